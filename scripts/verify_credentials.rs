//! X Credential Check Script
//!
//! This script loads the service configuration (environment or `.env`),
//! signs a `GET /users/me` request with the configured OAuth 1.0a
//! credentials and prints what the X API answers.

use tokio_util::sync::CancellationToken;
use xposter::{AppConfig, OperationResult, PostOperations};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    env_logger::init();

    println!("🐦 X Credential Check");
    println!("=====================");

    let config = AppConfig::from_env()?;
    println!("📍 API base URL: {}", config.endpoints.api_base_url);
    println!("🔑 Credentials: {:?}", config.credentials);

    let ops = PostOperations::from_config(&config)?;

    println!("\n🚀 Requesting the authenticated account...");
    match ops.verify_credentials(&CancellationToken::new()).await {
        OperationResult::Success(me) => {
            println!("✅ Credentials accepted!");
            if let Some(username) = me["data"]["username"].as_str() {
                println!("👤 Authenticated as @{}", username);
            }
            println!("📄 Full response: {}", me);
            Ok(())
        }
        OperationResult::AlreadyDone { reason } | OperationResult::Rejected { reason } => {
            println!("❌ Request was not sent: {}", reason);
            Err(reason.into())
        }
        OperationResult::Failed(e) => {
            println!("💥 Credential check failed: {}", e);
            Err(e.into())
        }
    }
}
