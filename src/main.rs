use tasktrack::core::config::Config;
use tasktrack::core::db::{DbConfig, MemoryUserStore, UserRepository, create_pool_with_migrations};
use tasktrack::core::server::serve;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (if exists)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tasktrack=debug,tower_http=info")),
        )
        .init();

    // Load application config from environment variables
    let config = Config::from_env();

    // Log config status (without revealing secrets)
    tracing::info!(
        "Config loaded: database={}, secrets={}, refresh_policy={:?}, cors_origin={}",
        config.has_database(),
        config.has_secrets(),
        config.refresh_policy,
        config.cors_origin.as_deref().unwrap_or("*")
    );

    config.validate()?;

    match config.database_url.as_deref() {
        Some(url) => {
            let pool = create_pool_with_migrations(&DbConfig::new(url)).await?;
            serve(&config, UserRepository::new(pool)).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory user store; data is lost on exit");
            serve(&config, MemoryUserStore::new()).await
        }
    }
}
