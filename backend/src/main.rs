// --- File: backend/src/main.rs ---

use backend::{
    config::AppConfig,
    db,
    web_server::{run_server, AppState},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- Setup ---
    // 1. Initialize structured logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::INFO) // This sets the minimum level to INFO
        .init();

    // 2. Load configuration (Config.toml, then APP_* environment variables)
    let app_config = AppConfig::from_env()?;

    // 3. Connect to the database and bring the schema up to date
    let db_pool = db::connect(&app_config.database).await?;
    db::migrate(&db_pool).await?;

    let app_state = AppState {
        db_pool,
        app_config,
    };

    // --- Run Server ---
    tracing::info!("Initializing server...");
    run_server(app_state).await
}
