//! Server binary: configuration from the environment, then serve.

use restdb::{app, AppConfig, AppState, Db};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("restdb=info".parse()?))
        .init();

    let config = AppConfig::from_env()?;
    std::fs::create_dir_all(&config.storage_path)?;

    let db = Db::connect(&config.database_url).await?;
    let state = AppState::new(db, &config);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app(state)).await?;
    Ok(())
}
