// Fee Registry - Web Server
// JSON API with Axum

use anyhow::{Context, Result};
use fee_registry::api::{build_router, AppState};
use fee_registry::{init_tracing, AppConfig, FeeSchedule, RegistryGateway, SqliteStore};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = AppConfig::from_env();

    println!("🌐 Fee Registry - Web Server v{}", fee_registry::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let schedule = FeeSchedule::from_file(&config.schedule_path)
        .with_context(|| format!("Failed to load fee schedule {:?}", config.schedule_path))?;
    let store = Arc::new(SqliteStore::open(&config.database_path)?);
    println!("✓ Database opened: {:?}", config.database_path);
    println!("✓ Fee schedule: {} entries", schedule.len());

    let gateway = RegistryGateway::with_store(store, Arc::new(schedule));
    let app = build_router(AppState::new(gateway, config.recent_limit));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "server listening");
    println!("\n🚀 Server running on http://{}", config.bind_addr);
    println!("   API: http://{}/api/students", config.bind_addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
