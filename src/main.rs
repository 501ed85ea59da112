use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use log::{error, info};

use ticketcore::core::config::AppConfig;
use ticketcore::core::shared::state::AppState;
use ticketcore::core::shared::{create_pool, run_migrations};
use ticketcore::tickets::{configure_ticket_lifecycle_routes, PgTicketStore, TicketLifecycle};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config = AppConfig::load_default()?;

    let pool = create_pool(&config.database_url, config.database_pool_size)
        .context("Failed to create database pool")?;
    run_migrations(&pool).map_err(|e| anyhow::anyhow!("{}", e))?;

    let store = PgTicketStore::new(pool);
    let lifecycle = TicketLifecycle::new(store, config.lifecycle.clone())
        .await
        .context("Failed to initialize ticket lifecycle")?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    let state = Arc::new(AppState::new(config, lifecycle));
    let app = configure_ticket_lifecycle_routes::<PgTicketStore>().with_state(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {} - is another instance running?", addr, e);
            return Err(e.into());
        }
    };
    info!("Ticket lifecycle service listening on {}", addr);
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
