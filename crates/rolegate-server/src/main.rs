mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use rolegate_core::{AdminReport, ChatCommands, RedemptionService, TokenIssuer};
use rolegate_db::Database;
use rolegate_discord::{Bot, DiscordRest, RoleGrantClient};

use crate::routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rolegate=debug,tower_http=debug".into()),
        )
        .init();

    // Config — credentials and wiring identifiers have no sensible defaults.
    let bot_token = require_env("ROLEGATE_BOT_TOKEN")?;
    let guild_id = require_env("ROLEGATE_GUILD_ID")?;
    let role_id = require_env("ROLEGATE_ROLE_ID")?;
    let admin_id = require_env("ROLEGATE_ADMIN_ID")?;
    let base_url = require_env("ROLEGATE_BASE_URL")?;

    let host = std::env::var("ROLEGATE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("ROLEGATE_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let db_path = std::env::var("ROLEGATE_DB_PATH").unwrap_or_else(|_| "rolegate.db".into());
    let prefix = std::env::var("ROLEGATE_COMMAND_PREFIX").unwrap_or_else(|_| ";".into());

    let db = Arc::new(Database::open(&PathBuf::from(&db_path))?);

    let rest = Arc::new(DiscordRest::new(bot_token.clone())?);
    let granter = RoleGrantClient::new(rest.clone(), guild_id, role_id);

    let commands = Arc::new(ChatCommands::new(
        TokenIssuer::new(db.clone()),
        AdminReport::new(db.clone(), admin_id),
        base_url,
    ));

    // The chat side runs next to the web surface; the two paths share
    // nothing but the store.
    let bot = Bot::new(rest, commands, bot_token, prefix);
    tokio::spawn(bot.run());

    let state = AppState {
        redemption: Arc::new(RedemptionService::new(db, granter)),
    };
    let app = routes::router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("rolegate listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

fn require_env(name: &str) -> anyhow::Result<String> {
    std::env::var(name).map_err(|_| anyhow::anyhow!("{} must be set", name))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
