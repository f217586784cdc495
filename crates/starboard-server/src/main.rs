mod config;
mod ingest;
mod rest;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use starboard_db::Database;
use starboard_engine::Engine;
use starboard_engine::locale::Locales;
use starboard_engine::settings::StoredSettings;

use config::{Config, Mode};
use ingest::IngestState;
use rest::DiscordRest;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "starboard=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);
    if config.mode == Mode::Dev {
        warn!("Dev mode: dropping and recreating all tables");
        db.reset()?;
    }

    let locales = Locales::load(&config.locales_dir)?;
    let platform = DiscordRest::connect(&config.api_base, &config.token).await?;

    let engine = Arc::new(Engine::new(
        db.clone(),
        Arc::new(platform),
        Arc::new(StoredSettings::new(db)),
        Arc::new(locales),
    ));
    engine.spawn_sweepers();

    let state = IngestState {
        engine,
        secret: config.ingest_secret.as_deref().map(Arc::from),
    };
    if state.secret.is_none() {
        warn!("STARBOARD_INGEST_SECRET is empty, event ingest accepts any caller");
    }

    let app = ingest::router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Starboard listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
            },
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
