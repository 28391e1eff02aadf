//! Snippetbox binary entry point.

use clap::Parser;
use snippetbox::{
    config::LogFormat, db, password::PasswordHasher, router, session::spawn_cleanup_task, AppState,
    Cli, Config,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli)?;

    init_tracing(config.server.log_format);
    tracing::info!("Starting snippetbox");

    let pool = db::connect(&config.database.url, config.database.max_connections).await?;
    tracing::info!(url = %config.database.url, "Database ready");

    let hasher = PasswordHasher::new(config.password)?;
    let state = AppState::sqlite(pool.clone(), hasher, config.session.clone())?;

    let reaper = spawn_cleanup_task(
        state.sessions.clone(),
        Duration::from_secs(config.session.cleanup_interval_secs),
    );

    let app = router(state, &config.server.static_dir);

    let addr = config.server.bind_address();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {addr}");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reaper.abort();
    pool.close().await;
    tracing::info!("Shut down");

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "snippetbox=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!(error = %err, "failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
