use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tracing_subscriber::EnvFilter;

use bulkcast::audit::sheets::SheetsAuditLog;
use bulkcast::config::Config;
use bulkcast::roster::Roster;
use bulkcast::state::AppState;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(&config.log_level)
        }))
        .init();

    tracing::info!("Starting bulkcast");

    // Without both tables there is nothing to send; stop before serving.
    let roster = Roster::load(&config.receivers_path, &config.senders_path).map_err(|e| {
        tracing::error!("Error loading CSV files: {e}");
        e
    })?;

    match &config.gateway {
        Some(gateway) => tracing::info!(
            "WhatsApp gateway {} (instance {})",
            gateway.base_url,
            gateway.instance_name
        ),
        None => tracing::info!("WhatsApp gateway not configured, only Email runs are available"),
    }

    let audit = SheetsAuditLog::new(config.sheets.clone())?;
    if let Err(e) = audit.validate_config() {
        tracing::warn!("Audit log not ready, runs will be refused until fixed: {e}");
    }

    let addr = SocketAddr::new(config.host, config.port);
    let state = AppState::new(config, roster, Arc::new(audit));
    let app = bulkcast::build_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, finishing current request");
}
