mod error;
mod routes;
mod state;
mod telemetry;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};

use mailminder::archive::{ArchiveSink, LocalArchive, NotionArchive};
use mailminder::config::{load_config, resolve_config_path, Config};
use mailminder::db::Database;
use mailminder::extraction::OpenAiCompatibleModel;
use mailminder::mail::{ImapMailSource, ImapSettings};
use mailminder::pipeline::{Collaborators, Orchestrator};

use routes::AppRouter;
use state::ServerState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let explicit = std::env::args().nth(1);
    let config_path = resolve_config_path(explicit.as_deref())
        .context("Could not determine a config path; pass one or set MAILMINDER_CONFIG")?;
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    telemetry::init(&config.logging)?;
    info!(
        "Starting mailminder-server v{} with config {}",
        env!("CARGO_PKG_VERSION"),
        config_path.display()
    );

    let db_path = config
        .database
        .resolve_path()
        .context("Could not determine a database path; set database.path")?;
    let db = Database::open(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    let collaborators = build_collaborators(&config)?;
    let orchestrator = Orchestrator::from_config(&config, db.clone(), collaborators);
    let router = AppRouter::create(
        ServerState::new(db, orchestrator),
        config.server.cors_allow_any,
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!("Listening on {}", config.server.bind);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

fn build_collaborators(config: &Config) -> anyhow::Result<Collaborators> {
    let settings = ImapSettings::from_config(&config.mail).context("Invalid mail settings")?;
    let model = OpenAiCompatibleModel::from_config(&config.model).context("Invalid model settings")?;
    info!("Model endpoint: {}", model.endpoint());

    let archive: Arc<dyn ArchiveSink> = if config.archive.enabled {
        Arc::new(NotionArchive::from_config(&config.archive).context("Invalid archive settings")?)
    } else {
        warn!("Archive sync is disabled; messages are recorded locally only");
        Arc::new(LocalArchive)
    };

    Ok(Collaborators {
        mail: Arc::new(ImapMailSource::new(settings)),
        model: Arc::new(model),
        archive,
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
