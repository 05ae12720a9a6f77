//! Process wiring: build the store and collaborators from config, then serve.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::ConsoleConfig;
use crate::console::GrantConsole;
use crate::error::{ConsoleError, Result};
use crate::generator::{HttpReportGenerator, LocalDraftGenerator, ReportGenerator};
use crate::mailer::{Mailer, ManualDelivery, SmtpMailer};
use crate::storage::RequestStore;
use crate::storage::memory::InMemoryRequestStore;
use crate::web::{self, AppState};

/// Build the console described by `config`.
///
/// Connects to and migrates the database when one is configured; otherwise requests are kept
/// in memory.
pub async fn build_console(config: &ConsoleConfig) -> Result<GrantConsole> {
    let store = build_store(config).await?;

    let generator: Arc<dyn ReportGenerator> = match &config.grant_forge_url {
        Some(url) => {
            info!(url, "Generating reports with Grant-Forge");
            Arc::new(HttpReportGenerator::new(
                url.clone(),
                config.report_dir.clone(),
                config.grant_forge_timeout(),
            ))
        }
        None => Arc::new(LocalDraftGenerator::new(config.report_dir.clone())),
    };

    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => {
            info!(host = %smtp.host, port = smtp.port, "Delivering reports over SMTP");
            Arc::new(SmtpMailer::new(smtp, &config.mail_from)?)
        }
        None => Arc::new(ManualDelivery),
    };

    Ok(GrantConsole::new(store, generator, mailer))
}

#[cfg(feature = "postgres")]
async fn build_store(config: &ConsoleConfig) -> Result<Arc<dyn RequestStore>> {
    use crate::storage::postgres::PostgresRequestStore;
    use sqlx::postgres::PgPoolOptions;

    let Some(url) = &config.database_url else {
        return Ok(Arc::new(InMemoryRequestStore::new()));
    };

    info!(
        max_connections = config.database_max_connections,
        "Connecting to Postgres"
    );
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(url)
        .await?;
    crate::migrator()
        .run(&pool)
        .await
        .map_err(|e| ConsoleError::Other(anyhow::anyhow!("Failed to run migrations: {e}")))?;

    Ok(Arc::new(PostgresRequestStore::new(pool)))
}

#[cfg(not(feature = "postgres"))]
async fn build_store(config: &ConsoleConfig) -> Result<Arc<dyn RequestStore>> {
    if config.database_url.is_some() {
        return Err(ConsoleError::Config(
            "DATABASE_URL is set but this build has no Postgres support".to_string(),
        ));
    }
    Ok(Arc::new(InMemoryRequestStore::new()))
}

/// Run the console until a shutdown signal arrives.
pub async fn start_server(config: ConsoleConfig) -> Result<()> {
    info!("Initializing grant console...");
    let console = build_console(&config).await?;

    tokio::fs::create_dir_all(&config.report_dir).await?;
    info!(report_dir = %config.report_dir.display(), "Report directory ready");

    console
        .release_stale_runs(config.stale_run_timeout())
        .await?;

    let app = web::router(AppState::new(console, &config.admin));

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Grant console listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(web::shutdown_signal())
        .await?;

    info!("Grant console shut down");
    Ok(())
}
