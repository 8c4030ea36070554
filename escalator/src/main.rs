use std::sync::Arc;

use escalator::config::AppConfig;
use escalator::database;
use escalator::database::repositories::Repositories;
use escalator::engine::{EscalationEngine, EscalationSweeper};
use escalator::logging::init_logging;
use escalator::notification::{EmailTransport, LogEmailTransport, ReqwestHttpClient, SmtpEmailTransport};
use escalator::utils::http_client::install_rustls_provider;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;

    // Keep the guard alive so buffered file output is flushed on exit
    let (logging, _log_guard) = init_logging(&config.log_dir)?;
    if let Some(directive) = &config.log_filter {
        logging.set_filter(directive)?;
    }

    install_rustls_provider();

    let pool = database::init_pool(&config.database_url).await?;
    database::run_migrations(&pool).await?;

    let http = Arc::new(ReqwestHttpClient::new(
        config.http_timeout,
        config.http_max_rate_limit_retries,
    ));
    let email: Arc<dyn EmailTransport> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpEmailTransport::new(
            &smtp.host,
            smtp.port,
            smtp.username.as_deref(),
            smtp.password.as_deref(),
            &smtp.from,
        )?),
        None => {
            tracing::warn!("ESCALATOR_SMTP_HOST not set; email alerts will only be logged");
            Arc::new(LogEmailTransport)
        }
    };

    let engine = Arc::new(EscalationEngine::with_transports(
        Repositories::sqlx(pool.clone()),
        http,
        email,
        config.engine.clone(),
    ));

    let cancel = CancellationToken::new();
    logging.start_retention_cleanup(cancel.clone());
    let sweeper = EscalationSweeper::from_engine(engine.clone(), cancel.clone()).start();

    tracing::info!(
        channel_types = ?engine.registry().channel_types(),
        log_filter = %logging.get_filter(),
        "escalator initialized successfully"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    cancel.cancel();
    sweeper.await?;
    pool.close().await;

    Ok(())
}
