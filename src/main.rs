use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod crawler;
mod database;
mod error;
mod fetcher;
mod harvester;
mod models;
mod parser;
mod reconciler;
#[cfg(test)]
mod testing;
mod traits;

use config::{Config, LogFormat};
use database::Database;
use fetcher::{BrowserFetcher, HttpPageClient};
use harvester::Harvester;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    init_tracing(&config)?;

    let once = std::env::args().skip(1).any(|arg| arg == "--once");

    info!(base_url = %config.fetcher.base_url, once, "starting catalog harvester");

    let database = Arc::new(
        Database::connect(&config.database_url)
            .await
            .with_context(|| format!("failed to open database {}", config.database_url))?,
    );
    let fetcher = Arc::new(BrowserFetcher::new(config.fetcher.clone()));

    let mut harvester = Harvester::new(
        fetcher,
        database.clone(),
        database,
        config.harvest.clone(),
    );
    if config.harvest.fetch_descriptions {
        harvester = harvester.with_descriptions(Arc::new(HttpPageClient::new(&config.fetcher)?));
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown requested, finishing in-flight work");
        shutdown.cancel();
    });

    if once {
        let report = harvester.run_cycle(&cancel).await?;
        info!(?report, "single cycle finished");
    } else {
        harvester.run(&cancel).await;
    }

    Ok(())
}

fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .with_context(|| format!("invalid log filter {:?}", config.log_level))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = match config.log_format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };

    installed.map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
