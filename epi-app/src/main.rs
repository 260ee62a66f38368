use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use epi_common::observability::init_logging;
use epi_scrape::Pipeline;
use tokio_util::sync::CancellationToken;

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = cli.load_config()?;

    let log_path = init_logging(cfg.logging.to_log_config())?;
    tracing::info!(
        log = %log_path.display(),
        command = ?cli.command(),
        first_page = cfg.listing.first_page,
        max_pages = cfg.listing.max_pages,
        "epi-scrape.start"
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling the in-flight request");
                cancel.cancel();
            }
        });
    }

    let pipeline = Pipeline::from_config(cfg).context("failed to set up scraper")?;
    match cli.command() {
        Command::Run => {
            let summary = pipeline.run(&cancel).await?;
            tracing::info!(
                urls = summary.urls,
                extracted = summary.details.extracted,
                bad = summary.details.bad(),
                "epi-scrape.done"
            );
        }
        Command::Crawl => {
            let urls = pipeline.crawl(&cancel).await?;
            tracing::info!(urls, "epi-scrape.done");
        }
        Command::Details => {
            let details = pipeline.details(&cancel).await?;
            tracing::info!(
                extracted = details.extracted,
                bad = details.bad(),
                "epi-scrape.done"
            );
        }
    }
    Ok(())
}
