use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use epi_config::{ScrapeConfig, ScrapeConfigLoader, discover_config_file};
use std::path::PathBuf;

/// Crawl recipe search listings and dump each recipe's JSON-LD block.
#[derive(Debug, Parser)]
#[command(name = "epi-scrape", version)]
pub struct Cli {
    /// Config file (YAML, TOML or JSON). Defaults to ./epi.yaml, then the
    /// user config directory.
    #[arg(short, long, env = "EPI_CONFIG")]
    pub config: Option<PathBuf>,

    /// First listing page to fetch.
    #[arg(long)]
    pub first_page: Option<u32>,

    /// Last listing page to fetch (inclusive).
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Retry budget for 429/5xx and network failures.
    #[arg(long)]
    pub retries: Option<usize>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Crawl the listing, then fetch every recipe (default).
    Run,
    /// Only crawl the listing and write the URL file.
    Crawl,
    /// Only fetch recipes listed in an existing URL file.
    Details,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Run)
    }

    /// Load file/env configuration and apply command-line overrides on top.
    pub fn load_config(&self) -> Result<ScrapeConfig> {
        let mut loader = ScrapeConfigLoader::new();
        let file = self.config.clone().or_else(discover_config_file);
        if let Some(path) = &file {
            loader = loader.with_file(path);
        }
        let mut cfg = loader
            .load()
            .with_context(|| match &file {
                Some(p) => format!("failed to load config from {}", p.display()),
                None => "failed to load config from environment".to_string(),
            })?;

        self.apply_overrides(&mut cfg);
        cfg.validate().context("invalid command-line overrides")?;
        Ok(cfg)
    }

    fn apply_overrides(&self, cfg: &mut ScrapeConfig) {
        if let Some(first) = self.first_page {
            cfg.listing.first_page = first;
        }
        if let Some(max) = self.max_pages {
            cfg.listing.max_pages = max;
        }
        if let Some(retries) = self.retries {
            cfg.http.retries = retries;
        }
    }
}
