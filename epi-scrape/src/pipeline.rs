//! Both stages wired to files and the HTTP client.

use crate::detail::{DetailFetcher, DetailSinks, DetailSummary};
use crate::error::ScrapeError;
use crate::listing::ListingCrawler;
use crate::source::PageSource;
use crate::url_file::{read_url_file, write_url_file};
use epi_config::ScrapeConfig;
use epi_http::{ClientSettings, HttpClient};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub urls: usize,
    pub details: DetailSummary,
}

pub struct Pipeline<S> {
    source: S,
    config: ScrapeConfig,
    crawler: ListingCrawler,
    fetcher: DetailFetcher,
}

impl Pipeline<HttpClient> {
    /// Build the HTTP client from `config.http`, anchored at the site root.
    pub fn from_config(config: ScrapeConfig) -> Result<Self, ScrapeError> {
        let settings = ClientSettings {
            connect_timeout: config.http.connect_timeout(),
            timeout: config.http.timeout(),
            retries: config.http.retries,
            user_agent: config.http.user_agent.clone(),
        };
        let client = HttpClient::with_settings(&config.detail.site_root, settings)?;
        Self::new(client, config)
    }
}

impl<S: PageSource> Pipeline<S> {
    pub fn new(source: S, config: ScrapeConfig) -> Result<Self, ScrapeError> {
        let crawler = ListingCrawler::new(&config.listing)?;
        let fetcher = DetailFetcher::new(&config.detail)?;
        Ok(Self {
            source,
            config,
            crawler,
            fetcher,
        })
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    /// Listing stage: crawl every page, then overwrite the URL file.
    pub async fn crawl(&self, cancel: &CancellationToken) -> Result<usize, ScrapeError> {
        let urls = self.crawler.crawl(&self.source, cancel).await?;
        write_url_file(&self.config.output.urls, &urls)
    }

    /// Detail stage: read the URL file, truncate both outputs once, process
    /// every line.
    pub async fn details(&self, cancel: &CancellationToken) -> Result<DetailSummary, ScrapeError> {
        let output = &self.config.output;
        let lines = read_url_file(&output.urls)?;
        tracing::info!(path = %output.urls.display(), lines = lines.len(), "detail.start");

        let mut sinks = DetailSinks::create(output)?;
        self.fetcher
            .fetch_all(&self.source, &lines, &mut sinks, cancel)
            .await
    }

    /// Listing stage to completion, then detail stage to completion.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunSummary, ScrapeError> {
        let urls = self.crawl(cancel).await?;
        let details = self.details(cancel).await?;
        Ok(RunSummary { urls, details })
    }
}
