use epi_http::HttpError;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal failures of a scrape run. Per-recipe problems never show up here;
/// they are diverted to the bad-records file instead.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("listing page {page} could not be fetched: {source}")]
    Listing {
        page: u32,
        #[source]
        source: HttpError,
    },

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("run cancelled")]
    Cancelled,
}

impl ScrapeError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
