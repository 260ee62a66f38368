use async_trait::async_trait;
use epi_http::{HttpClient, HttpError, RequestOpts};

/// Body of a fetched page plus the status it came with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

/// Anything that can turn an absolute URL into page text.
///
/// A returned error means the transport failed; HTTP error statuses are
/// ordinary pages.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, HttpError>;
}

#[async_trait]
impl PageSource for HttpClient {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, HttpError> {
        let page = self
            .get_page(
                url,
                RequestOpts {
                    allow_absolute: true,
                    ..Default::default()
                },
            )
            .await?;
        Ok(FetchedPage {
            status: page.status.as_u16(),
            body: page.body,
        })
    }
}
