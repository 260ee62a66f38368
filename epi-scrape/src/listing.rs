//! Paginated search crawl.
//!
//! Every page in `first_page..=max_pages` is fetched once, in order, and the
//! whole body is scanned for recipe paths. There is no end-of-results
//! detection; an empty page just contributes nothing.

use crate::error::ScrapeError;
use crate::source::PageSource;
use epi_config::ListingConfig;
use regex::Regex;
use std::collections::HashSet;
use std::collections::hash_set;
use tokio_util::sync::CancellationToken;

/// Compiled recipe path pattern.
#[derive(Debug, Clone)]
pub struct RecipeUrlPattern(Regex);

impl RecipeUrlPattern {
    pub fn new(pattern: &str) -> Result<Self, ScrapeError> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|e| ScrapeError::InvalidConfig(format!("listing.pattern: {e}")))
    }

    /// All non-overlapping matches in `html`, in document order.
    pub fn find_all<'a>(&'a self, html: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0.find_iter(html).map(|m| m.as_str())
    }
}

/// Deduplicated recipe URL fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlSet(HashSet<String>);

impl UrlSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union every match of `pattern` in `html`; returns how many matches
    /// were seen (duplicates included).
    pub fn extend_from_html(&mut self, pattern: &RecipeUrlPattern, html: &str) -> usize {
        let mut seen = 0;
        for fragment in pattern.find_all(html) {
            seen += 1;
            if !self.0.contains(fragment) {
                self.0.insert(fragment.to_owned());
            }
        }
        seen
    }

    pub fn insert(&mut self, fragment: impl Into<String>) -> bool {
        self.0.insert(fragment.into())
    }

    pub fn contains(&self, fragment: &str) -> bool {
        self.0.contains(fragment)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> hash_set::Iter<'_, String> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a UrlSet {
    type Item = &'a String;
    type IntoIter = hash_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<String> for UrlSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Listing page URL: the base string with the page number appended.
pub fn page_url(base_url: &str, page: u32) -> String {
    format!("{base_url}{page}")
}

pub struct ListingCrawler {
    base_url: String,
    first_page: u32,
    max_pages: u32,
    pattern: RecipeUrlPattern,
}

impl ListingCrawler {
    pub fn new(config: &ListingConfig) -> Result<Self, ScrapeError> {
        if config.first_page == 0 || config.first_page > config.max_pages {
            return Err(ScrapeError::InvalidConfig(format!(
                "listing page range {}..={} is empty",
                config.first_page, config.max_pages
            )));
        }
        Ok(Self {
            base_url: config.base_url.clone(),
            first_page: config.first_page,
            max_pages: config.max_pages,
            pattern: RecipeUrlPattern::new(&config.pattern)?,
        })
    }

    pub fn pages(&self) -> std::ops::RangeInclusive<u32> {
        self.first_page..=self.max_pages
    }

    /// Fetch every listing page and collect the recipe fragments.
    ///
    /// A transport failure on any page aborts the crawl; nothing collected
    /// so far is returned.
    pub async fn crawl<S>(&self, source: &S, cancel: &CancellationToken) -> Result<UrlSet, ScrapeError>
    where
        S: PageSource + ?Sized,
    {
        let mut urls = UrlSet::new();

        for page in self.pages() {
            let url = page_url(&self.base_url, page);
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!(page, collected = urls.len(), "listing.cancelled");
                    return Err(ScrapeError::Cancelled);
                }
                res = source.fetch(&url) => {
                    res.map_err(|source| ScrapeError::Listing { page, source })?
                }
            };

            let matches = urls.extend_from_html(&self.pattern, &fetched.body);
            tracing::info!(
                page,
                status = fetched.status,
                matches,
                total = urls.len(),
                "listing.page"
            );
        }

        tracing::info!(
            pages = self.max_pages - self.first_page + 1,
            total = urls.len(),
            "listing.done"
        );
        Ok(urls)
    }
}
