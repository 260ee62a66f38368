//! Recipe listing crawl and JSON-LD extraction.
//!
//! - [`listing`]: walk the paginated search results and collect recipe URL
//!   fragments into a deduplicated [`listing::UrlSet`]
//! - [`url_file`]: persist the set one fragment per line and read it back
//! - [`detail`]: fetch each recipe page, pull the first structured-data
//!   script and route it to the dump or the bad-records file
//! - [`pipeline`]: wire both stages to files and an [`epi_http::HttpClient`]
//!
//! Pages are fetched strictly one after another through the [`PageSource`]
//! seam, which tests replace with in-memory stubs.

pub mod detail;
pub mod error;
pub mod listing;
pub mod pipeline;
pub mod source;
pub mod url_file;

pub use detail::{DetailFetcher, DetailOutcome, DetailSinks, DetailSummary};
pub use error::ScrapeError;
pub use listing::{ListingCrawler, RecipeUrlPattern, UrlSet};
pub use pipeline::{Pipeline, RunSummary};
pub use source::{FetchedPage, PageSource};
