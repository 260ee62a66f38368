//! Recipe detail pages: fetch, pull the structured-data script, route it.
//!
//! Each URL line ends in exactly one place. Extracted text goes to the dump
//! (one blob per line, never parsed), anything else sends the original line
//! to the bad-records file and the loop moves on.

use crate::error::ScrapeError;
use crate::source::PageSource;
use crate::url_file::{ensure_parent, fragment_of};
use epi_config::{DetailConfig, OutputPaths};
use epi_http::HttpError;
use scraper::{Html, Selector};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub enum DetailOutcome {
    /// Raw text of the first structured-data element.
    Extracted(String),
    /// Page fetched, but it carries no structured-data element.
    MissingStructuredData { status: u16 },
    /// The page could not be fetched at all.
    FetchFailed(HttpError),
}

impl DetailOutcome {
    pub fn is_extracted(&self) -> bool {
        matches!(self, Self::Extracted(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetailSummary {
    pub total: usize,
    pub extracted: usize,
    pub missing: usize,
    pub failed: usize,
}

impl DetailSummary {
    pub fn bad(&self) -> usize {
        self.missing + self.failed
    }
}

/// The dump and bad-records writers. Generic so tests can capture output
/// in memory.
pub struct DetailSinks<R: Write, B: Write> {
    records: R,
    bad: B,
    records_path: PathBuf,
    bad_path: PathBuf,
}

impl DetailSinks<BufWriter<File>, BufWriter<File>> {
    /// Truncate (or create) both output files.
    pub fn create(paths: &OutputPaths) -> Result<Self, ScrapeError> {
        let open = |path: &PathBuf| -> Result<BufWriter<File>, ScrapeError> {
            ensure_parent(path)?;
            File::create(path)
                .map(BufWriter::new)
                .map_err(ScrapeError::io(path))
        };
        Ok(Self {
            records: open(&paths.records)?,
            bad: open(&paths.bad_records)?,
            records_path: paths.records.clone(),
            bad_path: paths.bad_records.clone(),
        })
    }
}

impl<R: Write, B: Write> DetailSinks<R, B> {
    pub fn new(records: R, bad: B) -> Self {
        Self {
            records,
            bad,
            records_path: PathBuf::from("<records>"),
            bad_path: PathBuf::from("<bad-records>"),
        }
    }

    fn write_record(&mut self, text: &str) -> Result<(), ScrapeError> {
        self.records
            .write_all(text.as_bytes())
            .and_then(|_| self.records.write_all(b"\n"))
            .map_err(ScrapeError::io(&self.records_path))
    }

    /// The line is written as read; a missing final newline is added.
    fn write_bad(&mut self, line: &str) -> Result<(), ScrapeError> {
        let res = if line.ends_with('\n') {
            self.bad.write_all(line.as_bytes())
        } else {
            self.bad
                .write_all(line.as_bytes())
                .and_then(|_| self.bad.write_all(b"\n"))
        };
        res.map_err(ScrapeError::io(&self.bad_path))
    }

    pub fn flush(&mut self) -> Result<(), ScrapeError> {
        self.records
            .flush()
            .map_err(ScrapeError::io(&self.records_path))?;
        self.bad.flush().map_err(ScrapeError::io(&self.bad_path))
    }

    pub fn into_parts(self) -> (R, B) {
        (self.records, self.bad)
    }
}

pub struct DetailFetcher {
    site_root: String,
    selector: Selector,
}

impl DetailFetcher {
    pub fn new(config: &DetailConfig) -> Result<Self, ScrapeError> {
        let selector = Selector::parse(&config.selector)
            .map_err(|e| ScrapeError::InvalidConfig(format!("detail.selector: {e}")))?;
        Ok(Self {
            site_root: config.site_root.clone(),
            selector,
        })
    }

    /// Site root with the fragment appended verbatim.
    pub fn detail_url(&self, fragment: &str) -> String {
        format!("{}{}", self.site_root, fragment)
    }

    /// Text of the first matching element, if any.
    pub fn extract(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        document
            .select(&self.selector)
            .next()
            .map(|el| el.text().collect::<String>())
    }

    pub async fn fetch_one<S>(&self, source: &S, fragment: &str) -> DetailOutcome
    where
        S: PageSource + ?Sized,
    {
        match source.fetch(&self.detail_url(fragment)).await {
            Ok(page) => match self.extract(&page.body) {
                Some(text) => DetailOutcome::Extracted(text),
                None => DetailOutcome::MissingStructuredData {
                    status: page.status,
                },
            },
            Err(err) => DetailOutcome::FetchFailed(err),
        }
    }

    /// Process every line in order, writing each to exactly one sink.
    ///
    /// Only sink I/O errors and cancellation stop the loop; on cancellation
    /// whatever was written so far is flushed first.
    pub async fn fetch_all<S, R, B>(
        &self,
        source: &S,
        lines: &[String],
        sinks: &mut DetailSinks<R, B>,
        cancel: &CancellationToken,
    ) -> Result<DetailSummary, ScrapeError>
    where
        S: PageSource + ?Sized,
        R: Write,
        B: Write,
    {
        let mut summary = DetailSummary::default();

        for (index, line) in lines.iter().enumerate() {
            // A blank line fetches the site root itself and is routed like any other.
            let fragment = fragment_of(line);
            tracing::info!(index, url = %fragment, "detail.fetch");
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    sinks.flush()?;
                    tracing::warn!(index, ?summary, "detail.cancelled");
                    return Err(ScrapeError::Cancelled);
                }
                outcome = self.fetch_one(source, fragment) => outcome,
            };

            summary.total += 1;
            match outcome {
                DetailOutcome::Extracted(text) => {
                    sinks.write_record(&text)?;
                    summary.extracted += 1;
                }
                DetailOutcome::MissingStructuredData { status } => {
                    sinks.write_bad(line)?;
                    summary.missing += 1;
                    tracing::warn!(index, url = %fragment, status, "no json");
                }
                DetailOutcome::FetchFailed(err) => {
                    sinks.write_bad(line)?;
                    summary.failed += 1;
                    tracing::warn!(index, url = %fragment, error = %err, "no json: fetch failed");
                }
            }
        }

        sinks.flush()?;
        tracing::info!(
            total = summary.total,
            extracted = summary.extracted,
            bad = summary.bad(),
            "detail.done"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FetchedPage;
    use async_trait::async_trait;
    use std::collections::HashMap;

    const ROOT: &str = "https://site.test";

    const RECIPE_PAGE: &str = r#"<html><head>
<script type="text/javascript">var x = 1;</script>
<script type="application/ld+json">{"@type":"Recipe","name":"Pea Soup"}</script>
<script type="application/ld+json">{"@type":"BreadcrumbList"}</script>
</head><body><h1>Pea Soup</h1></body></html>"#;

    const PLAIN_PAGE: &str = "<html><body><p>No data here</p></body></html>";

    struct StubDetail {
        pages: HashMap<String, Result<String, ()>>,
    }

    impl StubDetail {
        fn new(entries: &[(&str, Result<&str, ()>)]) -> Self {
            let pages = entries
                .iter()
                .map(|(frag, body)| (format!("{ROOT}{frag}"), body.map(str::to_owned)))
                .collect();
            Self { pages }
        }
    }

    #[async_trait]
    impl PageSource for StubDetail {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, HttpError> {
            match self.pages.get(url) {
                Some(Ok(body)) => Ok(FetchedPage::ok(body.clone())),
                Some(Err(())) => Err(HttpError::Network("connection refused".into())),
                None => Ok(FetchedPage {
                    status: 404,
                    body: "<html>gone</html>".into(),
                }),
            }
        }
    }

    fn fetcher() -> DetailFetcher {
        DetailFetcher::new(&DetailConfig {
            site_root: ROOT.into(),
            ..DetailConfig::default()
        })
        .unwrap()
    }

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    async fn run(stub: &StubDetail, input: &[String]) -> (DetailSummary, String, String) {
        let mut sinks = DetailSinks::new(Vec::new(), Vec::new());
        let summary = fetcher()
            .fetch_all(stub, input, &mut sinks, &CancellationToken::new())
            .await
            .unwrap();
        let (records, bad) = sinks.into_parts();
        (
            summary,
            String::from_utf8(records).unwrap(),
            String::from_utf8(bad).unwrap(),
        )
    }

    #[test]
    fn extracts_first_structured_data_script() {
        assert_eq!(
            fetcher().extract(RECIPE_PAGE).as_deref(),
            Some(r#"{"@type":"Recipe","name":"Pea Soup"}"#)
        );
    }

    #[test]
    fn no_script_means_nothing_extracted() {
        assert_eq!(fetcher().extract(PLAIN_PAGE), None);
        assert_eq!(fetcher().extract(""), None);
    }

    #[test]
    fn empty_script_extracts_empty_text() {
        let html = r#"<script type="application/ld+json"></script>"#;
        assert_eq!(fetcher().extract(html).as_deref(), Some(""));
    }

    #[test]
    fn detail_url_appends_fragment() {
        assert_eq!(
            fetcher().detail_url("/recipes/food/views/x"),
            "https://site.test/recipes/food/views/x"
        );
    }

    #[test]
    fn invalid_selector_is_config_error() {
        let res = DetailFetcher::new(&DetailConfig {
            selector: "script[".into(),
            ..DetailConfig::default()
        });
        assert!(matches!(res, Err(ScrapeError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn extracted_text_goes_to_dump_only() {
        let stub = StubDetail::new(&[("/recipes/food/views/soup", Ok(RECIPE_PAGE))]);
        let (summary, records, bad) = run(&stub, &lines(&["/recipes/food/views/soup\n"])).await;

        assert_eq!(records, "{\"@type\":\"Recipe\",\"name\":\"Pea Soup\"}\n");
        assert!(bad.is_empty());
        assert_eq!(summary.extracted, 1);
        assert_eq!(summary.bad(), 0);
    }

    #[tokio::test]
    async fn missing_tag_sends_original_line_to_bad_records() {
        let stub = StubDetail::new(&[("/recipes/food/views/plain", Ok(PLAIN_PAGE))]);
        let (summary, records, bad) =
            run(&stub, &lines(&["/recipes/food/views/plain\n"])).await;

        assert!(records.is_empty());
        assert_eq!(bad, "/recipes/food/views/plain\n");
        assert_eq!(summary.missing, 1);
    }

    #[tokio::test]
    async fn fetch_failure_is_recovered() {
        let stub = StubDetail::new(&[
            ("/recipes/food/views/down", Err(())),
            ("/recipes/food/views/soup", Ok(RECIPE_PAGE)),
        ]);
        let (summary, records, bad) = run(
            &stub,
            &lines(&["/recipes/food/views/down\n", "/recipes/food/views/soup\n"]),
        )
        .await;

        assert_eq!(bad, "/recipes/food/views/down\n");
        assert_eq!(records.lines().count(), 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.extracted, 1);
    }

    #[tokio::test]
    async fn every_line_lands_in_exactly_one_sink() {
        let stub = StubDetail::new(&[
            ("/recipes/food/views/a", Ok(RECIPE_PAGE)),
            ("/recipes/food/views/b", Ok(PLAIN_PAGE)),
            ("/recipes/food/views/c", Err(())),
            ("/recipes/food/views/d", Ok(RECIPE_PAGE)),
        ]);
        let input = lines(&[
            "/recipes/food/views/a\n",
            "/recipes/food/views/b\n",
            "/recipes/food/views/c\n",
            "/recipes/food/views/d\n",
            "/recipes/food/views/e\n",
        ]);
        let (summary, records, bad) = run(&stub, &input).await;

        assert_eq!(summary.total, input.len());
        assert_eq!(summary.extracted + summary.bad(), input.len());
        assert_eq!(records.lines().count(), summary.extracted);
        assert_eq!(
            bad,
            "/recipes/food/views/b\n/recipes/food/views/c\n/recipes/food/views/e\n"
        );
    }

    #[tokio::test]
    async fn blank_lines_land_in_exactly_one_sink() {
        let stub = StubDetail::new(&[("/recipes/food/views/a", Ok(RECIPE_PAGE))]);
        let (summary, records, bad) =
            run(&stub, &lines(&["\n", "/recipes/food/views/a\n", "   \n"])).await;

        assert_eq!(summary.total, 3);
        assert_eq!(summary.extracted + summary.bad(), 3);
        assert_eq!(records.lines().count(), 1);
        assert_eq!(bad, "\n   \n");
    }

    #[tokio::test]
    async fn blank_line_uses_the_site_root_page() {
        let stub = StubDetail::new(&[("", Ok(RECIPE_PAGE))]);
        let (summary, records, bad) = run(&stub, &lines(&["\n"])).await;

        assert_eq!(summary.extracted, 1);
        assert_eq!(records, "{\"@type\":\"Recipe\",\"name\":\"Pea Soup\"}\n");
        assert!(bad.is_empty());
    }

    #[tokio::test]
    async fn last_line_without_newline_still_gets_one() {
        let stub = StubDetail::new(&[]);
        let (_, _, bad) = run(&stub, &lines(&["/recipes/food/views/z"])).await;
        assert_eq!(bad, "/recipes/food/views/z\n");
    }

    #[tokio::test]
    async fn cancellation_flushes_and_stops() {
        let stub = StubDetail::new(&[("/recipes/food/views/a", Ok(RECIPE_PAGE))]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut sinks = DetailSinks::new(Vec::new(), Vec::new());

        let err = fetcher()
            .fetch_all(&stub, &lines(&["/recipes/food/views/a\n"]), &mut sinks, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, ScrapeError::Cancelled));
        let (records, bad) = sinks.into_parts();
        assert!(records.is_empty() && bad.is_empty());
    }

    /// Never answers; only cancellation can end a fetch.
    struct HangingSource;

    #[async_trait]
    impl PageSource for HangingSource {
        async fn fetch(&self, _url: &str) -> Result<FetchedPage, HttpError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn cancellation_abandons_the_in_flight_request() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let mut sinks = DetailSinks::new(Vec::new(), Vec::new());

        let err = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            fetcher().fetch_all(
                &HangingSource,
                &lines(&["/recipes/food/views/a\n", "/recipes/food/views/b\n"]),
                &mut sinks,
                &cancel,
            ),
        )
        .await
        .expect("cancellation ends the hanging request")
        .unwrap_err();

        assert!(matches!(err, ScrapeError::Cancelled));
        let (records, bad) = sinks.into_parts();
        assert!(records.is_empty() && bad.is_empty());
    }
}
