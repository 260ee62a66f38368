//! Loader for scraper configuration with file + environment overlays.
//!
//! Precedence, lowest to highest: built-in defaults, an optional
//! YAML/TOML/JSON file, `EPI__`-prefixed environment variables
//! (`EPI__LISTING__MAX_PAGES=10`). String values may reference other
//! environment variables as `${VAR}`; expansion is recursive up to a fixed
//! depth.
//!
//! With no file and no environment overrides the defaults reproduce the
//! original hardcoded run: the Epicurious search listing, 2507 pages,
//! `outputs/urls`, `data/epi.json` and `outputs/bad-recs`.
use config::{Config, ConfigError, Environment, File};
use epi_common::observability::{LogConfig, LogFormat};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;
const ENV_PREFIX: &str = "EPI";
const DEFAULT_FILE_NAME: &str = "epi.yaml";
const APP_DIR: &str = "epi-scrape";

pub const DEFAULT_LISTING_URL: &str = "https://www.epicurious.com/search?content=recipe&sort=newest&page=";
pub const DEFAULT_MAX_PAGES: u32 = 2507;
pub const DEFAULT_RECIPE_PATTERN: &str = r#"/recipes/food/views/[^"]+"#;
pub const DEFAULT_SITE_ROOT: &str = "https://www.epicurious.com";
pub const DEFAULT_STRUCTURED_DATA_SELECTOR: &str = r#"script[type="application/ld+json"]"#;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub listing: ListingConfig,
    pub detail: DetailConfig,
    pub output: OutputPaths,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

/// Search listing crawl: `base_url` + page index for every page in range.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    pub base_url: String,
    pub first_page: u32,
    pub max_pages: u32,
    /// Regex whose matches are collected as recipe URL fragments.
    pub pattern: String,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LISTING_URL.into(),
            first_page: 1,
            max_pages: DEFAULT_MAX_PAGES,
            pattern: DEFAULT_RECIPE_PATTERN.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetailConfig {
    /// Prefix joined with every URL fragment.
    pub site_root: String,
    /// CSS selector for the structured-data element; the first match wins.
    pub selector: String,
}

impl Default for DetailConfig {
    fn default() -> Self {
        Self {
            site_root: DEFAULT_SITE_ROOT.into(),
            selector: DEFAULT_STRUCTURED_DATA_SELECTOR.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputPaths {
    pub urls: PathBuf,
    pub records: PathBuf,
    pub bad_records: PathBuf,
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self {
            urls: PathBuf::from("outputs/urls"),
            records: PathBuf::from("data/epi.json"),
            bad_records: PathBuf::from("outputs/bad-recs"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct HttpConfig {
    /// Unset means requests wait as long as the server takes.
    pub timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub retries: usize,
    pub user_agent: Option<String>,
}

impl HttpConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub app_name: String,
    pub dir: Option<PathBuf>,
    pub format: LogFormat,
    pub stderr: bool,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let base = LogConfig::default();
        Self {
            app_name: base.app_name,
            dir: base.log_dir,
            format: base.format,
            stderr: base.emit_stderr,
            filter: base.default_filter,
        }
    }
}

impl LoggingConfig {
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            app_name: self.app_name.clone(),
            log_dir: self.dir.clone(),
            emit_stderr: self.stderr,
            format: self.format,
            default_filter: self.filter.clone(),
        }
    }
}

impl ScrapeConfig {
    /// Reject settings that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let listing = &self.listing;
        if listing.first_page == 0 {
            return Err(ConfigError::Message(
                "listing.first_page must be at least 1".into(),
            ));
        }
        if listing.first_page > listing.max_pages {
            return Err(ConfigError::Message(format!(
                "listing.first_page ({}) is greater than listing.max_pages ({})",
                listing.first_page, listing.max_pages
            )));
        }
        for (key, value) in [
            ("listing.base_url", &listing.base_url),
            ("listing.pattern", &listing.pattern),
            ("detail.site_root", &self.detail.site_root),
            ("detail.selector", &self.detail.selector),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Message(format!("{key} must not be empty")));
            }
        }
        let first_page_url = format!("{}{}", listing.base_url, listing.first_page);
        for (key, value) in [
            ("listing.base_url", first_page_url.as_str()),
            ("detail.site_root", self.detail.site_root.as_str()),
        ] {
            Url::parse(value)
                .map_err(|e| ConfigError::Message(format!("{key} is not a valid URL: {e}")))?;
        }
        for (key, value) in [
            ("http.timeout_secs", self.http.timeout_secs),
            ("http.connect_timeout_secs", self.http.connect_timeout_secs),
        ] {
            if value == Some(0) {
                return Err(ConfigError::Message(format!("{key} must be at least 1")));
            }
        }
        Ok(())
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// First existing default config file: `./epi.yaml`, then
/// `<config_dir>/epi-scrape/epi.yaml`.
pub fn discover_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(DEFAULT_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR).join(DEFAULT_FILE_NAME))
        .filter(|p| p.is_file())
}

/// Builder hides the `config` crate wiring (files + env overrides).
pub struct ScrapeConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for ScrapeConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrapeConfigLoader {
    /// Start from the built-in defaults. Environment overrides are layered on
    /// last in [`ScrapeConfigLoader::load`], so they beat any file.
    ///
    /// ```
    /// use epi_config::ScrapeConfigLoader;
    ///
    /// let cfg = ScrapeConfigLoader::new().load().expect("defaults are valid");
    /// assert_eq!(cfg.listing.max_pages, 2507);
    /// assert_eq!(cfg.detail.site_root, "https://www.epicurious.com");
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a YAML/TOML/JSON file that must exist; format is inferred by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that is skipped when missing.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet (tests, embedded presets).
    ///
    /// ```
    /// use epi_config::ScrapeConfigLoader;
    ///
    /// let cfg = ScrapeConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// listing:
    ///   max_pages: 3
    /// output:
    ///   records: "/tmp/recipes.jsonl"
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.listing.max_pages, 3);
    /// assert_eq!(cfg.listing.first_page, 1);
    /// assert_eq!(cfg.output.records.to_str(), Some("/tmp/recipes.jsonl"));
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources into a
    /// validated [`ScrapeConfig`].
    pub fn load(self) -> Result<ScrapeConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: ScrapeConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        typed.validate()?;
        Ok(typed)
    }
}
