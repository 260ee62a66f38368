//! Shared pieces for the epi-scrape workspace.
//!
//! Currently this is the tracing bootstrap in [`observability`], used by the
//! binary and by integration tests across crates. The crate stays light so
//! every other member can depend on it.
//!
//! ```rust
//! use epi_common::observability::{LogConfig, LogFormat};
//!
//! let cfg = LogConfig {
//!     format: LogFormat::Json,
//!     ..LogConfig::default()
//! };
//! assert_eq!(cfg.app_name, "epi-scrape");
//! assert!(cfg.emit_stderr);
//! ```

pub mod observability;

pub use observability::{init_logging, LogConfig, LogFormat};
