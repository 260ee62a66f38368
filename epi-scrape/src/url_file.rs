//! Line-delimited URL list shared by the two stages.

use crate::error::ScrapeError;
use crate::listing::UrlSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Create the parent directory of `path` if it has one.
pub(crate) fn ensure_parent(path: &Path) -> Result<(), ScrapeError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).map_err(ScrapeError::io(dir))
        }
        _ => Ok(()),
    }
}

/// Truncate `path` and write one fragment per line. Returns the line count.
pub fn write_url_file(path: &Path, urls: &UrlSet) -> Result<usize, ScrapeError> {
    ensure_parent(path)?;
    let file = File::create(path).map_err(ScrapeError::io(path))?;
    let mut out = BufWriter::new(file);
    let mut written = 0;
    for fragment in urls {
        writeln!(out, "{fragment}").map_err(ScrapeError::io(path))?;
        written += 1;
    }
    out.flush().map_err(ScrapeError::io(path))?;
    tracing::info!(path = %path.display(), urls = written, "url_file.written");
    Ok(written)
}

/// Read the URL list; every line keeps its trailing newline (the last one
/// may lack it).
pub fn read_url_file(path: &Path) -> Result<Vec<String>, ScrapeError> {
    let text = fs::read_to_string(path).map_err(ScrapeError::io(path))?;
    Ok(split_lines_keep_newline(&text))
}

pub fn split_lines_keep_newline(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(str::to_owned).collect()
}

/// The URL fragment carried by a line: one trailing `\n` and `\r` removed.
pub fn fragment_of(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}
