//! On-disk layout of the dataset
//!
//! ```text
//! <root>/tickers/{date}_liquid_us_stocks.txt
//! <root>/tickers/raw/{SYMBOL}.csv
//! <root>/tickers/clean/{date}_stock_data_clean.csv
//! ```

use crate::error::{IoResultExt, Result, StockPullError};
use chrono::{DateTime, Local, NaiveDate};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Suffix shared by every saved ticker list
pub const TICKER_LIST_SUFFIX: &str = "liquid_us_stocks.txt";

/// Paths of the dataset rooted at a data directory
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    /// Create a layout rooted at `root` (nothing is touched on disk)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Data directory root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding ticker lists
    pub fn tickers_dir(&self) -> PathBuf {
        self.root.join("tickers")
    }

    /// Directory holding one raw history CSV per ticker
    pub fn raw_dir(&self) -> PathBuf {
        self.tickers_dir().join("raw")
    }

    /// Directory holding consolidated panels
    pub fn clean_dir(&self) -> PathBuf {
        self.tickers_dir().join("clean")
    }

    /// Create the directory structure; existing folders are left alone
    pub fn create_folders(&self) -> Result<()> {
        for dir in [self.raw_dir(), self.clean_dir()] {
            std::fs::create_dir_all(&dir).with_path(&dir)?;
        }
        Ok(())
    }

    /// Path of the ticker list saved on `date`
    pub fn ticker_list_path(&self, date: NaiveDate) -> PathBuf {
        self.tickers_dir()
            .join(format!("{}_{}", date.format("%Y-%m-%d"), TICKER_LIST_SUFFIX))
    }

    /// Raw history file of a ticker
    pub fn raw_path(&self, symbol: &str) -> PathBuf {
        self.raw_dir().join(format!("{}.csv", symbol))
    }

    /// Clean panel written on `date`
    pub fn clean_path(&self, date: NaiveDate) -> PathBuf {
        self.clean_dir()
            .join(format!("{}_stock_data_clean.csv", date.format("%Y-%m-%d")))
    }

    /// Most recent ticker list, by file name order
    pub fn latest_ticker_list(&self) -> Result<PathBuf> {
        let dir = self.tickers_dir();
        let read = match std::fs::read_dir(&dir) {
            Ok(read) => read,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StockPullError::NoTickerList(dir))
            }
            Err(e) => return Err(StockPullError::io(&dir, e)),
        };

        let mut names = Vec::new();
        for entry in read {
            let entry = entry.with_path(&dir)?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.contains(TICKER_LIST_SUFFIX) && entry.path().is_file() {
                names.push(name);
            }
        }

        names.sort();
        names
            .pop()
            .map(|name| dir.join(name))
            .ok_or(StockPullError::NoTickerList(dir))
    }

    /// Symbols of the most recent ticker list
    pub fn load_latest_tickers(&self) -> Result<Vec<String>> {
        let path = self.latest_ticker_list()?;
        tracing::debug!("Using ticker list {:?}", path);
        load_list(&path)
    }
}

/// Write one item per line
pub fn save_list<S: AsRef<str>>(path: &Path, items: &[S]) -> Result<()> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(path).with_path(path)?);
    for item in items {
        writeln!(file, "{}", item.as_ref()).with_path(path)?;
    }
    file.flush().with_path(path)
}

/// Read a list written by [`save_list`], skipping blank lines
pub fn load_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).with_path(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Whole days elapsed since the file was last modified
pub fn days_since_modified(path: &Path, now: DateTime<Local>) -> Result<i64> {
    let modified = std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .with_path(path)?;
    let modified: DateTime<Local> = modified.into();
    Ok((now - modified).num_days())
}
