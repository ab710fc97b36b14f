//! Symbol discovery in a CSV directory.

use crate::domain::TimeFrame;
use crate::error::BundleError;
use std::fs;
use std::path::{Path, PathBuf};

/// Case-sensitive extension of price files.
pub const CSV_EXTENSION: &str = ".csv";

/// Directory holding the fundamentals files, relative to the CSV root.
pub const FUNDAMENTALS_DIR: &str = "fundamentals";

/// `{root}/{tframe}` when that folder exists, otherwise `root` itself.
pub fn resolve_price_dir(root: &Path, tframe: TimeFrame) -> PathBuf {
    let nested = root.join(tframe.as_str());
    if nested.is_dir() {
        nested
    } else {
        root.to_path_buf()
    }
}

/// Sorted symbols of every `<symbol>.csv` file directly under `dir`.
///
/// The position of a symbol in the returned list is its sid.
pub fn scan_symbols(dir: &Path) -> Result<Vec<String>, BundleError> {
    if !dir.exists() {
        return Err(BundleError::config(format!(
            "{} does not exist",
            dir.display()
        )));
    }
    if !dir.is_dir() {
        return Err(BundleError::config(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let entries = fs::read_dir(dir).map_err(|e| BundleError::io(dir, e))?;
    let mut symbols = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| BundleError::io(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if let Some(symbol) = name.strip_suffix(CSV_EXTENSION) {
            if !symbol.is_empty() {
                symbols.push(symbol.to_string());
            }
        }
    }

    if symbols.is_empty() {
        return Err(BundleError::config(format!(
            "no <symbol>.csv files found in {}",
            dir.display()
        )));
    }

    symbols.sort();
    Ok(symbols)
}
