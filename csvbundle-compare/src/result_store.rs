//! Append-only comparison results on disk.
//!
//! Layout under the result root:
//! - `processed.txt`: one sid per line, every asset compared
//! - `with_diff.txt`: one sid per line, assets with at least one mismatch
//! - `{sid}.json`: ISO dates on which that asset disagreed
//!
//! List files are opened lazily in append mode and flushed after every line,
//! so progress survives a later failure or a killed process.

use crate::error::CompareError;
use chrono::NaiveDate;
use csvbundle_core::domain::Sid;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const PROCESSED_FILE: &str = "processed.txt";
pub const WITH_DIFF_FILE: &str = "with_diff.txt";

pub struct ResultStore {
    rootdir: PathBuf,
    processed: Option<File>,
    with_diff: Option<File>,
}

impl ResultStore {
    /// Create the root if needed. No list file is opened yet.
    pub fn open(rootdir: impl Into<PathBuf>) -> Result<Self, CompareError> {
        let rootdir = rootdir.into();
        fs::create_dir_all(&rootdir).map_err(|e| CompareError::result_store(&rootdir, e))?;
        Ok(Self {
            rootdir,
            processed: None,
            with_diff: None,
        })
    }

    pub fn rootdir(&self) -> &Path {
        &self.rootdir
    }

    pub fn dates_path(&self, sid: Sid) -> PathBuf {
        self.rootdir.join(format!("{sid}.json"))
    }

    pub fn add_processed(&mut self, sid: Sid) -> Result<(), CompareError> {
        let path = self.rootdir.join(PROCESSED_FILE);
        append_line(&mut self.processed, &path, sid)
    }

    pub fn add_has_diff(&mut self, sid: Sid) -> Result<(), CompareError> {
        let path = self.rootdir.join(WITH_DIFF_FILE);
        append_line(&mut self.with_diff, &path, sid)
    }

    /// Sids in `processed.txt`, in append order. Empty when the file is absent.
    pub fn processed(&self) -> Result<Vec<Sid>, CompareError> {
        read_sids(&self.rootdir.join(PROCESSED_FILE))
    }

    /// Sids in `with_diff.txt`, in append order. Empty when the file is absent.
    pub fn with_diff(&self) -> Result<Vec<Sid>, CompareError> {
        read_sids(&self.rootdir.join(WITH_DIFF_FILE))
    }

    /// Replace `{sid}.json` with `dates`.
    pub fn write_dates(&self, sid: Sid, dates: &[NaiveDate]) -> Result<(), CompareError> {
        let path = self.dates_path(sid);
        let json = serde_json::to_string(dates)
            .map_err(|e| CompareError::result_format(&path, e.to_string()))?;
        fs::write(&path, json).map_err(|e| CompareError::result_store(&path, e))
    }

    pub fn read_dates(&self, sid: Sid) -> Result<Vec<NaiveDate>, CompareError> {
        let path = self.dates_path(sid);
        let content = fs::read_to_string(&path).map_err(|e| CompareError::result_store(&path, e))?;
        serde_json::from_str(&content).map_err(|e| CompareError::result_format(&path, e.to_string()))
    }
}

fn append_line(slot: &mut Option<File>, path: &Path, sid: Sid) -> Result<(), CompareError> {
    if slot.is_none() {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| CompareError::result_store(path, e))?;
        *slot = Some(file);
    }
    if let Some(file) = slot.as_mut() {
        writeln!(file, "{sid}").map_err(|e| CompareError::result_store(path, e))?;
        file.flush().map_err(|e| CompareError::result_store(path, e))?;
    }
    Ok(())
}

fn read_sids(path: &Path) -> Result<Vec<Sid>, CompareError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path).map_err(|e| CompareError::result_store(path, e))?;
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.parse::<Sid>()
                .map_err(|e| CompareError::result_format(path, format!("bad sid '{line}': {e}")))
        })
        .collect()
}
