//! JSON file extraction source
//!
//! Reads hand-off files written by upstream extractors. A file holds one
//! `ExtractionBatch` object or an array of them. A directory source reads
//! every `*.json` file in it, in sorted path order.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::domain::result::{Error, Result};
use crate::domain::ExtractionBatch;
use crate::ports::ExtractionSource;

#[derive(Deserialize)]
#[serde(untagged)]
enum BatchFile {
    Many(Vec<ExtractionBatch>),
    One(Box<ExtractionBatch>),
}

/// Extraction batches stored as JSON on disk
pub struct JsonFileSource {
    path: PathBuf,
    name: String,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self { path, name }
    }

    /// The files this source reads, sorted
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        if self.path.is_file() {
            return Ok(vec![self.path.clone()]);
        }
        if !self.path.is_dir() {
            return Err(Error::not_found(format!(
                "no such file or directory: {}",
                self.path.display()
            )));
        }

        let mut files: Vec<PathBuf> = fs::read_dir(&self.path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("json"))
            })
            .collect();
        files.sort();
        Ok(files)
    }

    /// Parse one hand-off file
    pub fn read_file(path: &Path) -> Result<Vec<ExtractionBatch>> {
        let content = fs::read_to_string(path)?;
        let parsed: BatchFile = serde_json::from_str(&content).map_err(|e| {
            Error::validation(format!("{} is not an extraction batch: {}", path.display(), e))
        })?;
        Ok(match parsed {
            BatchFile::Many(batches) => batches,
            BatchFile::One(batch) => vec![*batch],
        })
    }
}

impl ExtractionSource for JsonFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> Result<Vec<ExtractionBatch>> {
        let mut batches = Vec::new();
        for file in self.files()? {
            batches.extend(Self::read_file(&file)?);
        }
        Ok(batches)
    }
}
