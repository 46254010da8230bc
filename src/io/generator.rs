//! Datum sources: each datum is the full content of one input file.

use crate::error::{Error, Result};
use bytes::Bytes;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct FileGenerator {
    files: Vec<PathBuf>,
}

impl FileGenerator {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self { files }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Every file, in configured order.
    pub fn datums(&self) -> Datums<'_> {
        Datums {
            files: &self.files,
            next: 0,
        }
    }

    /// The first `ndatums` files.
    pub fn sample(&self, ndatums: usize) -> Datums<'_> {
        Datums {
            files: &self.files[..ndatums.min(self.files.len())],
            next: 0,
        }
    }
}

#[derive(Debug)]
pub struct Datums<'a> {
    files: &'a [PathBuf],
    next: usize,
}

impl Iterator for Datums<'_> {
    type Item = Result<(PathBuf, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.files.get(self.next)?;
        self.next += 1;
        info!(file = %path.display(), "reading datum");
        let read = std::fs::read(path).map_err(|e| {
            Error::Config(format!("cannot read input {}: {}", path.display(), e))
        });
        Some(read.map(|content| (path.clone(), Bytes::from(content))))
    }
}
