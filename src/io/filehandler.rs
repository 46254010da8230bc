//! Splits a raw file into blocks of whole lines.
//!
//! `prepare_schema` reads the header line (after `header_offset` bytes) for
//! column names. `prepare_blocks` cuts the body into pieces of about
//! `blocksize` bytes, each ending on a line separator, and starts every
//! block with a synthesized header line so each one parses on its own.

use crate::config::FileHandlerConfig;
use crate::error::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, info, warn};

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[derive(Debug, Clone)]
pub struct FileHandler {
    config: FileHandlerConfig,
    columns: Option<Vec<String>>,
    /// Bytes of the header line, separator included.
    header_size: usize,
}

impl FileHandler {
    pub fn new(config: FileHandlerConfig) -> Result<Self> {
        match config.encoding.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" | "ascii" => {}
            other => {
                return Err(Error::Config(format!("unsupported encoding {}", other)));
            }
        }
        if config.linesep.is_empty() || config.blocksize == 0 {
            return Err(Error::Config(
                "file handler needs a line separator and a positive blocksize".to_string(),
            ));
        }
        Ok(Self {
            columns: config.schema.clone(),
            config,
            header_size: 0,
        })
    }

    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    pub fn header_size(&self) -> usize {
        self.header_size
    }

    /// Read the header of `datum`. Configured column names win over the
    /// header line, which is still measured so it can be skipped.
    pub fn prepare_schema(&mut self, datum: &[u8]) -> Result<Option<Vec<String>>> {
        self.header_size = 0;
        if !self.config.header {
            return Ok(self.columns.clone());
        }

        let start = self.config.header_offset as usize;
        if start > datum.len() {
            return Err(Error::Config(format!(
                "header offset {} is past the end of a {} byte file",
                start,
                datum.len()
            )));
        }
        let rest = &datum[start..];
        let sep = self.config.linesep.as_bytes();
        let (line, size) = match find(rest, sep) {
            Some(i) => (&rest[..i], i + sep.len()),
            None => (rest, rest.len()),
        };
        self.header_size = size;

        let text = std::str::from_utf8(line).map_err(|e| {
            warn!("header is not utf8");
            Error::Config(format!("header is not utf8: {}", e))
        })?;
        let names: Vec<String> = text
            .trim_end_matches('\r')
            .split(self.config.delimiter.as_str())
            .map(|s| s.trim().trim_matches('"').to_string())
            .collect();
        info!(columns = ?names, header_size = size, "header read");

        if self.columns.is_none() {
            self.columns = Some(names);
        }
        Ok(self.columns.clone())
    }

    /// The header line put in front of every block.
    fn header_line(&self) -> Option<Vec<u8>> {
        let columns = self.columns.as_ref()?;
        let mut line = columns.join(self.config.delimiter.as_str()).into_bytes();
        line.extend_from_slice(self.config.linesep.as_bytes());
        Some(line)
    }

    /// Cut the body of `datum` into blocks. Call `prepare_schema` first.
    pub fn prepare_blocks(&self, datum: &Bytes) -> Result<Vec<Bytes>> {
        let mut start = self.config.header_offset as usize;
        if self.config.header {
            start += self.header_size;
        }
        let mut end = datum.len();
        if self.config.footer {
            end = end.saturating_sub(self.config.footer_size as usize);
        }
        if start >= end {
            debug!("no data after header and footer");
            return Ok(Vec::new());
        }

        let sep = self.config.linesep.as_bytes();
        let blocksize = self.config.blocksize as usize;
        let header = self.header_line();

        let mut blocks = Vec::new();
        let mut pos = start;
        while pos < end {
            let target = (pos + blocksize).min(end);
            let cut = if target >= end {
                end
            } else {
                // Extend to the end of the line that crosses the target.
                let from = target - 1;
                match find(&datum[from..end], sep) {
                    Some(i) => from + i + sep.len(),
                    None => end,
                }
            };

            let body = datum.slice(pos..cut);
            let block = match &header {
                Some(h) => {
                    let mut buf = BytesMut::with_capacity(h.len() + body.len());
                    buf.put_slice(h);
                    buf.put_slice(&body);
                    buf.freeze()
                }
                None => body,
            };
            blocks.push(block);
            pos = cut;
        }

        debug!(nblocks = blocks.len(), "blocks prepared");
        Ok(blocks)
    }
}
