//! Job configuration (job.json).
//!
//! JSON shape:
//! {
//!   "name": "csvjob",
//!   "job_id": "run1",
//!   "path": "out",
//!   "max_malloc": 2147483648,
//!   "sampler": { "ndatums": 1, "nchunks": 1 },
//!   "input": { "files": ["data.csv"], "filehandler": { "blocksize": 1048576 } },
//!   "algos": [ { "name": "csvparser", "klass": "CsvParserAlgo", "properties": [] } ],
//!   "tools": [ { "name": "bufferwriter", "klass": "BufferOutputWriter", "properties": [] } ]
//! }
//!
//! Every field except `name` has a default.

use crate::error::{Error, Result};
use crate::properties::{Properties, PropertyMsg, PropertyValue};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_MALLOC: u64 = 2 * 1024 * 1024 * 1024;
pub const DEFAULT_MAX_BUFFER_SIZE: u64 = 2 * 1024 * 1024 * 1024;
pub const DEFAULT_BLOCKSIZE: u64 = 1024 * 1024;
pub const DEFAULT_SEED: u64 = 42;

/// Tool name the collector clones its writers from.
pub const WRITER_TOOL: &str = "bufferwriter";

fn default_job_id() -> String {
    "job".to_string()
}

fn default_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_malloc() -> u64 {
    DEFAULT_MAX_MALLOC
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_one() -> usize {
    1
}

fn default_blocksize() -> u64 {
    DEFAULT_BLOCKSIZE
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_linesep() -> String {
    "\n".to_string()
}

fn default_true() -> bool {
    true
}

fn default_encoding() -> String {
    "utf8".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,

    /// Prefix of every output file.
    #[serde(default = "default_job_id")]
    pub job_id: String,

    /// Output directory.
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Columnar bytes held by the tree before the collector drains it.
    #[serde(default = "default_max_malloc")]
    pub max_malloc: u64,

    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default)]
    pub sampler: SamplerConfig,

    #[serde(default)]
    pub input: InputConfig,

    #[serde(default)]
    pub algos: Vec<ToolConfig>,

    #[serde(default)]
    pub tools: Vec<ToolConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Files read during the sampling pass.
    #[serde(default = "default_one")]
    pub ndatums: usize,

    /// Blocks steered per sampled file.
    #[serde(default = "default_one")]
    pub nchunks: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            ndatums: 1,
            nchunks: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(default)]
    pub files: Vec<PathBuf>,

    #[serde(default)]
    pub filehandler: FileHandlerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandlerConfig {
    /// Target block size in bytes; blocks end on a line separator.
    #[serde(default = "default_blocksize")]
    pub blocksize: u64,

    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    #[serde(default = "default_linesep")]
    pub linesep: String,

    /// The first line (after `header_offset` bytes) names the columns.
    #[serde(default = "default_true")]
    pub header: bool,

    #[serde(default)]
    pub header_offset: u64,

    #[serde(default)]
    pub footer: bool,

    /// Bytes dropped from the end of each file when `footer` is set.
    #[serde(default)]
    pub footer_size: u64,

    /// Column names to use instead of the header line.
    #[serde(default)]
    pub schema: Option<Vec<String>>,

    #[serde(default = "default_encoding")]
    pub encoding: String,
}

impl Default for FileHandlerConfig {
    fn default() -> Self {
        Self {
            blocksize: DEFAULT_BLOCKSIZE,
            delimiter: default_delimiter(),
            linesep: default_linesep(),
            header: true,
            header_offset: 0,
            footer: false,
            footer_size: 0,
            schema: None,
            encoding: default_encoding(),
        }
    }
}

/// A named, configurable algorithm or tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: String,

    /// Registered class used to build the instance.
    pub klass: String,

    #[serde(default)]
    pub properties: Vec<PropertyMsg>,
}

impl ToolConfig {
    pub fn new(name: impl Into<String>, klass: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            klass: klass.into(),
            properties: Vec::new(),
        }
    }

    /// Add or replace a property.
    pub fn with(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        let msg = PropertyMsg::new(name, &value.into());
        self.properties.retain(|p| p.name != name);
        self.properties.push(msg);
        self
    }

    pub fn properties(&self) -> Result<Properties> {
        Properties::from_msg(&self.properties)
    }
}

impl JobConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            job_id: default_job_id(),
            path: default_path(),
            max_malloc: DEFAULT_MAX_MALLOC,
            seed: DEFAULT_SEED,
            sampler: SamplerConfig::default(),
            input: InputConfig::default(),
            algos: Vec::new(),
            tools: Vec::new(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: JobConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn tool(&self, name: &str) -> Option<&ToolConfig> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Reject configurations a job cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("job name cannot be empty".to_string()));
        }
        if self.tool(WRITER_TOOL).is_none() {
            return Err(Error::Config(format!(
                "job {} has no {} tool",
                self.name, WRITER_TOOL
            )));
        }
        let fh = &self.input.filehandler;
        if fh.blocksize == 0 {
            return Err(Error::Config("blocksize must be positive".to_string()));
        }
        if fh.delimiter.len() != 1 {
            return Err(Error::Config(format!(
                "delimiter must be one byte, got {:?}",
                fh.delimiter
            )));
        }
        if fh.linesep.is_empty() {
            return Err(Error::Config("linesep cannot be empty".to_string()));
        }
        let mut seen = std::collections::HashSet::new();
        for algo in &self.algos {
            if !seen.insert(algo.name.as_str()) {
                return Err(Error::Config(format!("algorithm {} configured twice", algo.name)));
            }
        }
        Ok(())
    }
}
