//! Job summary written next to the output files as `<name>_meta.json`.

use arrow::datatypes::Schema;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

impl FieldInfo {
    pub fn from_schema(schema: &Schema) -> Vec<FieldInfo> {
        schema
            .fields()
            .iter()
            .map(|f| FieldInfo {
                name: f.name().clone(),
                data_type: f.data_type().to_string(),
                nullable: f.is_nullable(),
            })
            .collect()
    }
}

/// One finished output file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableInfo {
    pub writer: String,
    pub file: String,
    pub num_rows: u64,
    pub num_batches: u64,
    pub num_columns: usize,
    pub size_bytes: u64,
    pub fields: Vec<FieldInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriterSummary {
    pub name: String,
    pub state: String,
    pub nrecords: u64,
    pub nbatches: u64,
    pub nfiles: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerInfo {
    pub name: String,
    pub count: usize,
    pub total_ms: f64,
    pub mean_ms: f64,
    pub std_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramInfo {
    pub name: String,
    pub entries: u64,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub edges: Vec<f64>,
    pub counts: Vec<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobSummary {
    pub name: String,
    pub job_id: String,
    pub menu: String,
    pub seed: u64,
    pub ndatums: usize,
    pub nchunks: usize,
    pub ncollects: usize,
    pub peak_malloc: usize,
    pub total_records: u64,
    pub total_batches: u64,
    pub total_files: u64,
    pub writers: Vec<WriterSummary>,
    pub tables: Vec<TableInfo>,
    pub timers: Vec<TimerInfo>,
    pub histograms: Vec<HistogramInfo>,
}

impl JobSummary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
