//! Output writers.
//!
//! `BufferOutputWriter` serializes record batches into an in-memory Arrow
//! IPC file. When the next batch would push the buffered batches past
//! `max_buffer_size`, the current file is closed, written to disk, read back
//! for validation and a new one is started. Files are named
//! `<job_id>_<writer>_<n>.arrow`, with `<file>.csv` next to each one when
//! `write_csv` is set.

use crate::config::DEFAULT_MAX_BUFFER_SIZE;
use crate::engine::Element;
use crate::error::{Error, Result};
use crate::properties::Properties;
use crate::summary::{FieldInfo, TableInfo};
use arrow::csv;
use arrow::datatypes::SchemaRef;
use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Registered --initialize--> Open --finalize--> Closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Registered,
    Open,
    Closed,
}

impl fmt::Display for WriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WriterState::Registered => "registered",
            WriterState::Open => "open",
            WriterState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// What the collector needs from an output sink.
pub trait Writer: fmt::Debug {
    fn name(&self) -> &str;

    fn set_name(&mut self, name: String);

    /// Schema every written batch must match.
    fn schema(&self) -> Option<&SchemaRef>;

    /// Fix the schema. Only allowed before `initialize`.
    fn set_schema(&mut self, schema: SchemaRef) -> Result<()>;

    fn state(&self) -> WriterState;

    fn initialize(&mut self) -> Result<()>;

    /// Append the record batch of every element, in order.
    fn write(&mut self, elements: &[Element]) -> Result<()>;

    /// Drop whatever is buffered and not yet on disk.
    fn flush(&mut self);

    /// Close the last file and stop accepting writes.
    fn finalize(&mut self) -> Result<()>;

    /// Records in the file being filled.
    fn nrecords(&self) -> u64;

    /// Batches in the file being filled.
    fn nbatches(&self) -> u64;

    fn total_records(&self) -> u64;

    fn total_batches(&self) -> u64;

    fn total_files(&self) -> u64;

    /// Summary of every finished file.
    fn finfo(&self) -> &[TableInfo];
}

pub struct BufferOutputWriter {
    name: String,
    job_id: String,
    path: PathBuf,
    max_buffer_size: u64,
    write_csv: bool,
    schema: Option<SchemaRef>,
    state: WriterState,

    sink: Option<FileWriter<Vec<u8>>>,
    csv: Option<csv::Writer<Vec<u8>>>,
    sizeof_batches: u64,
    nbatches: u64,
    nrecords: u64,

    total_records: u64,
    total_batches: u64,
    filecounter: u64,
    finfo: Vec<TableInfo>,
}

impl fmt::Debug for BufferOutputWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferOutputWriter")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("state", &self.state)
            .field("nbatches", &self.nbatches)
            .field("nrecords", &self.nrecords)
            .field("filecounter", &self.filecounter)
            .finish()
    }
}

impl BufferOutputWriter {
    pub fn new(name: impl Into<String>, job_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            job_id: job_id.into(),
            path: path.into(),
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            write_csv: false,
            schema: None,
            state: WriterState::Registered,
            sink: None,
            csv: None,
            sizeof_batches: 0,
            nbatches: 0,
            nrecords: 0,
            total_records: 0,
            total_batches: 0,
            filecounter: 0,
            finfo: Vec::new(),
        }
    }

    /// Options: `max_buffer_size` (bytes), `write_csv` (bool).
    pub fn from_properties(
        name: impl Into<String>,
        properties: &Properties,
        job_id: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let mut writer = Self::new(name, job_id, path);
        let size = properties.i64_or("max_buffer_size", DEFAULT_MAX_BUFFER_SIZE as i64)?;
        if size <= 0 {
            return Err(Error::Config(format!(
                "writer {}: max_buffer_size must be positive",
                writer.name
            )));
        }
        writer.max_buffer_size = size as u64;
        writer.write_csv = properties.bool_or("write_csv", false)?;
        Ok(writer)
    }

    pub fn with_max_buffer_size(mut self, bytes: u64) -> Self {
        self.max_buffer_size = bytes;
        self
    }

    pub fn with_csv(mut self, write_csv: bool) -> Self {
        self.write_csv = write_csv;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File the current buffer will be written to.
    pub fn file_name(&self) -> PathBuf {
        self.path.join(format!(
            "{}_{}_{}.arrow",
            self.job_id, self.name, self.filecounter
        ))
    }

    fn state_error(&self, op: &'static str) -> Error {
        Error::WriterState {
            name: self.name.clone(),
            state: self.state.to_string(),
            op,
        }
    }

    fn open_sink(&mut self) -> Result<()> {
        let schema = self.schema.clone().ok_or_else(|| self.state_error("open a file without a schema"))?;
        debug!(writer = %self.name, "new buffer");
        self.sink = Some(FileWriter::try_new(Vec::new(), schema.as_ref())?);
        self.csv = if self.write_csv {
            Some(csv::WriterBuilder::new().with_header(true).build(Vec::new()))
        } else {
            None
        };
        Ok(())
    }

    fn check_schema(&self, batch: &RecordBatch) -> Result<()> {
        let Some(expected) = &self.schema else {
            return Err(self.state_error("write without a schema"));
        };
        let found = batch.schema();
        if found.as_ref() == expected.as_ref() {
            return Ok(());
        }

        error!(writer = %self.name, "batch error, incorrect schema");
        if found.fields().len() != expected.fields().len() {
            error!("mismatch in number of fields");
        } else {
            for (want, got) in expected.fields().iter().zip(found.fields().iter()) {
                if want != got {
                    error!("current field {:?}, expected field {:?}", got, want);
                }
            }
        }
        Err(Error::SchemaMismatch {
            writer: self.name.clone(),
            expected: expected.to_string(),
            found: found.to_string(),
        })
    }

    /// Close the buffered file, put it on disk and check it reads back.
    fn finish_file(&mut self) -> Result<()> {
        let Some(mut sink) = self.sink.take() else {
            return Ok(());
        };
        sink.finish()?;
        let buffer = sink.into_inner()?;
        let fname = self.file_name();
        info!(writer = %self.name, file = %fname.display(), size = buffer.len(), "writing file");
        std::fs::write(&fname, &buffer)?;

        if let Some(csv) = self.csv.take() {
            let mut csv_name = fname.clone().into_os_string();
            csv_name.push(".csv");
            std::fs::write(PathBuf::from(csv_name), csv.into_inner())?;
        }

        self.validate(&fname, &buffer)?;

        let num_columns = self.schema.as_ref().map_or(0, |s| s.fields().len());
        self.finfo.push(TableInfo {
            writer: self.name.clone(),
            file: fname.display().to_string(),
            num_rows: self.nrecords,
            num_batches: self.nbatches,
            num_columns,
            size_bytes: buffer.len() as u64,
            fields: self.schema.as_deref().map(FieldInfo::from_schema).unwrap_or_default(),
        });
        self.total_records += self.nrecords;
        self.total_batches += self.nbatches;
        self.filecounter += 1;
        self.reset_counters();
        Ok(())
    }

    /// Batch and record counts of the written buffer must match the
    /// counters kept while writing.
    fn validate(&self, fname: &Path, buffer: &[u8]) -> Result<()> {
        let fail = |reason: String| Error::Validation {
            file: fname.display().to_string(),
            reason,
        };
        let reader = FileReader::try_new(Cursor::new(buffer), None)?;
        let nbatches = reader.num_batches() as u64;
        if nbatches != self.nbatches {
            return Err(fail(format!(
                "batches: counter {} payload {}",
                self.nbatches, nbatches
            )));
        }
        let mut nrecords = 0u64;
        for batch in reader {
            nrecords += batch?.num_rows() as u64;
        }
        if nrecords != self.nrecords {
            return Err(fail(format!(
                "records: counter {} payload {}",
                self.nrecords, nrecords
            )));
        }
        debug!(file = %fname.display(), nbatches, nrecords, "file validated");
        Ok(())
    }

    fn reset_counters(&mut self) {
        self.sizeof_batches = 0;
        self.nbatches = 0;
        self.nrecords = 0;
    }

    fn write_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        self.check_schema(batch)?;

        let size = batch.get_array_memory_size() as u64;
        if self.nbatches > 0 && self.sizeof_batches + size > self.max_buffer_size {
            info!(
                writer = %self.name,
                current = self.sizeof_batches,
                estimated = self.sizeof_batches + size,
                "buffer full, starting a new file"
            );
            self.finish_file()?;
        }
        if self.sink.is_none() {
            self.open_sink()?;
        }

        if let Some(sink) = self.sink.as_mut() {
            sink.write(batch)?;
        }
        if let Some(csv) = self.csv.as_mut() {
            csv.write(batch)?;
        }
        self.nrecords += batch.num_rows() as u64;
        self.nbatches += 1;
        self.sizeof_batches += size;
        Ok(())
    }
}

impl Writer for BufferOutputWriter {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn schema(&self) -> Option<&SchemaRef> {
        self.schema.as_ref()
    }

    fn set_schema(&mut self, schema: SchemaRef) -> Result<()> {
        if self.state != WriterState::Registered {
            return Err(self.state_error("change schema"));
        }
        self.schema = Some(schema);
        Ok(())
    }

    fn state(&self) -> WriterState {
        self.state
    }

    fn initialize(&mut self) -> Result<()> {
        if self.state != WriterState::Registered {
            return Err(self.state_error("initialize"));
        }
        info!(writer = %self.name, path = %self.path.display(), "initialize writer");
        std::fs::create_dir_all(&self.path)?;
        self.open_sink()?;
        self.state = WriterState::Open;
        Ok(())
    }

    fn write(&mut self, elements: &[Element]) -> Result<()> {
        if self.state != WriterState::Open {
            return Err(self.state_error("write"));
        }
        for element in elements {
            let Some(batch) = element.batch() else {
                warn!(writer = %self.name, element = %element.key(), "element holds no record batch");
                continue;
            };
            self.write_batch(batch)?;
        }
        debug!(
            writer = %self.name,
            records = self.nrecords,
            batches = self.nbatches,
            size = self.sizeof_batches,
            "buffer filled"
        );
        Ok(())
    }

    fn flush(&mut self) {
        error!(writer = %self.name, "flushing buffer, {} batches dropped", self.nbatches);
        self.sink = None;
        self.csv = None;
        self.reset_counters();
    }

    fn finalize(&mut self) -> Result<()> {
        if self.state != WriterState::Open {
            return Err(self.state_error("finalize"));
        }
        self.state = WriterState::Closed;
        info!(
            writer = %self.name,
            batches = self.nbatches,
            records = self.nrecords,
            "finalize final file"
        );
        if self.nbatches == 0 {
            self.sink = None;
            self.csv = None;
            return Ok(());
        }
        self.finish_file()
    }

    fn nrecords(&self) -> u64 {
        self.nrecords
    }

    fn nbatches(&self) -> u64 {
        self.nbatches
    }

    fn total_records(&self) -> u64 {
        self.total_records
    }

    fn total_batches(&self) -> u64 {
        self.total_batches
    }

    fn total_files(&self) -> u64 {
        self.filecounter
    }

    fn finfo(&self) -> &[TableInfo] {
        &self.finfo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryPool;
    use arrow::array::{ArrayRef, Int64Array};
    use pretty_assertions::assert_eq;
    use std::fs::File;
    use std::sync::Arc;

    fn batch(names: [&str; 2], rows: i64) -> RecordBatch {
        let col = |start: i64| Arc::new(Int64Array::from_iter_values(start..start + rows)) as ArrayRef;
        RecordBatch::try_from_iter([(names[0], col(0)), (names[1], col(100))]).unwrap()
    }

    fn element(b: RecordBatch) -> Element {
        let mut el = Element::new("k", MemoryPool::new());
        el.set_data(b);
        el
    }

    fn writer(dir: &Path) -> BufferOutputWriter {
        let mut w = BufferOutputWriter::new("writer_leaf", "job", dir);
        w.set_schema(batch(["a", "b"], 1).schema()).unwrap();
        w
    }

    #[test]
    fn writes_and_validates_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path());
        w.initialize().unwrap();
        w.write(&[element(batch(["a", "b"], 3)), element(batch(["a", "b"], 4))])
            .unwrap();
        assert_eq!((w.nbatches(), w.nrecords()), (2, 7));
        w.finalize().unwrap();

        assert_eq!(w.state(), WriterState::Closed);
        assert_eq!(w.total_files(), 1);
        assert_eq!(w.total_records(), 7);
        let info = &w.finfo()[0];
        assert_eq!((info.num_rows, info.num_batches, info.num_columns), (7, 2, 2));

        let fname = dir.path().join("job_writer_leaf_0.arrow");
        let reader = FileReader::try_new(File::open(fname).unwrap(), None).unwrap();
        assert_eq!(reader.num_batches(), 2);
    }

    #[test]
    fn rotates_when_buffer_is_full() {
        let dir = tempfile::tempdir().unwrap();
        let one = batch(["a", "b"], 10);
        let size = one.get_array_memory_size() as u64;
        let mut w = writer(dir.path()).with_max_buffer_size(size + size / 2);
        w.initialize().unwrap();
        w.write(&[element(one.clone()), element(one.clone()), element(one)])
            .unwrap();
        w.finalize().unwrap();

        assert_eq!(w.total_files(), 3);
        assert_eq!(w.total_batches(), 3);
        assert!(dir.path().join("job_writer_leaf_2.arrow").exists());
    }

    #[test]
    fn schema_mismatch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path());
        w.initialize().unwrap();
        let err = w.write(&[element(batch(["d", "e"], 3))]).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { .. }));
        assert_eq!(w.nbatches(), 0);
    }

    #[test]
    fn csv_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path()).with_csv(true);
        w.initialize().unwrap();
        w.write(&[element(batch(["a", "b"], 2))]).unwrap();
        w.finalize().unwrap();

        let text = std::fs::read_to_string(dir.path().join("job_writer_leaf_0.arrow.csv")).unwrap();
        assert_eq!(text, "a,b\n0,100\n1,101\n");
    }

    #[test]
    fn state_machine_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path());
        assert!(matches!(w.write(&[]), Err(Error::WriterState { .. })));
        w.initialize().unwrap();
        assert!(w.set_schema(batch(["x", "y"], 1).schema()).is_err());
        assert!(w.initialize().is_err());
        w.finalize().unwrap();
        assert!(w.finalize().is_err());
        assert_eq!(w.total_files(), 0);
    }
}
