//! Collector: drains leaf payloads into writers when the tree holds too
//! much columnar memory, and once more when the job ends.

use super::writer::{BufferOutputWriter, Writer, WriterState};
use crate::config::{JobConfig, ToolConfig, WRITER_TOOL};
use crate::engine::book::uniform_edges;
use crate::engine::{Gate, timed};
use crate::error::{Error, Result};
use crate::summary::WriterSummary;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Writer configuration cloned once per leaf.
#[derive(Debug, Clone)]
pub struct WriterTemplate {
    pub tool: ToolConfig,
    pub job_id: String,
    pub path: PathBuf,
}

impl WriterTemplate {
    pub fn new(tool: ToolConfig, job_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            job_id: job_id.into(),
            path: path.into(),
        }
    }

    /// Build a writer named `name` from the template.
    pub fn instantiate(&self, name: &str) -> Result<Box<dyn Writer>> {
        match self.tool.klass.as_str() {
            "BufferOutputWriter" => {
                let properties = self.tool.properties()?;
                Ok(Box::new(BufferOutputWriter::from_properties(
                    name,
                    &properties,
                    self.job_id.clone(),
                    self.path.clone(),
                )?))
            }
            other => Err(Error::Config(format!(
                "tool {} has unknown writer class {}",
                self.tool.name, other
            ))),
        }
    }
}

#[derive(Debug)]
pub struct Collector {
    max_malloc: usize,
    template: WriterTemplate,
    writers: Vec<Box<dyn Writer>>,
    ncollects: usize,
}

impl Collector {
    /// Name under which the collector books its histograms.
    pub const NAME: &'static str = "collector";

    pub fn new(max_malloc: usize, template: WriterTemplate) -> Self {
        Self {
            max_malloc,
            template,
            writers: Vec::new(),
            ncollects: 0,
        }
    }

    /// Use the job's `bufferwriter` tool as the writer template.
    pub fn from_config(config: &JobConfig) -> Result<Self> {
        let Some(tool) = config.tool(WRITER_TOOL) else {
            error!("job {} has no {} configuration", config.name, WRITER_TOOL);
            return Err(Error::Config(format!("missing {} configuration", WRITER_TOOL)));
        };
        let max_malloc = usize::try_from(config.max_malloc).unwrap_or(usize::MAX);
        Ok(Self::new(
            max_malloc,
            WriterTemplate::new(tool.clone(), config.job_id.clone(), config.path.clone()),
        ))
    }

    pub fn max_malloc(&self) -> usize {
        self.max_malloc
    }

    /// Drains performed so far, the final one included.
    pub fn ncollects(&self) -> usize {
        self.ncollects
    }

    pub fn writer(&self, name: &str) -> Option<&dyn Writer> {
        self.writers
            .iter()
            .find(|w| w.name() == name)
            .map(|w| w.as_ref())
    }

    pub fn writers(&self) -> impl Iterator<Item = &dyn Writer> {
        self.writers.iter().map(|w| w.as_ref())
    }

    /// Take ownership of an already configured writer.
    pub fn register(&mut self, writer: Box<dyn Writer>) -> Result<()> {
        if self.writer(writer.name()).is_some() {
            return Err(Error::Config(format!(
                "writer {} is already registered",
                writer.name()
            )));
        }
        info!("add writer {}", writer.name());
        self.writers.push(writer);
        Ok(())
    }

    /// Register one writer per leaf whose last element is a record batch,
    /// using that batch's schema, then flush the tree.
    ///
    /// On failure the writers opened so far are finalized before the
    /// error is returned.
    pub fn initialize(&mut self, gate: &mut Gate) -> Result<()> {
        info!("initialize collector");
        if let Err(e) = gate
            .book
            .book_timer(Self::NAME, "time.collect", uniform_edges(0.0, 1000.0, 100))
        {
            error!("cannot book collector timer: {}", e);
        }

        if let Err(e) = self.open_writers(gate) {
            self.close_writers();
            return Err(e);
        }
        gate.tree.flush();
        Ok(())
    }

    fn open_writers(&mut self, gate: &Gate) -> Result<()> {
        for leaf in gate.tree.leaves() {
            let Some(node) = gate.tree.node(leaf) else {
                continue;
            };
            let Some(last) = node.payload().last() else {
                error!("cannot retrieve payload of leaf {}", leaf);
                return Err(Error::PayloadEmpty(leaf.clone()));
            };
            let Some(batch) = last.batch() else {
                debug!("leaf {} holds no record batch, no writer", leaf);
                continue;
            };

            let name = format!("writer_{}", leaf);
            if self.writer(&name).is_some() {
                return Err(Error::Config(format!("writer {} is already registered", name)));
            }
            let mut writer = self.template.instantiate(&name)?;
            writer.set_schema(batch.schema())?;
            if let Err(e) = writer.initialize() {
                error!("problem creating output stream {}: {}", name, e);
                return Err(e);
            }
            self.register(writer)?;
        }
        Ok(())
    }

    fn close_writers(&mut self) {
        for writer in &mut self.writers {
            if writer.state() != WriterState::Open {
                continue;
            }
            match writer.finalize() {
                Ok(()) => warn!("closed writer {} after failed initialize", writer.name()),
                Err(e) => error!("cannot close writer {}: {}", writer.name(), e),
            }
        }
    }

    /// Drain when the pool holds more than `max_malloc` bytes. Returns
    /// whether a drain happened.
    pub fn execute(&mut self, gate: &mut Gate) -> Result<bool> {
        let allocated = gate.pool().total_allocated_bytes();
        if allocated <= self.max_malloc {
            return Ok(false);
        }
        info!(allocated, max_malloc = self.max_malloc, "collect: memory ceiling reached");
        self.collect(gate)?;
        Ok(true)
    }

    /// Write every leaf's elements to its writer, then flush the tree.
    pub fn collect(&mut self, gate: &mut Gate) -> Result<()> {
        let (result, ms) = timed(|| self.drain(gate, false));
        if let Err(e) = gate.book.fill(Self::NAME, "time.collect", ms) {
            debug!("{}", e);
        }
        gate.timers.fill(Self::NAME, "collect", ms);
        if let Err(e) = &result {
            error!("problem collecting: {}", e);
        }
        result
    }

    /// Leaves are drained in order. A leaf's elements are all checked
    /// against the writer schema before any of them is written, and a
    /// written leaf is cleared at once so a later failure never sends it
    /// again. The final pass skips leaves an earlier partial drain emptied.
    fn drain(&mut self, gate: &mut Gate, last_pass: bool) -> Result<()> {
        info!(
            allocated = gate.pool().total_allocated_bytes(),
            leaves = ?gate.tree.leaves(),
            "collect"
        );

        let leaves = gate.tree.leaves().to_vec();
        for leaf in &leaves {
            let Some(node) = gate.tree.node(leaf) else {
                continue;
            };
            let elements = node.payload();
            if elements.is_empty() {
                if last_pass {
                    debug!("leaf {} has nothing left to drain", leaf);
                    continue;
                }
                error!("leaf {} has no payload", leaf);
                return Err(Error::PayloadEmpty(leaf.clone()));
            }
            if elements.iter().all(|e| e.batch().is_none()) {
                debug!("leaf {} holds no record batch", leaf);
                continue;
            }

            let name = format!("writer_{}", leaf);
            let Some(writer) = self.writers.iter_mut().find(|w| w.name() == name) else {
                if last_pass {
                    warn!("no writer {} during final collect, skipping", name);
                    continue;
                }
                return Err(Error::WriterNotFound(name));
            };
            let Some(expected) = writer.schema().cloned() else {
                return Err(Error::Config(format!("writer {} has no schema", name)));
            };

            for element in elements {
                let found = match element.batch() {
                    Some(batch) if batch.schema().as_ref() == expected.as_ref() => continue,
                    Some(batch) => batch.schema().to_string(),
                    None => {
                        warn!(leaf = %leaf, element = %element.key(), "non-columnar element on a batch leaf");
                        format!("non-columnar payload in {}", element.key())
                    }
                };
                error!(writer = %name, element = %element.key(), "schema mismatch");
                return Err(Error::SchemaMismatch {
                    writer: name,
                    expected: expected.to_string(),
                    found,
                });
            }

            debug!(leaf = %leaf, batches = elements.len(), "writing leaf");
            if let Err(e) = writer.write(elements) {
                error!("error in buffer writer {}: {}", name, e);
                return Err(e);
            }
            info!(
                writer = %name,
                records = writer.nrecords(),
                batches = writer.nbatches(),
                "leaf drained"
            );
            if let Some(node) = gate.tree.node_mut(leaf) {
                node.clear_payload();
            }
        }

        gate.tree.flush();
        self.ncollects += 1;
        info!(allocated = gate.pool().total_allocated_bytes(), "allocated after write");
        Ok(())
    }

    /// Drain what is left, then finalize every writer even if something
    /// failed. Writer counts and file summaries go into the job summary.
    pub fn finalize(&mut self, gate: &mut Gate) -> Result<()> {
        let mut first: Option<Error> = None;

        if !gate.tree.is_empty() {
            info!("collecting remaining data");
            let (result, ms) = timed(|| self.drain(gate, true));
            gate.timers.fill(Self::NAME, "collect", ms);
            if let Err(e) = result {
                error!("problem collecting: {}", e);
                first = Some(e);
            }
        }

        for writer in &mut self.writers {
            if writer.state() == WriterState::Closed {
                debug!("writer {} already closed", writer.name());
            } else if let Err(e) = writer.finalize() {
                error!("finalize buffer stream fails {}: {}", writer.name(), e);
                first.get_or_insert(e);
            }
            info!(
                writer = %writer.name(),
                records = writer.total_records(),
                batches = writer.total_batches(),
                files = writer.total_files(),
                "file summary statistics"
            );

            let summary = &mut gate.summary;
            summary.total_records += writer.total_records();
            summary.total_batches += writer.total_batches();
            summary.total_files += writer.total_files();
            summary.tables.extend(writer.finfo().iter().cloned());
            summary.writers.push(WriterSummary {
                name: writer.name().to_string(),
                state: writer.state().to_string(),
                nrecords: writer.total_records(),
                nbatches: writer.total_batches(),
                nfiles: writer.total_files(),
            });
        }
        gate.summary.ncollects = self.ncollects;

        first.map_or(Ok(()), Err)
    }
}
