//! Job driver: wires a configuration and a compiled menu into a gate,
//! steering and a collector, then runs every input block through them.
//!
//! Lifecycle of `control`:
//! 1. configure: validate, build steering from the registry, lock
//! 2. initialize: steering, a sampling pass, the collector, rebook
//! 3. run: every block of every datum, draining when memory runs high
//! 4. finalize: steering and collector always, then `<name>_meta.json`

use crate::algorithms::builtin_registry;
use crate::config::JobConfig;
use crate::engine::{AlgoRegistry, Datum, Gate, Steering};
use crate::error::{Error, Result};
use crate::io::{Collector, FileGenerator, FileHandler};
use crate::menu::Menu;
use crate::summary::{HistogramInfo, JobSummary};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Debug)]
pub struct Job {
    config: JobConfig,
    menu: Menu,
    registry: AlgoRegistry,
}

impl Job {
    pub fn new(config: JobConfig, menu: Menu) -> Self {
        Self::with_registry(config, menu, builtin_registry())
    }

    /// Use a custom algorithm catalog instead of the built-ins.
    pub fn with_registry(config: JobConfig, menu: Menu, registry: AlgoRegistry) -> Self {
        Self {
            config,
            menu,
            registry,
        }
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn menu(&self) -> &Menu {
        &self.menu
    }

    /// Where the job summary is written.
    pub fn meta_path(&self) -> PathBuf {
        self.config
            .path
            .join(format!("{}_meta.json", self.config.name))
    }

    /// Run the job to completion and return its summary.
    ///
    /// Once the collector is initialized, both finalizers run on every
    /// exit path and the summary is written before the first error is
    /// returned.
    pub fn control(&mut self) -> Result<JobSummary> {
        info!(job = %self.config.name, menu = %self.menu.name(), "configure");
        self.config.validate()?;
        let mut steering =
            Steering::from_config(&self.menu, &self.config.algos, &self.registry)?;
        let mut collector = Collector::from_config(&self.config)?;
        steering.lock();

        let mut gate = Gate::new(self.config.name.clone());
        let generator = FileGenerator::new(self.config.input.files.clone());
        if generator.is_empty() {
            return Err(Error::Config(format!(
                "job {} has no input files",
                self.config.name
            )));
        }
        let mut handler = FileHandler::new(self.config.input.filehandler.clone())?;

        info!("initialize");
        steering.initialize(&mut gate)?;
        self.sample(&generator, &mut handler, &mut steering, &mut gate)?;
        collector.initialize(&mut gate)?;
        steering.rebook(&mut gate);

        info!("run");
        let run = Self::run(&generator, &mut handler, &mut steering, &mut collector, &mut gate);
        if let Err(e) = &run {
            error!("job {} failed: {}", self.config.name, e);
        }

        info!("finalize");
        let steered = steering.finalize(&mut gate);
        let collected = collector.finalize(&mut gate);
        self.fill_summary(&steering, &mut gate);
        let written = self.write_summary(&gate.summary);

        run.and(steered).and(collected).and(written)?;
        info!(
            job = %self.config.name,
            chunks = steering.chunks(),
            records = gate.summary.total_records,
            files = gate.summary.total_files,
            "job complete"
        );
        Ok(gate.summary)
    }

    /// Steer the first `nchunks` blocks of the first `ndatums` files so
    /// every leaf holds a batch the collector can take a schema from.
    fn sample(
        &self,
        generator: &FileGenerator,
        handler: &mut FileHandler,
        steering: &mut Steering,
        gate: &mut Gate,
    ) -> Result<()> {
        let sampler = &self.config.sampler;
        info!(ndatums = sampler.ndatums, nchunks = sampler.nchunks, "sampling");
        for datum in generator.sample(sampler.ndatums) {
            let (path, raw) = datum?;
            handler.prepare_schema(&raw)?;
            let blocks = handler.prepare_blocks(&raw)?;
            if blocks.is_empty() {
                warn!(file = %path.display(), "sampled file has no data");
            }
            for block in blocks.into_iter().take(sampler.nchunks) {
                steering.execute(gate, Datum::Raw(block))?;
            }
        }
        if steering.chunks() == 0 {
            return Err(Error::Config("sampling pass steered no chunks".to_string()));
        }
        gate.summary.ndatums = sampler.ndatums.min(generator.len());
        Ok(())
    }

    fn run(
        generator: &FileGenerator,
        handler: &mut FileHandler,
        steering: &mut Steering,
        collector: &mut Collector,
        gate: &mut Gate,
    ) -> Result<()> {
        for datum in generator.datums() {
            let (path, raw) = datum?;
            handler.prepare_schema(&raw)?;
            let blocks = handler.prepare_blocks(&raw)?;
            info!(file = %path.display(), nblocks = blocks.len(), "processing datum");
            for block in blocks {
                steering.execute(gate, Datum::Raw(block))?;
                collector.execute(gate)?;
            }
        }
        Ok(())
    }

    fn fill_summary(&self, steering: &Steering, gate: &mut Gate) {
        let histograms = gate
            .book
            .iter()
            .map(|(name, h)| HistogramInfo {
                name: name.clone(),
                entries: h.entries(),
                mean: h.mean(),
                std: h.std(),
                edges: h.edges().to_vec(),
                counts: h.counts().to_vec(),
            })
            .collect();
        let peak_malloc = gate.pool().peak_allocated_bytes();
        let timers = gate.timers.summary();

        let summary = &mut gate.summary;
        summary.job_id = self.config.job_id.clone();
        summary.menu = self.menu.uuid().to_string();
        summary.seed = self.config.seed;
        summary.nchunks = steering.chunks();
        summary.peak_malloc = peak_malloc;
        summary.timers = timers;
        summary.histograms = histograms;
    }

    fn write_summary(&self, summary: &JobSummary) -> Result<()> {
        std::fs::create_dir_all(&self.config.path)?;
        let path = self.meta_path();
        std::fs::write(&path, summary.to_json()?)?;
        info!(file = %path.display(), "job summary written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ToolConfig, WRITER_TOOL};
    use crate::menu::{GraphMsg, MenuMsg, NodeMsg};

    fn node(name: &str, parents: &[&str], algos: &[&str]) -> NodeMsg {
        NodeMsg {
            name: name.to_string(),
            parents: parents.iter().map(|s| s.to_string()).collect(),
            algos: algos.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn parse_menu() -> Menu {
        let msg = MenuMsg {
            name: "csv".to_string(),
            uuid: String::new(),
            graphs: vec![GraphMsg {
                name: "csv".to_string(),
                nodes: vec![node("parse", &["initial"], &["csvparser"])],
            }],
        };
        Menu::from_definition(&msg).unwrap()
    }

    fn config(dir: &std::path::Path, files: Vec<PathBuf>) -> JobConfig {
        let mut config = JobConfig::new("unit");
        config.path = dir.to_path_buf();
        config.input.files = files;
        config.algos = vec![ToolConfig::new("csvparser", "CsvParserAlgo")];
        config.tools = vec![ToolConfig::new(WRITER_TOOL, "BufferOutputWriter")];
        config
    }

    #[test]
    fn no_input_files_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = Job::new(config(dir.path(), Vec::new()), parse_menu());
        assert!(matches!(job.control(), Err(Error::Config(_))));
    }

    #[test]
    fn unknown_algorithm_refuses_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), vec![dir.path().join("in.csv")]);
        cfg.algos[0].klass = "NoSuchAlgo".to_string();
        let mut job = Job::new(cfg, parse_menu());
        assert!(matches!(job.control(), Err(Error::AlgoNotFound(_))));
        assert!(!job.meta_path().exists());
    }

    #[test]
    fn summary_is_written_next_to_the_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.csv");
        std::fs::write(&input, "a,b\n1,2\n3,4\n").unwrap();

        let mut job = Job::new(config(dir.path(), vec![input]), parse_menu());
        let summary = job.control().unwrap();

        assert_eq!(summary.total_records, 2);
        assert_eq!(summary.total_files, 1);
        assert_eq!(summary.menu, job.menu().uuid());
        let meta = std::fs::read_to_string(job.meta_path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&meta).unwrap();
        assert_eq!(value["name"], "unit");
        assert_eq!(value["total_records"], 2);
    }
}
