//! Per-job context.

use super::book::HistBook;
use super::pool::MemoryPool;
use super::timer::TimerStore;
use super::tree::Tree;
use crate::summary::JobSummary;

/// Everything a job shares between steering and the collector.
///
/// Created when the job starts and dropped when it ends; nothing outlives
/// it, so two jobs in one process never see each other's state.
#[derive(Debug)]
pub struct Gate {
    name: String,
    pub tree: Tree,
    pub book: HistBook,
    pub timers: TimerStore,
    pub summary: JobSummary,
    pool: MemoryPool,
}

impl Gate {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            tree: Tree::new(name.clone()),
            book: HistBook::new(),
            timers: TimerStore::new(),
            summary: JobSummary::new(name.clone()),
            pool: MemoryPool::new(),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool(&self) -> &MemoryPool {
        &self.pool
    }
}
