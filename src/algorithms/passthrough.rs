//! Leaves the element untouched and counts the rows that go past.

use crate::engine::book::uniform_edges;
use crate::engine::{Algorithm, Element, HistBook};
use crate::error::Result;
use crate::properties::Properties;
use tracing::{debug, info};

#[derive(Debug)]
pub struct PassthroughAlgo {
    name: String,
    properties: Properties,
    nrows: u64,
}

impl PassthroughAlgo {
    pub fn new(name: impl Into<String>, properties: Properties) -> Self {
        Self {
            name: name.into(),
            properties,
            nrows: 0,
        }
    }

    pub fn create(name: &str, properties: Properties) -> Result<Box<dyn Algorithm>> {
        Ok(Box::new(Self::new(name, properties)))
    }

    /// Rows seen in every batch since the last rebook.
    pub fn nrows(&self) -> u64 {
        self.nrows
    }
}

impl Algorithm for PassthroughAlgo {
    fn name(&self) -> &str {
        &self.name
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    fn book(&mut self, book: &mut HistBook) -> Result<()> {
        book.book(&self.name, "nrows", uniform_edges(0.0, 100_000.0, 100), Some("rows"))
    }

    fn rebook(&mut self, _book: &mut HistBook) -> Result<()> {
        self.nrows = 0;
        Ok(())
    }

    fn execute(&mut self, element: &mut Element, book: &mut HistBook) -> Result<()> {
        let rows: usize = element.batches().map(|b| b.num_rows()).sum();
        self.nrows += rows as u64;
        if let Err(e) = book.fill(&self.name, "nrows", rows as f64) {
            debug!("{}", e);
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        info!("{}: {} rows passed through", self.name, self.nrows);
        Ok(())
    }
}
