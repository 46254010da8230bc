//! Combines the batches a multi-parent node receives into one batch.
//!
//! Parents' batches are concatenated row-wise in declared parent order and
//! must share a schema.

use crate::engine::{Algorithm, Element, HistBook};
use crate::error::{Error, Result};
use crate::properties::Properties;
use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatch;

#[derive(Debug)]
pub struct ConcatAlgo {
    name: String,
    properties: Properties,
}

impl ConcatAlgo {
    pub fn new(name: impl Into<String>, properties: Properties) -> Self {
        Self {
            name: name.into(),
            properties,
        }
    }

    pub fn create(name: &str, properties: Properties) -> Result<Box<dyn Algorithm>> {
        Ok(Box::new(Self::new(name, properties)))
    }
}

impl Algorithm for ConcatAlgo {
    fn name(&self) -> &str {
        &self.name
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    fn execute(&mut self, element: &mut Element, _book: &mut HistBook) -> Result<()> {
        let batches: Vec<RecordBatch> = element.batches().cloned().collect();
        let Some(first) = batches.first() else {
            return Err(Error::algorithm(
                &self.name,
                format!("element {} holds no record batch", element.key()),
            ));
        };
        if batches.len() != element.data().len() {
            return Err(Error::algorithm(
                &self.name,
                format!("element {} mixes raw and columnar data", element.key()),
            ));
        }

        let schema = first.schema();
        if let Some(other) = batches.iter().find(|b| b.schema() != schema) {
            return Err(Error::algorithm(
                &self.name,
                format!("cannot concatenate {} with {}", schema, other.schema()),
            ));
        }
        let combined = concat_batches(&schema, &batches)?;
        element.set_data(combined);
        Ok(())
    }
}
