//! Keeps the listed columns of a batch, or drops them with `invert`.
//!
//! Properties: `columns` (list of str, required), `invert` (bool, default
//! false).

use super::input_batch;
use crate::engine::{Algorithm, Element, HistBook};
use crate::error::{Error, Result};
use crate::properties::Properties;
use tracing::info;

#[derive(Debug)]
pub struct FilterColumnsAlgo {
    name: String,
    properties: Properties,
    columns: Vec<String>,
    invert: bool,
}

impl FilterColumnsAlgo {
    pub fn new(name: impl Into<String>, properties: Properties) -> Self {
        Self {
            name: name.into(),
            properties,
            columns: Vec::new(),
            invert: false,
        }
    }

    pub fn create(name: &str, properties: Properties) -> Result<Box<dyn Algorithm>> {
        Ok(Box::new(Self::new(name, properties)))
    }
}

impl Algorithm for FilterColumnsAlgo {
    fn name(&self) -> &str {
        &self.name
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    fn initialize(&mut self) -> Result<()> {
        self.columns = self.properties.str_list("columns")?.ok_or_else(|| {
            Error::Config(format!("{}: property columns is required", self.name))
        })?;
        self.invert = self.properties.bool_or("invert", false)?;
        info!(algo = %self.name, columns = ?self.columns, invert = self.invert, "initialized");
        Ok(())
    }

    fn execute(&mut self, element: &mut Element, _book: &mut HistBook) -> Result<()> {
        let batch = input_batch(&self.name, element)?;
        let schema = batch.schema();

        let indices: Vec<usize> = if self.invert {
            (0..schema.fields().len())
                .filter(|&i| !self.columns.contains(schema.field(i).name()))
                .collect()
        } else {
            self.columns
                .iter()
                .map(|c| {
                    schema
                        .index_of(c)
                        .map_err(|_| Error::algorithm(&self.name, format!("no column {}", c)))
                })
                .collect::<Result<_>>()?
        };

        let projected = batch.project(&indices)?;
        element.set_data(projected);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryPool;
    use crate::properties::PropertyValue;
    use arrow::array::{ArrayRef, Int64Array};
    use arrow::record_batch::RecordBatch;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn element() -> Element {
        let col = || Arc::new(Int64Array::from(vec![1])) as ArrayRef;
        let batch = RecordBatch::try_from_iter([("a", col()), ("b", col()), ("c", col())]).unwrap();
        let mut el = Element::new("k", MemoryPool::new());
        el.set_data(batch);
        el
    }

    fn names(el: &Element) -> Vec<String> {
        el.batch()
            .unwrap()
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    fn algo(invert: bool) -> FilterColumnsAlgo {
        let columns = PropertyValue::List(vec!["c".into(), "a".into()]);
        let mut algo = FilterColumnsAlgo::new(
            "filter",
            Properties::with([("columns", columns), ("invert", invert.into())]),
        );
        algo.initialize().unwrap();
        algo
    }

    #[test]
    fn keeps_listed_columns_in_listed_order() {
        let mut el = element();
        algo(false).execute(&mut el, &mut HistBook::new()).unwrap();
        assert_eq!(names(&el), ["c", "a"]);
    }

    #[test]
    fn invert_drops_them() {
        let mut el = element();
        algo(true).execute(&mut el, &mut HistBook::new()).unwrap();
        assert_eq!(names(&el), ["b"]);
    }

    #[test]
    fn unknown_column_fails() {
        let mut algo = FilterColumnsAlgo::new(
            "filter",
            Properties::with([("columns", PropertyValue::List(vec!["zz".into()]))]),
        );
        algo.initialize().unwrap();
        assert!(algo.execute(&mut element(), &mut HistBook::new()).is_err());
    }

    #[test]
    fn columns_are_required() {
        let mut algo = FilterColumnsAlgo::new("filter", Properties::new());
        assert!(matches!(algo.initialize(), Err(Error::Config(_))));
    }
}
