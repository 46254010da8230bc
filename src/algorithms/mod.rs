//! Built-in algorithms and the registry that knows them by class name.

pub mod concat;
pub mod csvparser;
pub mod filtercolumns;
pub mod passthrough;

pub use concat::ConcatAlgo;
pub use csvparser::CsvParserAlgo;
pub use filtercolumns::FilterColumnsAlgo;
pub use passthrough::PassthroughAlgo;

use crate::engine::{AlgoRegistry, Element};
use crate::error::{Error, Result};
use arrow::record_batch::RecordBatch;

/// Add every built-in class to `registry`.
pub fn register_builtins(registry: &mut AlgoRegistry) {
    registry.register("CsvParserAlgo", CsvParserAlgo::create);
    registry.register("PassthroughAlgo", PassthroughAlgo::create);
    registry.register("ConcatAlgo", ConcatAlgo::create);
    registry.register("FilterColumnsAlgo", FilterColumnsAlgo::create);
}

pub fn builtin_registry() -> AlgoRegistry {
    let mut registry = AlgoRegistry::new();
    register_builtins(&mut registry);
    registry
}

/// The one record batch an element must carry.
pub(crate) fn input_batch<'a>(algo: &str, element: &'a Element) -> Result<&'a RecordBatch> {
    element.batch().ok_or_else(|| {
        Error::algorithm(
            algo,
            format!(
                "element {} must hold exactly one record batch, found {} datum(s)",
                element.key(),
                element.data().len()
            ),
        )
    })
}
