//! Algorithm contract and the name -> factory registry.

use super::book::HistBook;
use super::tree::Element;
use crate::config::ToolConfig;
use crate::error::{Error, Result};
use crate::properties::Properties;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// A step run by steering on every element of the nodes that list it.
///
/// Lifecycle: `initialize` once, `book` once, `execute` per chunk,
/// optionally `rebook` after sampling, `finalize` once.
pub trait Algorithm: fmt::Debug {
    /// Instance name, as referenced by the menu.
    fn name(&self) -> &str;

    fn properties(&self) -> &Properties;

    fn properties_mut(&mut self) -> &mut Properties;

    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Declare histograms.
    fn book(&mut self, _book: &mut HistBook) -> Result<()> {
        Ok(())
    }

    /// Re-declare after sampling. The book has already been reset.
    fn rebook(&mut self, _book: &mut HistBook) -> Result<()> {
        Ok(())
    }

    /// Transform the element in place or replace its data.
    fn execute(&mut self, element: &mut Element, book: &mut HistBook) -> Result<()>;

    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Reject later property changes.
    fn lock(&mut self) {
        self.properties_mut().lock();
    }
}

/// Builds an algorithm from its instance name and properties.
pub type AlgoFactory = fn(name: &str, properties: Properties) -> Result<Box<dyn Algorithm>>;

/// Class name -> factory.
#[derive(Default)]
pub struct AlgoRegistry {
    factories: BTreeMap<String, AlgoFactory>,
}

impl fmt::Debug for AlgoRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlgoRegistry")
            .field("classes", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AlgoRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class. A repeated class name replaces the earlier factory.
    pub fn register(&mut self, klass: impl Into<String>, factory: AlgoFactory) {
        self.factories.insert(klass.into(), factory);
    }

    pub fn contains(&self, klass: &str) -> bool {
        self.factories.contains_key(klass)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn create(&self, tool: &ToolConfig) -> Result<Box<dyn Algorithm>> {
        let factory = self
            .factories
            .get(&tool.klass)
            .ok_or_else(|| Error::AlgoNotFound(format!("{} (class {})", tool.name, tool.klass)))?;
        let properties = tool.properties()?;
        debug!(algo = %tool.name, klass = %tool.klass, "creating algorithm");
        factory(&tool.name, properties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryPool;

    #[derive(Debug)]
    struct Noop {
        name: String,
        properties: Properties,
    }

    impl Algorithm for Noop {
        fn name(&self) -> &str {
            &self.name
        }
        fn properties(&self) -> &Properties {
            &self.properties
        }
        fn properties_mut(&mut self) -> &mut Properties {
            &mut self.properties
        }
        fn execute(&mut self, _element: &mut Element, _book: &mut HistBook) -> Result<()> {
            Ok(())
        }
    }

    fn noop(name: &str, properties: Properties) -> Result<Box<dyn Algorithm>> {
        Ok(Box::new(Noop {
            name: name.to_string(),
            properties,
        }))
    }

    #[test]
    fn creates_by_class_and_locks() {
        let mut registry = AlgoRegistry::new();
        registry.register("Noop", noop);

        let tool = ToolConfig::new("n1", "Noop");
        let mut algo = registry.create(&tool).unwrap();
        assert_eq!(algo.name(), "n1");

        let mut el = Element::new("k", MemoryPool::new());
        algo.execute(&mut el, &mut HistBook::new()).unwrap();

        algo.lock();
        assert!(!algo.properties_mut().set("x", 1));
    }

    #[test]
    fn unknown_class_is_not_found() {
        let registry = AlgoRegistry::new();
        let tool = ToolConfig::new("n1", "Missing");
        assert!(matches!(registry.create(&tool), Err(Error::AlgoNotFound(_))));
    }
}
