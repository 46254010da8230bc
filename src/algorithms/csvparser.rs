//! Parse raw CSV blocks into record batches.
//!
//! Properties:
//! - `delimiter` (str, default ","): one byte
//! - `header` (bool, default true): blocks start with a header line
//! - `schema` (dict, optional): column name -> type (`int64`, `float64`,
//!   `bool`, `utf8`), in column order
//! - `columns` (list, optional): subset and order of `schema` columns
//! - `max_infer` (int, default 1000): rows used to infer the schema
//!
//! Without `schema`, the schema inferred from the first block is kept for
//! every later block, so all batches of a job share one schema.

use crate::engine::book::uniform_edges;
use crate::engine::{Algorithm, Datum, Element, HistBook, timed};
use crate::error::{Error, Result};
use crate::properties::Properties;
use arrow::compute::concat_batches;
use arrow::csv::ReaderBuilder;
use arrow::csv::reader::Format;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, info};

fn data_type(name: &str) -> Option<DataType> {
    match name {
        "int" | "int64" => Some(DataType::Int64),
        "float" | "float64" | "double" => Some(DataType::Float64),
        "bool" | "boolean" => Some(DataType::Boolean),
        "str" | "string" | "utf8" => Some(DataType::Utf8),
        _ => None,
    }
}

#[derive(Debug)]
pub struct CsvParserAlgo {
    name: String,
    properties: Properties,
    delimiter: u8,
    header: bool,
    max_infer: usize,
    schema: Option<SchemaRef>,
    nblocks: u64,
}

impl CsvParserAlgo {
    pub fn new(name: impl Into<String>, properties: Properties) -> Self {
        Self {
            name: name.into(),
            properties,
            delimiter: b',',
            header: true,
            max_infer: 1000,
            schema: None,
            nblocks: 0,
        }
    }

    pub fn create(name: &str, properties: Properties) -> Result<Box<dyn Algorithm>> {
        Ok(Box::new(Self::new(name, properties)))
    }

    pub fn schema(&self) -> Option<&SchemaRef> {
        self.schema.as_ref()
    }

    fn configured_schema(&self) -> Result<Option<SchemaRef>> {
        let Some(value) = self.properties.get("schema") else {
            return Ok(None);
        };
        let columns = value
            .as_dict()
            .ok_or_else(|| Error::Property("schema".to_string()))?;
        // `columns` picks and orders a subset of the typed columns.
        let order: Vec<String> = match self.properties.str_list("columns")? {
            Some(order) => order,
            None => columns.keys().cloned().collect(),
        };

        let mut fields = Vec::with_capacity(order.len());
        for column in &order {
            let ty = columns
                .get(column)
                .and_then(|v| v.as_str())
                .and_then(data_type)
                .ok_or_else(|| {
                    Error::Config(format!("{}: no usable type for column {}", self.name, column))
                })?;
            fields.push(Field::new(column, ty, true));
        }
        Ok(Some(Arc::new(Schema::new(fields))))
    }

    fn infer(&self, raw: &[u8]) -> Result<SchemaRef> {
        let format = Format::default()
            .with_header(self.header)
            .with_delimiter(self.delimiter);
        let (schema, nrows) = format.infer_schema(Cursor::new(raw), Some(self.max_infer))?;
        info!(algo = %self.name, rows = nrows, schema = %schema, "schema inferred");
        Ok(Arc::new(schema))
    }
}

impl Algorithm for CsvParserAlgo {
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
        let delimiter = self.properties.str_or("delimiter", ",")?;
        let [byte] = delimiter.as_bytes() else {
            return Err(Error::Config(format!(
                "{}: delimiter must be one byte, got {:?}",
                self.name, delimiter
            )));
        };
        self.delimiter = *byte;
        self.header = self.properties.bool_or("header", true)?;
        self.max_infer = usize::try_from(self.properties.i64_or("max_infer", 1000)?)
            .map_err(|_| Error::Property("max_infer".to_string()))?;
        self.schema = self.configured_schema()?;
        info!("{}: initialized CsvParserAlgo", self.name);
        Ok(())
    }

    fn book(&mut self, book: &mut HistBook) -> Result<()> {
        book.book(&self.name, "nrows", uniform_edges(0.0, 100_000.0, 100), Some("rows"))?;
        book.book_timer(&self.name, "time.parse", uniform_edges(0.0, 100.0, 50))
    }

    fn rebook(&mut self, _book: &mut HistBook) -> Result<()> {
        self.nblocks = 0;
        Ok(())
    }

    fn execute(&mut self, element: &mut Element, book: &mut HistBook) -> Result<()> {
        let raw = match element.data() {
            [Datum::Raw(raw)] => raw.clone(),
            _ => {
                return Err(Error::algorithm(
                    &self.name,
                    format!("element {} must hold one raw block", element.key()),
                ));
            }
        };

        let schema = match &self.schema {
            Some(schema) => schema.clone(),
            None => {
                let schema = self.infer(&raw)?;
                self.schema = Some(schema.clone());
                schema
            }
        };

        let (parsed, ms) = timed(|| -> Result<_> {
            let reader = ReaderBuilder::new(schema.clone())
                .with_header(self.header)
                .with_delimiter(self.delimiter)
                .build(Cursor::new(raw.as_ref()))?;
            let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(concat_batches(&schema, &batches)?)
        });
        let batch = parsed.map_err(|e| Error::algorithm(&self.name, e))?;

        for (key, value) in [("time.parse", ms), ("nrows", batch.num_rows() as f64)] {
            if let Err(e) = book.fill(&self.name, key, value) {
                debug!("{}", e);
            }
        }
        self.nblocks += 1;
        debug!(algo = %self.name, rows = batch.num_rows(), "block parsed");

        element.set_data(batch);
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        info!("{}: completed csv parsing of {} blocks", self.name, self.nblocks);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryPool;
    use crate::properties::{Dict, PropertyMsg, PropertyValue};
    use arrow::array::{Array, Float64Array, Int64Array};
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn run(algo: &mut CsvParserAlgo, text: &'static [u8]) -> Element {
        let mut book = HistBook::new();
        algo.book(&mut book).unwrap();
        let mut el = Element::new("t_parse_0", MemoryPool::new());
        el.attach(Datum::Raw(Bytes::from_static(text)));
        algo.execute(&mut el, &mut book).unwrap();
        el
    }

    #[test]
    fn parses_and_keeps_first_schema() {
        let mut algo = CsvParserAlgo::new("csvparser", Properties::new());
        algo.initialize().unwrap();

        let first = run(&mut algo, b"a,b\n1,2\n3,4\n");
        let batch = first.batch().unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema().field(0).data_type(), &DataType::Int64);
        let a = batch.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(a.values(), &[1, 3]);

        // Later blocks are parsed with the schema inferred from the first.
        let second = run(&mut algo, b"a,b\n5,6\n");
        assert_eq!(second.batch().unwrap().schema(), batch.schema());
    }

    #[test]
    fn configured_schema_and_delimiter() {
        let mut types = Dict::new();
        types.insert("x", PropertyValue::from("float64"));
        types.insert("y", PropertyValue::from("utf8"));
        let props = Properties::with([
            ("delimiter", PropertyValue::from(";")),
            ("schema", PropertyValue::Dict(types)),
        ]);
        let mut algo = CsvParserAlgo::new("csvparser", props);
        algo.initialize().unwrap();

        let el = run(&mut algo, b"x;y\n1.5;foo\n");
        let batch = el.batch().unwrap();
        let x = batch.column(0).as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(x.value(0), 1.5);
        assert_eq!(batch.column(1).len(), 1);
    }

    #[test]
    fn configured_schema_follows_dict_order() {
        let msg = PropertyMsg {
            name: "schema".to_string(),
            ty: "dict".to_string(),
            value: "{'z': 'utf8', 'a': 'int64'}".to_string(),
        };
        let mut algo = CsvParserAlgo::new("csvparser", Properties::from_msg(&[msg]).unwrap());
        algo.initialize().unwrap();

        let schema = algo.schema().unwrap();
        assert_eq!(schema.field(0).name(), "z");
        assert_eq!(schema.field(0).data_type(), &DataType::Utf8);
        assert_eq!(schema.field(1).data_type(), &DataType::Int64);

        let el = run(&mut algo, b"z,a\nfoo,7\n");
        let a = el.batch().unwrap().column(1);
        assert_eq!(a.as_any().downcast_ref::<Int64Array>().unwrap().value(0), 7);
    }

    #[test]
    fn rejects_non_raw_input() {
        let mut algo = CsvParserAlgo::new("csvparser", Properties::new());
        algo.initialize().unwrap();
        let mut el = Element::new("k", MemoryPool::new());
        let err = algo.execute(&mut el, &mut HistBook::new()).unwrap_err();
        assert!(matches!(err, Error::Algorithm { .. }));
    }

    #[test]
    fn multi_byte_delimiter_is_rejected() {
        let props = Properties::with([("delimiter", "::")]);
        let mut algo = CsvParserAlgo::new("csvparser", props);
        assert!(algo.initialize().is_err());
    }
}
