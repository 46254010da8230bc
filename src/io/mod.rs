//! Input and output.
//!
//! - `generator` yields the raw content of each input file
//! - `filehandler` splits that content into blocks of whole lines
//! - `writer` serializes record batches to Arrow IPC files
//! - `collector` moves leaf payloads from the tree into writers

pub mod collector;
pub mod filehandler;
pub mod generator;
pub mod writer;

pub use collector::{Collector, WriterTemplate};
pub use filehandler::FileHandler;
pub use generator::FileGenerator;
pub use writer::{BufferOutputWriter, Writer, WriterState};
