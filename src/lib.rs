//! blockflow: steer CSV blocks through a DAG of algorithms and collect the
//! resulting record batches into Arrow files.
//!
//! Layers, leaves first:
//! - `menu`: plan compiler (nodes, graphs, menu, wire form)
//! - `properties`: typed property bags for algorithms and tools
//! - `engine`: gate, execution tree, steering, histograms, timers
//! - `io`: file handler, generator, writers and the collector
//! - `algorithms`: built-in algorithms
//! - `job`: the driver tying a configuration and a menu together

pub mod algorithms;
pub mod config;
pub mod engine;
pub mod error;
pub mod io;
pub mod job;
pub mod menu;
pub mod properties;
pub mod summary;

pub use error::{Error, Result};
