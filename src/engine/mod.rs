//! Execution side of a job.
//!
//! A `Gate` is created per job and handed to `Steering` and the collector
//! on every call. It owns the execution tree, the histogram book, the timer
//! store and the memory pool that tracks columnar data held by the tree.

pub mod algo;
pub mod book;
pub mod gate;
pub mod pool;
pub mod steering;
pub mod timer;
pub mod tree;

pub use algo::{AlgoFactory, AlgoRegistry, Algorithm};
pub use book::{HistBook, Histogram};
pub use gate::Gate;
pub use pool::{MemoryPool, Reservation};
pub use steering::Steering;
pub use timer::{TimerStore, timed};
pub use tree::{Datum, Element, Tree, TreeNode};
