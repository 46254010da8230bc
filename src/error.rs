//! Error types shared by the plan compiler, the engine and the output side.

use arrow::error::ArrowError;

/// Errors raised while building a plan or running a job.
///
/// Configuration and plan errors keep a job from starting. The invariant
/// variants (`SchemaMismatch`, `PayloadEmpty`) are kept apart from `Io` so
/// callers can tell a broken pipeline from a broken disk.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or inconsistent job configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Plan is structurally invalid (unknown parent, duplicate id, ...).
    #[error("plan error: {0}")]
    Plan(String),

    /// Kahn's sort could not visit every node.
    #[error("graph '{graph}' is not sortable: visited {visited} of {total} nodes")]
    NotSortable {
        /// Graph or menu name.
        graph: String,
        /// Nodes emitted before the queue ran dry.
        visited: usize,
        /// Nodes in the graph.
        total: usize,
    },

    /// The plan references an algorithm that the catalog cannot build.
    #[error("algorithm '{0}' not found in catalog")]
    AlgoNotFound(String),

    /// An algorithm failed inside one of its lifecycle calls.
    #[error("algorithm '{algo}' failed: {reason}")]
    Algorithm {
        /// Algorithm instance name.
        algo: String,
        /// Description of the failure.
        reason: String,
    },

    /// A leaf batch does not match the schema registered with its writer.
    #[error("schema mismatch for {writer}: expected {expected}, found {found}")]
    SchemaMismatch {
        /// Writer name (`writer_<leaf>`).
        writer: String,
        /// Registered schema.
        expected: String,
        /// Schema of the offending batch.
        found: String,
    },

    /// A leaf had no payload element when the collector drained it.
    #[error("payload is empty for leaf '{0}'")]
    PayloadEmpty(String),

    /// No writer is registered under the given name.
    #[error("writer '{0}' not found")]
    WriterNotFound(String),

    /// A writer call was made in the wrong state.
    #[error("writer '{name}' is {state}, cannot {op}")]
    WriterState {
        /// Writer name.
        name: String,
        /// Current state.
        state: String,
        /// Rejected operation.
        op: &'static str,
    },

    /// A written file failed read-back validation.
    #[error("validation failed for {file}: {reason}")]
    Validation {
        /// Output file name.
        file: String,
        /// What did not match.
        reason: String,
    },

    /// Property value could not be decoded from its textual form.
    #[error("cannot parse property '{name}' as {ty}: {reason}")]
    PropertyParse {
        /// Property name.
        name: String,
        /// Declared wire type.
        ty: String,
        /// Parser message.
        reason: String,
    },

    /// Property lookup or type conversion failed.
    #[error("property '{0}' missing or of the wrong type")]
    Property(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Arrow(#[from] ArrowError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap any displayable failure as an algorithm error.
    pub fn algorithm(algo: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Algorithm {
            algo: algo.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
