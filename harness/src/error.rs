use drover_node::NodeError;
use thiserror::Error;

/// Everything that can go wrong while driving the harness. Per-index
/// command failures are reported at the dispatcher boundary and never
/// abort sibling dispatches; only `ExpectationFailed` (and startup
/// script errors) end the run.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("not enough arguments, usage: {0}")]
    ArgCount(&'static str),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("index {0} out of range")]
    OutOfRange(usize),
    #[error("node {0} has not been started")]
    NotStarted(usize),
    #[error("node {0} has already been killed")]
    DeadNode(usize),
    #[error("node {0} is already running")]
    AlreadyRunning(usize),
    #[error("unrecognized command '{0}'")]
    UnrecognizedCommand(String),
    #[error("network operation timed out")]
    Timeout,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("read-back of '{0}' does not match the original bytes")]
    IntegrityMismatch(String),
    #[error("expectation failed: {0}")]
    ExpectationFailed(String),
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
