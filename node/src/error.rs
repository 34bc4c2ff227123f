use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("no record found for '{0}'")]
    NotFound(String),
    #[error("peer {0} could not be reached")]
    Unreachable(String),
    #[error("network operation timed out")]
    Timeout,
    #[error("node has been closed")]
    Closed,
    #[error("content block {0} failed to decode")]
    CorruptBlock(String),
}
