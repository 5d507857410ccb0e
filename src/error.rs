use thiserror::Error;

/// Validation failures raised by graph construction, frames and message passing.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("edge ({src}, {dst}) refers to a node outside 0..{num_nodes}")]
    NodeOutOfRange { src: u32, dst: u32, num_nodes: usize },

    #[error("{kind} id {id} is out of range (0..{len})")]
    IdOutOfRange {
        kind: &'static str,
        id: u32,
        len: usize,
    },

    #[error("field `{0}` does not exist")]
    MissingField(String),

    #[error("field `{name}` has {actual} rows, expected {expected}")]
    RowMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("no pending messages to receive")]
    EmptyMailbox,

    #[error("cannot fuse `{message}` with `{reduce}` into a sparse product")]
    NotFusable {
        message: &'static str,
        reduce: &'static str,
    },
}

impl From<GraphError> for candle_core::Error {
    fn from(e: GraphError) -> Self {
        candle_core::Error::wrap(e)
    }
}
