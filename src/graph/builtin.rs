//! Message and reduce functions.
//!
//! Built-in functions are plain descriptions (which field goes where), so the
//! executor can recognise pairs that collapse into a single adjacency product.
//! User-defined functions are opaque closures and always run through degree
//! bucketing.

use std::fmt;
use std::sync::Arc;

use candle_core::{Result, Tensor};

use super::frame::Frame;

/// Data visible to a message function: one row per edge in the batch.
pub struct EdgeBatch<'a> {
    pub(crate) ndata: &'a Frame,
    pub(crate) edata: &'a Frame,
    pub(crate) src: &'a Tensor,
    pub(crate) dst: &'a Tensor,
    pub(crate) eids: &'a Tensor,
}
impl<'a> EdgeBatch<'a> {
    /// Source node field, gathered per edge.
    pub fn src(&self, name: &str) -> Result<Tensor> {
        self.ndata.get(name)?.index_select(self.src, 0)
    }
    /// Edge field for the edges of the batch.
    pub fn data(&self, name: &str) -> Result<Tensor> {
        self.edata.get(name)?.index_select(self.eids, 0)
    }
    /// Destination node field, gathered per edge.
    pub fn dst(&self, name: &str) -> Result<Tensor> {
        self.ndata.get(name)?.index_select(self.dst, 0)
    }
    pub fn num_edges(&self) -> usize {
        self.eids.dims1().unwrap_or(0)
    }
}

/// Data visible to a reduce function: a bucket of nodes sharing one in-degree.
pub struct NodeBatch<'a> {
    pub(crate) nodes: &'a [u32],
    pub(crate) mailbox: &'a Tensor,
}
impl<'a> NodeBatch<'a> {
    pub fn nodes(&self) -> &[u32] {
        self.nodes
    }
    /// Incoming messages stacked as `(nodes, in_degree, feature...)`.
    pub fn mailbox(&self) -> &Tensor {
        self.mailbox
    }
}

pub type MessageUdf = Arc<dyn Fn(&EdgeBatch) -> Result<Tensor> + Send + Sync>;
pub type ReduceUdf = Arc<dyn Fn(&NodeBatch) -> Result<Tensor> + Send + Sync>;

#[derive(Clone)]
pub enum MessageFunc {
    CopySrc { src: String, out: String },
    CopyEdge { edge: String, out: String },
    SrcMulEdge { src: String, edge: String, out: String },
    Udf { func: MessageUdf, out: String },
}
impl MessageFunc {
    pub fn out(&self) -> &str {
        match self {
            Self::CopySrc { out, .. }
            | Self::CopyEdge { out, .. }
            | Self::SrcMulEdge { out, .. }
            | Self::Udf { out, .. } => out,
        }
    }
    pub fn name(&self) -> &'static str {
        match self {
            Self::CopySrc { .. } => "copy_src",
            Self::CopyEdge { .. } => "copy_edge",
            Self::SrcMulEdge { .. } => "src_mul_edge",
            Self::Udf { .. } => "message_udf",
        }
    }
}
impl fmt::Debug for MessageFunc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}(-> {})", self.name(), self.out())
    }
}

#[derive(Clone)]
pub enum ReduceFunc {
    Sum { msg: String, out: String },
    Mean { msg: String, out: String },
    Max { msg: String, out: String },
    Udf { func: ReduceUdf, msg: String, out: String },
}
impl ReduceFunc {
    pub fn msg(&self) -> &str {
        match self {
            Self::Sum { msg, .. }
            | Self::Mean { msg, .. }
            | Self::Max { msg, .. }
            | Self::Udf { msg, .. } => msg,
        }
    }
    pub fn out(&self) -> &str {
        match self {
            Self::Sum { out, .. }
            | Self::Mean { out, .. }
            | Self::Max { out, .. }
            | Self::Udf { out, .. } => out,
        }
    }
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sum { .. } => "sum",
            Self::Mean { .. } => "mean",
            Self::Max { .. } => "max",
            Self::Udf { .. } => "reduce_udf",
        }
    }
    /// Applies the reduction to a stacked mailbox.
    pub(crate) fn reduce(&self, batch: &NodeBatch) -> Result<Tensor> {
        match self {
            Self::Sum { .. } => batch.mailbox.sum(1),
            Self::Mean { .. } => batch.mailbox.mean(1),
            Self::Max { .. } => batch.mailbox.max(1),
            Self::Udf { func, .. } => func(batch),
        }
    }
}
impl fmt::Debug for ReduceFunc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({} -> {})", self.name(), self.msg(), self.out())
    }
}

pub fn copy_src(src: &str, out: &str) -> MessageFunc {
    MessageFunc::CopySrc {
        src: src.to_owned(),
        out: out.to_owned(),
    }
}
pub fn copy_edge(edge: &str, out: &str) -> MessageFunc {
    MessageFunc::CopyEdge {
        edge: edge.to_owned(),
        out: out.to_owned(),
    }
}
pub fn src_mul_edge(src: &str, edge: &str, out: &str) -> MessageFunc {
    MessageFunc::SrcMulEdge {
        src: src.to_owned(),
        edge: edge.to_owned(),
        out: out.to_owned(),
    }
}
pub fn message<F>(out: &str, func: F) -> MessageFunc
where
    F: Fn(&EdgeBatch) -> Result<Tensor> + Send + Sync + 'static,
{
    MessageFunc::Udf {
        func: Arc::new(func),
        out: out.to_owned(),
    }
}

pub fn sum(msg: &str, out: &str) -> ReduceFunc {
    ReduceFunc::Sum {
        msg: msg.to_owned(),
        out: out.to_owned(),
    }
}
pub fn mean(msg: &str, out: &str) -> ReduceFunc {
    ReduceFunc::Mean {
        msg: msg.to_owned(),
        out: out.to_owned(),
    }
}
pub fn max(msg: &str, out: &str) -> ReduceFunc {
    ReduceFunc::Max {
        msg: msg.to_owned(),
        out: out.to_owned(),
    }
}
pub fn reduce<F>(msg: &str, out: &str, func: F) -> ReduceFunc
where
    F: Fn(&NodeBatch) -> Result<Tensor> + Send + Sync + 'static,
{
    ReduceFunc::Udf {
        func: Arc::new(func),
        msg: msg.to_owned(),
        out: out.to_owned(),
    }
}
