use candle_core::{Result, Tensor};

use crate::graph::Graph;

/// A module whose forward pass propagates features over a graph.
///
/// The graph is borrowed mutably because modules stage their inputs in the
/// node frame and let message passing write the aggregated result back.
pub trait GnnModule {
    fn forward(&self, graph: &mut Graph, xs: &Tensor) -> Result<Tensor>;
}
