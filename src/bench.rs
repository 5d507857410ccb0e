//! Timing `update_all` under each execution strategy.

use std::time::{Duration, Instant};

use candle_core::{DType, Result, Tensor};
use tracing::info;

use crate::graph::{
    builtin, EdgeBatch, ExecutionPlan, ExecutionStrategy, Graph, MessageFunc, NodeBatch,
    ReduceFunc,
};

#[derive(Debug, Clone)]
pub struct BenchResult {
    pub label: &'static str,
    pub plan: ExecutionPlan,
    pub per_iter: Duration,
    /// Largest absolute difference from the first (reference) run.
    pub max_abs_diff: f32,
}

fn cases() -> Vec<(&'static str, ExecutionStrategy, MessageFunc, ReduceFunc)> {
    vec![
        (
            "builtin, fused",
            ExecutionStrategy::Fused,
            builtin::copy_src("h", "m"),
            builtin::sum("m", "h"),
        ),
        (
            "builtin, degree bucketing",
            ExecutionStrategy::DegreeBucketing,
            builtin::copy_src("h", "m"),
            builtin::sum("m", "h"),
        ),
        (
            "user-defined",
            ExecutionStrategy::Auto,
            builtin::message("m", |edges: &EdgeBatch| edges.src("h")),
            builtin::reduce("m", "h", |nodes: &NodeBatch| nodes.mailbox().sum(1)),
        ),
    ]
}

fn aggregate(
    graph: &mut Graph,
    xs: &Tensor,
    message: &MessageFunc,
    reduce: &ReduceFunc,
) -> Result<Tensor> {
    graph.ndata_mut().insert("h", xs.clone())?;
    graph.update_all(message, reduce)?;
    graph.ndata_mut().remove("h")
}

/// Runs the sum-of-neighbours aggregation `iters` times per strategy on
/// random `(num_nodes, feat_dim)` features.
pub fn compare_strategies(
    graph: &Graph,
    feat_dim: usize,
    iters: usize,
) -> Result<Vec<BenchResult>> {
    let xs = Tensor::randn(0f32, 1.0, (graph.num_nodes(), feat_dim), graph.device())?;
    let iters = iters.max(1);
    let mut reference: Option<Tensor> = None;
    let mut results = Vec::new();
    for (label, strategy, message, reduce) in cases() {
        let mut graph = graph.clone().with_strategy(strategy);
        let plan = graph.plan(&message, &reduce)?;

        let start = Instant::now();
        let mut out = aggregate(&mut graph, &xs, &message, &reduce)?;
        for _ in 1..iters {
            out = aggregate(&mut graph, &xs, &message, &reduce)?;
        }
        let per_iter = start.elapsed() / iters as u32;

        let max_abs_diff = match &reference {
            Some(r) => (&out - r)?
                .abs()?
                .max_all()?
                .to_dtype(DType::F32)?
                .to_scalar::<f32>()?,
            None => 0.0,
        };
        reference.get_or_insert(out);
        info!(label, ?plan, ?per_iter, max_abs_diff, "update_all");
        results.push(BenchResult {
            label,
            plan,
            per_iter,
            max_abs_diff,
        });
    }
    Ok(results)
}
