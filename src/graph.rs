//! A directed graph with node/edge frames and message passing.
//!
//! Messages flow along edges from `src` to `dst`. `send` computes messages and
//! parks them in a mailbox, `recv` reduces them into node data, and
//! `update_all` does both in one go, which lets the executor skip the mailbox
//! entirely and run the pair as a single sparse product when it can.

use std::cell::OnceCell;
use std::collections::{HashMap, HashSet};

use candle_core::{Device, Result, Tensor};
use itertools::Itertools;
use tracing::debug;

use crate::error::GraphError;

pub mod builtin;
pub mod bucketing;
mod frame;
pub mod spmm;

pub use builtin::{EdgeBatch, MessageFunc, NodeBatch, ReduceFunc};
pub use frame::Frame;

/// How `send_and_recv`/`update_all` should execute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// Fuse whenever the message/reduce pair allows it.
    #[default]
    Auto,
    /// Always fuse; fails for pairs that cannot be fused.
    Fused,
    /// Always materialize messages and reduce by degree bucket.
    DegreeBucketing,
}

/// The execution chosen for one message/reduce pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPlan {
    Fused,
    DegreeBucketing,
}

/// Messages computed by `send` and not yet consumed by `recv`.
#[derive(Debug, Clone)]
struct Pending {
    eids: Vec<u32>,
    messages: Tensor,
}

#[derive(Debug, Clone)]
pub struct Graph {
    num_nodes: usize,
    src: Vec<u32>,
    dst: Vec<u32>,
    device: Device,
    ndata: Frame,
    edata: Frame,
    mailbox: HashMap<String, Pending>,
    strategy: ExecutionStrategy,
    adjacency: OnceCell<Tensor>,
}

impl Graph {
    pub fn new(num_nodes: usize, edges: &[(u32, u32)], device: &Device) -> Result<Self> {
        for &(src, dst) in edges {
            if src as usize >= num_nodes || dst as usize >= num_nodes {
                return Err(GraphError::NodeOutOfRange {
                    src,
                    dst,
                    num_nodes,
                }
                .into());
            }
        }
        let (src, dst) = edges.iter().copied().unzip();
        Ok(Self {
            num_nodes,
            src,
            dst,
            device: device.clone(),
            ndata: Frame::new(num_nodes),
            edata: Frame::new(edges.len()),
            mailbox: HashMap::new(),
            strategy: ExecutionStrategy::default(),
            adjacency: OnceCell::new(),
        })
    }

    /// Each undirected edge `{u, v}` becomes `(u, v)` followed by `(v, u)`.
    pub fn from_undirected(
        num_nodes: usize,
        edges: &[(u32, u32)],
        device: &Device,
    ) -> Result<Self> {
        let directed: Vec<(u32, u32)> = edges
            .iter()
            .flat_map(|&(u, v)| [(u, v), (v, u)])
            .collect();
        Self::new(num_nodes, &directed, device)
    }

    /// Appends a `(v, v)` edge for every node. Frames are reset.
    pub fn with_self_loops(self) -> Result<Self> {
        let edges: Vec<(u32, u32)> = self
            .edges()
            .chain((0..self.num_nodes as u32).map(|v| (v, v)))
            .collect();
        let mut graph = Self::new(self.num_nodes, &edges, &self.device)?;
        graph.strategy = self.strategy;
        Ok(graph)
    }

    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }
    pub fn set_strategy(&mut self, strategy: ExecutionStrategy) {
        self.strategy = strategy;
    }
    pub fn strategy(&self) -> ExecutionStrategy {
        self.strategy
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }
    pub fn num_edges(&self) -> usize {
        self.src.len()
    }
    pub fn device(&self) -> &Device {
        &self.device
    }
    pub fn edges(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.src.iter().copied().zip(self.dst.iter().copied())
    }
    pub fn all_nodes(&self) -> Vec<u32> {
        (0..self.num_nodes as u32).collect()
    }
    pub fn all_edges(&self) -> Vec<u32> {
        (0..self.num_edges() as u32).collect()
    }
    pub fn in_degrees(&self) -> Vec<usize> {
        let mut degree = vec![0; self.num_nodes];
        self.dst.iter().for_each(|&v| degree[v as usize] += 1);
        degree
    }
    pub fn out_degrees(&self) -> Vec<usize> {
        let mut degree = vec![0; self.num_nodes];
        self.src.iter().for_each(|&u| degree[u as usize] += 1);
        degree
    }
    /// `(2, num_edges)`; row 0 holds sources, row 1 destinations.
    pub fn edge_index(&self) -> Result<Tensor> {
        Tensor::from_iter(self.src.iter().chain(&self.dst).copied(), &self.device)?
            .reshape((2, self.num_edges()))
    }

    pub fn ndata(&self) -> &Frame {
        &self.ndata
    }
    pub fn ndata_mut(&mut self) -> &mut Frame {
        &mut self.ndata
    }
    pub fn edata(&self) -> &Frame {
        &self.edata
    }
    pub fn edata_mut(&mut self) -> &mut Frame {
        &mut self.edata
    }
    /// Number of messages waiting in the mailbox.
    pub fn num_pending(&self) -> usize {
        self.mailbox.values().map(|p| p.eids.len()).sum()
    }

    /// Replaces node field `field` with `func(field)` on every node.
    pub fn apply_nodes<F>(&mut self, field: &str, func: F) -> Result<()>
    where
        F: FnOnce(&Tensor) -> Result<Tensor>,
    {
        let value = func(self.ndata.get(field)?)?;
        self.ndata.insert(field, value)?;
        Ok(())
    }

    /// Picks the execution for a message/reduce pair under the current strategy.
    pub fn plan(&self, message: &MessageFunc, reduce: &ReduceFunc) -> Result<ExecutionPlan> {
        let fusable = self.is_fusable(message, reduce);
        match (self.strategy, fusable) {
            (ExecutionStrategy::DegreeBucketing, _) => Ok(ExecutionPlan::DegreeBucketing),
            (_, true) => Ok(ExecutionPlan::Fused),
            (ExecutionStrategy::Auto, false) => Ok(ExecutionPlan::DegreeBucketing),
            (ExecutionStrategy::Fused, false) => Err(GraphError::NotFusable {
                message: message.name(),
                reduce: reduce.name(),
            }
            .into()),
        }
    }

    fn is_fusable(&self, message: &MessageFunc, reduce: &ReduceFunc) -> bool {
        if message.out() != reduce.msg() {
            return false;
        }
        let linear_reduce = matches!(reduce, ReduceFunc::Sum { .. } | ReduceFunc::Mean { .. });
        let linear_message = match message {
            MessageFunc::CopySrc { .. } | MessageFunc::CopyEdge { .. } => true,
            // one scalar weight per edge, otherwise the product is per feature
            MessageFunc::SrcMulEdge { edge, .. } => self
                .edata
                .get(edge)
                .map(|w| w.elem_count() == self.num_edges())
                .unwrap_or(false),
            MessageFunc::Udf { .. } => false,
        };
        linear_reduce && linear_message
    }

    /// Computes messages on `eids` and stores them until the next `recv`.
    pub fn send(&mut self, eids: &[u32], message: &MessageFunc) -> Result<()> {
        self.check_ids("edge", eids, self.num_edges())?;
        let eids: Vec<u32> = eids.iter().copied().unique().collect();
        let eids = eids.as_slice();
        let messages = self.compute_messages(eids, message)?;
        let fresh: HashSet<u32> = eids.iter().copied().collect();
        let pending = match self.mailbox.remove(message.out()) {
            // resending on an edge overwrites its pending message
            Some(old) => {
                let keep: Vec<u32> = (0..old.eids.len() as u32)
                    .filter(|&i| !fresh.contains(&old.eids[i as usize]))
                    .collect();
                let eids = keep
                    .iter()
                    .map(|&i| old.eids[i as usize])
                    .chain(eids.iter().copied())
                    .collect();
                let keep = Tensor::from_slice(&keep, keep.len(), &self.device)?;
                let messages = Tensor::cat(&[&old.messages.index_select(&keep, 0)?, &messages], 0)?;
                Pending { eids, messages }
            }
            None => Pending {
                eids: eids.to_vec(),
                messages,
            },
        };
        self.mailbox.insert(message.out().to_owned(), pending);
        Ok(())
    }

    /// Reduces the pending messages addressed to `nodes` into `ndata[out]`.
    pub fn recv(&mut self, nodes: &[u32], reduce: &ReduceFunc) -> Result<()> {
        self.check_ids("node", nodes, self.num_nodes)?;
        let pending = self
            .mailbox
            .remove(reduce.msg())
            .ok_or(GraphError::EmptyMailbox)?;
        let targets: HashSet<u32> = nodes.iter().copied().collect();
        let (taken, left): (Vec<usize>, Vec<usize>) = (0..pending.eids.len())
            .partition(|&i| targets.contains(&self.dst[pending.eids[i] as usize]));

        if !left.is_empty() {
            let rows = self.index_tensor(&left)?;
            let leftover = Pending {
                eids: left.iter().map(|&i| pending.eids[i]).collect(),
                messages: pending.messages.index_select(&rows, 0)?,
            };
            self.mailbox.insert(reduce.msg().to_owned(), leftover);
        }
        if taken.is_empty() {
            return Ok(());
        }
        let rows = self.index_tensor(&taken)?;
        let messages = pending.messages.index_select(&rows, 0)?;
        let dst: Vec<u32> = taken
            .iter()
            .map(|&i| self.dst[pending.eids[i] as usize])
            .collect();
        let (reduced, receivers) =
            bucketing::reduce_by_degree(self.num_nodes, &messages, &dst, reduce, &self.device)?;
        self.merge(reduce.out(), reduced, &receivers)
    }

    /// `send(eids)` followed by `recv` on their destinations, fused when possible.
    pub fn send_and_recv(
        &mut self,
        eids: &[u32],
        message: &MessageFunc,
        reduce: &ReduceFunc,
    ) -> Result<()> {
        self.check_ids("edge", eids, self.num_edges())?;
        let plan = self.plan(message, reduce)?;
        debug!(?message, ?reduce, ?plan, num_edges = eids.len(), "send_and_recv");
        let dst: Vec<u32> = eids.iter().map(|&e| self.dst[e as usize]).collect();
        let reduced = match plan {
            ExecutionPlan::Fused => self.fused(eids, &dst, message, reduce)?,
            ExecutionPlan::DegreeBucketing => {
                let messages = self.compute_messages(eids, message)?;
                bucketing::reduce_by_degree(self.num_nodes, &messages, &dst, reduce, &self.device)?
                    .0
            }
        };
        let receivers: Vec<u32> = dst.iter().copied().collect::<HashSet<_>>().into_iter().collect();
        self.merge(reduce.out(), reduced, &receivers)
    }

    /// Message passing over every edge into every node.
    pub fn update_all(&mut self, message: &MessageFunc, reduce: &ReduceFunc) -> Result<()> {
        let eids = self.all_edges();
        self.send_and_recv(&eids, message, reduce)
    }

    fn fused(
        &self,
        eids: &[u32],
        dst: &[u32],
        message: &MessageFunc,
        reduce: &ReduceFunc,
    ) -> Result<Tensor> {
        if eids.is_empty() {
            return self.no_messages(message, reduce);
        }
        let whole = eids.len() == self.num_edges()
            && eids.iter().enumerate().all(|(i, &e)| i as u32 == e);
        let src: Vec<u32> = eids.iter().map(|&e| self.src[e as usize]).collect();
        let out = match message {
            MessageFunc::CopySrc { src: field, .. } => {
                let xs = self.ndata.get(field)?;
                let a = if whole {
                    self.full_adjacency()?.clone()
                } else {
                    spmm::adjacency(self.num_nodes, &src, dst, None, &self.device)?
                };
                spmm::spmm(&a, xs)?
            }
            MessageFunc::SrcMulEdge {
                src: field, edge, ..
            } => {
                let xs = self.ndata.get(field)?;
                let w = self.edata.get(edge)?.index_select(&self.index_tensor_u32(eids)?, 0)?;
                let a = spmm::adjacency(self.num_nodes, &src, dst, Some(&w), &self.device)?;
                spmm::spmm(&a, xs)?
            }
            MessageFunc::CopyEdge { edge, .. } => {
                let e = self.edata.get(edge)?.index_select(&self.index_tensor_u32(eids)?, 0)?;
                let m = spmm::incidence(self.num_nodes, dst, e.dtype(), &self.device)?;
                spmm::spmm(&m, &e)?
            }
            MessageFunc::Udf { .. } => {
                return Err(GraphError::NotFusable {
                    message: message.name(),
                    reduce: reduce.name(),
                }
                .into())
            }
        };
        match reduce {
            ReduceFunc::Mean { .. } => {
                let rank = out.rank();
                let norm = spmm::degree_norm(self.num_nodes, dst, rank, out.dtype(), &self.device)?;
                out.broadcast_div(&norm)
            }
            _ => Ok(out),
        }
    }

    /// Zero rows shaped like the fused output when no edge is selected.
    fn no_messages(&self, message: &MessageFunc, reduce: &ReduceFunc) -> Result<Tensor> {
        let like = match message {
            MessageFunc::CopySrc { src, .. } | MessageFunc::SrcMulEdge { src, .. } => {
                self.ndata.get(src)?
            }
            MessageFunc::CopyEdge { edge, .. } => self.edata.get(edge)?,
            MessageFunc::Udf { .. } => {
                return Err(GraphError::NotFusable {
                    message: message.name(),
                    reduce: reduce.name(),
                }
                .into())
            }
        };
        let mut dims = like.dims().to_vec();
        dims[0] = self.num_nodes;
        Tensor::zeros(dims, like.dtype(), &self.device)
    }

    fn full_adjacency(&self) -> Result<&Tensor> {
        if let Some(a) = self.adjacency.get() {
            return Ok(a);
        }
        let a = spmm::adjacency(self.num_nodes, &self.src, &self.dst, None, &self.device)?;
        Ok(self.adjacency.get_or_init(|| a))
    }

    fn compute_messages(&self, eids: &[u32], message: &MessageFunc) -> Result<Tensor> {
        let src = Tensor::from_iter(eids.iter().map(|&e| self.src[e as usize]), &self.device)?;
        let dst = Tensor::from_iter(eids.iter().map(|&e| self.dst[e as usize]), &self.device)?;
        let eid = self.index_tensor_u32(eids)?;
        let batch = EdgeBatch {
            ndata: &self.ndata,
            edata: &self.edata,
            src: &src,
            dst: &dst,
            eids: &eid,
        };
        let messages = match message {
            MessageFunc::CopySrc { src, .. } => batch.src(src)?,
            MessageFunc::CopyEdge { edge, .. } => batch.data(edge)?,
            MessageFunc::SrcMulEdge { src, edge, .. } => {
                let xs = batch.src(src)?;
                let mut w = batch.data(edge)?;
                while w.rank() < xs.rank() {
                    w = w.unsqueeze(w.rank())?;
                }
                xs.broadcast_mul(&w)?
            }
            MessageFunc::Udf { func, .. } => func(&batch)?,
        };
        if messages.dims().first() != Some(&batch.num_edges()) {
            return Err(GraphError::RowMismatch {
                name: message.out().to_owned(),
                expected: batch.num_edges(),
                actual: messages.dims().first().copied().unwrap_or(0),
            }
            .into());
        }
        Ok(messages)
    }

    /// Writes `reduced` into `ndata[field]` on `receivers`; other rows keep
    /// their previous value, or zero when the field is new.
    fn merge(&mut self, field: &str, reduced: Tensor, receivers: &[u32]) -> Result<()> {
        let value = match self.ndata.get(field) {
            Ok(old) if receivers.len() < self.num_nodes => {
                let mut mask = vec![0u8; self.num_nodes];
                receivers.iter().for_each(|&v| mask[v as usize] = 1);
                let mut shape = vec![1usize; reduced.rank()];
                shape[0] = self.num_nodes;
                Tensor::from_vec(mask, shape, &self.device)?
                    .broadcast_as(reduced.shape())?
                    .where_cond(&reduced, &old.to_dtype(reduced.dtype())?)?
            }
            _ => reduced,
        };
        self.ndata.insert(field, value)?;
        Ok(())
    }

    fn check_ids(&self, kind: &'static str, ids: &[u32], len: usize) -> Result<()> {
        match ids.iter().find(|&&id| id as usize >= len) {
            Some(&id) => Err(GraphError::IdOutOfRange { kind, id, len }.into()),
            None => Ok(()),
        }
    }
    fn index_tensor(&self, rows: &[usize]) -> Result<Tensor> {
        Tensor::from_iter(rows.iter().map(|&i| i as u32), &self.device)
    }
    fn index_tensor_u32(&self, rows: &[u32]) -> Result<Tensor> {
        Tensor::from_slice(rows, rows.len(), &self.device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use candle_core::Var;

    fn path() -> Result<Graph> {
        // 0 -> 1 -> 2, 0 -> 2
        Graph::new(3, &[(0, 1), (1, 2), (0, 2)], &Device::Cpu)
    }

    fn features() -> Result<Tensor> {
        Tensor::new(&[[1f32, 10.0], [2.0, 20.0], [4.0, 40.0]], &Device::Cpu)
    }

    #[test]
    fn rejects_out_of_range_edges() {
        assert!(Graph::new(2, &[(0, 2)], &Device::Cpu).is_err());
    }

    #[test]
    fn symmetrize_and_self_loops() -> Result<()> {
        let g = Graph::from_undirected(3, &[(0, 1), (1, 2)], &Device::Cpu)?;
        assert_eq!(g.num_edges(), 4);
        assert_eq!(g.in_degrees(), vec![1, 2, 1]);
        let g = g.with_self_loops()?;
        assert_eq!(g.num_edges(), 7);
        assert_eq!(g.out_degrees(), vec![2, 3, 2]);
        assert_eq!(
            g.edge_index()?.to_vec2::<u32>()?,
            vec![vec![0, 1, 1, 2, 0, 1, 2], vec![1, 0, 2, 1, 0, 1, 2]]
        );
        Ok(())
    }

    #[test]
    fn plans_follow_strategy() -> Result<()> {
        let mut g = path()?;
        let copy = builtin::copy_src("h", "m");
        assert_eq!(g.plan(&copy, &builtin::sum("m", "h"))?, ExecutionPlan::Fused);
        assert_eq!(g.plan(&copy, &builtin::mean("m", "h"))?, ExecutionPlan::Fused);
        assert_eq!(g.plan(&copy, &builtin::max("m", "h"))?, ExecutionPlan::DegreeBucketing);
        // mismatched field names cannot be fused
        assert_eq!(g.plan(&copy, &builtin::sum("x", "h"))?, ExecutionPlan::DegreeBucketing);

        g.set_strategy(ExecutionStrategy::DegreeBucketing);
        assert_eq!(g.plan(&copy, &builtin::sum("m", "h"))?, ExecutionPlan::DegreeBucketing);
        g.set_strategy(ExecutionStrategy::Fused);
        assert!(g.plan(&copy, &builtin::max("m", "h")).is_err());
        Ok(())
    }

    #[test]
    fn update_all_sums_incoming_features() -> Result<()> {
        let mut g = path()?;
        g.ndata_mut().insert("h", features()?)?;
        g.update_all(&builtin::copy_src("h", "m"), &builtin::sum("m", "out"))?;
        assert_eq!(
            g.ndata().get("out")?.to_vec2::<f32>()?,
            vec![vec![0.0, 0.0], vec![1.0, 10.0], vec![3.0, 30.0]]
        );
        // node 0 has no in-edges, so an existing field keeps its row
        g.update_all(&builtin::copy_src("h", "m"), &builtin::sum("m", "h"))?;
        assert_eq!(
            g.ndata().get("h")?.to_vec2::<f32>()?,
            vec![vec![1.0, 10.0], vec![1.0, 10.0], vec![3.0, 30.0]]
        );
        Ok(())
    }

    #[test]
    fn fused_and_bucketed_agree() -> Result<()> {
        let pairs = [
            (builtin::copy_src("h", "m"), builtin::sum("m", "out")),
            (builtin::copy_src("h", "m"), builtin::mean("m", "out")),
            (builtin::src_mul_edge("h", "w", "m"), builtin::sum("m", "out")),
            (builtin::src_mul_edge("h", "w", "m"), builtin::mean("m", "out")),
            (builtin::copy_edge("e", "m"), builtin::sum("m", "out")),
        ];
        for (message, reduce) in pairs {
            let mut results = Vec::new();
            for strategy in [ExecutionStrategy::Fused, ExecutionStrategy::DegreeBucketing] {
                let mut g = path()?.with_strategy(strategy);
                g.ndata_mut().insert("h", features()?)?;
                g.edata_mut()
                    .insert("w", Tensor::new(&[0.5f32, 2.0, -1.0], &Device::Cpu)?)?;
                let e = Tensor::new(&[[1f32, 1.0], [2.0, 3.0], [5.0, 8.0]], &Device::Cpu)?;
                g.edata_mut().insert("e", e)?;
                g.update_all(&message, &reduce)?;
                results.push(g.ndata().get("out")?.flatten_all()?.to_vec1::<f32>()?);
            }
            for (a, b) in results[0].iter().zip(&results[1]) {
                assert_abs_diff_eq!(a, b, epsilon = 1e-5);
            }
        }
        Ok(())
    }

    #[test]
    fn gradients_flow_through_both_paths() -> Result<()> {
        for strategy in [ExecutionStrategy::Fused, ExecutionStrategy::DegreeBucketing] {
            let xs = Var::from_tensor(&features()?)?;
            let mut g = path()?.with_strategy(strategy);
            g.ndata_mut().insert("h", xs.as_tensor().clone())?;
            g.update_all(&builtin::copy_src("h", "m"), &builtin::sum("m", "out"))?;
            let grads = g.ndata().get("out")?.sum_all()?.backward()?;
            let grad = grads.get(&xs).expect("gradient for xs");
            // node 0 feeds two edges, node 1 one, node 2 none
            assert_eq!(
                grad.to_vec2::<f32>()?,
                vec![vec![2.0, 2.0], vec![1.0, 1.0], vec![0.0, 0.0]]
            );
        }
        Ok(())
    }

    #[test]
    fn send_then_recv_with_udfs() -> Result<()> {
        let mut g = path()?;
        g.ndata_mut().insert("h", features()?)?;
        let double = builtin::message("m", |edges: &EdgeBatch| edges.src("h")? * 2.0);
        let sum = builtin::reduce("m", "h", |nodes: &NodeBatch| nodes.mailbox().sum(1));
        g.send(&[0, 2], &double)?;
        assert_eq!(g.num_pending(), 2);
        // edge 1 goes to node 2 which is not received yet
        g.send(&[1], &double)?;
        g.recv(&[1], &sum)?;
        assert_eq!(g.num_pending(), 2);
        assert_eq!(
            g.ndata().get("h")?.to_vec2::<f32>()?,
            vec![vec![1.0, 10.0], vec![2.0, 20.0], vec![4.0, 40.0]]
        );
        g.recv(&[2], &sum)?;
        assert_eq!(g.num_pending(), 0);
        assert_eq!(
            g.ndata().get("h")?.to_vec2::<f32>()?,
            vec![vec![1.0, 10.0], vec![2.0, 20.0], vec![6.0, 60.0]]
        );
        assert!(g.recv(&[2], &sum).is_err());
        Ok(())
    }

    #[test]
    fn resend_overwrites_pending_message() -> Result<()> {
        let mut g = path()?;
        g.ndata_mut().insert("h", features()?)?;
        g.send(&[0], &builtin::copy_src("h", "m"))?;
        g.ndata_mut().insert("h", (features()? * 3.0)?)?;
        g.send(&[0], &builtin::copy_src("h", "m"))?;
        assert_eq!(g.num_pending(), 1);
        g.recv(&[1], &builtin::sum("m", "out"))?;
        assert_eq!(
            g.ndata().get("out")?.to_vec2::<f32>()?,
            vec![vec![0.0, 0.0], vec![3.0, 30.0], vec![0.0, 0.0]]
        );
        Ok(())
    }

    #[test]
    fn send_and_recv_keeps_untouched_rows() -> Result<()> {
        let mut g = path()?;
        g.ndata_mut().insert("h", features()?)?;
        g.send_and_recv(&[0], &builtin::copy_src("h", "m"), &builtin::sum("m", "h"))?;
        assert_eq!(
            g.ndata().get("h")?.to_vec2::<f32>()?,
            vec![vec![1.0, 10.0], vec![1.0, 10.0], vec![4.0, 40.0]]
        );
        Ok(())
    }

    #[test]
    fn apply_nodes_replaces_field() -> Result<()> {
        let mut g = path()?;
        g.ndata_mut().insert("h", features()?)?;
        g.apply_nodes("h", |h| h.affine(1.0, 1.0))?;
        assert_eq!(g.ndata().get("h")?.to_vec2::<f32>()?[0], vec![2.0, 11.0]);
        Ok(())
    }

    #[test]
    fn empty_edge_selection_agrees_across_strategies() -> Result<()> {
        let pairs = [
            (builtin::copy_edge("e", "m"), builtin::sum("m", "out")),
            (builtin::copy_src("h", "m"), builtin::mean("m", "out")),
        ];
        for (message, reduce) in pairs {
            let mut results = Vec::new();
            for strategy in [ExecutionStrategy::Fused, ExecutionStrategy::DegreeBucketing] {
                let mut g =
                    Graph::new(3, &[(0, 1), (1, 2)], &Device::Cpu)?.with_strategy(strategy);
                g.ndata_mut().insert("h", features()?)?;
                g.edata_mut()
                    .insert("e", Tensor::new(&[[1f32, 2.0], [3.0, 4.0]], &Device::Cpu)?)?;
                g.send_and_recv(&[], &message, &reduce)?;
                let out = g.ndata().get("out")?;
                assert_eq!(out.dims(), &[3, 2]);
                results.push(out.to_vec2::<f32>()?);
            }
            assert_eq!(results[0], results[1]);
            assert_eq!(results[0], vec![vec![0.0; 2]; 3]);
        }
        Ok(())
    }

    #[test]
    fn duplicate_edges_in_one_send_count_once() -> Result<()> {
        let mut g = Graph::new(2, &[(0, 1)], &Device::Cpu)?;
        g.ndata_mut()
            .insert("h", Tensor::new(&[[1f32], [5.0]], &Device::Cpu)?)?;
        g.send(&[0, 0], &builtin::copy_src("h", "m"))?;
        assert_eq!(g.num_pending(), 1);
        g.recv(&[1], &builtin::sum("m", "out"))?;
        assert_eq!(
            g.ndata().get("out")?.to_vec2::<f32>()?,
            vec![vec![0.0], vec![1.0]]
        );
        Ok(())
    }

    #[test]
    fn message_closure_must_return_one_row_per_edge() -> Result<()> {
        let mut g = path()?;
        g.ndata_mut().insert("h", features()?)?;
        let seen = std::sync::Arc::new(std::sync::Mutex::new(0));
        let counter = seen.clone();
        let first_row = builtin::message("m", move |edges: &EdgeBatch| {
            *counter.lock().unwrap() = edges.num_edges();
            edges.src("h")?.narrow(0, 0, 1)
        });
        assert!(g.send(&[0, 1], &first_row).is_err());
        assert_eq!(*seen.lock().unwrap(), 2);
        Ok(())
    }
}
