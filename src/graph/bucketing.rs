//! Degree bucketing: the fallback when a reduction cannot become a product.
//!
//! Destination nodes are grouped by in-degree so that each group's incoming
//! messages stack into a regular `(nodes, degree, feature...)` mailbox, and the
//! reducer runs once per distinct degree instead of once per node.

use std::collections::BTreeMap;

use candle_core::{bail, Device, Result, Tensor};
use itertools::Itertools;

use super::builtin::{NodeBatch, ReduceFunc};

/// Nodes sharing an in-degree, with the message rows addressed to each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub degree: usize,
    pub nodes: Vec<u32>,
    /// `nodes.len() * degree` message rows, node-major.
    pub rows: Vec<u32>,
}

/// Groups message rows by destination, then destinations by in-degree.
pub fn buckets(dst: &[u32]) -> Vec<Bucket> {
    let inbox = dst
        .iter()
        .enumerate()
        .map(|(row, &v)| (v, row as u32))
        .into_group_map();
    let mut by_degree: BTreeMap<usize, Vec<(u32, Vec<u32>)>> = BTreeMap::new();
    for (v, rows) in inbox.into_iter().sorted_by_key(|(v, _)| *v) {
        by_degree.entry(rows.len()).or_default().push((v, rows));
    }
    by_degree
        .into_iter()
        .map(|(degree, members)| {
            let (nodes, rows): (Vec<u32>, Vec<Vec<u32>>) = members.into_iter().unzip();
            Bucket {
                degree,
                nodes,
                rows: rows.concat(),
            }
        })
        .collect()
}

/// Reduces `messages` (one row per entry of `dst`) into a `(num_nodes, ...)`
/// tensor. Rows of nodes without incoming messages are zero. Also returns the
/// receiving nodes.
pub fn reduce_by_degree(
    num_nodes: usize,
    messages: &Tensor,
    dst: &[u32],
    reduce: &ReduceFunc,
    device: &Device,
) -> Result<(Tensor, Vec<u32>)> {
    let feature_dims = messages.dims()[1..].to_vec();
    let mut out_dims = vec![num_nodes];
    out_dims.extend_from_slice(&feature_dims);
    let mut out = Tensor::zeros(out_dims, messages.dtype(), device)?;

    let mut receivers = Vec::new();
    for bucket in buckets(dst) {
        let mut mailbox_dims = vec![bucket.nodes.len(), bucket.degree];
        mailbox_dims.extend_from_slice(&feature_dims);
        let rows = Tensor::from_slice(&bucket.rows, bucket.rows.len(), device)?;
        let mailbox = messages.index_select(&rows, 0)?.reshape(mailbox_dims)?;

        let batch = NodeBatch {
            nodes: &bucket.nodes,
            mailbox: &mailbox,
        };
        let reduced = reduce.reduce(&batch)?;
        if reduced.dims().first() != Some(&bucket.nodes.len()) {
            bail!(
                "{} returned {:?} for a bucket of {} nodes",
                reduce.name(),
                reduced.dims(),
                bucket.nodes.len()
            );
        }
        let nodes = Tensor::from_slice(&bucket.nodes, bucket.nodes.len(), device)?;
        out = out.index_add(&nodes, &reduced.to_dtype(out.dtype())?, 0)?;
        receivers.extend_from_slice(&bucket.nodes);
    }
    Ok((out, receivers))
}
