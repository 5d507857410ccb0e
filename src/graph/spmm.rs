//! Fused message passing: a linear message/reduce pair is one matrix product.
//!
//!   sum_{(u, v) in E} w_uv x_u  ==  (A x)_v,   A[v, u] = sum of w_uv
//!
//! so the per-edge messages never exist as a tensor. The adjacency is stored
//! densely; at karate-club scale that is the whole sparse matrix anyway.

use candle_core::{DType, Device, Result, Tensor};

/// `(num_nodes, num_nodes)` matrix with `A[dst, src]` accumulating `weights`
/// (ones when `weights` is `None`). Differentiable w.r.t. `weights`.
pub fn adjacency(
    num_nodes: usize,
    src: &[u32],
    dst: &[u32],
    weights: Option<&Tensor>,
    device: &Device,
) -> Result<Tensor> {
    let flat: Vec<u32> = src
        .iter()
        .zip(dst)
        .map(|(&u, &v)| v * num_nodes as u32 + u)
        .collect();
    let flat = Tensor::from_vec(flat, src.len(), device)?;
    let values = match weights {
        Some(w) => w.flatten_all()?,
        None => Tensor::ones(src.len(), DType::F32, device)?,
    };
    Tensor::zeros(num_nodes * num_nodes, values.dtype(), device)?
        .index_add(&flat, &values, 0)?
        .reshape((num_nodes, num_nodes))
}

/// `(num_nodes, num_edges)` matrix with a one at `(dst[k], k)`.
pub fn incidence(num_nodes: usize, dst: &[u32], dtype: DType, device: &Device) -> Result<Tensor> {
    let num_edges = dst.len();
    let flat: Vec<u32> = dst
        .iter()
        .enumerate()
        .map(|(k, &v)| v * num_edges as u32 + k as u32)
        .collect();
    let flat = Tensor::from_vec(flat, num_edges, device)?;
    Tensor::zeros(num_nodes * num_edges, dtype, device)?
        .index_add(&flat, &Tensor::ones(num_edges, dtype, device)?, 0)?
        .reshape((num_nodes, num_edges))
}

/// `matrix · xs`, treating every trailing dimension of `xs` as features.
pub fn spmm(matrix: &Tensor, xs: &Tensor) -> Result<Tensor> {
    let dims = xs.dims().to_vec();
    let rows = dims[0];
    let cols: usize = dims[1..].iter().product();
    let out = matrix
        .to_dtype(xs.dtype())?
        .matmul(&xs.reshape((rows, cols))?)?;
    let mut out_dims = dims;
    out_dims[0] = matrix.dims()[0];
    out.reshape(out_dims)
}

/// In-degree of every node counted over `dst`, clamped to at least one and
/// shaped to broadcast against `(num_nodes, feature...)`.
pub fn degree_norm(
    num_nodes: usize,
    dst: &[u32],
    rank: usize,
    dtype: DType,
    device: &Device,
) -> Result<Tensor> {
    let mut degree = vec![0f32; num_nodes];
    for &v in dst {
        degree[v as usize] += 1.0;
    }
    let degree: Vec<f32> = degree.into_iter().map(|d| d.max(1.0)).collect();
    let mut shape = vec![1usize; rank.max(1)];
    shape[0] = num_nodes;
    Tensor::from_vec(degree, shape, device)?.to_dtype(dtype)
}
