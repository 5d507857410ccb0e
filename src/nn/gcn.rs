use candle_core::{DType, Device, Result, Tensor};
use candle_nn::{Activation, Linear, Module, VarBuilder, VarMap};

use super::{traits::GnnModule, utils};
use crate::graph::{builtin, EdgeBatch, Graph, MessageFunc, NodeBatch, ReduceFunc};

/// Which message/reduce functions a [`GcnLayer`] wires up.
///
/// Both compute the same neighbourhood sum. `Builtin` lets the graph fuse the
/// pair into one adjacency product; `UserDefined` uses closures, which forces
/// degree bucketing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Aggregation {
    #[default]
    Builtin,
    UserDefined,
}
impl Aggregation {
    fn functions(&self) -> (MessageFunc, ReduceFunc) {
        match self {
            Self::Builtin => (builtin::copy_src("h", "m"), builtin::sum("m", "h")),
            Self::UserDefined => (
                builtin::message("m", |edges: &EdgeBatch| edges.src("h")),
                builtin::reduce("m", "h", |nodes: &NodeBatch| nodes.mailbox().sum(1)),
            ),
        }
    }
}

/// Node-wise update: a linear layer followed by an optional activation.
pub struct NodeApplyModule {
    linear: Linear,
    activation_fn: Option<Activation>,
}
impl NodeApplyModule {
    pub fn new(
        in_dim: usize,
        out_dim: usize,
        activation_fn: Option<Activation>,
        vs: VarBuilder,
    ) -> Result<Self> {
        Ok(Self {
            linear: utils::linear(in_dim, out_dim, vs.pp("linear"))?,
            activation_fn,
        })
    }
}
impl Module for NodeApplyModule {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let h = self.linear.forward(xs)?;
        match &self.activation_fn {
            Some(activation_fn) => activation_fn.forward(&h),
            None => Ok(h),
        }
    }
}

/// Sum neighbour features into each node, then apply [`NodeApplyModule`].
pub struct GcnLayer {
    apply_mod: NodeApplyModule,
    message: MessageFunc,
    reduce: ReduceFunc,
}
impl GcnLayer {
    pub fn new(
        in_dim: usize,
        out_dim: usize,
        activation_fn: Option<Activation>,
        aggregation: Aggregation,
        vs: VarBuilder,
    ) -> Result<Self> {
        let (message, reduce) = aggregation.functions();
        Ok(Self {
            apply_mod: NodeApplyModule::new(in_dim, out_dim, activation_fn, vs)?,
            message,
            reduce,
        })
    }
}
impl GnnModule for GcnLayer {
    fn forward(&self, graph: &mut Graph, xs: &Tensor) -> Result<Tensor> {
        graph.ndata_mut().insert("h", xs.clone())?;
        graph.update_all(&self.message, &self.reduce)?;
        graph.apply_nodes("h", |h| self.apply_mod.forward(h))?;
        graph.ndata_mut().remove("h")
    }
}

pub struct GcnParams {
    pub hidden_dim: usize,
    pub activation_fn: Activation,
    pub aggregation: Aggregation,
}
impl Default for GcnParams {
    fn default() -> Self {
        Self {
            hidden_dim: 5,
            activation_fn: Activation::Relu,
            aggregation: Aggregation::Builtin,
        }
    }
}

/// Two stacked [`GcnLayer`]s: `in -> hidden` with activation, `hidden -> classes` without.
pub struct Net {
    layers: [GcnLayer; 2],
    varmap: VarMap,
}
impl Net {
    pub fn with_params(
        in_dim: usize,
        num_classes: usize,
        params: GcnParams,
        device: &Device,
    ) -> Result<Self> {
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let layers = [
            GcnLayer::new(
                in_dim,
                params.hidden_dim,
                Some(params.activation_fn),
                params.aggregation,
                vs.pp("gcn1"),
            )?,
            GcnLayer::new(
                params.hidden_dim,
                num_classes,
                None,
                params.aggregation,
                vs.pp("gcn2"),
            )?,
        ];
        Ok(Self { layers, varmap })
    }
    pub fn new(in_dim: usize, num_classes: usize, device: &Device) -> Result<Self> {
        Self::with_params(in_dim, num_classes, GcnParams::default(), device)
    }
    /// Reinitializes every parameter deterministically from `seed`.
    pub fn seed(&self, seed: u64) -> Result<()> {
        utils::seed_parameters(&self.varmap, seed)
    }
    pub fn parameters(&self) -> Vec<candle_core::Var> {
        self.varmap.all_vars()
    }
}
impl GnnModule for Net {
    fn forward(&self, graph: &mut Graph, xs: &Tensor) -> Result<Tensor> {
        let mut h = xs.clone();
        for layer in &self.layers {
            h = layer.forward(graph, &h)?;
        }
        Ok(h)
    }
}
