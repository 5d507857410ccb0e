mod traits;
pub use traits::*;
pub mod utils;

mod gcn;
pub use gcn::{Aggregation, GcnLayer, GcnParams, Net, NodeApplyModule};
