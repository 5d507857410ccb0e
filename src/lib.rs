pub mod bench;
pub mod datasets;
pub mod error;
pub mod graph;
pub mod nn;
pub mod train;
pub mod viz;
