pub mod plan;
pub mod tree_node;

pub use plan::*;
