pub mod expr;
pub mod expr_fn;
pub mod tree_node;
pub mod aggregate;
pub mod generator;
pub mod window;
pub mod string;
pub mod conditional;
pub mod math;
pub mod misc;
pub mod complex_type_extractor;

pub use expr::*;
pub use expr_fn::*;
pub use aggregate::*;
pub use generator::*;
pub use window::*;
pub use string::*;
pub use conditional::*;
pub use math::*;
pub use misc::*;
pub use complex_type_extractor::*;
