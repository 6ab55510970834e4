pub mod analyzer;
pub mod check_analysis;
pub mod cleanup;
pub mod function_registry;
pub mod functions;
pub mod grouping;
pub mod object;
pub mod ordinals;
pub mod resolution;
pub mod substitution;
pub mod subquery;
pub mod time_window;
pub mod type_coercion;
pub mod window;

pub use analyzer::*;
pub use check_analysis::check_analysis;
pub use function_registry::{lookup_function, register_function, register_udf};
pub use object::{add_outer_scope, outer_scope_exists};
