mod comparison;
mod models;

pub use comparison::{CombineOp, ComparisonMode};
pub use models::*;
