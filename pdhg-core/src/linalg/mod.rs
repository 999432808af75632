//! Linear algebra layer.
//!
//! Operator interface, composite chains, matrix-backed and diagonal
//! operators, finite differences and dense slice kernels.

pub mod composite;
pub mod diagonal;
pub mod gradient;
pub mod operator;
pub mod sparse;
pub mod vector;

pub use composite::{CompositeOperator, OperatorSequence};
pub use diagonal::DiagonalOperator;
pub use gradient::FiniteDifference;
pub use operator::{adjointness_gap, LinearOperator};
pub use sparse::SparseOperator;
