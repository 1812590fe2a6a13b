pub mod constraints;
pub mod env;
pub mod formula;
pub mod ops;
pub mod pattern;
pub mod witness;

pub use constraints::MetavarConstraint;
pub use env::{BoundValue, Environment};
pub use formula::Formula;
pub use ops::{AnchoredOperationsMap, Operation};
pub use witness::Witness;
