//! Witness trees.

use crate::env::BoundValue;

/// Proof object recording the binding that satisfied a quantifier.
///
/// Witnesses nest: the `nested` set carries the trace from this quantifier
/// down to the atoms (and inner quantifiers) that produced the binding.
#[derive(Debug, Clone, PartialEq)]
pub struct Witness {
    /// Model state at which the binding was established.
    pub state: usize,
    pub metavar: String,
    pub binding: BoundValue,
    pub nested: Vec<Witness>,
}

impl Witness {
    pub fn new(state: usize, metavar: impl Into<String>, binding: BoundValue) -> Self {
        Self {
            state,
            metavar: metavar.into(),
            binding,
            nested: Vec::new(),
        }
    }

    pub fn with_nested(mut self, nested: Vec<Witness>) -> Self {
        self.nested = nested;
        self
    }
}
