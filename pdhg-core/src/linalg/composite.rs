//! Operator chains and subset collections.

use super::operator::LinearOperator;
use crate::error::{ReconError, ReconResult};

/// Ordered chain of operators acting as their composition.
///
/// `CompositeOperator::new(vec![A, B, C])` represents `A ∘ B ∘ C`: `apply`
/// runs C first and A last, `adjoint` runs Aᵀ first and Cᵀ last.
pub struct CompositeOperator {
    ops: Vec<Box<dyn LinearOperator>>,
}

impl CompositeOperator {
    /// Build a chain, checking that each operator's input shape matches the
    /// output shape of the operator applied before it.
    pub fn new(ops: Vec<Box<dyn LinearOperator>>) -> ReconResult<Self> {
        if ops.is_empty() {
            return Err(ReconError::InvalidInput("operator chain is empty".into()));
        }
        for (i, pair) in ops.windows(2).enumerate() {
            let (outer, inner) = (&pair[0], &pair[1]);
            if outer.in_shape() != inner.out_shape() {
                return Err(ReconError::shape(
                    format!("composite link {} <- {}", i, i + 1),
                    outer.in_shape(),
                    inner.out_shape(),
                ));
            }
        }
        Ok(Self { ops })
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl LinearOperator for CompositeOperator {
    fn in_shape(&self) -> &[usize] {
        self.ops[self.ops.len() - 1].in_shape()
    }

    fn out_shape(&self) -> &[usize] {
        self.ops[0].out_shape()
    }

    fn apply_into(&self, x: &[f64], y: &mut [f64]) {
        let mut current = x.to_vec();
        for op in self.ops[1..].iter().rev() {
            let mut next = vec![0.0; op.out_len()];
            op.apply_into(&current, &mut next);
            current = next;
        }
        self.ops[0].apply_into(&current, y);
    }

    fn adjoint_into(&self, y: &[f64], x: &mut [f64]) {
        let last = self.ops.len() - 1;
        let mut current = y.to_vec();
        for op in &self.ops[..last] {
            let mut next = vec![0.0; op.in_len()];
            op.adjoint_into(&current, &mut next);
            current = next;
        }
        self.ops[last].adjoint_into(&current, x);
    }
}

/// Indexed collection of operators sharing one input (image) space.
///
/// Operator `i` maps the image onto the measurements of partition subset `i`.
pub struct OperatorSequence {
    ops: Vec<Box<dyn LinearOperator>>,
}

impl OperatorSequence {
    pub fn new(ops: Vec<Box<dyn LinearOperator>>) -> ReconResult<Self> {
        let first = ops
            .first()
            .ok_or_else(|| ReconError::InvalidPartition("operator sequence is empty".into()))?;
        for (i, op) in ops.iter().enumerate().skip(1) {
            if op.in_shape() != first.in_shape() {
                return Err(ReconError::shape(
                    format!("operator sequence member {}", i),
                    first.in_shape(),
                    op.in_shape(),
                ));
            }
        }
        Ok(Self { ops })
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Shared image shape.
    pub fn in_shape(&self) -> &[usize] {
        self.ops[0].in_shape()
    }

    pub fn in_len(&self) -> usize {
        self.ops[0].in_len()
    }

    pub fn get(&self, i: usize) -> Option<&dyn LinearOperator> {
        self.ops.get(i).map(|op| op.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn LinearOperator> {
        self.ops.iter().map(|op| op.as_ref())
    }
}

impl std::ops::Index<usize> for OperatorSequence {
    type Output = dyn LinearOperator;

    fn index(&self, i: usize) -> &Self::Output {
        self.ops[i].as_ref()
    }
}
