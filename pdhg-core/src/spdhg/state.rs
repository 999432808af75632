//! Iterate, per-subset data and scratch buffers of LM-SPDHG.

use crate::error::ReconResult;
use crate::linalg::vector::axpy;
use crate::linalg::LinearOperator;
use crate::pdhg::state::{check_warm_start, initial_data_dual};
use crate::problem::ListModeProblem;

/// Event data of one subset, gathered in partition order.
#[derive(Debug, Clone)]
pub struct SubsetData {
    /// μ
    pub multiplicity: Vec<f64>,
    /// 1/μ
    pub inv_multiplicity: Vec<f64>,
    /// s
    pub contamination: Vec<f64>,
}

impl SubsetData {
    pub fn gather(problem: &ListModeProblem<'_>) -> Vec<Self> {
        (0..problem.num_subsets())
            .map(|i| {
                let multiplicity: Vec<f64> = problem
                    .partition
                    .gather(i, problem.multiplicity)
                    .into_iter()
                    .map(f64::from)
                    .collect();
                let inv_multiplicity = multiplicity.iter().map(|m| 1.0 / m).collect();
                Self {
                    multiplicity,
                    inv_multiplicity,
                    contamination: problem.partition.gather(i, problem.contamination),
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.multiplicity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.multiplicity.is_empty()
    }
}

/// LM-SPDHG iterate.
#[derive(Debug, Clone)]
pub struct LmSpdhgState {
    pub x: Vec<f64>,
    /// Data dual per subset
    pub y: Vec<Vec<f64>>,
    /// Gradient dual
    pub w: Vec<f64>,
    pub z: Vec<f64>,
    pub zbar: Vec<f64>,
}

impl LmSpdhgState {
    /// State for `warm_start`.
    ///
    /// `y_i = 1 − μ_i/(A_i x + s_i)`, `w = 0`,
    /// `z = zbar = Aᵀ1 + Σ_i A_iᵀ((y_i − 1)/μ_i)`.
    pub fn initialize(
        problem: &ListModeProblem<'_>,
        subsets: &[SubsetData],
        warm_start: &[f64],
    ) -> ReconResult<Self> {
        let n = problem.num_voxels();
        check_warm_start(warm_start, n)?;

        let mut z = problem.adjoint_ones.to_vec();
        let mut y = Vec::with_capacity(subsets.len());
        let mut back = vec![0.0; n];
        for (op, data) in problem.sequence.iter().zip(subsets) {
            let mut ybar = op.apply(warm_start)?;
            axpy(1.0, &data.contamination, &mut ybar);
            let yi = initial_data_dual(&ybar, &data.multiplicity)?;

            let scaled: Vec<f64> = yi
                .iter()
                .zip(&data.inv_multiplicity)
                .map(|(v, inv_mu)| (v - 1.0) * inv_mu)
                .collect();
            op.adjoint_into(&scaled, &mut back);
            axpy(1.0, &back, &mut z);
            y.push(yi);
        }

        let w = vec![0.0; problem.gradient.out_len()];
        let zbar = z.clone();
        Ok(Self { x: warm_start.to_vec(), y, w, z, zbar })
    }
}

/// Scratch buffers; data buffers are sized for the largest subset.
#[derive(Debug, Clone)]
pub struct LmSpdhgWorkspace {
    pub y_next: Vec<f64>,
    pub dy: Vec<f64>,
    pub w_next: Vec<f64>,
    pub dw: Vec<f64>,
    pub dz: Vec<f64>,
}

impl LmSpdhgWorkspace {
    pub fn new(n: usize, max_subset: usize, grad_len: usize) -> Self {
        Self {
            y_next: vec![0.0; max_subset],
            dy: vec![0.0; max_subset],
            w_next: vec![0.0; grad_len],
            dw: vec![0.0; grad_len],
            dz: vec![0.0; n],
        }
    }

    pub fn for_problem(problem: &ListModeProblem<'_>, subsets: &[SubsetData]) -> Self {
        let max_subset = subsets.iter().map(SubsetData::len).max().unwrap_or(0);
        Self::new(problem.num_voxels(), max_subset, problem.gradient.out_len())
    }
}
