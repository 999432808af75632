//! Sparse matrix operator.
//!
//! A system matrix stored in CSR format (one row per measurement), exposed
//! through [`LinearOperator`]. Row storage keeps forward projection a dot
//! product per measurement and lets list-mode subsets be cut out by row.

use sprs::{CsMat, TriMat};

use super::operator::LinearOperator;
use crate::error::{ReconError, ReconResult};

/// Sparse matrix in CSR format.
pub type SparseCsr = CsMat<f64>;

/// Build a sparse CSR matrix from triplets (row, col, value).
///
/// Duplicate (row, col) entries are summed.
pub fn from_triplets<I>(nrows: usize, ncols: usize, triplets: I) -> SparseCsr
where
    I: IntoIterator<Item = (usize, usize, f64)>,
{
    let mut tri = TriMat::new((nrows, ncols));
    for (i, j, v) in triplets {
        tri.add_triplet(i, j, v);
    }
    tri.to_csr()
}

/// y ← A x for a CSR matrix.
pub fn spmv(a: &SparseCsr, x: &[f64], y: &mut [f64]) {
    assert_eq!(a.cols(), x.len());
    assert_eq!(a.rows(), y.len());

    for (row, row_vec) in a.outer_iterator().enumerate() {
        y[row] = row_vec.iter().map(|(col, &val)| val * x[col]).sum();
    }
}

/// x ← Aᵀ y for a CSR matrix.
pub fn spmv_transpose(a: &SparseCsr, y: &[f64], x: &mut [f64]) {
    assert_eq!(a.rows(), y.len());
    assert_eq!(a.cols(), x.len());

    x.fill(0.0);
    for (row, row_vec) in a.outer_iterator().enumerate() {
        let yr = y[row];
        if yr == 0.0 {
            continue;
        }
        for (col, &val) in row_vec.iter() {
            x[col] += val * yr;
        }
    }
}

/// Matrix-backed linear operator.
///
/// The image side may carry an N-D shape (e.g. `[nx, ny, nz]`); the matrix
/// column count must equal its product. The measurement side is 1-D.
#[derive(Debug, Clone)]
pub struct SparseOperator {
    matrix: SparseCsr,
    in_shape: Vec<usize>,
    out_shape: Vec<usize>,
}

impl SparseOperator {
    /// Wrap a matrix, interpreting its columns as an image of `image_shape`.
    pub fn new(matrix: SparseCsr, image_shape: &[usize]) -> ReconResult<Self> {
        let n: usize = image_shape.iter().product();
        if n != matrix.cols() {
            return Err(ReconError::shape(
                "sparse operator columns vs image shape",
                &[n],
                &[matrix.cols()],
            ));
        }
        let matrix = if matrix.is_csr() { matrix } else { matrix.to_csr() };
        let out_shape = vec![matrix.rows()];
        Ok(Self {
            matrix,
            in_shape: image_shape.to_vec(),
            out_shape,
        })
    }

    /// Operator from triplets with a flat image of `ncols` voxels.
    pub fn from_triplets<I>(nrows: usize, ncols: usize, triplets: I) -> Self
    where
        I: IntoIterator<Item = (usize, usize, f64)>,
    {
        Self {
            matrix: from_triplets(nrows, ncols, triplets),
            in_shape: vec![ncols],
            out_shape: vec![nrows],
        }
    }

    /// n × n identity.
    pub fn identity(n: usize) -> Self {
        Self::from_triplets(n, n, (0..n).map(|i| (i, i, 1.0)))
    }

    /// Reinterpret the image side with an N-D shape of the same size.
    pub fn with_image_shape(self, image_shape: &[usize]) -> ReconResult<Self> {
        Self::new(self.matrix, image_shape)
    }

    pub fn matrix(&self) -> &SparseCsr {
        &self.matrix
    }

    /// Operator made of the given rows, in the given order.
    ///
    /// Used to build per-event (list-mode) and per-subset operators from a
    /// histogram system matrix. Indices may repeat.
    pub fn select_rows(&self, rows: &[usize]) -> ReconResult<Self> {
        let nrows = self.matrix.rows();
        if let Some(&bad) = rows.iter().find(|&&r| r >= nrows) {
            return Err(ReconError::InvalidInput(format!(
                "row index {} out of range (rows={})",
                bad, nrows
            )));
        }

        let mut tri = TriMat::new((rows.len(), self.matrix.cols()));
        for (new_row, &old_row) in rows.iter().enumerate() {
            if let Some(row_vec) = self.matrix.outer_view(old_row) {
                for (col, &val) in row_vec.iter() {
                    tri.add_triplet(new_row, col, val);
                }
            }
        }

        Ok(Self {
            matrix: tri.to_csr(),
            in_shape: self.in_shape.clone(),
            out_shape: vec![rows.len()],
        })
    }
}

impl LinearOperator for SparseOperator {
    fn in_shape(&self) -> &[usize] {
        &self.in_shape
    }

    fn out_shape(&self) -> &[usize] {
        &self.out_shape
    }

    fn apply_into(&self, x: &[f64], y: &mut [f64]) {
        spmv(&self.matrix, x, y);
    }

    fn adjoint_into(&self, y: &[f64], x: &mut [f64]) {
        spmv_transpose(&self.matrix, y, x);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::operator::adjointness_gap;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_from_triplets() {
        let triplets = vec![(0, 0, 1.0), (1, 1, 2.0), (0, 1, 3.0)];
        let mat = from_triplets(2, 2, triplets);

        assert_eq!(mat.rows(), 2);
        assert_eq!(mat.cols(), 2);
        assert_eq!(mat.nnz(), 3);
    }

    #[test]
    fn test_spmv() {
        // [[1, 2], [3, 4]] * [1, 2] = [5, 11]
        let op = SparseOperator::from_triplets(
            2,
            2,
            vec![(0, 0, 1.0), (0, 1, 2.0), (1, 0, 3.0), (1, 1, 4.0)],
        );
        let y = op.apply(&[1.0, 2.0]).unwrap();
        assert!((y[0] - 5.0).abs() < 1e-12);
        assert!((y[1] - 11.0).abs() < 1e-12);

        // Aᵀ [1, 1] = column sums
        let x = op.adjoint(&[1.0, 1.0]).unwrap();
        assert!((x[0] - 4.0).abs() < 1e-12);
        assert!((x[1] - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_select_rows_repeats_and_reorders() {
        let op = SparseOperator::from_triplets(3, 2, vec![(0, 0, 1.0), (1, 1, 2.0), (2, 0, 3.0)]);
        let sub = op.select_rows(&[2, 0, 2]).unwrap();
        assert_eq!(sub.out_shape(), &[3]);

        let y = sub.apply(&[1.0, 1.0]).unwrap();
        assert_eq!(y, vec![3.0, 1.0, 3.0]);

        assert!(op.select_rows(&[3]).is_err());
    }

    #[test]
    fn test_image_shape_must_match_columns() {
        let mat = from_triplets(2, 4, vec![(0, 0, 1.0)]);
        assert!(SparseOperator::new(mat.clone(), &[2, 2, 1]).is_ok());
        assert!(matches!(
            SparseOperator::new(mat, &[3, 1, 1]),
            Err(ReconError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_adjointness_random_matrix() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut triplets = Vec::new();
        for i in 0..12 {
            for j in 0..9 {
                if rng.gen_bool(0.4) {
                    triplets.push((i, j, rng.gen_range(0.0..2.0)));
                }
            }
        }
        let op = SparseOperator::from_triplets(12, 9, triplets);

        for _ in 0..5 {
            let u: Vec<f64> = (0..9).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let v: Vec<f64> = (0..12).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let gap = adjointness_gap(&op, &u, &v).unwrap();
            assert!(gap < 1e-12, "adjointness gap {}", gap);
        }
    }
}
