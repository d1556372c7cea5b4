/// Pivots smaller than this are treated as zero during elimination.
const SINGULAR_EPSILON: f64 = 1e-12;

/// Dense square matrix stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    n: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn identity(n: usize) -> Self {
        let mut data = vec![0.0; n * n];
        for i in 0..n {
            data[i * n + i] = 1.0;
        }
        Self { n, data }
    }

    /// Builds a matrix from row-major values; `None` if the length is not `n * n`.
    pub fn from_row_major(n: usize, data: Vec<f64>) -> Option<Self> {
        (data.len() == n * n).then_some(Self { n, data })
    }

    pub fn dimension(&self) -> usize {
        self.n
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.n + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.n + col] = value;
    }

    pub fn as_row_major(&self) -> &[f64] {
        &self.data
    }

    /// `self += v * vᵗ`
    pub fn add_outer(&mut self, v: &[f64]) {
        debug_assert_eq!(v.len(), self.n);
        let n = self.n;
        for (i, &vi) in v.iter().enumerate() {
            if vi == 0.0 {
                continue;
            }
            let row = &mut self.data[i * n..(i + 1) * n];
            for (cell, &vj) in row.iter_mut().zip(v) {
                *cell += vi * vj;
            }
        }
    }

    pub fn mul_vec(&self, v: &[f64]) -> Vec<f64> {
        debug_assert_eq!(v.len(), self.n);
        self.data
            .chunks_exact(self.n)
            .map(|row| dot(row, v))
            .collect()
    }

    /// Inverse by Gauss-Jordan elimination with partial pivoting.
    ///
    /// Returns `None` when a pivot falls below working precision.
    pub fn inverse(&self) -> Option<Matrix> {
        let n = self.n;
        let mut work = self.data.clone();
        let mut inv = Matrix::identity(n).data;

        for col in 0..n {
            let pivot_row = (col..n).max_by(|&a, &b| {
                work[a * n + col]
                    .abs()
                    .total_cmp(&work[b * n + col].abs())
            })?;
            let pivot = work[pivot_row * n + col];
            if !pivot.is_finite() || pivot.abs() < SINGULAR_EPSILON {
                return None;
            }

            if pivot_row != col {
                for k in 0..n {
                    work.swap(col * n + k, pivot_row * n + k);
                    inv.swap(col * n + k, pivot_row * n + k);
                }
            }

            for k in 0..n {
                work[col * n + k] /= pivot;
                inv[col * n + k] /= pivot;
            }

            for row in 0..n {
                if row == col {
                    continue;
                }
                let factor = work[row * n + col];
                if factor == 0.0 {
                    continue;
                }
                for k in 0..n {
                    work[row * n + k] -= factor * work[col * n + k];
                    inv[row * n + k] -= factor * inv[col * n + k];
                }
            }
        }

        Some(Matrix { n, data: inv })
    }
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
