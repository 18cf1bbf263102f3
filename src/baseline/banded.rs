use super::BaselineError;

// ---------------------------------------------------------------------------
// Roughness penalty: λ·DᵀD for the second-difference operator D
// ---------------------------------------------------------------------------

/// Symmetric pentadiagonal matrix `λ·DᵀD`, stored as its lower bands.
///
/// `D` is the implicit (n-2)×n operator with rows `[1, -2, 1]`. The penalty
/// depends only on `n` and `λ`, so one instance serves every reweighting
/// round of a fit.
#[derive(Debug, Clone)]
pub struct SecondDifferencePenalty {
    lambda: f64,
    /// `A[i][i]`
    diag: Vec<f64>,
    /// `A[i][i-1]`, zero at `i = 0`.
    sub1: Vec<f64>,
    /// `A[i][i-2]`, zero at `i < 2`.
    sub2: Vec<f64>,
}

const STENCIL: [f64; 3] = [1.0, -2.0, 1.0];

impl SecondDifferencePenalty {
    /// Accumulate `λ·DᵀD` row by row of `D`. Requires `n >= 3`.
    pub fn new(n: usize, lambda: f64) -> Self {
        let mut bands = [vec![0.0; n], vec![0.0; n], vec![0.0; n]];
        for row in 0..n.saturating_sub(2) {
            for p in 0..3 {
                for q in 0..=p {
                    bands[p - q][row + p] += lambda * STENCIL[p] * STENCIL[q];
                }
            }
        }
        let [diag, sub1, sub2] = bands;
        Self {
            lambda,
            diag,
            sub1,
            sub2,
        }
    }

    fn len(&self) -> usize {
        self.diag.len()
    }

    /// `λ·DᵀD·y`, evaluated through the second differences of `y` so that
    /// any constant signal maps to exactly zero.
    pub fn apply(&self, y: &[f64]) -> Vec<f64> {
        let n = self.len();
        let dy: Vec<f64> = y.windows(3).map(|w| w[0] - 2.0 * w[1] + w[2]).collect();

        (0..n)
            .map(|j| {
                // Column j of D touches rows j-2 (coef 1), j-1 (coef -2), j (coef 1).
                let mut acc = 0.0;
                if j >= 2 {
                    acc += dy[j - 2];
                }
                if j >= 1 && j - 1 < dy.len() {
                    acc -= 2.0 * dy[j - 1];
                }
                if j < dy.len() {
                    acc += dy[j];
                }
                self.lambda * acc
            })
            .collect()
    }

    /// Solve `(W + λ·DᵀD)·x = rhs`, where `W = diag(weights)`.
    ///
    /// Tries a banded Cholesky factorisation first. For large `λ` the last
    /// pivots can cancel to round-off even though the matrix is positive
    /// definite; the system is then solved again by banded LU with partial
    /// pivoting. Only an exactly zero LU pivot or a non-finite solution is
    /// reported as [`BaselineError::SingularSystem`].
    pub fn solve(&self, weights: &[f64], rhs: &[f64]) -> Result<Vec<f64>, BaselineError> {
        debug_assert_eq!(weights.len(), self.len());
        debug_assert_eq!(rhs.len(), self.len());

        match self.solve_cholesky(weights, rhs) {
            Some(x) => Ok(x),
            None => {
                log::debug!("Cholesky pivot lost to round-off, retrying with pivoted LU");
                self.solve_lu(weights, rhs)
            }
        }
    }

    /// `None` when a pivot is not positive at machine precision or the
    /// solution is not finite.
    fn solve_cholesky(&self, weights: &[f64], rhs: &[f64]) -> Option<Vec<f64>> {
        let n = self.len();

        // L = lower-triangular factor, bandwidth 2.
        let mut l0 = vec![0.0; n];
        let mut l1 = vec![0.0; n];
        let mut l2 = vec![0.0; n];

        for i in 0..n {
            let a_ii = weights[i] + self.diag[i];
            let l2i = if i >= 2 { self.sub2[i] / l0[i - 2] } else { 0.0 };
            let l1i = if i >= 1 {
                (self.sub1[i] - l2i * l1[i - 1]) / l0[i - 1]
            } else {
                0.0
            };
            let pivot = a_ii - l1i * l1i - l2i * l2i;
            if !pivot.is_finite() || pivot <= a_ii * f64::EPSILON {
                return None;
            }
            l0[i] = pivot.sqrt();
            l1[i] = l1i;
            l2[i] = l2i;
        }

        // Forward substitution: L·z = rhs
        let mut z = vec![0.0; n];
        for i in 0..n {
            let mut acc = rhs[i];
            if i >= 1 {
                acc -= l1[i] * z[i - 1];
            }
            if i >= 2 {
                acc -= l2[i] * z[i - 2];
            }
            z[i] = acc / l0[i];
        }

        // Back substitution: Lᵀ·x = z
        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let mut acc = z[i];
            if i + 1 < n {
                acc -= l1[i + 1] * x[i + 1];
            }
            if i + 2 < n {
                acc -= l2[i + 2] * x[i + 2];
            }
            x[i] = acc / l0[i];
        }

        x.iter().all(|v| v.is_finite()).then_some(x)
    }

    /// Gaussian elimination with partial pivoting on the band.
    fn solve_lu(&self, weights: &[f64], rhs: &[f64]) -> Result<Vec<f64>, BaselineError> {
        let n = self.len();
        let mut a = BandMatrix::zeros(n);
        for i in 0..n {
            a.set(i, i, weights[i] + self.diag[i]);
            if i >= 1 {
                a.set(i, i - 1, self.sub1[i]);
                a.set(i - 1, i, self.sub1[i]);
            }
            if i >= 2 {
                a.set(i, i - 2, self.sub2[i]);
                a.set(i - 2, i, self.sub2[i]);
            }
        }
        let mut b = rhs.to_vec();

        for k in 0..n {
            let last_row = (k + LU_LOWER).min(n - 1);
            let last_col = (k + LU_UPPER).min(n - 1);

            let mut p = k;
            for i in k + 1..=last_row {
                if a.get(i, k).abs() > a.get(p, k).abs() {
                    p = i;
                }
            }
            if a.get(p, k) == 0.0 {
                return Err(BaselineError::SingularSystem { row: k });
            }
            if p != k {
                for c in k..=last_col {
                    let tmp = a.get(k, c);
                    a.set(k, c, a.get(p, c));
                    a.set(p, c, tmp);
                }
                b.swap(k, p);
            }

            let pivot = a.get(k, k);
            for i in k + 1..=last_row {
                let factor = a.get(i, k) / pivot;
                if factor == 0.0 {
                    continue;
                }
                a.set(i, k, 0.0);
                for c in k + 1..=last_col {
                    a.set(i, c, a.get(i, c) - factor * a.get(k, c));
                }
                b[i] -= factor * b[k];
            }
        }

        let mut x = vec![0.0; n];
        for k in (0..n).rev() {
            let mut acc = b[k];
            for c in k + 1..=(k + LU_UPPER).min(n - 1) {
                acc -= a.get(k, c) * x[c];
            }
            x[k] = acc / a.get(k, k);
        }

        if let Some(row) = x.iter().position(|v| !v.is_finite()) {
            return Err(BaselineError::SingularSystem { row });
        }
        Ok(x)
    }
}

/// Sub-diagonals kept by the LU factor.
const LU_LOWER: usize = 2;
/// Super-diagonals of the LU factor: the original 2 plus 2 of fill from row
/// interchanges.
const LU_UPPER: usize = 4;

/// Column-wise band storage: entry `(i, j)` lives in `cols[j][i + LU_UPPER - j]`
/// for `j - LU_UPPER <= i <= j + LU_LOWER`.
struct BandMatrix {
    cols: Vec<[f64; LU_LOWER + LU_UPPER + 1]>,
}

impl BandMatrix {
    fn zeros(n: usize) -> Self {
        Self {
            cols: vec![[0.0; LU_LOWER + LU_UPPER + 1]; n],
        }
    }

    fn get(&self, i: usize, j: usize) -> f64 {
        self.cols[j][i + LU_UPPER - j]
    }

    fn set(&mut self, i: usize, j: usize, value: f64) {
        self.cols[j][i + LU_UPPER - j] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Dense reference for `λ·DᵀD`.
    fn dense_penalty(n: usize, lambda: f64) -> Vec<Vec<f64>> {
        let mut a = vec![vec![0.0; n]; n];
        for row in 0..n - 2 {
            for p in 0..3 {
                for q in 0..3 {
                    a[row + p][row + q] += lambda * STENCIL[p] * STENCIL[q];
                }
            }
        }
        a
    }

    #[test]
    fn bands_match_dense_product() {
        let n = 7;
        let penalty = SecondDifferencePenalty::new(n, 2.5);
        let dense = dense_penalty(n, 2.5);
        for i in 0..n {
            assert_eq!(penalty.diag[i], dense[i][i]);
            if i >= 1 {
                assert_eq!(penalty.sub1[i], dense[i][i - 1]);
            }
            if i >= 2 {
                assert_eq!(penalty.sub2[i], dense[i][i - 2]);
            }
        }
        // Interior rows carry the familiar [1, -4, 6, -4, 1] stencil.
        assert_eq!(penalty.diag[3], 6.0 * 2.5);
        assert_eq!(penalty.sub1[3], -4.0 * 2.5);
        assert_eq!(penalty.sub2[3], 2.5);
    }

    #[test]
    fn three_point_operator() {
        let penalty = SecondDifferencePenalty::new(3, 1.0);
        assert_eq!(penalty.diag, vec![1.0, 4.0, 1.0]);
        assert_eq!(penalty.sub1, vec![0.0, -2.0, -2.0]);
        assert_eq!(penalty.sub2, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn apply_matches_dense_and_kills_constants() {
        let n = 6;
        let lambda = 3.0;
        let penalty = SecondDifferencePenalty::new(n, lambda);
        let dense = dense_penalty(n, lambda);
        let y = [1.0, 4.0, -2.0, 0.5, 3.0, 7.0];
        let got = penalty.apply(&y);
        for i in 0..n {
            let expected: f64 = (0..n).map(|j| dense[i][j] * y[j]).sum();
            assert!((got[i] - expected).abs() < 1e-12, "row {i}");
        }

        let flat = penalty.apply(&[0.1; 6]);
        assert!(flat.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn solve_recovers_known_solution() {
        let n = 9;
        let penalty = SecondDifferencePenalty::new(n, 10.0);
        let dense = dense_penalty(n, 10.0);
        let weights: Vec<f64> = (0..n).map(|i| 0.5 + i as f64 * 0.1).collect();
        let x_true: Vec<f64> = (0..n).map(|i| (i as f64 * 0.7).sin()).collect();
        let rhs: Vec<f64> = (0..n)
            .map(|i| {
                weights[i] * x_true[i] + (0..n).map(|j| dense[i][j] * x_true[j]).sum::<f64>()
            })
            .collect();

        let x = penalty.solve(&weights, &rhs).unwrap();
        for (a, b) in x.iter().zip(&x_true) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn pivoted_lu_agrees_with_cholesky() {
        let n = 12;
        let penalty = SecondDifferencePenalty::new(n, 50.0);
        let weights: Vec<f64> = (0..n).map(|i| if i % 3 == 0 { 0.0 } else { 1.0 }).collect();
        let rhs: Vec<f64> = (0..n).map(|i| (i as f64 * 0.4).cos()).collect();

        let chol = penalty.solve_cholesky(&weights, &rhs).unwrap();
        let lu = penalty.solve_lu(&weights, &rhs).unwrap();
        for (a, b) in chol.iter().zip(&lu) {
            assert!((a - b).abs() < 1e-9 * (1.0 + a.abs()), "{a} vs {b}");
        }
    }

    #[test]
    fn pivoted_lu_keeps_a_line_through_two_weighted_samples() {
        // Two weighted samples pin a straight line, which the penalty ignores.
        let n = 200;
        let penalty = SecondDifferencePenalty::new(n, 1e5);
        let mut weights = vec![0.0; n];
        weights[20] = 1.0;
        weights[150] = 1.0;
        let line: Vec<f64> = (0..n).map(|i| 0.5 + 0.002 * i as f64).collect();
        let rhs: Vec<f64> = weights.iter().zip(&line).map(|(w, y)| w * y).collect();

        let x = penalty.solve_lu(&weights, &rhs).unwrap();
        for (a, b) in x.iter().zip(&line) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }

    #[test]
    fn zero_weights_are_singular() {
        let penalty = SecondDifferencePenalty::new(5, 1.0);
        assert!(penalty.solve_cholesky(&[0.0; 5], &[0.0; 5]).is_none());
        let err = penalty.solve(&[0.0; 5], &[0.0; 5]).unwrap_err();
        assert_eq!(err, BaselineError::SingularSystem { row: 3 });
    }
}
