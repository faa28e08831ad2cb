use anyhow::{anyhow, bail};
use log::{debug, trace, warn};
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;

use crate::dense::{DenseMatrix, RowMajorMut};
use crate::householder::{
    compute_tau_and_divide, divide_elements_col, divide_elements_row, find_max,
    rank_one_update_raw,
};
use crate::utils::ZeroVec;
use single_utilities::traits::FloatOpsTS;
use single_utilities::types::Direction;

/// Householder bidiagonalization `A = U·B·Vᵀ` of a dense `m×n` matrix, with
/// `B` upper bidiagonal. Row reflectors (U side) and column reflectors (V side)
/// are computed alternately, one pair per step.
///
/// The result is kept packed in a single `m×n` matrix:
/// - the diagonal and first super-diagonal hold `B`,
/// - below the diagonal, column `k` holds the tail of the `k`-th row
///   reflector, whose leading `1` at row `k` is implicit,
/// - right of the super-diagonal, row `k` holds the tail of the `k`-th column
///   reflector, whose leading `1` at column `k + 1` is implicit.
///
/// Reflector `k` is `I - γ·u·uᵀ` with `γ` taken from [`gammas_u`] or
/// [`gammas_v`]. A zero gamma means the step needed no reflector; the
/// corresponding packed tail is zero. Explicit `U` and `V` are never formed.
///
/// Works best on wide or square matrices.
///
/// [`gammas_u`]: BidiagonalRow::gammas_u
/// [`gammas_v`]: BidiagonalRow::gammas_v
pub struct BidiagonalRow<T: FloatOpsTS = f64> {
    ubv: Option<Array2<T>>,
    gammas_u: Vec<T>,
    gammas_v: Vec<T>,
    // copy of the current reflector, taken out of the matrix
    u: Vec<T>,
    // rank-1 update accumulator
    b: Vec<T>,
}

impl<T: FloatOpsTS> BidiagonalRow<T> {
    pub fn new() -> Self {
        BidiagonalRow {
            ubv: None,
            gammas_u: Vec::new(),
            gammas_v: Vec::new(),
            u: Vec::new(),
            b: Vec::new(),
        }
    }

    /// Pre-sizes the scratch buffers for inputs whose larger dimension is at
    /// most `max_dim`.
    pub fn with_capacity(max_dim: usize) -> Self {
        BidiagonalRow {
            ubv: None,
            gammas_u: Vec::with_capacity(max_dim),
            gammas_v: Vec::with_capacity(max_dim),
            u: Vec::with_capacity(max_dim + 1),
            b: Vec::with_capacity(max_dim + 1),
        }
    }

    /// Decomposes a copy of `a`. The input is not modified.
    ///
    /// Any earlier result held by this instance is discarded. Empty matrices
    /// decompose trivially. Non-finite entries are not rejected and propagate
    /// into the result.
    pub fn decompose(&mut self, a: &impl DenseMatrix<T>) -> anyhow::Result<()> {
        self.ubv = None;

        let mut ubv = a.to_row_major();
        let (m, n) = ubv.dim();
        let min = m.min(n);
        let max = m.max(n);
        debug!("Bidiagonalizing {}x{} matrix in {} steps", m, n, min);

        self.u.zero_len(max + 1);
        self.b.zero_len(max + 1);
        self.gammas_u.zero_len(m);
        self.gammas_v.zero_len(n);

        {
            let mut raw = RowMajorMut::new(&mut ubv)?;
            for k in 0..min {
                self.compute_u(&mut raw, k);
                self.compute_v(&mut raw, k);
            }
        }

        if ubv.iter().any(|v| !num_traits::Float::is_finite(*v)) {
            warn!(
                "Input {}x{} matrix contains non-finite values; they propagated into the result",
                m, n
            );
        }

        self.ubv = Some(ubv);
        Ok(())
    }

    fn compute_u(&mut self, ubv: &mut RowMajorMut<'_, T>, k: usize) {
        let (m, n) = (ubv.rows(), ubv.cols());
        let u = &mut self.u;

        // Copy the column out of the matrix so the update below reads it
        // contiguously. The largest magnitude is used to scale the column.
        let data = ubv.data();
        let mut max = T::zero();
        let mut nonzero_tail = false;
        for i in k..m {
            let val = data[i * n + k];
            u[i] = val;
            if num_traits::Float::abs(val) > max {
                max = num_traits::Float::abs(val);
            }
            if i > k && val != T::zero() {
                nonzero_tail = true;
            }
        }

        if !nonzero_tail {
            self.gammas_u[k] = T::zero();
            return;
        }

        let tau = compute_tau_and_divide(k, m, u, 0, max);

        // write the reflector below the diagonal while dividing by nu
        let nu = u[k] + tau;
        divide_elements_col(k + 1, m, n, u, ubv.data_mut(), k, nu);
        u[k] = T::one();

        let gamma = nu / tau;
        self.gammas_u[k] = gamma;

        rank_one_update_raw(ubv, u, gamma, k..m, k + 1..n, &Direction::ROW, &mut self.b);

        ubv.data_mut()[k * n + k] = -tau * max;
        trace!("row step {}: gamma = {:?}", k, gamma.to_f64());
    }

    fn compute_v(&mut self, ubv: &mut RowMajorMut<'_, T>, k: usize) {
        let (m, n) = (ubv.rows(), ubv.cols());
        if k + 1 >= n {
            return;
        }
        let row = k * n;

        let data = ubv.data_mut();
        let max = find_max(data, row + k + 1, n - k - 1);
        let nonzero_tail = data[row + k + 2..row + n].iter().any(|&v| v != T::zero());

        if !nonzero_tail {
            self.gammas_v[k] = T::zero();
            return;
        }

        let tau = compute_tau_and_divide(k + 1, n, data, row, max);

        // the reflector stays in the row, a copy goes to u for the update
        let nu = data[row + k + 1] + tau;
        divide_elements_row(k + 2, n, &mut self.u, data, row, nu);
        self.u[k + 1] = T::one();

        let gamma = nu / tau;
        self.gammas_v[k] = gamma;

        rank_one_update_raw(
            ubv,
            &self.u,
            gamma,
            k + 1..m,
            k + 1..n,
            &Direction::COLUMN,
            &mut self.b,
        );

        ubv.data_mut()[row + k + 1] = -tau * max;
        trace!("column step {}: gamma = {:?}", k, gamma.to_f64());
    }

    /// The packed `m×n` result, or `None` before the first decomposition.
    pub fn ubv(&self) -> Option<&Array2<T>> {
        self.ubv.as_ref()
    }

    pub fn dim(&self) -> Option<(usize, usize)> {
        self.ubv.as_ref().map(|ubv| ubv.dim())
    }

    /// Gammas of the row (U side) reflectors, one slot per row.
    pub fn gammas_u(&self) -> &[T] {
        &self.gammas_u
    }

    /// Gammas of the column (V side) reflectors, one slot per column.
    pub fn gammas_v(&self) -> &[T] {
        &self.gammas_v
    }

    pub fn gammas_u_mut(&mut self) -> &mut [T] {
        &mut self.gammas_u
    }

    pub fn gammas_v_mut(&mut self) -> &mut [T] {
        &mut self.gammas_v
    }

    /// Copies the diagonal of `B` into `diag` and its super-diagonal into
    /// `off`.
    ///
    /// `diag` needs `min(m, n)` slots and `off` needs `min(m, n - 1)`: a wide
    /// matrix has one super-diagonal value per row. Nothing is allocated;
    /// undersized buffers are an error.
    pub fn diagonal_and_off_diagonal(&self, diag: &mut [T], off: &mut [T]) -> anyhow::Result<()> {
        let ubv = self
            .ubv
            .as_ref()
            .ok_or_else(|| anyhow!("Matrix must be decomposed first"))?;
        let (m, n) = ubv.dim();
        let n_diag = m.min(n);
        let n_off = m.min(n.saturating_sub(1));

        if diag.len() < n_diag {
            bail!(
                "Diagonal buffer too small: {} slots for {} values",
                diag.len(),
                n_diag
            );
        }
        if off.len() < n_off {
            bail!(
                "Off-diagonal buffer too small: {} slots for {} values",
                off.len(),
                n_off
            );
        }

        for (i, d) in diag.iter_mut().take(n_diag).enumerate() {
            *d = ubv[[i, i]];
        }
        for (i, o) in off.iter_mut().take(n_off).enumerate() {
            *o = ubv[[i, i + 1]];
        }
        Ok(())
    }

    /// Dense copy of `B`.
    ///
    /// With `compact` the result is `min(m,n)` rows by `min(m,n)` columns, plus
    /// one column for wide matrices so the last super-diagonal value fits.
    /// Otherwise it has the shape of the input.
    pub fn b(&self, compact: bool) -> anyhow::Result<Array2<T>> {
        let (m, n) = self
            .dim()
            .ok_or_else(|| anyhow!("Matrix must be decomposed first"))?;
        let min = m.min(n);
        let shape = if compact {
            (min, if n > m { min + 1 } else { min })
        } else {
            (m, n)
        };

        let mut diag = vec![T::zero(); min];
        let mut off = vec![T::zero(); m.min(n.saturating_sub(1))];
        self.diagonal_and_off_diagonal(&mut diag, &mut off)?;

        let mut b = Array2::zeros(shape);
        for (i, &d) in diag.iter().enumerate() {
            b[[i, i]] = d;
        }
        for (i, &o) in off.iter().enumerate() {
            b[[i, i + 1]] = o;
        }
        Ok(b)
    }
}

impl<T: FloatOpsTS> Default for BidiagonalRow<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Decomposes independent matrices in parallel, one [`BidiagonalRow`] per
/// input. Results come back in input order.
pub fn decompose_batch<T: FloatOpsTS + Send + Sync>(
    inputs: &[ArrayView2<'_, T>],
) -> anyhow::Result<Vec<BidiagonalRow<T>>> {
    debug!("Bidiagonalizing batch of {} matrices", inputs.len());
    inputs
        .par_iter()
        .map(|a| {
            let mut decomposition = BidiagonalRow::new();
            decomposition.decompose(a)?;
            Ok(decomposition)
        })
        .collect()
}
