//! # Householder reflector kernels
//!
//! Stateless routines used to build and apply Householder reflectors
//! `Q = I - γ·u·uᵀ`. Every routine works on explicit index ranges of a slice
//! and keeps no state between calls; the decompositions own the buffers and
//! pass them in.
//!
//! Vectors are scaled by their largest magnitude before the norm is taken.
//! This keeps `Σ v²` finite for entries near the overflow threshold and
//! non-zero for entries near the underflow threshold.

use std::ops::Range;

use ndarray::Array2;

use crate::dense::RowMajorMut;
use single_utilities::traits::FloatOpsTS;
use single_utilities::types::Direction;

/// Largest absolute value in `vector[offset..offset + count]`, or zero when
/// the range is empty.
pub fn find_max<T: FloatOpsTS>(vector: &[T], offset: usize, count: usize) -> T {
    vector[offset..offset + count]
        .iter()
        .fold(T::zero(), |max, &v| num_traits::Float::max(max, num_traits::Float::abs(v)))
}

/// Divides `vector[offset + start..offset + end]` by `max` and returns the
/// signed norm of the scaled range, `tau = sign(v[start]) * ||v||`.
///
/// `max` must be non-zero, normally the value returned by [`find_max`].
pub fn compute_tau_and_divide<T: FloatOpsTS>(
    start: usize,
    end: usize,
    vector: &mut [T],
    offset: usize,
    max: T,
) -> T {
    let range = &mut vector[offset + start..offset + end];

    let mut tau = T::zero();
    for v in range.iter_mut() {
        *v = *v / max;
        tau = tau + *v * *v;
    }
    tau = tau.sqrt();

    match range.first() {
        Some(&lead) if lead < T::zero() => -tau,
        _ => tau,
    }
}

/// Divides `vector[start..end]` by `divisor` in place.
pub fn divide_sub_vector<T: FloatOpsTS>(start: usize, end: usize, vector: &mut [T], divisor: T) {
    for v in &mut vector[start..end] {
        *v = *v / divisor;
    }
}

/// Divides `u[start..end]` by `nu` and writes the result down column `col` of
/// a row-major `storage` with `cols` columns.
pub fn divide_elements_col<T: FloatOpsTS>(
    start: usize,
    end: usize,
    cols: usize,
    u: &mut [T],
    storage: &mut [T],
    col: usize,
    nu: T,
) {
    for i in start..end {
        let v = u[i] / nu;
        u[i] = v;
        storage[i * cols + col] = v;
    }
}

/// Divides `storage[row_offset + start..row_offset + end]` by `nu` in place and
/// copies the result into `u[start..end]`.
pub fn divide_elements_row<T: FloatOpsTS>(
    start: usize,
    end: usize,
    u: &mut [T],
    storage: &mut [T],
    row_offset: usize,
    nu: T,
) {
    let row = &mut storage[row_offset + start..row_offset + end];
    for (dst, v) in u[start..end].iter_mut().zip(row.iter_mut()) {
        *v = *v / nu;
        *dst = *v;
    }
}

/// Applies `Q = I - γ·u·uᵀ` to the block `rows × cols` of `matrix`.
///
/// With [`Direction::ROW`] the block is replaced by `Q·A` and `u` is indexed by
/// row; with [`Direction::COLUMN`] it is replaced by `A·Q` and `u` is indexed by
/// column.
pub fn rank_one_update<T: FloatOpsTS>(
    matrix: &mut Array2<T>,
    u: &[T],
    gamma: T,
    rows: Range<usize>,
    cols: Range<usize>,
    direction: &Direction,
) -> anyhow::Result<()> {
    let mut scratch = vec![T::zero(); matrix.ncols()];
    let mut raw = RowMajorMut::new(matrix)?;
    rank_one_update_raw(&mut raw, u, gamma, rows, cols, direction, &mut scratch);
    Ok(())
}

/// Hot-loop form of [`rank_one_update`] on the raw row-major storage.
///
/// `scratch` must hold at least `cols.end` elements when `direction` is
/// [`Direction::ROW`]; it is not touched for [`Direction::COLUMN`].
pub(crate) fn rank_one_update_raw<T: FloatOpsTS>(
    matrix: &mut RowMajorMut<'_, T>,
    u: &[T],
    gamma: T,
    rows: Range<usize>,
    cols: Range<usize>,
    direction: &Direction,
    scratch: &mut [T],
) {
    if rows.is_empty() || cols.is_empty() {
        return;
    }
    let n = matrix.cols();
    let a = matrix.data_mut();

    match direction {
        Direction::ROW => {
            // scratch[j] = γ · Σ_i u[i]·A[i, j], accumulated row by row so the
            // inner loop stays contiguous.
            let w = &mut scratch[cols.clone()];
            let first = rows.start;
            for (s, &x) in w.iter_mut().zip(&a[first * n + cols.start..first * n + cols.end]) {
                *s = u[first] * x;
            }
            for i in rows.start + 1..rows.end {
                let ui = u[i];
                for (s, &x) in w.iter_mut().zip(&a[i * n + cols.start..i * n + cols.end]) {
                    *s = *s + ui * x;
                }
            }
            for s in w.iter_mut() {
                *s = *s * gamma;
            }

            for i in rows {
                let ui = u[i];
                for (x, &s) in a[i * n + cols.start..i * n + cols.end].iter_mut().zip(w.iter()) {
                    *x = *x - ui * s;
                }
            }
        }
        Direction::COLUMN => {
            let uc = &u[cols.clone()];
            for i in rows {
                let row = &mut a[i * n + cols.start..i * n + cols.end];
                let sum = row
                    .iter()
                    .zip(uc)
                    .fold(T::zero(), |acc, (&x, &uj)| acc + x * uj);
                let alpha = gamma * sum;
                for (x, &uj) in row.iter_mut().zip(uc) {
                    *x = *x - alpha * uj;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::{array, Array1};

    fn reflector(u: &Array1<f64>, gamma: f64) -> Array2<f64> {
        let n = u.len();
        let mut q = Array2::eye(n);
        for i in 0..n {
            for j in 0..n {
                q[[i, j]] -= gamma * u[i] * u[j];
            }
        }
        q
    }

    #[test]
    fn test_find_max() {
        let v = [1.0f64, -7.5, 3.0, 2.0];
        assert_eq!(find_max(&v, 0, 4), 7.5);
        assert_eq!(find_max(&v, 2, 2), 3.0);
        assert_eq!(find_max(&v, 1, 0), 0.0);
        assert_eq!(find_max::<f64>(&[], 0, 0), 0.0);
    }

    #[test]
    fn test_compute_tau_and_divide() {
        let mut v = [9.0f64, 3.0, 4.0];
        let tau = compute_tau_and_divide(1, 3, &mut v, 0, 4.0);
        assert_relative_eq!(tau, 1.25);
        assert_eq!(v, [9.0, 0.75, 1.0]);

        let mut v = [0.0f64, 0.0, -3.0, 4.0];
        let tau = compute_tau_and_divide(0, 2, &mut v, 2, 4.0);
        assert_relative_eq!(tau, -1.25);
        assert_eq!(v, [0.0, 0.0, -0.75, 1.0]);
    }

    #[test]
    fn test_scaling_avoids_overflow_and_underflow() {
        let mut big = [1e300f64, -1e300, 1e300];
        let max = find_max(&big, 0, 3);
        let tau = compute_tau_and_divide(0, 3, &mut big, 0, max);
        assert!(tau.is_finite());
        assert_relative_eq!(tau * max, 3.0f64.sqrt() * 1e300, max_relative = 1e-12);

        let mut tiny = [3e-310f64, 4e-310];
        let max = find_max(&tiny, 0, 2);
        let tau = compute_tau_and_divide(0, 2, &mut tiny, 0, max);
        assert!(tau > 0.0);
        assert_relative_eq!(tau * max, 5e-310, max_relative = 1e-6);
    }

    #[test]
    fn test_divide_variants() {
        let mut v = [2.0f64, 4.0, 6.0];
        divide_sub_vector(1, 3, &mut v, 2.0);
        assert_eq!(v, [2.0, 2.0, 3.0]);

        // 3x2 row-major storage, write into column 1 from row 1
        let mut storage = [0.0; 6];
        let mut u = [10.0, 4.0, 8.0];
        divide_elements_col(1, 3, 2, &mut u, &mut storage, 1, 4.0);
        assert_eq!(u, [10.0, 1.0, 2.0]);
        assert_eq!(storage, [0.0, 0.0, 0.0, 1.0, 0.0, 2.0]);

        // second row of a 2x4 matrix, columns 2..4
        let mut storage = [0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 6.0, 9.0];
        let mut u = [0.0; 4];
        divide_elements_row(2, 4, &mut u, &mut storage, 4, 3.0);
        assert_eq!(storage, [0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 2.0, 3.0]);
        assert_eq!(u, [0.0, 0.0, 2.0, 3.0]);
    }

    #[test]
    fn test_reflector_annihilates_tail() {
        let mut u = [3.0f64, 4.0];
        let max = find_max(&u, 0, 2);
        let tau = compute_tau_and_divide(0, 2, &mut u, 0, max);
        let nu = u[0] + tau;
        divide_sub_vector(1, 2, &mut u, nu);
        u[0] = 1.0;
        let gamma = nu / tau;

        let mut x = array![[3.0], [4.0]];
        rank_one_update(&mut x, &u, gamma, 0..2, 0..1, &Direction::ROW).unwrap();
        assert_abs_diff_eq!(x[[0, 0]], -tau * max, epsilon = 1e-12);
        assert_abs_diff_eq!(x[[1, 0]], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rank_one_update_left() {
        let a = array![
            [1.0, 2.0, 3.0, 4.0],
            [5.0, 6.0, 7.0, 8.0],
            [9.0, 10.0, 11.0, 12.0]
        ];
        let u = array![0.0, 1.0, 0.5];
        let gamma = 1.6;

        let mut updated = a.clone();
        rank_one_update(&mut updated, u.as_slice().unwrap(), gamma, 1..3, 1..4, &Direction::ROW)
            .unwrap();

        let expected = reflector(&u, gamma).dot(&a);
        for i in 0..3 {
            for j in 0..4 {
                let want = if i >= 1 && j >= 1 { expected[[i, j]] } else { a[[i, j]] };
                assert_abs_diff_eq!(updated[[i, j]], want, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_rank_one_update_right() {
        let a = array![
            [1.0, 2.0, 3.0],
            [4.0, 5.0, 6.0],
            [7.0, 8.0, 9.0],
            [1.0, -1.0, 2.0]
        ];
        let u = array![0.0, 1.0, -0.25];
        let gamma = 1.2;

        let mut updated = a.clone();
        rank_one_update(&mut updated, u.as_slice().unwrap(), gamma, 2..4, 1..3, &Direction::COLUMN)
            .unwrap();

        let expected = a.dot(&reflector(&u, gamma));
        for i in 0..4 {
            for j in 0..3 {
                let want = if i >= 2 && j >= 1 { expected[[i, j]] } else { a[[i, j]] };
                assert_abs_diff_eq!(updated[[i, j]], want, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_rank_one_update_empty_block_is_noop() {
        let a = array![[1.0, 2.0], [3.0, 4.0]];
        let mut updated = a.clone();
        rank_one_update(&mut updated, &[1.0, 1.0], 2.0, 2..2, 0..2, &Direction::ROW).unwrap();
        rank_one_update(&mut updated, &[1.0, 1.0], 2.0, 0..2, 1..1, &Direction::COLUMN).unwrap();
        assert_eq!(updated, a);
    }
}
