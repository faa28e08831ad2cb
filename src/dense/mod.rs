use anyhow::anyhow;
use nalgebra::DMatrix;
use ndarray::{Array2, ArrayView2};

use nshare::IntoNdarray2;
use single_utilities::traits::FloatOpsTS;

/// Dense matrix accepted as input by the decompositions.
///
/// Implementors only need to report their shape and hand out an independent
/// copy in standard (row-major, contiguous) layout. The copy is owned by the
/// decomposition, so the input is never mutated.
pub trait DenseMatrix<T: FloatOpsTS> {
    fn row_count(&self) -> usize;

    fn column_count(&self) -> usize;

    fn to_row_major(&self) -> Array2<T>;
}

impl<T: FloatOpsTS> DenseMatrix<T> for Array2<T> {
    fn row_count(&self) -> usize {
        self.nrows()
    }

    fn column_count(&self) -> usize {
        self.ncols()
    }

    fn to_row_major(&self) -> Array2<T> {
        self.as_standard_layout().into_owned()
    }
}

impl<T: FloatOpsTS> DenseMatrix<T> for ArrayView2<'_, T> {
    fn row_count(&self) -> usize {
        self.nrows()
    }

    fn column_count(&self) -> usize {
        self.ncols()
    }

    fn to_row_major(&self) -> Array2<T> {
        self.as_standard_layout().into_owned()
    }
}

// nalgebra stores column-major; the ndarray copy is re-laid out row-major.
impl<T: FloatOpsTS + nalgebra::Scalar> DenseMatrix<T> for DMatrix<T> {
    fn row_count(&self) -> usize {
        self.nrows()
    }

    fn column_count(&self) -> usize {
        self.ncols()
    }

    fn to_row_major(&self) -> Array2<T> {
        self.clone()
            .into_ndarray2()
            .as_standard_layout()
            .into_owned()
    }
}

/// Raw row-major view over the working matrix of a decomposition.
///
/// Element `(row, col)` lives at `row * cols + col`. Only the kernels in this
/// crate get to see the backing slice.
pub(crate) struct RowMajorMut<'a, T> {
    data: &'a mut [T],
    rows: usize,
    cols: usize,
}

impl<'a, T> RowMajorMut<'a, T> {
    pub(crate) fn new(matrix: &'a mut Array2<T>) -> anyhow::Result<Self> {
        let (rows, cols) = matrix.dim();
        let data = matrix
            .as_slice_mut()
            .ok_or_else(|| anyhow!("Working matrix is not in standard layout"))?;
        Ok(RowMajorMut { data, rows, cols })
    }

    pub(crate) fn rows(&self) -> usize {
        self.rows
    }

    pub(crate) fn cols(&self) -> usize {
        self.cols
    }

    pub(crate) fn data(&self) -> &[T] {
        &*self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [T] {
        &mut *self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_transposed_view_is_copied_row_major() {
        let a = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let t = a.t();
        assert_eq!(t.row_count(), 3);
        assert_eq!(t.column_count(), 2);

        let mut copy = t.to_row_major();
        let raw = RowMajorMut::new(&mut copy).unwrap();
        assert_eq!(raw.rows(), 3);
        assert_eq!(raw.cols(), 2);
        assert_eq!(raw.data(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_nalgebra_input() {
        let m = DMatrix::from_row_slice(2, 3, &[1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(m.row_count(), 2);
        assert_eq!(m.column_count(), 3);
        assert_eq!(m.to_row_major(), array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);

        let tall = DMatrix::from_column_slice(3, 2, &[1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut copy = tall.to_row_major();
        assert!(copy.is_standard_layout());
        let raw = RowMajorMut::new(&mut copy).unwrap();
        assert_eq!(raw.data(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_copy_does_not_alias_input() {
        let a = array![[1.0, 2.0], [3.0, 4.0]];
        let mut copy = a.to_row_major();
        RowMajorMut::new(&mut copy).unwrap().data_mut()[0] = 10.0;
        assert_eq!(a[[0, 0]], 1.0);
        assert_eq!(copy[[0, 0]], 10.0);
    }

    #[test]
    fn test_empty_matrix_has_raw_view() {
        let mut empty = Array2::<f64>::zeros((0, 3));
        let raw = RowMajorMut::new(&mut empty).unwrap();
        assert_eq!(raw.rows(), 0);
        assert_eq!(raw.cols(), 3);
        assert!(raw.data().is_empty());
    }
}
