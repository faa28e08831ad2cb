pub mod bidiagonal;
pub mod dense;
pub mod householder;
mod utils;

pub use bidiagonal::{decompose_batch, BidiagonalRow};
pub use dense::DenseMatrix;
pub use single_utilities::traits::FloatOpsTS;
pub use single_utilities::types::Direction;
