//! Coordinate-pair swapper for `[x1, y1, x2, y2, class_id]` rows (exercise 2).
//!
//! The defect: a column-by-column assignment through live views that reads column 1 twice and
//! reads column 2 after overwriting it, so `x1` and `x2` are lost. It also mutates the caller's
//! matrix.
//!
//! The fix returns a fresh matrix with `x1 <-> y1` and `x2 <-> y2`. Column 4 (the class id) is
//! never touched, and the operation is an involution.

use ndarray::{Array2, ArrayView2};

use crate::{Error, Result};

/// Number of columns in a coordinate record.
pub const RECORD_WIDTH: usize = 5;

/// Check that `coords` is `N × 5`.
pub fn validate_coords<A>(coords: &ArrayView2<A>) -> Result<()> {
    if coords.ncols() != RECORD_WIDTH {
        return Err(Error::Shape(format!(
            "coords must have shape (N, {RECORD_WIDTH}), got ({}, {})",
            coords.nrows(),
            coords.ncols()
        )));
    }
    Ok(())
}

/// Fixed variant: swap columns 0/1 and 2/3 into a new matrix.
pub fn swap<A: Clone>(coords: &ArrayView2<A>) -> Result<Array2<A>> {
    validate_coords(coords)?;
    let mut out = coords.to_owned();
    out.column_mut(0).assign(&coords.column(1));
    out.column_mut(1).assign(&coords.column(0));
    out.column_mut(2).assign(&coords.column(3));
    out.column_mut(3).assign(&coords.column(2));
    Ok(out)
}

/// Buggy variant, in place.
///
/// Each right-hand column is a live view, read at the moment its assignment runs, so a write is
/// visible to every later read. Column 1 is read where column 0 was meant, and column 3 is
/// assigned from column 2 after column 2 was already overwritten: the result is
/// `[y1, y1, y2, y2, class_id]`.
pub fn swap_buggy<A: Clone>(coords: &mut Array2<A>) -> Result<()> {
    validate_coords(&coords.view())?;
    for (dst, src) in [(0, 1), (1, 1), (2, 3), (3, 2)] {
        let column = coords.column(src).to_owned();
        coords.column_mut(dst).assign(&column);
    }
    Ok(())
}

/// The matrix used by the exercise.
pub fn sample_coords() -> Array2<i64> {
    ndarray::array![
        [10, 5, 15, 6, 0],
        [11, 3, 13, 6, 0],
        [5, 3, 13, 6, 1],
        [4, 4, 13, 6, 1],
        [6, 5, 13, 16, 1],
    ]
}
