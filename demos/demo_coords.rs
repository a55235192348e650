//! Swap `[x1, y1, x2, y2, class_id]` columns and show both variants.
//!
//! Run:
//! ```bash
//! cargo run --example demo_coords
//! ```

use ndarray::array;
use pointfix::coords::{swap, swap_buggy};
use pointfix::Result;

fn main() -> Result<()> {
    let coords = array![[10, 20, 30, 40, 1], [5, 8, 12, 16, 2]];
    println!("Original:\n{coords}");

    println!("Swapped:\n{}", swap(&coords.view())?);

    let mut buggy = coords.clone();
    swap_buggy(&mut buggy)?;
    println!("Swapped (buggy):\n{buggy}");

    Ok(())
}
