//! Write the sample precision/recall CSV and plot it both ways.
//!
//! Run:
//! ```bash
//! cargo run --example demo_pr_curve -- /tmp/pr
//! ```

use std::path::PathBuf;

use pointfix::pr_curve::{load_precision_recall, plot_data, plot_data_buggy, write_sample_csv};
use pointfix::Result;

fn main() -> Result<()> {
    let dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("pointfix-out"));

    let csv = write_sample_csv(dir.join("data_file.csv"))?;
    let curve = load_precision_recall(&csv)?;
    for (p, r) in curve.precision.iter().zip(&curve.recall).take(4) {
        println!("precision={p:.3} recall={r:.3}");
    }

    let fixed = plot_data(&csv, dir.join("pr_curve_fixed.svg"))?;
    let buggy = plot_data_buggy(&csv, dir.join("pr_curve_buggy.svg"))?;
    println!("fixed: {}\nbuggy: {}", fixed.display(), buggy.display());
    Ok(())
}
