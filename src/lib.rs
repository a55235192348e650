//! # pointfix
//!
//! Four "find-the-bug" exercises, each pairing a buggy function with its point fix.
//!
//! This crate is intentionally small:
//!
//! - every exercise keeps **both** variants, so the defect stays visible next to the fix,
//! - exercises share nothing at runtime; the [`runner`] invokes them one after another,
//! - the GAN trainer (exercise 4) is the only part that needs a training backend, and it is
//!   **feature-gated** behind `burn` (on by default).
//!
//! ## Public invariants (must not change)
//!
//! - **Determinism is explicit**: rank lookups impose a total order before indexing; anything
//!   random takes a `seed`.
//! - **No silent coercion**: loaders either parse a value or return [`Error::Parse`]. The lenient
//!   variants exist only as the buggy half of an exercise and say so in their names.
//! - **Actual sizes over configured sizes**: tensors shaped "per batch" use the batch received.
//!
//! ## Module map
//!
//! - `fruits`: lookup-by-rank over an unordered set (exercise 1)
//! - `coords`: `[x1, y1, x2, y2, class_id]` column swapper (exercise 2)
//! - `pr_curve`: precision/recall CSV loader and SVG plotter (exercise 3)
//! - `batches`: in-memory image sets and seeded mini-batch iteration
//! - `mnist`: IDX parsing and dataset download with mirror fallback
//! - `gan`: generator/discriminator training loop (exercise 4, `burn` feature)
//! - `runner`: exercise registry, isolated execution, CLI arguments

pub mod batches;
pub mod coords;
pub mod fruits;
pub mod mnist;
pub mod pr_curve;
pub mod runner;

#[cfg(feature = "burn")]
pub mod gan;

use std::path::PathBuf;

/// pointfix error variants.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("id {id} is out of range for a collection of {len}")]
    OutOfRange { id: i64, len: usize },
    #[error("shape mismatch: {0}")]
    Shape(String),
    #[error("domain error: {0}")]
    Domain(&'static str),
    #[error("line {line}: column `{column}` is not a number: {value:?}")]
    Parse {
        line: usize,
        column: &'static str,
        value: String,
    },
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("download failed: {0}")]
    Download(String),
    #[error("plot error: {0}")]
    Plot(String),
    #[error("training failed at epoch {epoch}, batch {batch}: {source}")]
    Training {
        epoch: usize,
        batch: usize,
        #[source]
        source: Box<Error>,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Attach the training position to an error raised inside a step.
    pub fn at(self, epoch: usize, batch: usize) -> Self {
        Error::Training {
            epoch,
            batch,
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
