//! Exercise registry and runner.
//!
//! Each exercise runs the buggy variant first (its failure is expected and only logged), then the
//! fixed variant, which must succeed. [`run_all`] runs exercises one after another and isolates
//! them: an `Err` or a panic in one is recorded and the next one still runs.

use std::fmt;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

#[cfg(feature = "burn")]
use crate::batches::ImageSet;
use crate::mnist::{self, MnistSources};
use crate::{coords, fruits, pr_curve, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exercise {
    Fruits,
    Coords,
    PrCurve,
    Gan,
}

impl Exercise {
    pub const ALL: [Exercise; 4] = [
        Exercise::Fruits,
        Exercise::Coords,
        Exercise::PrCurve,
        Exercise::Gan,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Exercise::Fruits => "exercise1_fruits",
            Exercise::Coords => "exercise2_coords",
            Exercise::PrCurve => "exercise3_pr_curve",
            Exercise::Gan => "exercise4_gan",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Exercise::Fruits => "id_to_fruit: indexing an unordered set",
            Exercise::Coords => "swap: coordinate columns",
            Exercise::PrCurve => "plot_data: string data and swapped axes",
            Exercise::Gan => "train_gan: hardcoded batch size",
        }
    }

    /// `None` when the exercise can run in this build, otherwise why not.
    pub fn unavailable(self) -> Option<&'static str> {
        match self {
            Exercise::Gan if !cfg!(feature = "burn") => Some("built without the `burn` feature"),
            _ => None,
        }
    }

    pub fn run(self, cfg: &RunnerConfig) -> Result<()> {
        info!(exercise = self.id(), "{}", self.title());
        match self {
            Exercise::Fruits => run_fruits(),
            Exercise::Coords => run_coords(),
            Exercise::PrCurve => run_pr_curve(cfg),
            Exercise::Gan => run_gan(cfg),
        }
    }
}

impl fmt::Display for Exercise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Exercise {
    type Err = Error;

    /// Accepts the full id (`exercise2_coords`), the short name (`coords`) or the number (`2`).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Exercise::ALL
            .into_iter()
            .find(|ex| {
                let id = ex.id();
                let (num, name) = id
                    .trim_start_matches("exercise")
                    .split_once('_')
                    .unwrap_or(("", id));
                s == id || s == name || s == num
            })
            .ok_or(Error::Domain("unknown exercise"))
    }
}

/// Where exercise 4 gets its images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GanData {
    /// MNIST training set, downloaded into the work directory if not cached.
    Mnist,
    /// Seeded random images; no network, small networks.
    Synthetic,
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Generated CSV files, plots, and the dataset cache go here.
    pub work_dir: PathBuf,
    pub gan_data: GanData,
    /// Truncate the GAN training set to this many images.
    pub gan_limit: Option<usize>,
    /// Image count for [`GanData::Synthetic`].
    pub synthetic_samples: usize,
    pub gan_epochs: usize,
    pub gan_batch_size: usize,
    pub mnist_sources: MnistSources,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("pointfix-out"),
            gan_data: GanData::Mnist,
            gan_limit: None,
            synthetic_samples: 1_000,
            gan_epochs: 1,
            gan_batch_size: 64,
            mnist_sources: MnistSources::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed(String),
    Skipped(&'static str),
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Passed => f.write_str("PASSED"),
            Outcome::Failed(why) => write!(f, "FAILED ({why})"),
            Outcome::Skipped(why) => write!(f, "SKIPPED ({why})"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub results: Vec<(Exercise, Outcome)>,
}

impl RunSummary {
    /// No exercise failed (skipped ones do not count as failures).
    pub fn all_passed(&self) -> bool {
        !self.results.iter().any(|(_, o)| o.is_failure())
    }

    pub fn outcome(&self, ex: Exercise) -> Option<&Outcome> {
        self.results.iter().find(|(e, _)| *e == ex).map(|(_, o)| o)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SUMMARY")?;
        for (ex, outcome) in &self.results {
            writeln!(f, "  {ex}: {outcome}")?;
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

/// Run one unit, turning both `Err` and panics into [`Outcome::Failed`].
pub fn run_isolated(f: impl FnOnce() -> Result<()>) -> Outcome {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Outcome::Passed,
        Ok(Err(e)) => Outcome::Failed(e.to_string()),
        Err(payload) => Outcome::Failed(format!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

/// Run `exercises` in order; failures never stop the run.
pub fn run_all(cfg: &RunnerConfig, exercises: &[Exercise]) -> RunSummary {
    let mut summary = RunSummary::default();
    for &ex in exercises {
        let outcome = match ex.unavailable() {
            Some(why) => {
                warn!(exercise = ex.id(), "skipped: {why}");
                Outcome::Skipped(why)
            }
            None => run_isolated(|| ex.run(cfg)),
        };
        match &outcome {
            Outcome::Passed => info!(exercise = ex.id(), "completed"),
            Outcome::Failed(why) => error!(exercise = ex.id(), "failed: {why}"),
            Outcome::Skipped(_) => {}
        }
        summary.results.push((ex, outcome));
    }
    summary
}

fn run_fruits() -> Result<()> {
    let set = fruits::sample_fruits();
    let sorted: fruits::RankedSet<&String> = set.iter().collect();

    for id in [1, 3, 4] {
        let got = fruits::id_to_fruit_unordered(id, &set)?;
        info!(variant = "buggy", id, got = %got, "hash-set order");
    }
    for id in [1, 3, 4] {
        let got = fruits::id_to_fruit(id, &set)?;
        let expected = sorted.get(id)?;
        info!(variant = "fixed", id, got = %got, "sorted order");
        if &got != *expected {
            return Err(Error::Domain("fixed lookup disagrees with sorted order"));
        }
    }
    match fruits::id_to_fruit(set.len() as i64, &set) {
        Err(Error::OutOfRange { .. }) => Ok(()),
        _ => Err(Error::Domain("out-of-range id was not rejected")),
    }
}

fn run_coords() -> Result<()> {
    let original = coords::sample_coords();
    info!("original [x1, y1, x2, y2, class_id]:\n{original}");

    let mut buggy = original.clone();
    coords::swap_buggy(&mut buggy)?;
    info!(variant = "buggy", "x1 and x2 are lost:\n{buggy}");

    let fixed = coords::swap(&original.view())?;
    info!(variant = "fixed", "x1<->y1, x2<->y2:\n{fixed}");

    if fixed.row(0).to_vec() != vec![5, 10, 6, 15, 0] {
        return Err(Error::Domain("first row did not swap to [5, 10, 6, 15, 0]"));
    }
    if coords::swap(&fixed.view())? != original {
        return Err(Error::Domain("swap is not an involution"));
    }
    Ok(())
}

fn run_pr_curve(cfg: &RunnerConfig) -> Result<()> {
    let dir = &cfg.work_dir;
    let csv = pr_curve::write_sample_csv(dir.join("data_file.csv"))?;
    info!(path = %csv.display(), rows = pr_curve::SAMPLE_ROWS.len(), "sample csv written");

    match pr_curve::plot_data_buggy(&csv, dir.join("pr_curve_buggy.svg")) {
        Ok(path) => info!(variant = "buggy", path = %path.display(), "recall on x"),
        Err(e) => warn!(variant = "buggy", "failed: {e}"),
    }

    // A corrupt row: the lenient loader hides it, the strict one refuses it.
    let corrupt = dir.join("data_file_corrupt.csv");
    fs::write(&corrupt, "precision,recall\n0.5,0.5\nabc,0.7\n")?;
    let lenient = pr_curve::load_precision_recall_lenient(&corrupt)?;
    info!(variant = "buggy", precision = ?lenient.precision, "`abc` became 0.0");
    match pr_curve::load_precision_recall(&corrupt) {
        Err(e @ Error::Parse { .. }) => info!(variant = "fixed", "rejected: {e}"),
        _ => return Err(Error::Domain("corrupt csv was not rejected")),
    }

    let path = pr_curve::plot_data(&csv, dir.join("pr_curve_fixed.svg"))?;
    info!(variant = "fixed", path = %path.display(), "precision on x, recall on y");
    Ok(())
}

/// Training data and network config for exercise 4.
#[cfg(feature = "burn")]
pub fn gan_inputs(cfg: &RunnerConfig) -> Result<(ImageSet, crate::gan::GanConfig)> {
    use crate::gan::GanConfig;

    let dim = mnist::IMAGE_SIDE * mnist::IMAGE_SIDE;
    let (data, mut gan_cfg) = match cfg.gan_data {
        GanData::Mnist => {
            let data = mnist::load_train_set(&cfg.work_dir, &cfg.mnist_sources, mnist::http_fetch)?;
            (data, GanConfig::default())
        }
        GanData::Synthetic => (
            ImageSet::synthetic(cfg.synthetic_samples, dim, 0),
            GanConfig::tiny(dim),
        ),
    };
    let data = match cfg.gan_limit {
        Some(n) => data.truncate(n),
        None => data,
    };
    gan_cfg.batch_size = cfg.gan_batch_size;
    gan_cfg.epochs = cfg.gan_epochs;
    Ok((data, gan_cfg))
}

#[cfg(feature = "burn")]
fn run_gan(cfg: &RunnerConfig) -> Result<()> {
    use crate::gan;

    let (data, gan_cfg) = gan_inputs(cfg)?;
    info!(
        samples = data.len(),
        batch_size = gan_cfg.batch_size,
        remainder = data.len() % gan_cfg.batch_size,
        "training set ready"
    );

    match gan::train_gan_buggy(&data, &gan_cfg) {
        Err(e @ Error::Training { .. }) => info!(variant = "buggy", "failed as expected: {e}"),
        Err(e) => return Err(e),
        Ok(_) => warn!(
            variant = "buggy",
            "completed: the batch size divides the training set, so the defect never fired"
        ),
    }

    let trained = gan::train_gan_fixed(&data, &gan_cfg)?;
    info!(
        variant = "fixed",
        batches = trained.report.batches,
        last_batch_rows = trained.report.last_batch_rows,
        "training completed"
    );
    Ok(())
}

#[cfg(not(feature = "burn"))]
fn run_gan(_cfg: &RunnerConfig) -> Result<()> {
    Err(Error::Domain("built without the `burn` feature"))
}

/// Command-line arguments for the `run_exercises` binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "run_exercises",
    about = "Run the find-the-bug exercises and report pass/fail"
)]
pub struct RunnerArgs {
    /// Exercises to run (ids, short names, or numbers; comma separated). All when omitted.
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,
    /// Directory for generated files and the dataset cache.
    #[arg(long, default_value = "pointfix-out")]
    pub work_dir: PathBuf,
    /// Training data for exercise 4.
    #[arg(long, value_enum, default_value_t = GanData::Mnist)]
    pub gan_data: GanData,
    /// Truncate the exercise 4 training set to this many images.
    #[arg(long)]
    pub gan_limit: Option<usize>,
    /// Image count with `--gan-data synthetic`.
    #[arg(long, default_value_t = 1_000)]
    pub synthetic_samples: usize,
    /// Training epochs for exercise 4.
    #[arg(long, default_value_t = 1)]
    pub epochs: usize,
    /// Configured batch size for exercise 4.
    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,
    /// Exit non-zero if any exercise failed.
    #[arg(long)]
    pub fail_on_error: bool,
    /// List the exercises and exit.
    #[arg(long)]
    pub list: bool,
    /// Check the environment (features, work dir, dataset cache) and exit.
    #[arg(long)]
    pub verify: bool,
}

impl RunnerArgs {
    pub fn config(&self) -> RunnerConfig {
        RunnerConfig {
            work_dir: self.work_dir.clone(),
            gan_data: self.gan_data,
            gan_limit: self.gan_limit,
            synthetic_samples: self.synthetic_samples,
            gan_epochs: self.epochs,
            gan_batch_size: self.batch_size,
            ..RunnerConfig::default()
        }
    }

    /// Exercises named by `--only`, in registry order; all when empty.
    pub fn selected(&self) -> Result<Vec<Exercise>> {
        if self.only.is_empty() {
            return Ok(Exercise::ALL.to_vec());
        }
        let picked = self
            .only
            .iter()
            .map(|s| s.parse::<Exercise>())
            .collect::<Result<Vec<_>>>()?;
        Ok(Exercise::ALL
            .into_iter()
            .filter(|ex| picked.contains(ex))
            .collect())
    }
}

/// One line per check, `true` if nothing blocks a run.
pub fn verify(cfg: &RunnerConfig) -> (Vec<String>, bool) {
    let mut lines = Vec::new();
    let mut ok = true;

    lines.push(format!(
        "burn feature: {}",
        if cfg!(feature = "burn") {
            "enabled (exercise 4 available)"
        } else {
            "disabled (exercise 4 will be skipped)"
        }
    ));

    let marker = cfg.work_dir.join(".pointfix-write-check");
    match fs::create_dir_all(&cfg.work_dir).and_then(|_| fs::write(&marker, b"ok")) {
        Ok(()) => {
            let _ = fs::remove_file(&marker);
            lines.push(format!("work dir {}: writable", cfg.work_dir.display()));
        }
        Err(e) => {
            ok = false;
            lines.push(format!("work dir {}: NOT writable ({e})", cfg.work_dir.display()));
        }
    }

    lines.push(format!(
        "mnist cache: {}",
        if mnist::is_cached(&cfg.work_dir) {
            "present"
        } else {
            "missing (exercise 4 will download it)"
        }
    ));

    (lines, ok)
}

static TRACING: OnceLock<()> = OnceLock::new();

/// Install the global `tracing` subscriber once (`RUST_LOG`, default `info`).
pub fn init_tracing() {
    TRACING.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
        if let Err(e) = Registry::default().with(filter).with(fmt_layer).try_init() {
            eprintln!("failed to initialise tracing subscriber: {e}");
        }
    });
}
