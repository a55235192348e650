//! Minimal GAN trainer (exercise 4), Burn autodiff + Adam.
//!
//! The defect: label and noise tensors are shaped from the *configured* batch size. The last
//! batch of a finite dataset is usually shorter, so on that batch the concatenated real + fake
//! samples no longer line up with the concatenated labels and the loss cannot be computed.
//!
//! The fix: read the row count off the batch actually received and shape every per-batch tensor
//! from it. [`BatchSizing`] selects between the two so both stay runnable.
//!
//! Shape mismatches surface as [`Error::Training`] (with epoch and batch index) rather than a
//! backend panic: [`binary_cross_entropy`] checks shapes before touching the tensors.

use burn::backend::{Autodiff, NdArray};
use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::activation::{relu, sigmoid, tanh};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use ndarray::{Array2, ArrayView2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use tracing::{debug, info};

use crate::batches::ImageSet;
use crate::mnist::IMAGE_SIDE;
use crate::{Error, Result};

/// Default burn backend for training: ndarray + autodiff.
pub type GanBackend = Autodiff<NdArray<f32>>;

// Probabilities are clamped away from {0, 1} before taking logs.
const BCE_EPS: f32 = 1e-7;

/// How per-batch label and noise tensors are sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchSizing {
    /// Rows of the batch actually received (correct).
    #[default]
    Observed,
    /// `GanConfig::batch_size`, whatever the batch holds (the defect).
    Configured,
}

#[derive(Debug, Clone)]
pub struct GanConfig {
    /// Generator input width.
    pub latent_dim: usize,
    /// Flattened image width (generator output, discriminator input).
    pub image_dim: usize,
    pub generator_hidden: Vec<usize>,
    pub discriminator_hidden: Vec<usize>,
    /// Dropout after each discriminator hidden layer.
    pub dropout: f64,
    /// Adam learning rate (both networks).
    pub lr: f64,
    pub batch_size: usize,
    pub epochs: usize,
    /// Seeds batch shuffling and latent noise.
    pub seed: u64,
    /// Log losses every `log_every` batches (0 disables).
    pub log_every: usize,
}

impl Default for GanConfig {
    fn default() -> Self {
        Self {
            latent_dim: 100,
            image_dim: IMAGE_SIDE * IMAGE_SIDE,
            generator_hidden: vec![256, 512, 1024],
            discriminator_hidden: vec![1024, 512, 256],
            dropout: 0.3,
            lr: 1e-4,
            batch_size: 32,
            epochs: 2,
            seed: 123,
            log_every: 100,
        }
    }
}

impl GanConfig {
    /// Small networks for quick runs on synthetic data.
    pub fn tiny(image_dim: usize) -> Self {
        Self {
            latent_dim: 8,
            image_dim,
            generator_hidden: vec![16],
            discriminator_hidden: vec![16],
            epochs: 1,
            log_every: 0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.latent_dim == 0 || self.image_dim == 0 {
            return Err(Error::Domain("latent_dim and image_dim must be >= 1"));
        }
        if self.generator_hidden.contains(&0) || self.discriminator_hidden.contains(&0) {
            return Err(Error::Domain("hidden layer widths must be >= 1"));
        }
        if self.batch_size == 0 {
            return Err(Error::Domain("batch_size must be >= 1"));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(Error::Domain("dropout must be in [0, 1)"));
        }
        if !self.lr.is_finite() || self.lr <= 0.0 {
            return Err(Error::Domain("lr must be positive and finite"));
        }
        Ok(())
    }
}

fn mlp<B: Backend>(
    device: &B::Device,
    input: usize,
    hidden: &[usize],
    output: usize,
) -> (Vec<Linear<B>>, Linear<B>) {
    let mut layers = Vec::with_capacity(hidden.len());
    let mut width = input;
    for &h in hidden {
        layers.push(LinearConfig::new(width, h).init(device));
        width = h;
    }
    (layers, LinearConfig::new(width, output).init(device))
}

/// Latent noise → image, `tanh` output in `[-1, 1]`.
#[derive(Module, Debug)]
pub struct Generator<B: Backend> {
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
}

impl<B: Backend> Generator<B> {
    pub fn new(cfg: &GanConfig, device: &B::Device) -> Self {
        let (hidden, output) = mlp(device, cfg.latent_dim, &cfg.generator_hidden, cfg.image_dim);
        Self { hidden, output }
    }

    /// `[batch, latent_dim] -> [batch, image_dim]`.
    pub fn forward(&self, z: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = z;
        for layer in &self.hidden {
            x = relu(layer.forward(x));
        }
        tanh(self.output.forward(x))
    }
}

/// Image → probability of being real.
#[derive(Module, Debug)]
pub struct Discriminator<B: Backend> {
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> Discriminator<B> {
    pub fn new(cfg: &GanConfig, device: &B::Device) -> Self {
        let (hidden, output) = mlp(device, cfg.image_dim, &cfg.discriminator_hidden, 1);
        let dropout = DropoutConfig::new(cfg.dropout).init();
        Self {
            hidden,
            output,
            dropout,
        }
    }

    /// `[batch, image_dim] -> [batch, 1]`.
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = x;
        for layer in &self.hidden {
            x = self.dropout.forward(relu(layer.forward(x)));
        }
        sigmoid(self.output.forward(x))
    }
}

/// Mean binary cross-entropy of `probs` against `targets`.
///
/// Shapes must match exactly; no broadcasting.
pub fn binary_cross_entropy<B: Backend>(
    probs: Tensor<B, 2>,
    targets: Tensor<B, 2>,
) -> Result<Tensor<B, 1>> {
    let (p_dims, t_dims) = (probs.dims(), targets.dims());
    if p_dims != t_dims {
        return Err(Error::Shape(format!(
            "discriminator output {p_dims:?} vs labels {t_dims:?}"
        )));
    }
    let p = probs.clamp(BCE_EPS, 1.0 - BCE_EPS);
    let pos = targets.clone() * p.clone().log();
    let neg = targets.neg().add_scalar(1.0) * p.neg().add_scalar(1.0).log();
    Ok((pos + neg).mean().neg())
}

fn to_tensor<B: Backend>(batch: &ArrayView2<f32>, device: &B::Device) -> Tensor<B, 2> {
    let values: Vec<f32> = batch.iter().copied().collect();
    Tensor::from_data(TensorData::new(values, [batch.nrows(), batch.ncols()]), device)
}

fn latent_batch<B: Backend>(
    rng: &mut ChaCha8Rng,
    rows: usize,
    latent_dim: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    let values: Vec<f32> = (0..rows * latent_dim)
        .map(|_| StandardNormal.sample(&mut *rng))
        .collect();
    Tensor::from_data(TensorData::new(values, [rows, latent_dim]), device)
}

fn scalar<B: Backend>(t: &Tensor<B, 1>) -> f32 {
    t.clone()
        .into_data()
        .to_vec::<f32>()
        .ok()
        .and_then(|v| v.first().copied())
        .unwrap_or(f32::NAN)
}

/// What a training run did.
#[derive(Debug, Clone, Default)]
pub struct GanReport {
    pub epochs: usize,
    /// Batches processed over all epochs.
    pub batches: usize,
    /// Rows in the final batch of the final epoch.
    pub last_batch_rows: usize,
    /// Discriminator loss per batch.
    pub d_losses: Vec<f32>,
    /// Generator loss per batch.
    pub g_losses: Vec<f32>,
}

/// A trained generator plus the run report.
#[derive(Debug)]
pub struct TrainedGan {
    pub generator: Generator<GanBackend>,
    pub report: GanReport,
    latent_dim: usize,
}

impl TrainedGan {
    /// Generate `n` flattened images.
    pub fn sample(&self, n: usize, seed: u64) -> Result<Array2<f32>> {
        let device = <GanBackend as Backend>::Device::default();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let z = latent_batch::<GanBackend>(&mut rng, n, self.latent_dim, &device);
        let out = self.generator.forward(z).detach();
        let [rows, cols] = out.dims();
        let values = out
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| Error::Shape(format!("{e:?}")))?;
        Array2::from_shape_vec((rows, cols), values).map_err(|e| Error::Shape(e.to_string()))
    }
}

/// Alternate discriminator and generator updates over `data` for `cfg.epochs` passes.
///
/// Per batch:
/// 1. real rows + fresh fake rows, labelled 1 and 0;
/// 2. one Adam step on the discriminator's BCE;
/// 3. fresh latent noise, one Adam step on the generator's BCE against the "real" label.
pub fn train_gan(data: &ImageSet, cfg: &GanConfig, sizing: BatchSizing) -> Result<TrainedGan> {
    cfg.validate()?;
    if data.is_empty() {
        return Err(Error::Domain("training set is empty"));
    }
    if data.dim() != cfg.image_dim {
        return Err(Error::Shape(format!(
            "images have {} values, config expects {}",
            data.dim(),
            cfg.image_dim
        )));
    }

    let device = <GanBackend as Backend>::Device::default();
    let mut generator = Generator::<GanBackend>::new(cfg, &device);
    let mut discriminator = Discriminator::<GanBackend>::new(cfg, &device);
    let mut g_optim = AdamConfig::new().init::<GanBackend, Generator<GanBackend>>();
    let mut d_optim = AdamConfig::new().init::<GanBackend, Discriminator<GanBackend>>();
    let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
    let mut report = GanReport::default();

    info!(
        samples = data.len(),
        batch_size = cfg.batch_size,
        epochs = cfg.epochs,
        ?sizing,
        "training gan"
    );

    for epoch in 0..cfg.epochs {
        let shuffle_seed = cfg.seed.wrapping_add(epoch as u64);
        for (n, batch) in data.batches(cfg.batch_size, Some(shuffle_seed))?.enumerate() {
            let observed = batch.nrows();
            let rows = match sizing {
                BatchSizing::Observed => observed,
                BatchSizing::Configured => cfg.batch_size,
            };
            debug!(epoch, batch = n, observed, rows, "step");

            // Discriminator on real + fake.
            let real = to_tensor::<GanBackend>(&batch.view(), &device);
            let real_labels = Tensor::<GanBackend, 2>::ones([rows, 1], &device);
            let fake_labels = Tensor::<GanBackend, 2>::zeros([rows, 1], &device);
            let z = latent_batch::<GanBackend>(&mut rng, rows, cfg.latent_dim, &device);
            let fake = generator.forward(z).detach();
            let samples = Tensor::cat(vec![real, fake], 0);
            let labels = Tensor::cat(vec![real_labels.clone(), fake_labels], 0);

            let d_loss = binary_cross_entropy(discriminator.forward(samples), labels)
                .map_err(|e| e.at(epoch, n))?;
            let d_value = scalar(&d_loss);
            let grads = GradientsParams::from_grads(d_loss.backward(), &discriminator);
            discriminator = d_optim.step(cfg.lr, discriminator, grads);

            // Generator against the "real" label.
            let z = latent_batch::<GanBackend>(&mut rng, rows, cfg.latent_dim, &device);
            let verdict = discriminator.forward(generator.forward(z));
            let g_loss =
                binary_cross_entropy(verdict, real_labels).map_err(|e| e.at(epoch, n))?;
            let g_value = scalar(&g_loss);
            let grads = GradientsParams::from_grads(g_loss.backward(), &generator);
            generator = g_optim.step(cfg.lr, generator, grads);

            if cfg.log_every > 0 && n % cfg.log_every == 0 {
                info!(epoch, batch = n, d_loss = d_value, g_loss = g_value, "losses");
            }
            report.d_losses.push(d_value);
            report.g_losses.push(g_value);
            report.batches += 1;
            report.last_batch_rows = observed;
        }
        report.epochs += 1;
    }

    info!(batches = report.batches, "training completed");
    Ok(TrainedGan {
        generator,
        report,
        latent_dim: cfg.latent_dim,
    })
}

/// Fixed variant.
pub fn train_gan_fixed(data: &ImageSet, cfg: &GanConfig) -> Result<TrainedGan> {
    train_gan(data, cfg, BatchSizing::Observed)
}

/// Buggy variant: fails on any batch shorter than `cfg.batch_size`.
pub fn train_gan_buggy(data: &ImageSet, cfg: &GanConfig) -> Result<TrainedGan> {
    train_gan(data, cfg, BatchSizing::Configured)
}
