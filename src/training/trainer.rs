//! Training loop implementation for CartoonGAN
//!
//! Runs the two-phase schedule: reconstruction pretraining of the generator,
//! then adversarial training alternating discriminator and generator updates.

use std::path::{Path, PathBuf};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tch::{nn, nn::Module, Tensor};
use tracing::{debug, info, warn};

use super::history::{LossAccumulator, LossKind, TrainingHistory};
use super::losses::{adversarial_loss, content_loss, discriminator_loss};
use super::schedule::MultiStepLr;
use crate::data::{split_pair, DataLoader};
use crate::error::{Error, Result};
use crate::model::CartoonGan;
use crate::utils::{
    save_checkpoint_meta, side_by_side, CheckpointMeta, CheckpointStore, FsCheckpointStore,
    PngSink, SampleSink,
};

/// Training configuration
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// Run name, prefixes sample file names
    pub name: String,
    /// Directory for samples, histories and checkpoints
    pub results_dir: PathBuf,
    /// Side length of source images; target pairs are twice as wide
    pub input_size: i64,
    /// Number of reconstruction pretraining epochs
    pub pretrain_epochs: usize,
    /// Number of adversarial training epochs
    pub epochs: usize,
    /// Learning rate for generator
    pub gen_lr: f64,
    /// Learning rate for discriminator
    pub disc_lr: f64,
    /// Adam beta1
    pub beta1: f64,
    /// Adam beta2
    pub beta2: f64,
    /// Content loss weight (lambda)
    pub content_weight: f64,
    /// Scale of the pretraining reconstruction loss
    pub recon_scale: f64,
    /// Snapshot samples and latest checkpoints every N epochs (and on the last one)
    pub snapshot_every: usize,
    /// Images written per split at each snapshot
    pub sample_count: usize,
    /// Whether to write sample images
    pub save_samples: bool,
    /// Window (in batches) of the collapse heuristic
    pub collapse_window: usize,
    /// Draw progress bars
    pub show_progress: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            name: "CartoonGan_Converter".to_string(),
            results_dir: PathBuf::from("CartoonGan_Converter_results"),
            input_size: 256,
            pretrain_epochs: 10,
            epochs: 100,
            gen_lr: 2e-4,
            disc_lr: 2e-4,
            beta1: 0.5,
            beta2: 0.999,
            content_weight: 10.0,
            recon_scale: 10.0,
            snapshot_every: 2,
            sample_count: 5,
            save_samples: true,
            collapse_window: 100,
            show_progress: true,
        }
    }
}

/// Phase of the training state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingPhase {
    Init,
    Pretrain,
    Adversarial,
    Done,
}

/// How a run starts, decided once from the supplied checkpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPoint {
    /// Fresh generator: pretrain before adversarial training
    Fresh { discriminator: Option<PathBuf> },
    /// Generator restored from a checkpoint: pretraining is skipped
    Resumed {
        generator: PathBuf,
        discriminator: Option<PathBuf>,
    },
}

impl EntryPoint {
    pub fn from_checkpoints(generator: Option<PathBuf>, discriminator: Option<PathBuf>) -> Self {
        match generator {
            Some(generator) => EntryPoint::Resumed {
                generator,
                discriminator,
            },
            None => EntryPoint::Fresh { discriminator },
        }
    }

    pub fn skips_pretraining(&self) -> bool {
        matches!(self, EntryPoint::Resumed { .. })
    }

    pub fn generator(&self) -> Option<&Path> {
        match self {
            EntryPoint::Resumed { generator, .. } => Some(generator),
            EntryPoint::Fresh { .. } => None,
        }
    }

    pub fn discriminator(&self) -> Option<&Path> {
        match self {
            EntryPoint::Fresh { discriminator } | EntryPoint::Resumed { discriminator, .. } => {
                discriminator.as_deref()
            }
        }
    }
}

/// Source photos, paired target cartoons and optional test photos
pub struct TrainingData {
    /// Photo batches
    pub source: DataLoader,
    /// [cartoon | edge-smoothed] pair batches
    pub target: DataLoader,
    /// Test photos used only for samples
    pub test: Option<DataLoader>,
}

impl TrainingData {
    /// Bundle the loaders; fails if either training stream yields no batch
    pub fn new(source: DataLoader, target: DataLoader, test: Option<DataLoader>) -> Result<Self> {
        if source.num_batches() == 0 {
            return Err(Error::Config(format!(
                "source dataset ({} images) yields no batch of size {}",
                source.num_samples(),
                source.batch_size()
            )));
        }
        if target.num_batches() == 0 {
            return Err(Error::Config(format!(
                "target dataset ({} images) yields no batch of size {}",
                target.num_samples(),
                target.batch_size()
            )));
        }
        Ok(Self {
            source,
            target,
            test,
        })
    }

    /// Batches per adversarial epoch (the shorter stream wins)
    pub fn paired_batches(&self) -> usize {
        self.source.num_batches().min(self.target.num_batches())
    }
}

/// Optimizers and learning-rate schedules of both networks
pub struct Optimizers {
    pub gen: nn::Optimizer,
    pub disc: nn::Optimizer,
    pub gen_schedule: MultiStepLr,
    pub disc_schedule: MultiStepLr,
}

impl Optimizers {
    /// Adam for each network with a 10x decay at half and three quarters of the epochs
    pub fn new(model: &CartoonGan, config: &TrainingConfig) -> Result<Self> {
        let gen_schedule = MultiStepLr::halving_quarters(config.gen_lr, config.epochs);
        let disc_schedule = MultiStepLr::halving_quarters(config.disc_lr, config.epochs);

        let gen = model.gen_optimizer(gen_schedule.lr(), config.beta1, config.beta2)?;
        let disc = model.disc_optimizer(disc_schedule.lr(), config.beta1, config.beta2)?;

        Ok(Self {
            gen,
            disc,
            gen_schedule,
            disc_schedule,
        })
    }

    /// Advance both schedules by one epoch and apply the new rates
    pub fn step_schedules(&mut self) -> (f64, f64) {
        let gen_lr = self.gen_schedule.step();
        let disc_lr = self.disc_schedule.step();
        self.gen.set_lr(gen_lr);
        self.disc.set_lr(disc_lr);
        (gen_lr, disc_lr)
    }
}

/// Scalar losses of one adversarial batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLosses {
    /// Sum of the real, fake and edge BCE terms
    pub discriminator: f64,
    /// Generator adversarial BCE
    pub generator: f64,
    /// Weighted content loss
    pub content: f64,
}

/// One pretraining update: scaled feature-space L1 between G(x) and x
///
/// Only the generator's parameters are updated.
pub fn reconstruction_step(
    model: &mut CartoonGan,
    gen_opt: &mut nn::Optimizer,
    photos: &Tensor,
    scale: f64,
) -> f64 {
    model.gen_vs.unfreeze();

    let source_features = tch::no_grad(|| model.extractor.forward(photos));
    let generated = model.generator.forward(photos);
    let generated_features = model.extractor.forward(&generated);

    let loss = content_loss(&generated_features, &source_features, scale);
    gen_opt.backward_step(&loss);

    loss.double_value(&[])
}

/// One adversarial update: discriminator step, then generator step
///
/// # Arguments
///
/// * `photos` - Source photos x
/// * `cartoons` - Target cartoons y
/// * `edges` - Edge-smoothed companions e of the cartoons
/// * `content_weight` - Lambda of the content loss
pub fn adversarial_step(
    model: &mut CartoonGan,
    opts: &mut Optimizers,
    photos: &Tensor,
    cartoons: &Tensor,
    edges: &Tensor,
    content_weight: f64,
) -> StepLosses {
    // ========== Train Discriminator ==========
    model.disc_vs.unfreeze();
    model.gen_vs.freeze();

    let generated = tch::no_grad(|| model.generator.forward(photos));
    let d_loss = discriminator_loss(
        &model.discriminator.forward(cartoons),
        &model.discriminator.forward(&generated),
        &model.discriminator.forward(edges),
    );
    opts.disc.backward_step(&d_loss.total);

    // ========== Train Generator ==========
    model.disc_vs.freeze();
    model.gen_vs.unfreeze();

    // Fresh forward pass: the discriminator just changed
    let generated = model.generator.forward(photos);
    let adv_loss = adversarial_loss(&model.discriminator.forward(&generated));

    let source_features = tch::no_grad(|| model.extractor.forward(photos));
    let con_loss = content_loss(
        &model.extractor.forward(&generated),
        &source_features,
        content_weight,
    );

    let g_loss = &adv_loss + &con_loss;
    opts.gen.backward_step(&g_loss);

    model.disc_vs.unfreeze();

    StepLosses {
        discriminator: d_loss.total.double_value(&[]),
        generator: adv_loss.double_value(&[]),
        content: con_loss.double_value(&[]),
    }
}

fn ensure_finite(kind: LossKind, value: f64, epoch: usize) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Error::NonFiniteLoss { kind, value, epoch })
    }
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("##-"),
    );
    pb
}

/// CartoonGAN Trainer
///
/// Drives `Init → Pretrain → Adversarial → Done` and owns the loss history.
pub struct Trainer<S = FsCheckpointStore, V = PngSink> {
    config: TrainingConfig,
    store: S,
    sink: V,
    phase: TrainingPhase,
    history: TrainingHistory,
}

impl Trainer {
    /// Create a trainer writing checkpoints and PNG samples to disk
    pub fn new(config: TrainingConfig) -> Self {
        Self::with_collaborators(config, FsCheckpointStore, PngSink)
    }
}

impl<S: CheckpointStore, V: SampleSink> Trainer<S, V> {
    /// Create a trainer with explicit checkpoint store and sample sink
    pub fn with_collaborators(config: TrainingConfig, store: S, sink: V) -> Self {
        Self {
            config,
            store,
            sink,
            phase: TrainingPhase::Init,
            history: TrainingHistory::default(),
        }
    }

    /// Run the whole schedule and return the loss history
    pub fn run(
        &mut self,
        model: &mut CartoonGan,
        entry: &EntryPoint,
        data: &mut TrainingData,
    ) -> Result<TrainingHistory> {
        let mut opts = self.init(model, entry)?;

        if entry.skips_pretraining() {
            info!("Loaded the latest generator model, no need to pre-train");
        } else {
            self.pretrain(model, &mut opts, data)?;
        }

        self.train_adversarial(model, &mut opts, data)?;
        self.finish(model)?;

        Ok(self.history.clone())
    }

    /// Load the checkpoints named by `entry` and build the optimizers
    pub fn init(&mut self, model: &mut CartoonGan, entry: &EntryPoint) -> Result<Optimizers> {
        self.phase = TrainingPhase::Init;
        self.history = TrainingHistory::default();

        if let Some(path) = entry.generator() {
            self.store.load(&mut model.gen_vs, path)?;
        }
        if let Some(path) = entry.discriminator() {
            self.store.load(&mut model.disc_vs, path)?;
        }

        let (gen, disc, vgg) = model.parameter_counts();
        info!("---------- Networks initialized -------------");
        info!("Generator parameters: {}", gen);
        info!("Discriminator parameters: {}", disc);
        info!("VGG19 (frozen) parameters: {}", vgg);

        Optimizers::new(model, &self.config)
    }

    /// Reconstruction pretraining of the generator
    pub fn pretrain(
        &mut self,
        model: &mut CartoonGan,
        opts: &mut Optimizers,
        data: &mut TrainingData,
    ) -> Result<()> {
        self.phase = TrainingPhase::Pretrain;
        info!("Pre-training start!");
        let start = Instant::now();

        for epoch in 0..self.config.pretrain_epochs {
            let mean = self.pretrain_epoch(model, &mut opts.gen, &mut data.source, epoch)?;
            info!(
                "[{}/{}] - time: {:.2}, Recon loss: {:.3}",
                epoch + 1,
                self.config.pretrain_epochs,
                self.history.pretrain.per_epoch_time.last().copied().unwrap_or(0.0),
                mean
            );
        }

        self.history.pretrain.total_time = Some(start.elapsed().as_secs_f64());
        self.save_history(&self.history.pretrain, "pre_train_hist")?;

        let dir = self.config.results_dir.join("Reconstruction");
        let name = self.config.name.clone();
        self.snapshot(model, &mut data.source, &dir, |n| format!("{name}_train_recon_{n}.png"))?;
        if let Some(test) = data.test.as_mut() {
            self.snapshot(model, test, &dir, |n| format!("{name}_test_recon_{n}.png"))?;
        }

        Ok(())
    }

    /// One pretraining epoch over the source photos; returns the mean loss
    pub fn pretrain_epoch(
        &mut self,
        model: &mut CartoonGan,
        gen_opt: &mut nn::Optimizer,
        source: &mut DataLoader,
        epoch: usize,
    ) -> Result<f64> {
        let epoch_start = Instant::now();
        let first = self.history.pretrain.len(LossKind::Reconstruction);
        let pb = progress_bar(source.num_batches(), self.config.show_progress);

        for batch in source.iter() {
            let (photos, _) = batch?;
            let photos = photos.to_device(model.device);
            let loss = reconstruction_step(model, gen_opt, &photos, self.config.recon_scale);
            let loss = ensure_finite(LossKind::Reconstruction, loss, epoch)?;
            self.history.pretrain.record(LossKind::Reconstruction, loss);

            pb.set_message(format!("Recon: {:.4}", loss));
            pb.inc(1);
        }
        pb.finish_and_clear();

        self.history
            .pretrain
            .record_epoch_time(epoch_start.elapsed().as_secs_f64());
        Ok(self.history.pretrain.mean_since(LossKind::Reconstruction, first))
    }

    /// Adversarial training over all configured epochs
    pub fn train_adversarial(
        &mut self,
        model: &mut CartoonGan,
        opts: &mut Optimizers,
        data: &mut TrainingData,
    ) -> Result<()> {
        self.phase = TrainingPhase::Adversarial;
        info!("training start!");

        let (src_batches, tgt_batches) = (data.source.num_batches(), data.target.num_batches());
        if src_batches != tgt_batches {
            warn!(
                "Source yields {} batches and target {}; only {} paired batches are used per epoch",
                src_batches,
                tgt_batches,
                src_batches.min(tgt_batches)
            );
        }

        let start = Instant::now();
        for epoch in 0..self.config.epochs {
            self.adversarial_epoch(model, opts, data, epoch)?;

            let (gen_lr, disc_lr) = opts.step_schedules();
            debug!("Learning rates after epoch {}: G={:e}, D={:e}", epoch + 1, gen_lr, disc_lr);

            if self.history.adversarial.check_mode_collapse(self.config.collapse_window) {
                warn!("Possible mode collapse detected! Consider adjusting learning rates.");
            }

            if self.is_snapshot_epoch(epoch) {
                let dir = self.config.results_dir.join("Transfer");
                let name = self.config.name.clone();
                let tag = epoch + 1;
                self.snapshot(model, &mut data.source, &dir, |n| {
                    format!("{tag}_epoch_{name}_train_{n}.png")
                })?;
                if let Some(test) = data.test.as_mut() {
                    self.snapshot(model, test, &dir, |n| format!("{tag}_epoch_{name}_test_{n}.png"))?;
                }
                self.save_networks(model, "generator_latest.pt", "discriminator_latest.pt", epoch + 1)?;
            }
        }

        let total = start.elapsed().as_secs_f64();
        self.history.adversarial.total_time = Some(total);
        info!(
            "Avg one epoch time: {:.2}, total {} epochs time: {:.2}",
            self.history.adversarial.mean_epoch_time(),
            self.config.epochs,
            total
        );
        Ok(())
    }

    /// One adversarial epoch over the zipped source and target streams
    pub fn adversarial_epoch(
        &mut self,
        model: &mut CartoonGan,
        opts: &mut Optimizers,
        data: &mut TrainingData,
        epoch: usize,
    ) -> Result<StepLosses> {
        let epoch_start = Instant::now();
        let hist = &self.history.adversarial;
        let first = (
            hist.len(LossKind::Discriminator),
            hist.len(LossKind::Generator),
            hist.len(LossKind::Content),
        );
        let pb = progress_bar(data.paired_batches(), self.config.show_progress);

        for (photos, pairs) in data.source.iter().zip(data.target.iter()) {
            let (photos, _) = photos?;
            let (pairs, _) = pairs?;
            let (cartoons, edges) = split_pair(&pairs, self.config.input_size)?;
            let photos = photos.to_device(model.device);
            let cartoons = cartoons.to_device(model.device);
            let edges = edges.to_device(model.device);

            let losses = adversarial_step(
                model,
                opts,
                &photos,
                &cartoons,
                &edges,
                self.config.content_weight,
            );

            let disc = ensure_finite(LossKind::Discriminator, losses.discriminator, epoch)?;
            let gen = ensure_finite(LossKind::Generator, losses.generator, epoch)?;
            let con = ensure_finite(LossKind::Content, losses.content, epoch)?;

            let hist = &mut self.history.adversarial;
            hist.record(LossKind::Discriminator, disc);
            hist.record(LossKind::Generator, gen);
            hist.record(LossKind::Content, con);

            pb.set_message(format!("D: {:.4}, G: {:.4}, Con: {:.4}", disc, gen, con));
            pb.inc(1);
        }
        pb.finish_and_clear();

        let hist = &mut self.history.adversarial;
        let per_epoch_time = epoch_start.elapsed().as_secs_f64();
        hist.record_epoch_time(per_epoch_time);

        let means = StepLosses {
            discriminator: hist.mean_since(LossKind::Discriminator, first.0),
            generator: hist.mean_since(LossKind::Generator, first.1),
            content: hist.mean_since(LossKind::Content, first.2),
        };
        info!(
            "[{}/{}] - time: {:.2}, Disc loss: {:.3}, Gen loss: {:.3}, Con loss: {:.3}",
            epoch + 1,
            self.config.epochs,
            per_epoch_time,
            means.discriminator,
            means.generator,
            means.content
        );
        Ok(means)
    }

    /// Persist the final parameters and the adversarial history
    pub fn finish(&mut self, model: &CartoonGan) -> Result<()> {
        info!("Training finish!... save training results");
        self.phase = TrainingPhase::Done;
        self.save_networks(
            model,
            "generator_param.pt",
            "discriminator_param.pt",
            self.config.epochs,
        )?;
        self.save_history(&self.history.adversarial, "train_hist")?;
        Ok(())
    }

    fn is_snapshot_epoch(&self, epoch: usize) -> bool {
        let every = self.config.snapshot_every.max(1);
        (epoch + 1) % every == 0 || epoch + 1 == self.config.epochs
    }

    /// Write [x | G(x)] samples for the first batches of `loader`
    fn snapshot<F>(&self, model: &CartoonGan, loader: &mut DataLoader, dir: &Path, file_name: F) -> Result<()>
    where
        F: Fn(usize) -> String,
    {
        if !self.config.save_samples {
            return Ok(());
        }

        for (n, batch) in loader.iter().take(self.config.sample_count).enumerate() {
            let (photos, _) = batch?;
            let photos = photos.to_device(model.device);
            let stylized = model.stylize(&photos);
            let image = side_by_side(&photos.get(0), &stylized.get(0));
            self.sink.save(&image, &dir.join(file_name(n + 1)))?;
        }
        Ok(())
    }

    fn save_networks(&self, model: &CartoonGan, gen_file: &str, disc_file: &str, epoch: usize) -> Result<()> {
        let dir = &self.config.results_dir;
        let gen_path = dir.join(gen_file);
        let disc_path = dir.join(disc_file);

        self.store.save(&model.gen_vs, &gen_path)?;
        self.store.save(&model.disc_vs, &disc_path)?;

        let meta = CheckpointMeta::new(
            epoch,
            self.phase,
            &self.history,
            model.config(),
            gen_path,
            disc_path,
        );
        save_checkpoint_meta(&meta, dir)?;
        info!("Saved {} and {} (epoch {})", gen_file, disc_file, epoch);
        Ok(())
    }

    fn save_history(&self, history: &LossAccumulator, stem: &str) -> Result<()> {
        let dir = &self.config.results_dir;
        std::fs::create_dir_all(dir)?;
        history.save_json(dir.join(format!("{stem}.json")))?;
        history.save_csv(dir.join(format!("{stem}.csv")))?;
        Ok(())
    }

    /// Current phase
    pub fn phase(&self) -> TrainingPhase {
        self.phase
    }

    /// Loss history recorded so far
    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    /// Get configuration
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }
}
