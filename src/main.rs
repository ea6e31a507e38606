//! CartoonGAN photo-to-cartoon training
//!
//! Main entry point providing CLI interface for:
//! - Building edge-promoted target pairs
//! - Training the CartoonGAN model
//! - Stylizing photos with a trained generator

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};

use cartoongan::{
    data::{edge_promote_dir, needs_edge_promotion, DataLoader, ImageFolder},
    model::CartoonGan,
    training::{EntryPoint, LossKind, Trainer, TrainingData},
    transfer::Stylizer,
    utils::{ensure_config_exists, setup_logging, ComputeContext, Config, FsCheckpointStore, PngSink},
};

/// CartoonGAN: turn photos into cartoons
#[derive(Parser)]
#[command(name = "cartoongan")]
#[command(version = "0.1.0")]
#[command(about = "Train and apply a CartoonGAN photo-to-cartoon generator")]
struct Cli {
    /// Verbosity level (overridden by RUST_LOG)
    #[arg(short, long, global = true, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the CartoonGAN model
    Train {
        /// Path to configuration file (TOML or JSON)
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Run name
        #[arg(long)]
        name: Option<String>,

        /// Adversarial training epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Pretraining epochs
        #[arg(long)]
        pretrain_epochs: Option<usize>,

        /// Batch size
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Device: auto, cpu, cuda, cuda:N or mps
        #[arg(short, long)]
        device: Option<String>,

        /// Generator checkpoint to resume from (skips pretraining)
        #[arg(long)]
        generator: Option<PathBuf>,

        /// Discriminator checkpoint to resume from
        #[arg(long)]
        discriminator: Option<PathBuf>,

        /// Pretrained VGG19 weights
        #[arg(long)]
        vgg: Option<PathBuf>,

        /// Results directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build [cartoon | edge-smoothed] pairs from a directory of cartoons
    EdgePromote {
        /// Directory of cartoon images
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory for the pairs
        #[arg(short, long)]
        output: PathBuf,

        /// Side length of each half
        #[arg(short, long, default_value = "256")]
        size: i64,
    },

    /// Stylize a directory of photos with a trained generator
    Transfer {
        /// Generator checkpoint
        #[arg(short, long)]
        generator: PathBuf,

        /// Directory of photos
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Resize photos to a square of this side (default: keep size)
        #[arg(short, long)]
        size: Option<i64>,

        /// Configuration holding the generator architecture
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Device: auto, cpu, cuda, cuda:N or mps
        #[arg(short, long, default_value = "auto")]
        device: String,
    },

    /// Write the default configuration file (an existing file is kept)
    Init {
        /// Output configuration file path
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.verbosity);

    match cli.command {
        Commands::Train {
            config,
            name,
            epochs,
            pretrain_epochs,
            batch_size,
            device,
            generator,
            discriminator,
            vgg,
            output,
        } => {
            let mut config = load_config(&config)?;
            if let Some(name) = name {
                config.name = name;
            }
            if let Some(epochs) = epochs {
                config.training.train_epoch = epochs;
            }
            if let Some(epochs) = pretrain_epochs {
                config.training.pre_train_epoch = epochs;
            }
            if let Some(batch_size) = batch_size {
                config.data.batch_size = batch_size;
            }
            if let Some(device) = device {
                config.training.device = device;
            }
            if generator.is_some() {
                config.checkpoint.latest_generator_model = generator;
            }
            if discriminator.is_some() {
                config.checkpoint.latest_discriminator_model = discriminator;
            }
            if vgg.is_some() {
                config.model.vgg_model = vgg;
            }
            if output.is_some() {
                config.results_dir = output;
            }
            train(config)?;
        }
        Commands::EdgePromote {
            input,
            output,
            size,
        } => {
            let written = edge_promote_dir(&input, &output, size)?;
            info!("Wrote {} pairs to {}", written, output.display());
        }
        Commands::Transfer {
            generator,
            input,
            output,
            size,
            config,
            device,
        } => {
            let config = match config {
                Some(path) => load_config(&path)?,
                None => Config::default(),
            };
            let ctx = ComputeContext::resolve(&device)?;
            let stylizer = Stylizer::load(
                config.model_config().generator,
                &ctx,
                &FsCheckpointStore,
                &generator,
            )?;
            stylizer.stylize_dir(&input, &output, size, &PngSink)?;
        }
        Commands::Init { output } => {
            let config = ensure_config_exists(&output)?;
            info!("Configuration for run '{}' at {}", config.name, output.display());
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::load(path).with_context(|| format!("failed to read config {}", path.display()))
    } else {
        info!("Config file {} not found, using defaults", path.display());
        Ok(Config::default())
    }
}

/// Train the CartoonGAN model
fn train(config: Config) -> Result<()> {
    config.validate()?;
    let ctx = ComputeContext::resolve(&config.training.device)?;
    info!("Using device: {:?}", ctx.device());

    let data = &config.data;
    let size = data.input_size;

    // Build the target pairs on first use
    let pair_dir = data.tgt_data.join(&data.pair_split);
    if needs_edge_promotion(&pair_dir) {
        info!("Pair split {} is missing, running edge promotion", pair_dir.display());
        edge_promote_dir(&data.tgt_data.join(&data.train_split), &pair_dir, size)?;
    }

    let source = ImageFolder::open_square(&data.src_data, &data.train_split, size)?;
    let target = ImageFolder::open_pairs(&data.tgt_data, &data.pair_split, size)?;
    debug!("Source classes: {:?}, target classes: {:?}", source.classes(), target.classes());
    let test = match ImageFolder::open_square(&data.src_data, &data.test_split, size) {
        Ok(folder) => Some(DataLoader::from_folder(folder, 1, true, false)),
        Err(e) => {
            warn!("No test photos, samples use training photos only: {}", e);
            None
        }
    };

    let mut training_data = TrainingData::new(
        DataLoader::from_folder(source, data.batch_size, true, true),
        DataLoader::from_folder(target, data.batch_size, true, true),
        test,
    )?;

    let mut model = CartoonGan::new(config.model_config(), &ctx, config.model.vgg_model.as_deref())?;
    let entry = EntryPoint::from_checkpoints(
        config.checkpoint.latest_generator_model.clone(),
        config.checkpoint.latest_discriminator_model.clone(),
    );

    let training_config = config.training_config();
    let results_dir = training_config.results_dir.clone();
    std::fs::create_dir_all(&results_dir)?;
    config.save(results_dir.join("config.toml"))?;

    let mut trainer = Trainer::new(training_config);
    let history = trainer.run(&mut model, &entry, &mut training_data)?;

    info!(
        "Training complete. Final D_loss: {:.4}, G_loss: {:.4}, Con_loss: {:.4}",
        history.adversarial.latest(LossKind::Discriminator).unwrap_or(0.0),
        history.adversarial.latest(LossKind::Generator).unwrap_or(0.0),
        history.adversarial.latest(LossKind::Content).unwrap_or(0.0)
    );
    info!("Results saved to {}", results_dir.display());

    Ok(())
}
