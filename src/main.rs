#![recursion_limit = "256"]

use std::error::Error;
use std::path::PathBuf;

use burn::{
    config::Config,
    data::dataloader::DataLoaderBuilder,
    tensor::backend::AutodiffBackend,
    train::{ApplicationLoggerInstaller, FileApplicationLoggerInstaller},
};
use clap::{Parser, Subcommand};
use lenet_mnist::{
    data::MnistBatcher,
    dataset::{MnistSource, MnistSplit},
    evaluation::evaluate,
    images, inference,
    training::{self, TrainingConfig},
};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Directory holding the config, architecture, weights and training logs.
    #[arg(long, global = true, default_value = "artifacts")]
    artifact_dir: String,

    /// Directory with the uncompressed MNIST IDX files; downloaded when omitted.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train the network, then save it and report the test accuracy.
    Train {
        /// Training config JSON; flags below override its values.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        epochs: Option<usize>,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        learning_rate: Option<f64>,
        #[arg(long)]
        momentum: Option<f64>,
        #[arg(long)]
        nesterov: bool,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Score a trained network on the test split.
    Evaluate {
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Classify a single 28x28 grayscale image.
    Predict {
        #[arg(long)]
        image: PathBuf,
    },
    /// Write test images as PGM files next to their IDX label file.
    ExportImages {
        #[arg(long, default_value = "mnist")]
        out: PathBuf,
        #[arg(long, default_value_t = 10_000)]
        count: usize,
    },
}

fn install_logger(artifact_dir: &str, name: &str) {
    if let Err(err) = std::fs::create_dir_all(artifact_dir) {
        eprintln!("Unable to create {artifact_dir}: {err}");
        return;
    }
    let installer = FileApplicationLoggerInstaller::new(&format!("{artifact_dir}/{name}.log"));
    if let Err(err) = installer.install() {
        eprintln!("Unable to install the application logger: {err}");
    }
}

fn training_config(
    config: Option<PathBuf>,
    epochs: Option<usize>,
    batch_size: Option<usize>,
    learning_rate: Option<f64>,
    momentum: Option<f64>,
    nesterov: bool,
    seed: Option<u64>,
) -> Result<TrainingConfig, Box<dyn Error>> {
    let mut config = match config {
        Some(path) => TrainingConfig::load(path).map_err(lenet_mnist::Error::from)?,
        None => TrainingConfig::lenet(),
    };

    if let Some(epochs) = epochs {
        config.num_epochs = epochs;
    }
    if let Some(batch_size) = batch_size {
        config.batch_size = batch_size;
    }
    if let Some(learning_rate) = learning_rate {
        config.learning_rate = learning_rate;
    }
    if momentum.is_some() || nesterov {
        config.optimizer = TrainingConfig::sgd(momentum.unwrap_or(0.0), nesterov);
    }
    if let Some(seed) = seed {
        config.seed = seed;
    }
    Ok(config)
}

fn launch<B: AutodiffBackend>(cli: Cli, device: B::Device) -> Result<(), Box<dyn Error>> {
    let source = MnistSource::from_dir(cli.data_dir);
    let artifact_dir = cli.artifact_dir.as_str();

    match cli.command {
        Command::Train {
            config,
            epochs,
            batch_size,
            learning_rate,
            momentum,
            nesterov,
            seed,
        } => {
            let config = training_config(
                config,
                epochs,
                batch_size,
                learning_rate,
                momentum,
                nesterov,
                seed,
            )?;
            training::train::<B>(&config, artifact_dir, &source, device)?;
        }
        Command::Evaluate { batch_size } => {
            install_logger(artifact_dir, "evaluation");
            let (config, model) =
                inference::load_model::<B::InnerBackend>(artifact_dir, &device)?;
            let batcher =
                MnistBatcher::<B::InnerBackend>::new(device, config.model.num_classes);
            let dataset = source.load(MnistSplit::Test)?;
            training::check_labels(&dataset, MnistSplit::Test, config.model.num_classes)?;
            let loader = DataLoaderBuilder::new(batcher)
                .batch_size(batch_size.unwrap_or(config.batch_size))
                .num_workers(config.num_workers)
                .build(dataset);

            let report = inference::score(&model, loader.as_ref());
            println!("{report}");
            println!("{}", evaluate(&model, loader.as_ref()));
        }
        Command::Predict { image } => {
            install_logger(artifact_dir, "prediction");
            let (_, model) =
                inference::load_model::<B::InnerBackend>(artifact_dir, &device)?;
            let pixels = images::load_image(&image)?;

            println!("{}", inference::predict_image(&model, &pixels, &device)?);
        }
        Command::ExportImages { out, count } => {
            install_logger(artifact_dir, "export");
            let dataset = source.load(MnistSplit::Test)?;
            let written = images::export_pgm(&dataset, MnistSplit::Test, &out, count)?;

            println!("Wrote {} images to {}", written.len(), out.display());
        }
    }

    Ok(())
}

#[cfg(not(any(feature = "ndarray", feature = "wgpu", feature = "tch-cpu")))]
compile_error!("Enable one of the `ndarray`, `wgpu` or `tch-cpu` backend features.");

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    #[cfg(feature = "wgpu")]
    return launch::<burn::backend::Autodiff<burn::backend::Wgpu>>(
        cli,
        burn::backend::wgpu::WgpuDevice::default(),
    );

    #[cfg(all(feature = "tch-cpu", not(feature = "wgpu")))]
    return launch::<burn::backend::Autodiff<burn::backend::LibTorch>>(
        cli,
        burn::backend::libtorch::LibTorchDevice::Cpu,
    );

    #[cfg(all(feature = "ndarray", not(any(feature = "wgpu", feature = "tch-cpu"))))]
    return launch::<burn::backend::Autodiff<burn::backend::NdArray>>(
        cli,
        burn::backend::ndarray::NdArrayDevice::Cpu,
    );
}
