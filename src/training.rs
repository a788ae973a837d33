use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use burn::{
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
    module::AutodiffModule,
    optim::{momentum::MomentumConfig, SgdConfig},
    prelude::*,
    record::{BinFileRecorder, CompactRecorder, FullPrecisionSettings},
    tensor::backend::AutodiffBackend,
    train::{
        metric::{AccuracyMetric, LossMetric},
        LearnerBuilder,
    },
};

use crate::architecture::ModelArchitecture;
use crate::data::{self, MnistBatcher};
use crate::dataset::{MnistData, MnistSource, MnistSplit};
use crate::error::Error;
use crate::evaluation::{evaluate, Evaluation};
use crate::model::LenetConfig;

/// Recorder used for the final weights file.
pub type WeightsRecorder = BinFileRecorder<FullPrecisionSettings>;

#[derive(Config)]
pub struct TrainingConfig {
    pub model: LenetConfig,
    pub optimizer: SgdConfig,
    #[config(default = 20)]
    pub num_epochs: usize,
    #[config(default = 128)]
    pub batch_size: usize,
    #[config(default = 4)]
    pub num_workers: usize,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 0.01)]
    pub learning_rate: f64,
}

impl TrainingConfig {
    /// Plain SGD with a constant learning rate, as LeNet is usually trained.
    pub fn lenet() -> Self {
        Self::new(LenetConfig::new(), Self::sgd(0.0, false))
    }

    /// SGD optimizer config; a zero momentum leaves out the momentum state entirely.
    pub fn sgd(momentum: f64, nesterov: bool) -> SgdConfig {
        if momentum == 0.0 && !nesterov {
            return SgdConfig::new();
        }

        SgdConfig::new().with_momentum(Some(
            MomentumConfig::new()
                .with_momentum(momentum)
                .with_dampening(0.0)
                .with_nesterov(nesterov),
        ))
    }
}

/// Files written to the artifact directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    dir: PathBuf,
}

impl ArtifactPaths {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> PathBuf {
        self.dir.join("config.json")
    }

    pub fn architecture(&self) -> PathBuf {
        self.dir.join("model.json")
    }

    /// Weights path handed to the recorder, which appends its own extension.
    pub fn weights(&self) -> PathBuf {
        self.dir.join("lenet_weights")
    }

    /// Weights file as it lands on disk.
    pub fn weights_file(&self) -> PathBuf {
        self.weights().with_extension("bin")
    }

    pub fn create(&self) -> crate::Result<()> {
        fs::create_dir_all(&self.dir).map_err(|err| Error::io(&self.dir, err))
    }
}

#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub evaluation: Evaluation,
    pub elapsed: Duration,
    pub paths: ArtifactPaths,
}

/// Refuse splits carrying labels the model has no output for.
pub fn check_labels(
    data: &MnistData,
    split: MnistSplit,
    num_classes: usize,
) -> crate::Result<()> {
    let labels = data.labels();
    let classes = data::num_classes(&labels);
    log::info!("MNIST {split} split spans {classes} classes");

    if classes > num_classes {
        return Err(Error::LabelOutOfRange {
            label: (classes - 1) as u8,
            num_classes,
        });
    }
    Ok(())
}

/// Save the configuration, architecture description and weights of a model.
pub fn save_artifacts<B: Backend>(
    config: &TrainingConfig,
    model: crate::model::Lenet<B>,
    paths: &ArtifactPaths,
) -> crate::Result<()> {
    paths.create()?;
    config
        .save(paths.config())
        .map_err(|err| Error::io(paths.config(), err))?;
    ModelArchitecture::from_config(&config.model)?.save(paths.architecture())?;
    model.save_file(paths.weights(), &WeightsRecorder::new())?;

    log::info!(
        "Saved architecture to {} and weights to {}",
        paths.architecture().display(),
        paths.weights_file().display()
    );
    Ok(())
}

pub fn train<B: AutodiffBackend>(
    config: &TrainingConfig,
    artifact_dir: &str,
    source: &MnistSource,
    device: B::Device,
) -> crate::Result<TrainingReport> {
    let paths = ArtifactPaths::new(artifact_dir);
    paths.create()?;

    B::seed(config.seed);

    let architecture = ModelArchitecture::from_config(&config.model)?;
    println!("{architecture}");

    let dataset_train = source.load(MnistSplit::Train)?;
    let dataset_test = source.load(MnistSplit::Test)?;
    check_labels(&dataset_train, MnistSplit::Train, config.model.num_classes)?;
    check_labels(&dataset_test, MnistSplit::Test, config.model.num_classes)?;
    log::info!(
        "Training on {} images, testing on {} images",
        dataset_train.len(),
        dataset_test.len()
    );

    // Dataloaders
    let batcher_train = MnistBatcher::<B>::new(device.clone(), config.model.num_classes);
    let batcher_test =
        MnistBatcher::<B::InnerBackend>::new(device.clone(), config.model.num_classes);

    let dataloader_train = DataLoaderBuilder::new(batcher_train)
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .build(dataset_train);

    // The test split doubles as the validation split reported after every epoch.
    let dataloader_test = DataLoaderBuilder::new(batcher_test)
        .batch_size(config.batch_size)
        .num_workers(config.num_workers)
        .build(dataset_test);

    let model = config.model.init::<B>(&device)?;

    // Learner config
    let learner = LearnerBuilder::new(artifact_dir)
        .metric_train_numeric(AccuracyMetric::new())
        .metric_valid_numeric(AccuracyMetric::new())
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .with_file_checkpointer(CompactRecorder::new())
        .devices(vec![device.clone()])
        .num_epochs(config.num_epochs)
        .summary()
        .build(model, config.optimizer.init(), config.learning_rate);

    // Training
    let now = Instant::now();
    let model_trained = learner.fit(dataloader_train, dataloader_test.clone());
    let elapsed = now.elapsed();
    log::info!(
        "Training completed in {}m{}s",
        elapsed.as_secs() / 60,
        elapsed.as_secs() % 60
    );

    save_artifacts(config, model_trained.clone(), &paths)?;

    let evaluation = evaluate(&model_trained.valid(), dataloader_test.as_ref());
    println!("{evaluation}");

    Ok(TrainingReport {
        evaluation,
        elapsed,
        paths,
    })
}
