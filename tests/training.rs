mod common;

use std::fs;

use burn::backend::{Autodiff, NdArray};
use lenet_mnist::dataset::MnistSource;
use lenet_mnist::training::{train, TrainingConfig};

type TestBackend = Autodiff<NdArray>;

const TRAIN_LABELS: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 0, 1];
const TEST_LABELS: [u8; 5] = [9, 4, 2, 7, 0];

#[test]
fn one_epoch_saves_artifacts_and_scores_the_test_split() {
    let data_dir = tempfile::tempdir().unwrap();
    let artifact_dir = tempfile::tempdir().unwrap();
    let artifact_dir = artifact_dir.path().join("artifacts");
    let artifact_dir = artifact_dir.to_str().unwrap();
    common::write_mnist_dir(data_dir.path(), &TRAIN_LABELS, &TEST_LABELS);

    let config = TrainingConfig::lenet()
        .with_num_epochs(1)
        .with_batch_size(4)
        .with_num_workers(1);
    let source = MnistSource::Directory(data_dir.path().to_path_buf());

    let report =
        train::<TestBackend>(&config, artifact_dir, &source, Default::default()).unwrap();

    assert_eq!(report.evaluation.total, TEST_LABELS.len());
    assert!(report.evaluation.correct <= TEST_LABELS.len());
    assert!(report.evaluation.loss.is_finite());
    for file in [
        report.paths.config(),
        report.paths.architecture(),
        report.paths.weights_file(),
    ] {
        let len = fs::metadata(&file).unwrap().len();
        assert!(len > 0, "{} is empty", file.display());
    }
}
