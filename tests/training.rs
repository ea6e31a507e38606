//! Integration tests for the CartoonGAN training orchestrator

use std::path::Path;

use cartoongan::data::DataLoader;
use cartoongan::model::{CartoonGan, DiscriminatorConfig, GeneratorConfig, ModelConfig};
use cartoongan::training::{
    adversarial_step, discriminator_loss, EntryPoint, LossKind, Optimizers, Trainer,
    TrainingConfig, TrainingData, TrainingPhase,
};
use cartoongan::utils::{
    load_checkpoint_meta, CheckpointStore, ComputeContext, FsCheckpointStore, NullSink, PngSink,
};
use cartoongan::Error;
use tch::{nn, nn::Module, Device, Kind, Tensor};

const SIZE: i64 = 16;

fn tiny_model() -> CartoonGan {
    let config = ModelConfig {
        generator: GeneratorConfig {
            features: 4,
            residual_blocks: 1,
            ..Default::default()
        },
        discriminator: DiscriminatorConfig {
            features: 4,
            ..Default::default()
        },
    };
    CartoonGan::new(config, &ComputeContext::cpu(), None).unwrap()
}

fn images(n: i64, height: i64, width: i64) -> Tensor {
    Tensor::rand([n, 3, height, width], (Kind::Float, Device::Cpu)) * 2.0 - 1.0
}

/// `photos` source images and `pairs` target pairs, one batch each when equal to `batch`
fn training_data(photos: i64, pairs: i64, batch: usize) -> TrainingData {
    TrainingData::new(
        DataLoader::unlabelled(images(photos, SIZE, SIZE), batch, true, true),
        DataLoader::unlabelled(images(pairs, SIZE, 2 * SIZE), batch, true, true),
        None,
    )
    .unwrap()
}

fn config(results_dir: &Path) -> TrainingConfig {
    TrainingConfig {
        name: "test".to_string(),
        results_dir: results_dir.to_path_buf(),
        input_size: SIZE,
        pretrain_epochs: 1,
        epochs: 1,
        sample_count: 1,
        show_progress: false,
        ..Default::default()
    }
}

fn params(vs: &nn::VarStore) -> Vec<(String, Tensor)> {
    let mut vars: Vec<(String, Tensor)> = vs
        .variables()
        .into_iter()
        .map(|(name, t)| (name, t.detach().copy()))
        .collect();
    vars.sort_by(|a, b| a.0.cmp(&b.0));
    vars
}

fn changed(before: &[(String, Tensor)], vs: &nn::VarStore) -> bool {
    params(vs)
        .iter()
        .zip(before)
        .any(|((_, now), (_, then))| !now.equal(then))
}

#[test]
fn test_pretrain_updates_only_generator() {
    let dir = tempfile::tempdir().unwrap();
    let mut model = tiny_model();
    let mut data = training_data(2, 2, 2);
    let mut trainer = Trainer::with_collaborators(config(dir.path()), FsCheckpointStore, NullSink);

    let mut opts = trainer.init(&mut model, &EntryPoint::Fresh { discriminator: None }).unwrap();
    let gen_before = params(&model.gen_vs);
    let disc_before = params(&model.disc_vs);

    trainer.pretrain(&mut model, &mut opts, &mut data).unwrap();

    assert!(changed(&gen_before, &model.gen_vs));
    assert!(!changed(&disc_before, &model.disc_vs));

    let history = trainer.history();
    assert_eq!(history.pretrain.len(LossKind::Reconstruction), 1);
    assert!(history.pretrain.latest(LossKind::Reconstruction).unwrap() >= 0.0);
    assert!(history.adversarial.is_empty());
    assert_eq!(trainer.phase(), TrainingPhase::Pretrain);
    assert!(dir.path().join("pre_train_hist.json").exists());
    assert!(dir.path().join("pre_train_hist.csv").exists());
}

#[test]
fn test_adversarial_epoch_single_batch() {
    let dir = tempfile::tempdir().unwrap();
    let mut model = tiny_model();
    let mut data = training_data(2, 2, 2);
    let mut trainer = Trainer::with_collaborators(config(dir.path()), FsCheckpointStore, NullSink);

    let mut opts = trainer.init(&mut model, &EntryPoint::Fresh { discriminator: None }).unwrap();
    let gen_before = params(&model.gen_vs);
    let disc_before = params(&model.disc_vs);

    let means = trainer.adversarial_epoch(&mut model, &mut opts, &mut data, 0).unwrap();

    assert!(changed(&gen_before, &model.gen_vs));
    assert!(changed(&disc_before, &model.disc_vs));

    let hist = &trainer.history().adversarial;
    assert_eq!(hist.len(LossKind::Discriminator), 1);
    assert_eq!(hist.len(LossKind::Generator), 1);
    assert_eq!(hist.len(LossKind::Content), 1);
    assert_eq!(hist.len(LossKind::Reconstruction), 0);
    assert_eq!(hist.num_epochs(), 1);
    assert_eq!(hist.latest(LossKind::Discriminator), Some(means.discriminator));
}

#[test]
fn test_discriminator_loss_is_sum_of_three_terms() {
    let mut model = tiny_model();
    let config = TrainingConfig {
        epochs: 4,
        ..Default::default()
    };
    let mut opts = Optimizers::new(&model, &config).unwrap();

    let photos = images(2, SIZE, SIZE);
    let cartoons = images(2, SIZE, SIZE);
    let edges = images(2, SIZE, SIZE);

    let expected = tch::no_grad(|| {
        let generated = model.generator.forward(&photos);
        discriminator_loss(
            &model.discriminator.forward(&cartoons),
            &model.discriminator.forward(&generated),
            &model.discriminator.forward(&edges),
        )
    });
    let sum = expected.real.double_value(&[]) + expected.fake.double_value(&[]) + expected.edge.double_value(&[]);

    let losses = adversarial_step(&mut model, &mut opts, &photos, &cartoons, &edges, 10.0);

    assert!((losses.discriminator - sum).abs() < 1e-4);
    assert!(losses.generator > 0.0);
    assert!(losses.content >= 0.0);
    // every variable is trainable again after the step
    assert!(model.gen_vs.trainable_variables().iter().all(|t| t.requires_grad()));
    assert!(model.disc_vs.trainable_variables().iter().all(|t| t.requires_grad()));
}

#[test]
fn test_resumed_run_skips_pretraining() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = dir.path().join("pretrained_generator.pt");

    let pretrained = tiny_model();
    FsCheckpointStore.save(&pretrained.gen_vs, &checkpoint).unwrap();

    let mut model = tiny_model();
    let results = dir.path().join("results");
    let mut trainer = Trainer::with_collaborators(config(&results), FsCheckpointStore, NullSink);
    let entry = EntryPoint::from_checkpoints(Some(checkpoint), None);

    trainer.init(&mut model, &entry).unwrap();
    assert!(!changed(&params(&pretrained.gen_vs), &model.gen_vs));

    let mut data = training_data(2, 2, 2);
    let history = trainer.run(&mut model, &entry, &mut data).unwrap();

    assert_eq!(history.pretrain.len(LossKind::Reconstruction), 0);
    assert_eq!(history.adversarial.len(LossKind::Discriminator), 1);
    assert_eq!(trainer.phase(), TrainingPhase::Done);

    assert!(!results.join("pre_train_hist.json").exists());
    for file in [
        "train_hist.json",
        "train_hist.csv",
        "generator_latest.pt",
        "discriminator_latest.pt",
        "generator_param.pt",
        "discriminator_param.pt",
    ] {
        assert!(results.join(file).exists(), "missing {file}");
    }

    let meta = load_checkpoint_meta(&results).unwrap();
    assert_eq!(meta.epoch, 1);
    assert_eq!(meta.phase, TrainingPhase::Done);
    assert!(meta.disc_loss.is_some());
}

#[test]
fn test_fresh_run_writes_samples() {
    let dir = tempfile::tempdir().unwrap();
    let mut model = tiny_model();
    let mut data = TrainingData::new(
        DataLoader::unlabelled(images(2, SIZE, SIZE), 2, true, true),
        DataLoader::unlabelled(images(2, SIZE, 2 * SIZE), 2, true, true),
        Some(DataLoader::unlabelled(images(1, SIZE, SIZE), 1, false, false)),
    )
    .unwrap();
    let mut trainer = Trainer::with_collaborators(config(dir.path()), FsCheckpointStore, PngSink);

    let history = trainer
        .run(&mut model, &EntryPoint::from_checkpoints(None, None), &mut data)
        .unwrap();

    assert_eq!(history.pretrain.len(LossKind::Reconstruction), 1);
    assert_eq!(history.adversarial.len(LossKind::Content), 1);

    let recon = dir.path().join("Reconstruction");
    assert!(recon.join("test_train_recon_1.png").exists());
    assert!(recon.join("test_test_recon_1.png").exists());

    let sample = tch::vision::image::load(dir.path().join("Transfer").join("1_epoch_test_train_1.png")).unwrap();
    assert_eq!(sample.size(), vec![3, SIZE, 2 * SIZE]);
}

#[test]
fn test_shorter_stream_truncates_epoch() {
    let dir = tempfile::tempdir().unwrap();
    let mut model = tiny_model();
    // two source batches, one target batch
    let mut data = training_data(4, 2, 2);
    assert_eq!(data.paired_batches(), 1);

    let mut trainer = Trainer::with_collaborators(config(dir.path()), FsCheckpointStore, NullSink);
    let mut opts = trainer.init(&mut model, &EntryPoint::Fresh { discriminator: None }).unwrap();
    trainer.train_adversarial(&mut model, &mut opts, &mut data).unwrap();

    assert_eq!(trainer.history().adversarial.len(LossKind::Generator), 1);
}

#[test]
fn test_schedule_steps_once_per_adversarial_epoch() {
    let dir = tempfile::tempdir().unwrap();
    let mut model = tiny_model();
    let mut data = training_data(2, 2, 2);
    let config = TrainingConfig {
        pretrain_epochs: 2,
        epochs: 4,
        ..config(dir.path())
    };
    let (gen_lr, disc_lr) = (config.gen_lr, config.disc_lr);
    let mut trainer = Trainer::with_collaborators(config, FsCheckpointStore, NullSink);

    let mut opts = trainer.init(&mut model, &EntryPoint::Fresh { discriminator: None }).unwrap();
    // milestones at epochs 2 and 3
    assert_eq!(opts.gen_schedule.milestones(), &[2, 3]);

    trainer.pretrain(&mut model, &mut opts, &mut data).unwrap();
    assert_eq!(opts.gen_schedule.epoch(), 0);
    assert_eq!(opts.disc_schedule.epoch(), 0);
    assert_eq!(opts.gen_schedule.lr(), gen_lr);

    trainer.train_adversarial(&mut model, &mut opts, &mut data).unwrap();
    assert_eq!(opts.gen_schedule.epoch(), 4);
    assert_eq!(opts.disc_schedule.epoch(), 4);
    assert!((opts.gen_schedule.lr() - gen_lr * 0.01).abs() < 1e-12);
    assert!((opts.disc_schedule.lr() - disc_lr * 0.01).abs() < 1e-12);
}

#[test]
fn test_empty_loader_is_rejected() {
    let result = TrainingData::new(
        DataLoader::unlabelled(images(1, SIZE, SIZE), 2, true, true),
        DataLoader::unlabelled(images(2, SIZE, 2 * SIZE), 2, true, true),
        None,
    );
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_missing_resume_checkpoint_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut model = tiny_model();
    let mut trainer = Trainer::with_collaborators(config(dir.path()), FsCheckpointStore, NullSink);
    let entry = EntryPoint::from_checkpoints(Some(dir.path().join("missing.pt")), None);

    assert!(matches!(
        trainer.init(&mut model, &entry),
        Err(Error::Checkpoint { .. })
    ));
}

#[test]
#[ignore = "full-size networks on 8x256x256 batches are slow on CPU"]
fn test_full_size_batch() {
    let dir = tempfile::tempdir().unwrap();
    let mut model = CartoonGan::new(ModelConfig::default(), &ComputeContext::cpu(), None).unwrap();
    let mut data = TrainingData::new(
        DataLoader::unlabelled(images(8, 256, 256), 8, true, true),
        DataLoader::unlabelled(images(8, 256, 512), 8, true, true),
        None,
    )
    .unwrap();
    let mut trainer = Trainer::with_collaborators(
        TrainingConfig {
            input_size: 256,
            ..config(dir.path())
        },
        FsCheckpointStore,
        NullSink,
    );

    let history = trainer
        .run(&mut model, &EntryPoint::from_checkpoints(None, None), &mut data)
        .unwrap();
    assert_eq!(history.pretrain.len(LossKind::Reconstruction), 1);
    assert_eq!(history.adversarial.len(LossKind::Discriminator), 1);
}
