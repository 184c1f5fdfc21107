/// Integration tests for the training workflow and persisted model package
///
/// These tests verify:
/// - CSV ingestion through training and artifact persistence
/// - Package reload gives identical predictions
/// - Threshold re-scanning and CSV report export
/// - Lenient handling of incomplete records at scoring time

mod common;

use startup_predictor::{
    ml::{
        dataset::load_records, pipeline::{checksum, checksum_path}, rescan_thresholds, FeatureSet, ModelPackage,
        ModelType, ThresholdConfig, ThresholdObjective, Trainer,
    },
    models::StartupRecord,
};

#[test]
fn test_csv_ingestion_skips_unlabeled_rows() {
    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().join("startups.csv");
    common::write_csv(&data_path, 30);

    let records = load_records(&data_path).unwrap();
    assert_eq!(records.len(), 32);
    assert_eq!(records.iter().filter(|r| r.status.is_some()).count(), 30);

    let garbage = &records[31];
    assert_eq!(garbage.founded_at, None);
    assert_eq!(garbage.relationships, None);
    assert_eq!(garbage.funding_total_usd, None);
    assert_eq!(garbage.category_code, None);
}

#[test]
fn test_train_save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().join("startups.csv");
    common::write_csv(&data_path, 90);

    let mut config = common::fast_config(ModelType::Stacking);
    config.data_path = data_path.clone();
    config.output_path = dir.path().join("nested").join("model.bin");

    let report = Trainer::new(config).run().unwrap();
    assert!(report.package_path.exists());

    let bytes = std::fs::read(&report.package_path).unwrap();
    assert_eq!(checksum(&bytes), report.checksum);

    let loaded = ModelPackage::load(&report.package_path).unwrap();
    let trained = &report.outcome.package;
    assert_eq!(loaded.threshold, trained.threshold);
    assert_eq!(loaded.feature_names(), trained.feature_names());
    assert_eq!(loaded.metadata.model_type, ModelType::Stacking);
    assert_eq!(loaded.metadata.feature_set, FeatureSet::Advanced);

    let records = load_records(&data_path).unwrap();
    assert_eq!(
        loaded.predict_proba(&records).unwrap(),
        trained.predict_proba(&records).unwrap()
    );
    assert!(report.outcome.metrics.accuracy > 0.8);

    let sidecar = checksum_path(&report.package_path);
    assert_eq!(std::fs::read_to_string(&sidecar).unwrap().trim(), report.checksum);
    std::fs::write(&sidecar, checksum(b"tampered")).unwrap();
    assert!(ModelPackage::load(&report.package_path).is_err());
}

#[test]
fn test_incomplete_record_is_scored() {
    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().join("startups.csv");
    common::write_csv(&data_path, 60);

    let config = common::fast_config(ModelType::GradientBoosting);
    let package = Trainer::new(config)
        .train(load_records(&data_path).unwrap())
        .unwrap()
        .package;

    // Nothing known but the sector, which was never seen in training
    let record = StartupRecord {
        category_code: Some("space".to_string()),
        ..Default::default()
    };
    let scored = package.predict(&record).unwrap();
    assert!((0.0..=1.0).contains(&scored.probability));
    assert_eq!(scored.positive, scored.probability >= scored.threshold);
}

#[test]
fn test_rescan_writes_report() {
    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().join("startups.csv");
    common::write_csv(&data_path, 90);

    let records = load_records(&data_path).unwrap();
    let mut package = Trainer::new(common::fast_config(ModelType::GradientBoosting))
        .train(records.clone())
        .unwrap()
        .package;

    let config = ThresholdConfig {
        objective: ThresholdObjective::MinErrors,
        ..Default::default()
    };
    let analysis = rescan_thresholds(&mut package, records, &config).unwrap();
    assert_eq!(analysis.selected, analysis.min_errors);
    assert_eq!(package.threshold, analysis.min_errors);

    let report_path = dir.path().join("thresholds.csv");
    analysis.write_csv(&report_path).unwrap();
    let report = std::fs::read_to_string(&report_path).unwrap();
    let mut lines = report.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("threshold,accuracy,precision,recall"));
    assert!(header.contains(",fn,"));
    assert_eq!(lines.count(), analysis.rows.len());
}

#[test]
fn test_missing_data_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::fast_config(ModelType::GradientBoosting);
    config.data_path = dir.path().join("absent.csv");
    config.output_path = dir.path().join("model.bin");

    assert!(Trainer::new(config).run().is_err());
    assert!(!dir.path().join("model.bin").exists());
}
