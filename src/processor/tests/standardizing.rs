//! Standardization pipeline tests

use super::write_raw;
use crate::catalog::CatalogMerger;
use crate::config::PipelineConfig;
use crate::constants::{DEPTH, PRESS, PSAL, TEMP, TIMESTAMP};
use crate::models::AttrValue;
use crate::processor::{StandardizePipeline, TagPipeline};
use crate::store;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_standardize_tagged_stores() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("ctd");
    write_raw(&root, "MEDS_2021", "casts", &[70.0, 75.0]);
    TagPipeline::new(&root, temp_dir.path().join("catalog"), PipelineConfig::default())
        .unwrap()
        .run()
        .unwrap();

    let stats = StandardizePipeline::new(&root, PipelineConfig::default())
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(stats.datasets_processed, 1);
    assert_eq!(stats.datasets_failed, 0);

    let ds = store::open(&root.join("MEDS_2021/standard/casts_id_standard")).unwrap();
    assert_eq!(ds.name(), "casts_id_standard");
    let press = ds.f64_values(PRESS).unwrap();
    assert_eq!(press.len(), 4);
    assert!(press.iter().all(|p| *p > 0.0));
    assert_eq!(ds.f64_values(DEPTH).unwrap(), vec![5.0, 50.0, 5.0, 50.0]);

    assert!(ds.f64_values(PSAL).unwrap().iter().all(|s| s.is_nan()));
    assert_eq!(
        ds.variable_attrs(TEMP).unwrap().get("lentemp"),
        Some(&AttrValue::Int(4))
    );
    assert_eq!(ds.f64_values(TIMESTAMP).unwrap()[0], 1_564_660_800.0);
    assert_eq!(ds.attr("orig_filename"), Some(&AttrValue::from("casts")));
}

#[test]
fn test_failed_dataset_does_not_stop_siblings() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("ctd");
    write_raw(&root, "MEDS_2021", "casts", &[70.0]);
    TagPipeline::new(&root, temp_dir.path().join("catalog"), PipelineConfig::default())
        .unwrap()
        .run()
        .unwrap();

    // A tagged store with neither depth nor pressure
    let mut bare = super::cast_dataset("bare", &[71.0]);
    bare.drop_variable(DEPTH);
    store::save(
        &bare,
        &root.join("MEDS_2021/tagged/bare_id"),
        crate::config::CompressionAlgorithm::Snappy,
    )
    .unwrap();

    let stats = StandardizePipeline::new(&root, PipelineConfig::default())
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(stats.datasets_failed, 1);
    assert_eq!(stats.datasets_processed, 1);
    assert!(root.join("MEDS_2021/standard/casts_id_standard").exists());
    assert!(!root.join("MEDS_2021/standard/bare_id_standard").exists());

    // Standardizing never touches the catalog
    assert_eq!(
        CatalogMerger::new(temp_dir.path().join("catalog"))
            .existing_ids()
            .unwrap()
            .len(),
        1
    );
    assert!(fs::read_dir(root.join("MEDS_2021/raw")).unwrap().count() == 1);
}
