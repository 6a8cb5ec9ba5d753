//! Tagging pipeline tests

use super::write_raw;
use crate::allocator::{IdAllocator, is_valid_profile_id};
use crate::catalog::{CatalogMerger, inspect};
use crate::config::PipelineConfig;
use crate::constants::{PROFILE_DIM, PROFILE_ID, PROFILE_ID_LEGACY};
use crate::models::AttrValue;
use crate::processor::TagPipeline;
use crate::store;
use polars::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashSet;
use tempfile::TempDir;

fn catalog_ids(catalog: &CatalogMerger) -> Vec<String> {
    let ds = catalog.load().unwrap().unwrap();
    ds.string_values(PROFILE_ID)
        .unwrap()
        .into_iter()
        .flatten()
        .collect()
}

#[test]
fn test_tag_run_writes_stores_and_catalog() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("ctd");
    write_raw(&root, "MEDS_2021", "casts_a", &[70.0, 71.0]);
    write_raw(&root, "MEDS_2021", "casts_b", &[72.0]);
    write_raw(&root, "IOS", "casts", &[60.0, 61.0, 62.0]);
    std::fs::create_dir_all(root.join("empty_source")).unwrap();

    let catalog_path = temp_dir.path().join("catalog");
    let pipeline = TagPipeline::new(&root, &catalog_path, PipelineConfig::default()).unwrap();
    let stats = pipeline.run().unwrap();

    assert_eq!(stats.sources_processed, 2);
    assert_eq!(stats.datasets_processed, 3);
    assert_eq!(stats.datasets_failed, 0);
    assert_eq!(stats.profiles_tagged, 6);
    assert_eq!(stats.catalog_rows, 6);

    let tagged = store::open(&root.join("MEDS_2021/tagged/casts_a_id")).unwrap();
    assert_eq!(tagged.name(), "casts_a_id");
    assert_eq!(tagged.dimension_of(PROFILE_ID), Some(PROFILE_DIM));
    assert_eq!(
        tagged.attr("dataset_name"),
        Some(&AttrValue::from("MEDS_2021"))
    );

    // Sources in sorted order: IOS first
    let ids = catalog_ids(pipeline.catalog());
    assert_eq!(ids.len(), 6);
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 6);
    assert!(ids.iter().all(|id| is_valid_profile_id(id)));
    let first_source = tagged_ids(&root.join("IOS/tagged/casts_id"));
    assert_eq!(&ids[..3], first_source.as_slice());

    let report = inspect(&pipeline.catalog().load().unwrap().unwrap()).unwrap();
    assert!(report.is_clean());
}

fn tagged_ids(path: &std::path::Path) -> Vec<String> {
    store::open(path)
        .unwrap()
        .string_values(PROFILE_ID)
        .unwrap()
        .into_iter()
        .flatten()
        .collect()
}

#[test]
fn test_second_run_appends_and_avoids_existing_ids() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("first");
    write_raw(&root, "MEDS_2021", "casts", &[70.0, 71.0]);
    let catalog_path = temp_dir.path().join("catalog");

    TagPipeline::new(&root, &catalog_path, PipelineConfig::default())
        .unwrap()
        .run()
        .unwrap();
    let before = catalog_ids(&CatalogMerger::new(&catalog_path));

    let second_root = temp_dir.path().join("second");
    write_raw(&second_root, "AWI", "casts", &[80.0, 81.0, 82.0]);
    let pipeline =
        TagPipeline::new(&second_root, &catalog_path, PipelineConfig::default()).unwrap();

    // Seeded from the catalog, so the first run's IDs are excluded
    let existing = pipeline.catalog().existing_ids().unwrap();
    let mut allocator = IdAllocator::with_rng(existing, StdRng::seed_from_u64(11));
    let stats = pipeline.run_with_allocator(&mut allocator).unwrap();
    assert_eq!(stats.catalog_rows, 5);

    let after = catalog_ids(pipeline.catalog());
    assert_eq!(after.len(), 5);
    assert_eq!(&after[..2], before.as_slice());
    assert_eq!(after.iter().collect::<HashSet<_>>().len(), 5);
}

#[test]
fn test_guard_aborts_rest_of_source() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("ctd");
    write_raw(&root, "MEDS_2021", "a_casts", &[70.0]);
    write_raw(&root, "MEDS_2021", "c_casts", &[72.0]);
    write_raw(&root, "OTHER", "casts", &[60.0]);

    // Middle store already carries an identifier under the legacy name
    let mut tagged = super::cast_dataset("b_casts", &[71.0]);
    tagged
        .set_variable(PROFILE_DIM, Series::new(PROFILE_ID_LEGACY.into(), &["QQQQQ"]))
        .unwrap();
    store::save(
        &tagged,
        &root.join("MEDS_2021/raw/b_casts"),
        crate::config::CompressionAlgorithm::Snappy,
    )
    .unwrap();

    let catalog_path = temp_dir.path().join("catalog");
    let pipeline = TagPipeline::new(&root, &catalog_path, PipelineConfig::default()).unwrap();
    let mut allocator = IdAllocator::with_rng(HashSet::new(), StdRng::seed_from_u64(5));
    let stats = pipeline.run_with_allocator(&mut allocator).unwrap();

    assert_eq!(stats.sources_aborted, 1);
    assert_eq!(stats.sources_processed, 1);
    assert_eq!(stats.datasets_processed, 2);
    assert_eq!(stats.datasets_failed, 1);

    assert!(root.join("MEDS_2021/tagged/a_casts_id").exists());
    assert!(!root.join("MEDS_2021/tagged/c_casts_id").exists());

    // a_casts was merged before the abort took effect
    assert_eq!(catalog_ids(pipeline.catalog()).len(), 2);
}

#[test]
fn test_unreadable_store_is_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("ctd");
    write_raw(&root, "MEDS_2021", "good", &[70.0]);
    let broken = root.join("MEDS_2021/raw/broken");
    std::fs::create_dir_all(&broken).unwrap();
    std::fs::write(
        broken.join("dataset.json"),
        r#"{"name": "broken", "tables": {"profile": "profile-0.parquet"}}"#,
    )
    .unwrap();

    let catalog_path = temp_dir.path().join("catalog");
    let stats = TagPipeline::new(&root, &catalog_path, PipelineConfig::default())
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(stats.datasets_failed, 1);
    assert_eq!(stats.datasets_processed, 1);
    assert_eq!(stats.sources_processed, 1);
    assert_eq!(stats.catalog_rows, 1);
}
