//! Dataset store persistence.
//!
//! A dataset is stored as a directory:
//!
//! ```text
//! <store>/
//!   dataset.json        manifest: name, generation, tables, attributes
//!   profile-0.parquet   one table per dimension
//!   obs-0.parquet
//! ```
//!
//! Rewrites never touch the tables of the live generation. New tables are
//! written under the next generation number, then a fresh manifest is
//! renamed over the old one. A rewrite that fails part-way leaves the
//! previous store readable as it was.

use crate::config::CompressionAlgorithm;
use crate::constants::{
    DIMENSION_FILE_EXTENSION, MANIFEST_FILE, MANIFEST_TMP_FILE, dimension_filename,
};
use crate::error::{CtdError, Result};
use crate::models::{Attributes, Dataset};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    name: String,
    #[serde(default)]
    generation: u64,
    /// Dimension name → table file
    tables: BTreeMap<String, String>,
    #[serde(default)]
    coordinates: Vec<String>,
    #[serde(default)]
    attributes: Attributes,
    #[serde(default)]
    variable_attributes: BTreeMap<String, Attributes>,
}

fn read_manifest(path: &Path) -> Result<Manifest> {
    Ok(serde_json::from_reader(File::open(path.join(MANIFEST_FILE))?)?)
}

/// Check whether a path holds a dataset store
pub fn is_store(path: &Path) -> bool {
    path.join(MANIFEST_FILE).is_file()
}

/// Load a dataset store
pub fn open(path: &Path) -> Result<Dataset> {
    if !is_store(path) {
        return Err(CtdError::DatasetNotFound {
            path: path.to_path_buf(),
        });
    }

    let manifest = read_manifest(path)?;
    let mut dataset = Dataset::new(manifest.name);

    for (dim, table) in &manifest.tables {
        let file = File::open(path.join(table))?;
        let frame = ParquetReader::new(file).finish()?;
        dataset.replace_dimension(dim.clone(), frame);
    }
    for (key, value) in manifest.attributes {
        dataset.set_attr(key, value);
    }
    for (var, attrs) in manifest.variable_attributes {
        for (key, value) in attrs {
            dataset.set_variable_attr(&var, key, value);
        }
    }
    dataset.set_coordinates(manifest.coordinates);

    debug!(
        "Opened dataset {} from {} (generation {}, {} dimensions)",
        dataset.name(),
        path.display(),
        manifest.generation,
        manifest.tables.len()
    );
    Ok(dataset)
}

/// Write a dataset store, replacing any store already at `path`
///
/// The previous store stays readable until the new manifest is in place.
pub fn save(dataset: &Dataset, path: &Path, compression: CompressionAlgorithm) -> Result<()> {
    fs::create_dir_all(path)?;

    let generation = if is_store(path) {
        match read_manifest(path) {
            Ok(previous) => previous.generation + 1,
            Err(e) => {
                warn!("Replacing unreadable store {}: {}", path.display(), e);
                0
            }
        }
    } else {
        0
    };

    let mut tables = BTreeMap::new();
    for dim in dataset.dimension_names() {
        let Some(frame) = dataset.dimension(dim) else {
            continue;
        };
        let mut frame = frame.clone();
        let table = dimension_filename(dim, generation);
        let file = File::create(path.join(&table))?;
        ParquetWriter::new(file)
            .with_compression(compression.to_polars_compression())
            .finish(&mut frame)?;
        tables.insert(dim.to_string(), table);
    }

    let manifest = Manifest {
        name: dataset.name().to_string(),
        generation,
        tables,
        coordinates: dataset.coordinates().to_vec(),
        attributes: dataset.attrs().clone(),
        variable_attributes: dataset.all_variable_attrs().clone(),
    };
    let tmp_path = path.join(MANIFEST_TMP_FILE);
    let file = File::create(&tmp_path)?;
    serde_json::to_writer_pretty(&file, &manifest)?;
    file.sync_all()?;
    fs::rename(&tmp_path, path.join(MANIFEST_FILE))?;

    remove_stale_tables(path, &manifest);
    debug!(
        "Wrote dataset {} to {} (generation {})",
        dataset.name(),
        path.display(),
        generation
    );
    Ok(())
}

/// Delete table files the live manifest no longer references
fn remove_stale_tables(path: &Path, manifest: &Manifest) {
    let Ok(entries) = fs::read_dir(path) else {
        return;
    };
    for entry in entries.flatten() {
        let file_path = entry.path();
        let is_table = file_path
            .extension()
            .is_some_and(|ext| ext == DIMENSION_FILE_EXTENSION);
        let referenced = entry
            .file_name()
            .to_str()
            .is_some_and(|name| manifest.tables.values().any(|t| t == name));
        if !is_table || referenced || !file_path.is_file() {
            continue;
        }
        if let Err(e) = fs::remove_file(&file_path) {
            warn!("Could not remove stale table {}: {}", file_path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DEPTH, LAT, OBS_DIM, PROFILE_DIM};
    use crate::models::AttrValue;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_open_preserves_layout() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cruise_2019");

        let mut ds = Dataset::new("cruise_2019");
        ds.set_variable(PROFILE_DIM, Series::new(LAT.into(), &[74.5, 75.1]))
            .unwrap();
        ds.set_variable(OBS_DIM, Series::new(DEPTH.into(), &[5.0, 10.0, 5.0]))
            .unwrap();
        ds.set_attr("platform", "CCGS Amundsen");
        ds.set_attr("num_casts", 2i64);
        ds.set_variable_attr(DEPTH, "units", "m");
        ds.set_coordinates(vec![LAT.to_string()]);

        save(&ds, &path, CompressionAlgorithm::Snappy).unwrap();
        assert!(is_store(&path));

        let loaded = open(&path).unwrap();
        assert_eq!(loaded.name(), "cruise_2019");
        assert_eq!(loaded.dimension_len(OBS_DIM), Some(3));
        assert_eq!(loaded.f64_values(LAT).unwrap(), vec![74.5, 75.1]);
        assert_eq!(loaded.attr("num_casts"), Some(&AttrValue::Int(2)));
        assert_eq!(
            loaded.variable_attrs(DEPTH).unwrap().get("units"),
            Some(&AttrValue::from("m"))
        );
        assert_eq!(loaded.coordinates(), &[LAT.to_string()]);
    }

    #[test]
    fn test_open_missing_store() {
        let temp_dir = TempDir::new().unwrap();
        match open(&temp_dir.path().join("absent")) {
            Err(CtdError::DatasetNotFound { .. }) => {}
            other => panic!(
                "Expected DatasetNotFound, got {:?}",
                other.map(|d| d.name().to_string())
            ),
        }
    }

    #[test]
    fn test_directory_without_manifest_is_not_a_store() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("profile-0.parquet"), b"partial").unwrap();
        assert!(!is_store(temp_dir.path()));
    }

    fn profile_store(lats: &[f64]) -> Dataset {
        let mut ds = Dataset::new("catalog");
        ds.set_variable(PROFILE_DIM, Series::new(LAT.into(), lats))
            .unwrap();
        ds
    }

    #[test]
    fn test_rewrite_replaces_generation() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog");

        save(&profile_store(&[70.0]), &path, CompressionAlgorithm::Snappy).unwrap();
        save(&profile_store(&[70.0, 71.0]), &path, CompressionAlgorithm::Snappy).unwrap();

        assert_eq!(open(&path).unwrap().f64_values(LAT).unwrap(), vec![70.0, 71.0]);
        assert!(path.join(dimension_filename(PROFILE_DIM, 1)).is_file());
        assert!(!path.join(dimension_filename(PROFILE_DIM, 0)).exists());
        assert!(!path.join(MANIFEST_TMP_FILE).exists());
    }

    #[test]
    fn test_failed_rewrite_keeps_previous_store() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog");
        save(&profile_store(&[70.0, 71.0]), &path, CompressionAlgorithm::Snappy).unwrap();

        // Block the next generation's table so the rewrite fails
        fs::create_dir(path.join(dimension_filename(PROFILE_DIM, 1))).unwrap();
        assert!(save(&profile_store(&[1.0]), &path, CompressionAlgorithm::Snappy).is_err());

        assert!(is_store(&path));
        assert_eq!(open(&path).unwrap().f64_values(LAT).unwrap(), vec![70.0, 71.0]);
    }
}
