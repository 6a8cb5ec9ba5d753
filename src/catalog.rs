//! Consolidated profile metadata catalog.
//!
//! The catalog is a single store with one `profile` dimension holding the
//! metadata of every tagged profile (no observations). Each merge reloads
//! the existing catalog, appends the new per-source batches after it and
//! rewrites the whole store. Rows are never modified or reordered, and no
//! de-duplication happens here; uniqueness is guaranteed at allocation time.

use crate::allocator::is_valid_profile_id;
use crate::config::CompressionAlgorithm;
use crate::constants::{
    CATALOG_DATE_FORMAT, CATALOG_FIELDS, COORDINATE_FIELDS, CREATION_DATE_ATTR, CatalogField,
    FieldKind, MODIFIED_DATE_ATTR, PROFILE_DIM, PROFILE_ID,
};
use crate::error::{CtdError, Result};
use crate::models::{AttrValue, Dataset};
use crate::store;
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

fn field_dtype(kind: FieldKind) -> DataType {
    match kind {
        FieldKind::Text => DataType::String,
        FieldKind::Float => DataType::Float64,
    }
}

/// Gather the catalog fields of one dataset into a per-profile table
///
/// Each field is resolved in order: a variable on the `profile` dimension
/// is used as is; a dataset-level attribute is repeated for every profile;
/// anything else becomes a column of nulls.
pub fn build_batch(dataset: &Dataset) -> Result<DataFrame> {
    let rows = dataset.profile_count()?;
    let columns = CATALOG_FIELDS
        .iter()
        .map(|field| resolve_field(dataset, field, rows).map(IntoColumn::into_column))
        .collect::<Result<Vec<_>>>()?;
    Ok(DataFrame::new(columns)?)
}

fn resolve_field(dataset: &Dataset, field: &CatalogField, rows: usize) -> Result<Series> {
    let dtype = field_dtype(field.kind);

    match dataset.dimension_of(field.name) {
        Some(PROFILE_DIM) => {
            let series = dataset
                .column(field.name)?
                .as_materialized_series()
                .cast(&dtype)?;
            return Ok(series);
        }
        Some(other) => warn!(
            "{}: '{}' is defined on dimension '{}', not per profile; ignoring it",
            dataset.name(),
            field.name,
            other
        ),
        None => {}
    }

    if let Some(value) = dataset.attr(field.name) {
        let name: PlSmallStr = field.name.into();
        let series = match value {
            AttrValue::Text(v) => Series::new(name, vec![v.as_str(); rows]),
            AttrValue::Int(v) => Series::new(name, vec![*v; rows]),
            AttrValue::Float(v) => Series::new(name, vec![*v; rows]),
        };
        return Ok(series.cast(&dtype)?);
    }

    Ok(Series::full_null(field.name.into(), rows, &dtype))
}

/// Result of inspecting a catalog's identifiers
#[derive(Debug, Default, Clone)]
pub struct CatalogReport {
    pub profiles: usize,
    /// Identifiers occurring more than once, with their counts
    pub duplicates: Vec<(String, usize)>,
    /// Identifiers not matching `[A-Z][A-Z0-9]{4}`
    pub malformed: Vec<String>,
    /// Rows without an identifier
    pub missing: usize,
}

impl CatalogReport {
    pub fn is_clean(&self) -> bool {
        self.duplicates.is_empty() && self.malformed.is_empty() && self.missing == 0
    }
}

/// Inspect the identifiers of a loaded catalog
pub fn inspect(catalog: &Dataset) -> Result<CatalogReport> {
    let ids = catalog.string_values(PROFILE_ID)?;
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut report = CatalogReport {
        profiles: ids.len(),
        ..Default::default()
    };

    for id in &ids {
        match id {
            Some(id) => {
                *counts.entry(id.as_str()).or_default() += 1;
                if !is_valid_profile_id(id) {
                    report.malformed.push(id.clone());
                }
            }
            None => report.missing += 1,
        }
    }

    report.duplicates = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(id, count)| (id.to_string(), count))
        .collect();
    report.duplicates.sort();
    report.malformed.sort();
    report.malformed.dedup();
    Ok(report)
}

/// Builds and extends the catalog store at a fixed path
#[derive(Debug, Clone)]
pub struct CatalogMerger {
    path: PathBuf,
    compression: CompressionAlgorithm,
}

impl CatalogMerger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            compression: CompressionAlgorithm::Snappy,
        }
    }

    pub fn with_compression(mut self, compression: CompressionAlgorithm) -> Self {
        self.compression = compression;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        store::is_store(&self.path)
    }

    /// Load the catalog, or `None` if it has not been created yet
    pub fn load(&self) -> Result<Option<Dataset>> {
        if !self.exists() {
            return Ok(None);
        }
        store::open(&self.path).map(Some)
    }

    /// Every identifier already recorded in the catalog
    ///
    /// A missing catalog means no identifiers are in use yet.
    pub fn existing_ids(&self) -> Result<HashSet<String>> {
        match self.load()? {
            Some(catalog) => {
                let ids: HashSet<String> = catalog
                    .string_values(PROFILE_ID)?
                    .into_iter()
                    .flatten()
                    .collect();
                debug!("Loaded {} existing profile IDs", ids.len());
                Ok(ids)
            }
            None => {
                info!(
                    "Catalog {} does not exist yet, starting with no profile IDs",
                    self.path.display()
                );
                Ok(HashSet::new())
            }
        }
    }

    /// Append the metadata of `batches` to the catalog and rewrite it
    ///
    /// Returns the number of catalog rows after the merge. Merging the same
    /// batch twice duplicates its rows.
    pub fn merge(&self, batches: &[Dataset]) -> Result<usize> {
        let existing = self.load()?;

        let mut frames = Vec::with_capacity(batches.len() + 1);
        let mut creation_date = None;
        if let Some(catalog) = &existing {
            frames.push(build_batch(catalog)?);
            creation_date = catalog.attr(CREATION_DATE_ATTR).cloned();
        }
        for batch in batches {
            frames.push(build_batch(batch)?);
        }

        let mut frames = frames.into_iter();
        let Some(mut combined) = frames.next() else {
            debug!("Nothing to merge into {}", self.path.display());
            return Ok(0);
        };
        for frame in frames {
            combined.vstack_mut(&frame)?;
        }
        let rows = combined.height();

        let catalog = self.assemble(combined, creation_date);
        store::save(&catalog, &self.path, self.compression)?;

        info!(
            "Catalog {} now holds {} profiles ({} new)",
            self.path.display(),
            rows,
            batches.iter().map(|b| b.profile_count().unwrap_or(0)).sum::<usize>()
        );
        Ok(rows)
    }

    fn assemble(&self, frame: DataFrame, creation_date: Option<AttrValue>) -> Dataset {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "catalog".to_string());
        let now = chrono::Local::now().format(CATALOG_DATE_FORMAT).to_string();

        let mut catalog = Dataset::new(name);
        catalog.replace_dimension(PROFILE_DIM, frame);
        catalog.set_coordinates(COORDINATE_FIELDS.iter().map(|c| c.to_string()).collect());
        catalog.set_attr(
            CREATION_DATE_ATTR,
            creation_date.unwrap_or_else(|| AttrValue::Text(now.clone())),
        );
        catalog.set_attr(MODIFIED_DATE_ATTR, now);
        catalog
    }
}

/// Check that a catalog has the expected field layout
pub fn validate_layout(catalog: &Dataset) -> Result<()> {
    for field in CATALOG_FIELDS {
        if catalog.dimension_of(field.name) != Some(PROFILE_DIM) {
            return Err(CtdError::missing_variable(catalog.name(), field.name));
        }
    }
    Ok(())
}
