//! Variable-name normalisation and provenance defaults.

use crate::constants::{VARIABLE_ALIASES, row_size_name};
use crate::error::Result;
use crate::models::Dataset;
use tracing::debug;

const DATASET_NAME: &str = "dataset_name";
const ORIG_FILENAME: &str = "orig_filename";

/// Rename alternative variable names to their canonical form
///
/// An alias is only renamed when the canonical name is not already taken,
/// so a store carrying both keeps both. Per-variable row sizes follow the
/// variable they address. Returns the number of renamed variables.
pub fn normalize_aliases(dataset: &mut Dataset) -> Result<usize> {
    let mut renamed = 0;
    for (alias, canonical) in VARIABLE_ALIASES {
        if !dataset.contains(alias) || dataset.contains(canonical) {
            continue;
        }
        dataset.rename_variable(alias, canonical)?;

        let alias_rows = row_size_name(alias);
        let canonical_rows = row_size_name(canonical);
        if dataset.contains(&alias_rows) && !dataset.contains(&canonical_rows) {
            dataset.rename_variable(&alias_rows, &canonical_rows)?;
        }

        debug!("{}: renamed '{}' to '{}'", dataset.name(), alias, canonical);
        renamed += 1;
    }
    Ok(renamed)
}

/// Fill `dataset_name` and `orig_filename` attributes when the store
/// carries neither a variable nor an attribute for them
pub fn fill_provenance(dataset: &mut Dataset, source: &str, orig_filename: &str) {
    for (field, value) in [(DATASET_NAME, source), (ORIG_FILENAME, orig_filename)] {
        if dataset.contains(field) || dataset.attr(field).is_some() || value.is_empty() {
            continue;
        }
        dataset.set_attr(field, value);
    }
}
