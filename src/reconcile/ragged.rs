//! Ragged observation addressing.
//!
//! Observation arrays are flat; the link back to the owning profile is one
//! of (checked in this order):
//!
//! - `<var>_row_size` on the profile dimension, one count per profile, for
//!   sources storing each variable on its own ragged dimension
//! - `parent_index` on the observation dimension, one profile index per sample
//! - `row_size` on the profile dimension for a shared observation dimension
//! - nothing at all, when the dataset holds a single profile

use crate::constants::{DEPTH, PARENT_INDEX, PRESS, PROFILE_DIM, ROW_SIZE, row_size_name};
use crate::error::{CtdError, Result};
use crate::models::Dataset;
use polars::prelude::*;
use tracing::debug;

/// Expand per-profile counts into one profile index per sample
pub fn expand_rows(row_sizes: &[usize]) -> Vec<usize> {
    row_sizes
        .iter()
        .enumerate()
        .flat_map(|(profile, &count)| std::iter::repeat_n(profile, count))
        .collect()
}

/// Whether depth and pressure carry their own row-size arrays
pub fn uses_per_variable_rows(dataset: &Dataset) -> bool {
    [DEPTH, PRESS]
        .iter()
        .any(|var| dataset.contains(&row_size_name(var)))
}

/// Number of profiles, treating a dataset without a profile dimension as one
fn profiles_or_single(dataset: &Dataset) -> usize {
    dataset.dimension_len(PROFILE_DIM).unwrap_or(1)
}

/// Owning profile of every sample of `var`
pub fn parent_indices(dataset: &Dataset, var: &str) -> Result<Vec<usize>> {
    let dim = dataset
        .dimension_of(var)
        .ok_or_else(|| CtdError::missing_variable(dataset.name(), var))?;
    let samples = dataset.dimension_len(dim).unwrap_or(0);
    let profiles = profiles_or_single(dataset);

    let own_rows = row_size_name(var);
    let (source, parents) = if dataset.contains(&own_rows) {
        (own_rows.clone(), expand_rows(&dataset.index_values(&own_rows)?))
    } else if dataset.dimension_of(PARENT_INDEX) == Some(dim) {
        (PARENT_INDEX.to_string(), dataset.index_values(PARENT_INDEX)?)
    } else if dataset.contains(ROW_SIZE) {
        (ROW_SIZE.to_string(), expand_rows(&dataset.index_values(ROW_SIZE)?))
    } else if dim == PROFILE_DIM || profiles == 1 {
        // Samples on the profile dimension own themselves
        let parents = if dim == PROFILE_DIM {
            (0..samples).collect()
        } else {
            vec![0; samples]
        };
        return Ok(parents);
    } else {
        return Err(CtdError::missing_variable(dataset.name(), PARENT_INDEX));
    };

    if parents.len() != samples {
        return Err(CtdError::invalid_variable(
            dataset.name(),
            &source,
            format!("addresses {} samples but '{}' has {}", parents.len(), var, samples),
        ));
    }
    if let Some(bad) = parents.iter().find(|&&p| p >= profiles) {
        return Err(CtdError::invalid_variable(
            dataset.name(),
            &source,
            format!("profile index {} out of range for {} profiles", bad, profiles),
        ));
    }
    Ok(parents)
}

/// Reindex a ragged dimension so profile `i` has `target[i]` rows,
/// appending null rows where it had fewer
fn pad_dimension(frame: &DataFrame, current: &[usize], target: &[usize]) -> Result<DataFrame> {
    let mut indices: Vec<Option<IdxSize>> = Vec::with_capacity(target.iter().sum());
    let mut offset = 0usize;
    for (&have, &want) in current.iter().zip(target) {
        indices.extend((offset..offset + have).map(|row| Some(row as IdxSize)));
        indices.extend(std::iter::repeat_n(None, want - have));
        offset += have;
    }
    let idx: IdxCa = indices.into_iter().collect();
    Ok(frame.take(&idx)?)
}

/// Co-index separately ragged depth and pressure arrays
///
/// A profile with no samples of one variable gets missing samples up to the
/// other variable's count, and the row-size arrays are rewritten to match.
/// Returns the number of profiles that were padded.
pub fn align_row_sizes(dataset: &mut Dataset) -> Result<usize> {
    let depth_rows_name = row_size_name(DEPTH);
    let press_rows_name = row_size_name(PRESS);
    if !dataset.contains(&depth_rows_name) || !dataset.contains(&press_rows_name) {
        return Ok(0);
    }

    let depth_rows = dataset.index_values(&depth_rows_name)?;
    let press_rows = dataset.index_values(&press_rows_name)?;

    let mut target = Vec::with_capacity(depth_rows.len());
    let mut padded = 0;
    for (profile, (&d, &p)) in depth_rows.iter().zip(&press_rows).enumerate() {
        let rows = match (d, p) {
            _ if d == p => d,
            (0, p) => p,
            (d, 0) => d,
            _ => {
                return Err(CtdError::RaggedMismatch {
                    dataset: dataset.name().to_string(),
                    profile,
                    depth_rows: d,
                    press_rows: p,
                });
            }
        };
        if rows != d || rows != p {
            padded += 1;
        }
        target.push(rows);
    }
    if padded == 0 {
        return Ok(0);
    }

    let same_dimension = dataset.dimension_of(DEPTH).is_some()
        && dataset.dimension_of(DEPTH) == dataset.dimension_of(PRESS);
    if same_dimension {
        return Err(CtdError::invalid_variable(
            dataset.name(),
            &press_rows_name,
            "differs from depth_row_size on a shared dimension",
        ));
    }

    for (var, rows_name, current) in [
        (DEPTH, &depth_rows_name, &depth_rows),
        (PRESS, &press_rows_name, &press_rows),
    ] {
        if *current != target {
            if let Some(dim) = dataset.dimension_of(var).map(str::to_string) {
                let frame = dataset
                    .dimension(&dim)
                    .ok_or_else(|| CtdError::MissingDimension {
                        dataset: dataset.name().to_string(),
                        dimension: dim.clone(),
                    })?;
                let expected: usize = current.iter().sum();
                if frame.height() != expected {
                    return Err(CtdError::invalid_variable(
                        dataset.name(),
                        rows_name,
                        format!("sums to {} but '{}' has {} rows", expected, dim, frame.height()),
                    ));
                }
                let frame = pad_dimension(frame, current, &target)?;
                dataset.replace_dimension(dim, frame);
            }
        }

        let sizes: Vec<i64> = target.iter().map(|&n| n as i64).collect();
        dataset.set_variable(PROFILE_DIM, Series::new(rows_name.as_str().into(), sizes))?;
    }

    debug!(
        "{}: padded {} profiles to co-index depth and pressure",
        dataset.name(),
        padded
    );
    Ok(padded)
}
