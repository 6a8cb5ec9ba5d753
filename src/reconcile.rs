//! Physical standardization of tagged datasets.
//!
//! [`Standardizer`] is a pure per-dataset transform applied in a fixed
//! order: variable aliases, timezone normalisation, timestamp derivation,
//! depth/pressure reconciliation, salinity from conductivity (or an
//! all-missing fallback) and sample summaries.

pub mod aliases;
pub mod ragged;
pub mod summary;
pub mod teos;
pub mod timezone;

use crate::config::PipelineConfig;
use crate::constants::{
    CONDUCTIVITY, DEPTH, LAT, PRESS, PROFILE_DIM, PSAL, TEMP, row_size_name,
};
use crate::error::{CtdError, Result};
use crate::models::Dataset;
use chrono_tz::Tz;
use polars::prelude::*;
use std::collections::BTreeMap;
use teos::DepthConvention;
use tracing::{debug, warn};

pub use teos::{p_from_z, sp_from_c, z_from_p};

/// Applies the standardization steps to one dataset at a time
#[derive(Debug, Clone)]
pub struct Standardizer {
    timezone_rules: BTreeMap<String, Tz>,
    datestr_format: String,
    normalize_aliases: bool,
}

impl Standardizer {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            timezone_rules: config.resolved_timezone_rules()?,
            datestr_format: config.datestr_format.clone(),
            normalize_aliases: config.normalize_aliases,
        })
    }

    /// Standardize a dataset in place
    pub fn standardize(&self, dataset: &mut Dataset) -> Result<()> {
        if self.normalize_aliases {
            aliases::normalize_aliases(dataset)?;
        }
        timezone::normalize_timezones(dataset, &self.timezone_rules, &self.datestr_format)?;
        timezone::derive_timestamps(dataset, &self.datestr_format)?;
        reconcile_depth_pressure(dataset)?;
        ensure_salinity(dataset)?;
        summary::annotate(dataset)?;

        debug!("Standardized {}", dataset.name());
        Ok(())
    }
}

/// Fill depth and pressure from each other
///
/// With one array absent the other is converted in full. With both present
/// only the NaN slots of each are filled, so measured values never change.
/// Derived depth follows the sign convention of the given depth array, or
/// positive-down when there is none.
pub fn fill_depth_pressure(
    depth: Option<&[f64]>,
    press: Option<&[f64]>,
    lat: &[f64],
) -> (Vec<f64>, Vec<f64>) {
    match (depth, press) {
        (Some(depth), Some(press)) => {
            let convention = DepthConvention::detect(depth);
            let derived_press = teos::pressure_from_depth(depth, lat);
            let derived_depth = teos::depth_from_pressure(press, lat, convention);
            (fill_missing(depth, &derived_depth), fill_missing(press, &derived_press))
        }
        (Some(depth), None) => (depth.to_vec(), teos::pressure_from_depth(depth, lat)),
        (None, Some(press)) => (
            teos::depth_from_pressure(press, lat, DepthConvention::PositiveDown),
            press.to_vec(),
        ),
        (None, None) => (Vec::new(), Vec::new()),
    }
}

fn fill_missing(measured: &[f64], derived: &[f64]) -> Vec<f64> {
    measured
        .iter()
        .zip(derived)
        .map(|(&m, &d)| if m.is_nan() { d } else { m })
        .collect()
}

/// Latitude of the profile owning each sample of `var`
pub fn observation_latitudes(dataset: &Dataset, var: &str) -> Result<Vec<f64>> {
    let dim = dataset
        .dimension_of(var)
        .ok_or_else(|| CtdError::missing_variable(dataset.name(), var))?;

    // Some sources repeat the position on every sample
    if dataset.dimension_of(LAT) == Some(dim) {
        return dataset.f64_values(LAT);
    }

    let profile_lat = if dataset.contains(LAT) {
        dataset.f64_values(LAT)?
    } else if let Some(lat) = dataset.attr(LAT).and_then(|v| v.as_f64()) {
        vec![lat; dataset.dimension_len(PROFILE_DIM).unwrap_or(1)]
    } else {
        return Err(CtdError::missing_variable(dataset.name(), LAT));
    };

    let parents = ragged::parent_indices(dataset, var)?;
    Ok(parents
        .iter()
        .map(|&p| profile_lat.get(p).copied().unwrap_or(f64::NAN))
        .collect())
}

/// Derive missing depth or pressure samples from the counterpart
pub fn reconcile_depth_pressure(dataset: &mut Dataset) -> Result<()> {
    let has_depth = dataset.contains(DEPTH);
    let has_press = dataset.contains(PRESS);
    if !has_depth && !has_press {
        return Err(CtdError::missing_variable(dataset.name(), DEPTH));
    }

    ragged::align_row_sizes(dataset)?;

    let anchor = if has_depth { DEPTH } else { PRESS };
    let lat = observation_latitudes(dataset, anchor)?;
    let depth = has_depth.then(|| dataset.f64_values(DEPTH)).transpose()?;
    let press = has_press.then(|| dataset.f64_values(PRESS)).transpose()?;

    if let (Some(depth), Some(press)) = (&depth, &press) {
        if depth.len() != press.len() {
            return Err(CtdError::LengthMismatch {
                dataset: dataset.name().to_string(),
                variable: PRESS.to_string(),
                expected: depth.len(),
                found: press.len(),
            });
        }
    }

    let (depth, press) = fill_depth_pressure(depth.as_deref(), press.as_deref(), &lat);

    let anchor_dim = dataset
        .dimension_of(anchor)
        .unwrap_or(PROFILE_DIM)
        .to_string();
    let depth_dim = dataset
        .dimension_of(DEPTH)
        .unwrap_or(anchor_dim.as_str())
        .to_string();
    let press_dim = dataset
        .dimension_of(PRESS)
        .unwrap_or(anchor_dim.as_str())
        .to_string();
    dataset.set_variable(&depth_dim, Series::new(DEPTH.into(), depth))?;
    dataset.set_variable(&press_dim, Series::new(PRESS.into(), press))?;

    if !(has_depth && has_press) {
        let derived = if has_depth { PRESS } else { DEPTH };
        dataset.set_variable_attr(derived, "derived_from", anchor);
        share_row_sizes(dataset, anchor, derived)?;
        debug!("{}: derived {} from {}", dataset.name(), derived, anchor);
    }
    Ok(())
}

/// Give a variable created on a per-variable ragged dimension the row sizes
/// of the variable it was built alongside
fn share_row_sizes(dataset: &mut Dataset, from: &str, to: &str) -> Result<()> {
    let from_rows = row_size_name(from);
    let to_rows = row_size_name(to);
    if !ragged::uses_per_variable_rows(dataset)
        || !dataset.contains(&from_rows)
        || dataset.contains(&to_rows)
    {
        return Ok(());
    }
    let sizes = dataset
        .column(&from_rows)?
        .as_materialized_series()
        .clone()
        .with_name(to_rows.as_str().into());
    dataset.set_variable(PROFILE_DIM, sizes)
}

/// Add `psal` when the dataset has no salinity
///
/// Salinity is computed from conductivity when conductivity, temperature
/// and pressure share a dimension. Otherwise an all-missing `psal` is
/// added beside depth.
pub fn ensure_salinity(dataset: &mut Dataset) -> Result<bool> {
    if dataset.contains(PSAL) {
        return Ok(false);
    }
    if salinity_from_conductivity(dataset)? {
        return Ok(true);
    }

    let dim = dataset
        .dimension_of(DEPTH)
        .ok_or_else(|| CtdError::missing_variable(dataset.name(), DEPTH))?
        .to_string();
    let len = dataset.dimension_len(&dim).unwrap_or(0);

    dataset.set_variable(&dim, Series::new(PSAL.into(), vec![f64::NAN; len]))?;
    share_row_sizes(dataset, DEPTH, PSAL)?;
    Ok(true)
}

fn salinity_from_conductivity(dataset: &mut Dataset) -> Result<bool> {
    let Some(dim) = dataset.dimension_of(CONDUCTIVITY).map(str::to_string) else {
        return Ok(false);
    };
    let aligned = [TEMP, PRESS]
        .iter()
        .all(|var| dataset.dimension_of(var) == Some(dim.as_str()));
    if !aligned {
        warn!(
            "{}: {} is not sampled alongside {} and {}, salinity left missing",
            dataset.name(),
            CONDUCTIVITY,
            TEMP,
            PRESS
        );
        return Ok(false);
    }

    let psal = teos::salinity_from_conductivity(
        &dataset.f64_values(CONDUCTIVITY)?,
        &dataset.f64_values(TEMP)?,
        &dataset.f64_values(PRESS)?,
    );
    dataset.set_variable(&dim, Series::new(PSAL.into(), psal))?;
    dataset.set_variable_attr(PSAL, "derived_from", "conductivity temp press");
    share_row_sizes(dataset, CONDUCTIVITY, PSAL)?;

    debug!("{}: derived {} from {}", dataset.name(), PSAL, CONDUCTIVITY);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{OBS_DIM, PARENT_INDEX};

    fn shared(depth: Option<&[f64]>, press: Option<&[f64]>) -> Dataset {
        let mut ds = Dataset::new("shared_obs");
        ds.set_variable(PROFILE_DIM, Series::new(LAT.into(), &[45.0, 72.0]))
            .unwrap();
        let n = depth.or(press).map_or(0, <[f64]>::len);
        let parents: Vec<i64> = (0..n as i64).map(|i| i % 2).collect();
        ds.set_variable(OBS_DIM, Series::new(PARENT_INDEX.into(), parents))
            .unwrap();
        if let Some(depth) = depth {
            ds.set_variable(OBS_DIM, Series::new(DEPTH.into(), depth))
                .unwrap();
        }
        if let Some(press) = press {
            ds.set_variable(OBS_DIM, Series::new(PRESS.into(), press))
                .unwrap();
        }
        ds.set_variable(OBS_DIM, Series::new(TEMP.into(), vec![0.0; n]))
            .unwrap();
        ds
    }

    #[test]
    fn test_partial_fill_keeps_measured_values() {
        let depth = [10.0, f64::NAN, 30.0, f64::NAN];
        let press = [f64::NAN, 20.2, 30.3, f64::NAN];
        let lat = [72.0; 4];

        let (d, p) = fill_depth_pressure(Some(&depth[..]), Some(&press[..]), &lat);
        assert_eq!(d[0], 10.0);
        assert_eq!(d[2], 30.0);
        assert_eq!(p[1], 20.2);
        assert_eq!(p[2], 30.3);

        // Filled from the counterpart
        assert!(d[1] > 19.0 && d[1] < 20.2);
        assert!(p[0] > 10.0 && p[0] < 10.2);

        // Nothing to derive from
        assert!(d[3].is_nan() && p[3].is_nan());
    }

    #[test]
    fn test_derived_depth_follows_existing_convention() {
        let depth = [-10.0, -20.0, f64::NAN];
        let press = [f64::NAN, f64::NAN, 50.0];
        let (d, _) = fill_depth_pressure(Some(&depth[..]), Some(&press[..]), &[60.0; 3]);
        assert!(d[2] < -49.0 && d[2] > -50.0);
    }

    #[test]
    fn test_pressure_derived_on_shared_dimension() {
        let mut ds = shared(Some(&[10.0, 10.0, 100.0, 100.0][..]), None);
        reconcile_depth_pressure(&mut ds).unwrap();

        assert_eq!(ds.dimension_of(PRESS), Some(OBS_DIM));
        let press = ds.f64_values(PRESS).unwrap();
        // Parent latitudes alternate 45 / 72
        assert!((press[0] - p_from_z(-10.0, 45.0)).abs() < 1e-12);
        assert!((press[1] - p_from_z(-10.0, 72.0)).abs() < 1e-12);
        assert!(press[1] > press[0]);
        assert_eq!(ds.f64_values(DEPTH).unwrap()[2], 100.0);
    }

    #[test]
    fn test_depth_derived_positive_down() {
        let mut ds = shared(None, Some(&[50.0, 100.0][..]));
        reconcile_depth_pressure(&mut ds).unwrap();

        let depth = ds.f64_values(DEPTH).unwrap();
        assert!(depth.iter().all(|d| *d > 0.0));
        assert!((depth[0] + z_from_p(50.0, 45.0)).abs() < 1e-12);
    }

    #[test]
    fn test_neither_depth_nor_pressure_is_fatal() {
        let mut ds = shared(None, None);
        match reconcile_depth_pressure(&mut ds) {
            Err(CtdError::MissingVariable { variable, .. }) => assert_eq!(variable, DEPTH),
            other => panic!("Expected MissingVariable, got {:?}", other),
        }
    }

    #[test]
    fn test_latitude_attribute_broadcast() {
        let mut ds = Dataset::new("single_cast");
        ds.set_attr(LAT, 72.0);
        ds.set_variable(OBS_DIM, Series::new(DEPTH.into(), &[5.0, 15.0]))
            .unwrap();
        assert_eq!(observation_latitudes(&ds, DEPTH).unwrap(), vec![72.0, 72.0]);
    }

    #[test]
    fn test_standardize_fills_salinity_and_summaries() {
        let mut ds = shared(Some(&[10.0, 10.0, 100.0, 100.0][..]), None);
        ds.set_variable(OBS_DIM, Series::new("temperature".into(), vec![1.0; 4]))
            .unwrap();

        let standardizer = Standardizer::new(&PipelineConfig::default()).unwrap();
        standardizer.standardize(&mut ds).unwrap();

        let psal = ds.f64_values(PSAL).unwrap();
        assert_eq!(psal.len(), 4);
        assert!(psal.iter().all(|s| s.is_nan()));
        for var in [DEPTH, PRESS, TEMP, PSAL] {
            let attrs = ds.variable_attrs(var).unwrap();
            assert!(attrs.contains_key(&format!("len{}", var)));
            assert!(attrs.contains_key(&format!("sum{}", var)));
        }
        // `temp` already existed, so the alias stays as it was
        assert!(ds.contains("temperature"));
    }

    #[test]
    fn test_salinity_from_conductivity() {
        let mut ds = shared(Some(&[10.0, 10.0, 100.0, 100.0][..]), None);
        ds.set_variable(OBS_DIM, Series::new(TEMP.into(), vec![15.0; 4]))
            .unwrap();
        ds.set_variable(
            OBS_DIM,
            Series::new("cond".into(), &[42.914, 42.914, 30.0, f64::NAN]),
        )
        .unwrap();

        let standardizer = Standardizer::new(&PipelineConfig::default()).unwrap();
        standardizer.standardize(&mut ds).unwrap();

        assert!(ds.contains(CONDUCTIVITY));
        let psal = ds.f64_values(PSAL).unwrap();
        let press = ds.f64_values(PRESS).unwrap();
        assert_eq!(psal[0], sp_from_c(42.914, 15.0, press[0]));
        assert!(psal[0] > 34.9 && psal[0] < 35.0);
        assert_eq!(psal[2], sp_from_c(30.0, 15.0, press[2]));
        assert!(psal[2] < psal[0]);
        assert!(psal[3].is_nan());
        assert_eq!(
            ds.variable_attrs(PSAL).unwrap().get("derived_from"),
            Some(&crate::models::AttrValue::from("conductivity temp press"))
        );
    }

    #[test]
    fn test_conductivity_off_pressure_dimension_falls_back() {
        let mut ds = shared(Some(&[10.0, 10.0, 100.0, 100.0][..]), None);
        reconcile_depth_pressure(&mut ds).unwrap();
        ds.set_variable(PROFILE_DIM, Series::new(CONDUCTIVITY.into(), &[40.0, 41.0]))
            .unwrap();

        assert!(ensure_salinity(&mut ds).unwrap());
        assert_eq!(ds.dimension_of(PSAL), Some(OBS_DIM));
        assert!(ds.f64_values(PSAL).unwrap().iter().all(|s| s.is_nan()));
    }

    #[test]
    fn test_aliases_can_be_disabled() {
        let mut ds = shared(Some(&[10.0, 10.0, 100.0, 100.0][..]), None);
        ds.set_variable(OBS_DIM, Series::new("sal".into(), vec![34.0; 4]))
            .unwrap();

        let config = PipelineConfig::default().without_alias_normalization();
        let standardizer = Standardizer::new(&config).unwrap();
        standardizer.standardize(&mut ds).unwrap();

        // `sal` is kept as is, so salinity still counts as missing
        assert!(ds.contains("sal"));
        assert!(ds.f64_values(PSAL).unwrap().iter().all(|s| s.is_nan()));
    }
}
