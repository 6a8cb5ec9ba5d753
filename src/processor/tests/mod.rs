//! Pipeline tests over temporary processing roots

pub mod standardizing;
pub mod tagging;

use crate::config::CompressionAlgorithm;
use crate::constants::{DATESTR, DEPTH, LAT, LON, OBS_DIM, PROFILE_DIM, ROW_SIZE, TEMP};
use crate::models::Dataset;
use crate::store;
use polars::prelude::*;
use std::path::Path;

/// A raw store with `lats.len()` profiles of two samples each
pub fn cast_dataset(name: &str, lats: &[f64]) -> Dataset {
    let n = lats.len();
    let mut ds = Dataset::new(name);
    ds.set_variable(PROFILE_DIM, Series::new(LAT.into(), lats))
        .unwrap();
    ds.set_variable(PROFILE_DIM, Series::new(LON.into(), vec![-105.0; n]))
        .unwrap();
    ds.set_variable(
        PROFILE_DIM,
        Series::new(DATESTR.into(), vec!["2019/08/01 12:00:00"; n]),
    )
    .unwrap();
    ds.set_variable(PROFILE_DIM, Series::new(ROW_SIZE.into(), vec![2i64; n]))
        .unwrap();

    let depth: Vec<f64> = (0..n).flat_map(|_| [5.0, 50.0]).collect();
    ds.set_variable(OBS_DIM, Series::new(DEPTH.into(), depth))
        .unwrap();
    ds.set_variable(OBS_DIM, Series::new(TEMP.into(), vec![-1.2; 2 * n]))
        .unwrap();
    ds.set_attr("platform", "CCGS Amundsen");
    ds
}

pub fn write_raw(root: &Path, source: &str, name: &str, lats: &[f64]) {
    let path = root.join(source).join("raw").join(name);
    store::save(&cast_dataset(name, lats), &path, CompressionAlgorithm::Snappy).unwrap();
}
