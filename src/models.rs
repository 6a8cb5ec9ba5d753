//! Core data structures for CTD processing.
//!
//! A [`Dataset`] mirrors the layout of the profile archives: named
//! dimensions, each backed by a polars `DataFrame` whose columns are the
//! variables defined along that dimension, plus global and per-variable
//! attributes. Profiles live on the `profile` dimension; observations live
//! on one or more ragged observation dimensions addressed by parent-index or
//! row-size arrays.

use crate::constants::PROFILE_DIM;
use crate::error::{CtdError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Scalar attribute value attached to a dataset or a variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Int(v) => write!(f, "{}", v),
            AttrValue::Float(v) => write!(f, "{}", v),
            AttrValue::Text(v) => f.write_str(v),
        }
    }
}

impl AttrValue {
    /// Numeric value, parsing text when possible
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Int(v) => Some(*v as f64),
            AttrValue::Float(v) => Some(*v),
            AttrValue::Text(v) => v.trim().parse().ok(),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

pub type Attributes = BTreeMap<String, AttrValue>;

/// In-memory profile dataset
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    name: String,
    attrs: Attributes,
    dimensions: BTreeMap<String, DataFrame>,
    variable_attrs: BTreeMap<String, Attributes>,
    coordinates: Vec<String>,
}

impl Dataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.attrs.insert(key.into(), value.into());
    }

    pub fn dimension_names(&self) -> impl Iterator<Item = &str> {
        self.dimensions.keys().map(String::as_str)
    }

    pub fn dimension(&self, dim: &str) -> Option<&DataFrame> {
        self.dimensions.get(dim)
    }

    pub fn dimension_len(&self, dim: &str) -> Option<usize> {
        self.dimensions.get(dim).map(DataFrame::height)
    }

    /// Number of profiles (rows of the `profile` dimension)
    pub fn profile_count(&self) -> Result<usize> {
        self.dimension_len(PROFILE_DIM)
            .ok_or_else(|| CtdError::MissingDimension {
                dataset: self.name.clone(),
                dimension: PROFILE_DIM.to_string(),
            })
    }

    /// Replace a whole dimension table, e.g. after inserting observation rows
    pub fn replace_dimension(&mut self, dim: impl Into<String>, frame: DataFrame) {
        self.dimensions.insert(dim.into(), frame);
    }

    pub fn contains(&self, var: &str) -> bool {
        self.dimension_of(var).is_some()
    }

    /// Name of the dimension a variable is defined on
    pub fn dimension_of(&self, var: &str) -> Option<&str> {
        self.dimensions
            .iter()
            .find(|(_, frame)| frame.get_column_index(var).is_some())
            .map(|(dim, _)| dim.as_str())
    }

    pub fn column(&self, var: &str) -> Result<&Column> {
        self.dimensions
            .values()
            .find_map(|frame| frame.column(var).ok())
            .ok_or_else(|| CtdError::missing_variable(&self.name, var))
    }

    /// Variable values as f64, with missing entries as NaN
    pub fn f64_values(&self, var: &str) -> Result<Vec<f64>> {
        let series = self
            .column(var)?
            .as_materialized_series()
            .cast(&DataType::Float64)?;
        Ok(series
            .f64()?
            .into_iter()
            .map(|value| value.unwrap_or(f64::NAN))
            .collect())
    }

    /// Variable values as non-negative indices (row sizes, parent indices)
    pub fn index_values(&self, var: &str) -> Result<Vec<usize>> {
        let series = self
            .column(var)?
            .as_materialized_series()
            .cast(&DataType::Int64)?;
        series
            .i64()?
            .into_iter()
            .enumerate()
            .map(|(i, value)| match value {
                Some(v) if v >= 0 => Ok(v as usize),
                _ => Err(CtdError::invalid_variable(
                    &self.name,
                    var,
                    format!("entry {} is missing or negative", i),
                )),
            })
            .collect()
    }

    /// Variable values as optional strings
    pub fn string_values(&self, var: &str) -> Result<Vec<Option<String>>> {
        let series = self
            .column(var)?
            .as_materialized_series()
            .cast(&DataType::String)?;
        Ok(series
            .str()?
            .into_iter()
            .map(|value| value.map(str::to_string))
            .collect())
    }

    /// Add or replace a variable on a dimension
    ///
    /// A variable already defined on another dimension is moved. The
    /// length must match the dimension unless the dimension does not exist
    /// yet, in which case the variable creates it.
    pub fn set_variable(&mut self, dim: &str, series: Series) -> Result<()> {
        let var = series.name().to_string();
        if let Some(current) = self.dimension_of(&var) {
            if current != dim {
                self.drop_column_only(&var);
            }
        }

        match self.dimensions.get_mut(dim) {
            Some(frame) => {
                if frame.height() != series.len() {
                    return Err(CtdError::LengthMismatch {
                        dataset: self.name.clone(),
                        variable: var,
                        expected: frame.height(),
                        found: series.len(),
                    });
                }
                frame.with_column(series)?;
            }
            None => {
                let frame = DataFrame::new(vec![series.into_column()])?;
                self.dimensions.insert(dim.to_string(), frame);
            }
        }
        Ok(())
    }

    /// Remove a variable together with its attributes
    pub fn drop_variable(&mut self, var: &str) -> Option<Column> {
        let column = self.drop_column_only(var)?;
        self.variable_attrs.remove(var);
        self.coordinates.retain(|coord| coord != var);
        Some(column)
    }

    fn drop_column_only(&mut self, var: &str) -> Option<Column> {
        let dim = self.dimension_of(var)?.to_string();
        let frame = self.dimensions.get_mut(&dim)?;
        let column = frame.drop_in_place(var).ok()?;
        if frame.width() == 0 {
            self.dimensions.remove(&dim);
        }
        Some(column)
    }

    pub fn rename_variable(&mut self, from: &str, to: &str) -> Result<()> {
        let dim = self
            .dimension_of(from)
            .ok_or_else(|| CtdError::missing_variable(&self.name, from))?
            .to_string();
        if let Some(frame) = self.dimensions.get_mut(&dim) {
            frame.rename(from, to.into())?;
        }
        if let Some(attrs) = self.variable_attrs.remove(from) {
            self.variable_attrs.insert(to.to_string(), attrs);
        }
        for coord in self.coordinates.iter_mut().filter(|c| c.as_str() == from) {
            *coord = to.to_string();
        }
        Ok(())
    }

    pub fn variable_attrs(&self, var: &str) -> Option<&Attributes> {
        self.variable_attrs.get(var)
    }

    pub fn all_variable_attrs(&self) -> &BTreeMap<String, Attributes> {
        &self.variable_attrs
    }

    pub fn set_variable_attr(
        &mut self,
        var: &str,
        key: impl Into<String>,
        value: impl Into<AttrValue>,
    ) {
        self.variable_attrs
            .entry(var.to_string())
            .or_default()
            .insert(key.into(), value.into());
    }

    pub fn coordinates(&self) -> &[String] {
        &self.coordinates
    }

    pub fn set_coordinates(&mut self, coordinates: Vec<String>) {
        self.coordinates = coordinates;
    }
}

/// Processing statistics for one pipeline run
#[derive(Debug, Default, Clone)]
pub struct ProcessingStats {
    pub sources_processed: usize,
    pub sources_aborted: usize,
    pub datasets_processed: usize,
    pub datasets_failed: usize,
    pub profiles_tagged: usize,
    pub catalog_rows: usize,
    pub processing_time_ms: u128,
}
