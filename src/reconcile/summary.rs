//! Pre-aggregated sample summaries on observation variables.

use crate::constants::{SUMMARY_VARIABLES, TEMP};
use crate::error::{CtdError, Result};
use crate::models::Dataset;

/// Attach `len<var>` (sample count, missing included) and `sum<var>`
/// (sum over present samples) to every summary variable
pub fn annotate(dataset: &mut Dataset) -> Result<()> {
    for var in SUMMARY_VARIABLES {
        if !dataset.contains(var) {
            // depth, press and psal are guaranteed by the earlier steps
            if *var == TEMP {
                return Err(CtdError::missing_variable(dataset.name(), var));
            }
            continue;
        }

        let values = dataset.f64_values(var)?;
        let sum: f64 = values.iter().filter(|v| !v.is_nan()).sum();
        dataset.set_variable_attr(var, format!("len{}", var), values.len() as i64);
        dataset.set_variable_attr(var, format!("sum{}", var), sum);
    }
    Ok(())
}
