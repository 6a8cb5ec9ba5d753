//! Timestamp normalisation.
//!
//! Profiles tagged with a local zone have their `datestr` rewritten to UTC;
//! afterwards every `datestr` is UTC and the `timezone` variable is dropped.

use crate::constants::{DATESTR, PROFILE_DIM, TIMESTAMP, TIMEZONE, UTC_ZONE};
use crate::error::{CtdError, Result};
use crate::models::Dataset;
use chrono::{LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Parse a civil timestamp, accepting optional fractional seconds
fn parse_naive(dataset: &str, value: &str, format: &str) -> Result<NaiveDateTime> {
    let trimmed = value.trim();
    NaiveDateTime::parse_from_str(trimmed, format)
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, &format!("{}%.f", format)))
        .map_err(|e| CtdError::TimestampParse {
            dataset: dataset.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Convert a naive local time in `zone` to naive UTC
///
/// Times repeated by a DST fall-back resolve to the earlier instant; times
/// skipped by a spring-forward do not exist and are rejected.
fn local_to_utc(
    dataset: &str,
    value: &str,
    naive: NaiveDateTime,
    zone: Tz,
) -> Result<NaiveDateTime> {
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(local) => Ok(local.with_timezone(&Utc).naive_utc()),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc).naive_utc()),
        LocalResult::None => Err(CtdError::TimestampParse {
            dataset: dataset.to_string(),
            value: value.to_string(),
            reason: format!("local time does not exist in {}", zone.name()),
        }),
    }
}

/// Rewrite zone-tagged `datestr` values to UTC and drop `timezone`
///
/// Returns the number of converted profiles. Rows tagged UTC, untagged rows
/// and rows whose tag has no rule keep their string.
pub fn normalize_timezones(
    dataset: &mut Dataset,
    rules: &BTreeMap<String, Tz>,
    format: &str,
) -> Result<usize> {
    if !dataset.contains(TIMEZONE) || !dataset.contains(DATESTR) {
        return Ok(0);
    }

    let zones = dataset.string_values(TIMEZONE)?;
    let mut dates = dataset.string_values(DATESTR)?;
    if zones.len() != dates.len() {
        return Err(CtdError::LengthMismatch {
            dataset: dataset.name().to_string(),
            variable: TIMEZONE.to_string(),
            expected: dates.len(),
            found: zones.len(),
        });
    }

    let mut converted = 0;
    let mut unknown = BTreeSet::new();
    for (tag, date) in zones.iter().zip(dates.iter_mut()) {
        let (Some(tag), Some(value)) = (tag.as_deref().map(str::trim), date.as_mut()) else {
            continue;
        };
        if tag.is_empty() || tag.eq_ignore_ascii_case(UTC_ZONE) {
            continue;
        }
        let Some(zone) = rules.get(tag) else {
            unknown.insert(tag.to_string());
            continue;
        };

        let naive = parse_naive(dataset.name(), value, format)?;
        let utc = local_to_utc(dataset.name(), value, naive, *zone)?;
        *value = utc.format(format).to_string();
        converted += 1;
    }

    for tag in &unknown {
        warn!(
            "{}: no timezone rule for '{}', leaving those timestamps unchanged",
            dataset.name(),
            tag
        );
    }

    let dim = dataset
        .dimension_of(DATESTR)
        .unwrap_or(PROFILE_DIM)
        .to_string();
    dataset.set_variable(&dim, Series::new(DATESTR.into(), dates))?;
    dataset.drop_variable(TIMEZONE);
    dataset.set_variable_attr(DATESTR, TIMEZONE, UTC_ZONE);

    debug!("{}: converted {} timestamps to UTC", dataset.name(), converted);
    Ok(converted)
}

/// Add `timestamp` (UTC epoch seconds) from `datestr` when it is absent
///
/// Missing `datestr` entries give a NaN timestamp.
pub fn derive_timestamps(dataset: &mut Dataset, format: &str) -> Result<bool> {
    if dataset.contains(TIMESTAMP) || !dataset.contains(DATESTR) {
        return Ok(false);
    }

    let dates = dataset.string_values(DATESTR)?;
    let mut stamps = Vec::with_capacity(dates.len());
    for date in &dates {
        let stamp = match date {
            Some(value) => {
                let naive = parse_naive(dataset.name(), value, format)?;
                naive.and_utc().timestamp_millis() as f64 / 1000.0
            }
            None => f64::NAN,
        };
        stamps.push(stamp);
    }

    let dim = dataset
        .dimension_of(DATESTR)
        .unwrap_or(PROFILE_DIM)
        .to_string();
    dataset.set_variable(&dim, Series::new(TIMESTAMP.into(), stamps))?;
    dataset.set_variable_attr(TIMESTAMP, "units", "seconds since 1970-01-01 00:00:00 UTC");
    Ok(true)
}
