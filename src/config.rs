//! Configuration management and validation.
//!
//! Provides the pipeline configuration: directory and naming conventions
//! for source trees, the identifier retry bound, timezone rules used when
//! normalizing timestamps, and Parquet output settings.

use crate::constants::{
    DEFAULT_DATESTR_FORMAT, DEFAULT_RAW_DIR, DEFAULT_STANDARD_DIR, DEFAULT_STANDARD_SUFFIX,
    DEFAULT_TAGGED_DIR, DEFAULT_TAGGED_SUFFIX,
};
use crate::error::{CtdError, Result};
use chrono_tz::Tz;
use polars::prelude::ParquetCompression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

/// Supported compression algorithms for parquet files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionAlgorithm {
    /// Snappy compression - good balance of speed and compression
    Snappy,
    /// ZSTD compression - better compression ratio, slower
    Zstd,
    /// LZ4 compression - fastest, lower compression ratio
    Lz4,
    /// No compression
    Uncompressed,
}

impl CompressionAlgorithm {
    /// Convert to polars ParquetCompression type
    pub fn to_polars_compression(&self) -> ParquetCompression {
        match self {
            CompressionAlgorithm::Snappy => ParquetCompression::Snappy,
            CompressionAlgorithm::Zstd => ParquetCompression::Zstd(None),
            CompressionAlgorithm::Lz4 => ParquetCompression::Lz4Raw,
            CompressionAlgorithm::Uncompressed => ParquetCompression::Uncompressed,
        }
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = CtdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "snappy" => Ok(CompressionAlgorithm::Snappy),
            "zstd" => Ok(CompressionAlgorithm::Zstd),
            "lz4" => Ok(CompressionAlgorithm::Lz4),
            "none" | "uncompressed" => Ok(CompressionAlgorithm::Uncompressed),
            other => Err(CtdError::Configuration {
                message: format!(
                    "Unknown compression '{}' (expected snappy, zstd, lz4 or none)",
                    other
                ),
            }),
        }
    }
}

/// Global configuration for CTD processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Per-source directory holding raw dataset stores
    pub raw_dir: String,

    /// Per-source directory receiving ID-tagged stores
    pub tagged_dir: String,

    /// Per-source directory receiving standardized stores
    pub standard_dir: String,

    /// Name suffix for tagged stores
    pub tagged_suffix: String,

    /// Name suffix for standardized stores
    pub standard_suffix: String,

    /// Give up allocating an ID after this many consecutive collisions (None = never)
    pub max_id_attempts: Option<u64>,

    /// Timezone tag found in source data → IANA zone the tagged times are local to
    pub timezone_rules: BTreeMap<String, String>,

    /// Format of `datestr` values
    pub datestr_format: String,

    /// Rename alternative variable names to their canonical form before standardizing
    pub normalize_aliases: bool,

    /// Parquet compression for every written store
    pub compression: CompressionAlgorithm,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut timezone_rules = BTreeMap::new();
        timezone_rules.insert("MDT".to_string(), "America/Denver".to_string());

        Self {
            raw_dir: DEFAULT_RAW_DIR.to_string(),
            tagged_dir: DEFAULT_TAGGED_DIR.to_string(),
            standard_dir: DEFAULT_STANDARD_DIR.to_string(),
            tagged_suffix: DEFAULT_TAGGED_SUFFIX.to_string(),
            standard_suffix: DEFAULT_STANDARD_SUFFIX.to_string(),
            max_id_attempts: None,
            timezone_rules,
            datestr_format: DEFAULT_DATESTR_FORMAT.to_string(),
            normalize_aliases: true,
            compression: CompressionAlgorithm::Snappy,
        }
    }
}

impl PipelineConfig {
    /// Bound the number of identifier draws per allocation
    pub fn with_max_id_attempts(mut self, max_attempts: Option<u64>) -> Self {
        self.max_id_attempts = max_attempts;
        self
    }

    /// Set parquet compression
    pub fn with_compression(mut self, compression: CompressionAlgorithm) -> Self {
        self.compression = compression;
        self
    }

    /// Add or replace a timezone rule
    pub fn with_timezone_rule(mut self, tag: impl Into<String>, zone: impl Into<String>) -> Self {
        self.timezone_rules.insert(tag.into(), zone.into());
        self
    }

    /// Disable variable-name alias normalization
    pub fn without_alias_normalization(mut self) -> Self {
        self.normalize_aliases = false;
        self
    }

    /// Resolve the configured timezone rules to chrono-tz zones
    pub fn resolved_timezone_rules(&self) -> Result<BTreeMap<String, Tz>> {
        self.timezone_rules
            .iter()
            .map(|(tag, zone)| {
                zone.parse::<Tz>()
                    .map(|tz| (tag.clone(), tz))
                    .map_err(|_| CtdError::UnknownTimezone { name: zone.clone() })
            })
            .collect()
    }

    /// Check the configuration before any file is touched
    pub fn validate(&self) -> Result<()> {
        let dirs = [&self.raw_dir, &self.tagged_dir, &self.standard_dir];
        if dirs.iter().any(|dir| dir.trim().is_empty()) {
            return Err(CtdError::Configuration {
                message: "Stage directory names must not be empty".to_string(),
            });
        }
        if self.raw_dir == self.tagged_dir
            || self.raw_dir == self.standard_dir
            || self.tagged_dir == self.standard_dir
        {
            return Err(CtdError::Configuration {
                message: "Raw, tagged and standard directories must differ".to_string(),
            });
        }
        if self.tagged_suffix.is_empty() || self.standard_suffix.is_empty() {
            return Err(CtdError::Configuration {
                message: "Output suffixes must not be empty".to_string(),
            });
        }
        if self.max_id_attempts == Some(0) {
            return Err(CtdError::Configuration {
                message: "max_id_attempts must be at least 1".to_string(),
            });
        }

        let rules = self.resolved_timezone_rules()?;
        debug!("Validated configuration with {} timezone rules", rules.len());
        Ok(())
    }
}
