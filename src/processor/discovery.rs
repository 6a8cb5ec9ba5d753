//! Source discovery for CTD archives
//!
//! A processing root holds one directory per data source; each source keeps
//! its dataset stores in per-stage subdirectories:
//!
//! ```text
//! root/
//!   MEDS_2021/
//!     raw/
//!       casts_1990/          dataset store
//!     tagged/
//!       casts_1990_id/
//!     standard/
//!       casts_1990_id_standard/
//!   ...
//! ```

use crate::config::PipelineConfig;
use crate::error::{CtdError, Result};
use crate::store;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Processing stage a store belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Raw,
    Tagged,
    Standard,
}

/// A dataset store found under a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub source: String,
    pub name: String,
    pub path: PathBuf,
}

/// Enumerates sources and their stores under a processing root
#[derive(Debug, Clone)]
pub struct SourceWalker {
    root: PathBuf,
    raw_dir: String,
    tagged_dir: String,
    standard_dir: String,
    tagged_suffix: String,
    standard_suffix: String,
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

impl SourceWalker {
    pub fn new(root: impl Into<PathBuf>, config: &PipelineConfig) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(CtdError::DatasetNotFound { path: root });
        }
        Ok(Self {
            root,
            raw_dir: config.raw_dir.clone(),
            tagged_dir: config.tagged_dir.clone(),
            standard_dir: config.standard_dir.clone(),
            tagged_suffix: config.tagged_suffix.clone(),
            standard_suffix: config.standard_suffix.clone(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a source's stores for a stage
    pub fn stage_dir(&self, source: &str, stage: Stage) -> PathBuf {
        let dir = match stage {
            Stage::Raw => &self.raw_dir,
            Stage::Tagged => &self.tagged_dir,
            Stage::Standard => &self.standard_dir,
        };
        self.root.join(source).join(dir)
    }

    /// Source names, sorted, hidden directories skipped
    pub fn sources(&self) -> Result<Vec<String>> {
        let mut sources = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_hidden(&name) {
                sources.push(name);
            }
        }
        sources.sort();
        debug!("Found {} sources under {}", sources.len(), self.root.display());
        Ok(sources)
    }

    /// Dataset stores of one source at a stage, sorted by name
    ///
    /// A source without the stage directory has no stores.
    pub fn datasets(&self, source: &str, stage: Stage) -> Result<Vec<SourceFile>> {
        let dir = self.stage_dir(source, stage);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !entry.file_type().is_dir() || is_hidden(&name) {
                continue;
            }
            if !store::is_store(entry.path()) {
                debug!("Skipping {} (not a dataset store)", entry.path().display());
                continue;
            }
            files.push(SourceFile {
                source: source.to_string(),
                name,
                path: entry.into_path(),
            });
        }
        Ok(files)
    }

    /// Whether a source has a directory for a stage
    pub fn has_stage(&self, source: &str, stage: Stage) -> bool {
        self.stage_dir(source, stage).is_dir()
    }

    /// Where the next stage's store for `file` is written
    pub fn output_path(&self, file: &SourceFile, stage: Stage) -> PathBuf {
        self.stage_dir(&file.source, stage)
            .join(self.output_name(file, stage))
    }

    /// Store name of `file` once written to `stage`
    pub fn output_name(&self, file: &SourceFile, stage: Stage) -> String {
        let suffix = match stage {
            Stage::Raw => "",
            Stage::Tagged => self.tagged_suffix.as_str(),
            Stage::Standard => self.standard_suffix.as_str(),
        };
        format!("{}{}", file.name, suffix)
    }
}
