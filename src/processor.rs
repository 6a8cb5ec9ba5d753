//! Tagging and standardization pipelines.
//!
//! Both passes walk the sources under a processing root in sorted order and
//! handle one dataset store at a time, start to finish. A failing dataset is
//! logged and counted; its siblings are still processed.

pub mod discovery;

use crate::allocator::IdAllocator;
use crate::catalog::CatalogMerger;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::models::{Dataset, ProcessingStats};
use crate::reconcile::Standardizer;
use crate::reconcile::aliases::fill_provenance;
use crate::store;
use discovery::{SourceFile, SourceWalker, Stage};
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Create a progress bar over the datasets of one source
fn create_progress_bar(total: usize, message: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}

/// Name of the raw store a tagged or standardized store was derived from
fn original_name<'a>(name: &'a str, suffixes: &[&str]) -> &'a str {
    suffixes
        .iter()
        .fold(name, |name, suffix| name.strip_suffix(suffix).unwrap_or(name))
}

/// Assigns profile IDs to raw stores and folds them into the catalog
#[derive(Debug)]
pub struct TagPipeline {
    walker: SourceWalker,
    merger: CatalogMerger,
    config: PipelineConfig,
    show_progress: bool,
}

impl TagPipeline {
    pub fn new(
        root: impl Into<PathBuf>,
        catalog: impl Into<PathBuf>,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let walker = SourceWalker::new(root, &config)?;
        let merger = CatalogMerger::new(catalog).with_compression(config.compression);
        Ok(Self {
            walker,
            merger,
            config,
            show_progress: false,
        })
    }

    /// Show a progress bar per source
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn catalog(&self) -> &CatalogMerger {
        &self.merger
    }

    /// Tag every source, seeding the allocator from the catalog
    pub fn run(&self) -> Result<ProcessingStats> {
        let existing = self.merger.existing_ids()?;
        let mut allocator =
            IdAllocator::new(existing).with_max_attempts(self.config.max_id_attempts);
        self.run_with_allocator(&mut allocator)
    }

    /// Tag every source with a caller-supplied allocator
    pub fn run_with_allocator<R: Rng>(
        &self,
        allocator: &mut IdAllocator<R>,
    ) -> Result<ProcessingStats> {
        let start_time = Instant::now();
        let mut stats = ProcessingStats::default();

        for source in self.walker.sources()? {
            if !self.walker.has_stage(&source, Stage::Raw) {
                info!("Skipping source {} (no {} directory)", source, self.config.raw_dir);
                continue;
            }
            self.tag_source(&source, allocator, &mut stats)?;
        }

        stats.processing_time_ms = start_time.elapsed().as_millis();
        Ok(stats)
    }

    fn tag_source<R: Rng>(
        &self,
        source: &str,
        allocator: &mut IdAllocator<R>,
        stats: &mut ProcessingStats,
    ) -> Result<()> {
        let files = self.walker.datasets(source, Stage::Raw)?;
        info!("Tagging {} datasets from source {}", files.len(), source);

        let pb = create_progress_bar(files.len(), source, self.show_progress);
        let mut tagged = Vec::with_capacity(files.len());
        let mut aborted = false;

        for file in &files {
            pb.set_message(format!("{}: {}", source, file.name));
            let result = self.tag_file(file, allocator);
            pb.inc(1);

            match result {
                Ok(dataset) => {
                    stats.datasets_processed += 1;
                    stats.profiles_tagged += dataset.profile_count().unwrap_or(0);
                    tagged.push(dataset);
                }
                Err(e) if e.is_source_fatal() => {
                    error!("Aborting source {} at {}: {}", source, file.name, e);
                    stats.datasets_failed += 1;
                    aborted = true;
                    break;
                }
                Err(e) => {
                    error!("Failed to tag {}: {:#}", file.path.display(), e);
                    stats.datasets_failed += 1;
                }
            }
        }
        pb.finish_and_clear();

        // Stores already written keep their IDs reserved even after an abort
        if !tagged.is_empty() {
            stats.catalog_rows = self.merger.merge(&tagged)?;
        } else {
            debug!("Source {} produced no tagged datasets", source);
        }

        if aborted {
            stats.sources_aborted += 1;
        } else {
            stats.sources_processed += 1;
        }
        Ok(())
    }

    fn tag_file<R: Rng>(
        &self,
        file: &SourceFile,
        allocator: &mut IdAllocator<R>,
    ) -> Result<Dataset> {
        let mut dataset = store::open(&file.path)?;
        allocator.tag_dataset(&mut dataset)?;
        fill_provenance(&mut dataset, &file.source, &file.name);
        dataset.set_name(self.walker.output_name(file, Stage::Tagged));

        let output = self.walker.output_path(file, Stage::Tagged);
        store::save(&dataset, &output, self.config.compression)?;
        debug!("Wrote tagged store {}", output.display());
        Ok(dataset)
    }
}

/// Produces standardized stores from tagged ones
#[derive(Debug)]
pub struct StandardizePipeline {
    walker: SourceWalker,
    standardizer: Standardizer,
    config: PipelineConfig,
    show_progress: bool,
}

impl StandardizePipeline {
    pub fn new(root: impl Into<PathBuf>, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            walker: SourceWalker::new(root, &config)?,
            standardizer: Standardizer::new(&config)?,
            config,
            show_progress: false,
        })
    }

    /// Show a progress bar per source
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn run(&self) -> Result<ProcessingStats> {
        let start_time = Instant::now();
        let mut stats = ProcessingStats::default();

        for source in self.walker.sources()? {
            let files = self.walker.datasets(&source, Stage::Tagged)?;
            if files.is_empty() {
                info!("Skipping source {} (no tagged datasets)", source);
                continue;
            }

            let pb = create_progress_bar(files.len(), &source, self.show_progress);
            for file in &files {
                pb.set_message(format!("{}: {}", source, file.name));
                match self.standardize_file(file) {
                    Ok(()) => stats.datasets_processed += 1,
                    Err(e) => {
                        error!("Failed to standardize {}: {:#}", file.path.display(), e);
                        stats.datasets_failed += 1;
                    }
                }
                pb.inc(1);
            }
            pb.finish_and_clear();
            stats.sources_processed += 1;
        }

        if stats.datasets_processed == 0 && stats.datasets_failed == 0 {
            warn!("No tagged datasets found under {}", self.walker.root().display());
        }
        stats.processing_time_ms = start_time.elapsed().as_millis();
        Ok(stats)
    }

    fn standardize_file(&self, file: &SourceFile) -> Result<()> {
        let mut dataset = store::open(&file.path)?;
        let orig = original_name(
            &file.name,
            &[
                self.config.standard_suffix.as_str(),
                self.config.tagged_suffix.as_str(),
            ],
        );
        fill_provenance(&mut dataset, &file.source, orig);
        self.standardizer.standardize(&mut dataset)?;
        dataset.set_name(self.walker.output_name(file, Stage::Standard));

        let output = self.walker.output_path(file, Stage::Standard);
        store::save(&dataset, &output, self.config.compression)?;
        debug!("Wrote standardized store {}", output.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests;
