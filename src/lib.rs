//! CTD Processor Library
//!
//! Tools for maintaining an archive of oceanographic CTD profiles:
//! - Assigning every profile a short, globally unique identifier
//! - Keeping a consolidated per-profile metadata catalog across runs
//! - Standardizing observations (UTC timestamps, depth/pressure
//!   cross-derivation over ragged arrays, salinity fallback, summaries)

pub mod allocator;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod processor;
pub mod reconcile;
pub mod store;

pub use allocator::IdAllocator;
pub use catalog::CatalogMerger;
pub use config::{CompressionAlgorithm, PipelineConfig};
pub use error::{CtdError, Result};
pub use models::{AttrValue, Dataset, ProcessingStats};
pub use processor::{StandardizePipeline, TagPipeline};
pub use reconcile::Standardizer;
