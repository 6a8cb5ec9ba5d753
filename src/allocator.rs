//! Profile identifier allocation.
//!
//! Identifiers are five characters: one uppercase letter followed by four
//! characters drawn from `A-Z0-9`, each chosen uniformly at random
//! (26 × 36⁴ ≈ 43.7M codes). Candidates are rejection-sampled against an
//! exclusion set that the allocator owns; every allocated identifier joins
//! the set before the next draw, so profiles tagged in the same run never
//! collide with each other or with the catalog the set was seeded from.

use crate::constants::{PROFILE_DIM, PROFILE_ID, PROFILE_ID_LEGACY};
use crate::error::{CtdError, Result};
use crate::models::Dataset;
use polars::prelude::*;
use rand::Rng;
use rand::rngs::ThreadRng;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;

/// Length of a profile identifier
pub const PROFILE_ID_LEN: usize = 5;

const LEADING_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const TRAILING_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

static PROFILE_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9]{4}$").expect("profile ID pattern is valid"));

/// Check that a string is a well-formed profile identifier
pub fn is_valid_profile_id(id: &str) -> bool {
    PROFILE_ID_PATTERN.is_match(id)
}

/// Draw one candidate identifier
pub fn generate_candidate<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut id = String::with_capacity(PROFILE_ID_LEN);
    id.push(LEADING_CHARS[rng.random_range(0..LEADING_CHARS.len())] as char);
    for _ in 1..PROFILE_ID_LEN {
        id.push(TRAILING_CHARS[rng.random_range(0..TRAILING_CHARS.len())] as char);
    }
    id
}

/// Allocate one identifier against `existing`, returning the identifier and
/// the extended exclusion set
pub fn allocate(mut existing: HashSet<String>) -> (String, HashSet<String>) {
    let id = draw_unused(&mut existing, &mut rand::rng());
    (id, existing)
}

/// Draw until a candidate is not in `existing`, then reserve it
fn draw_unused<R: Rng + ?Sized>(existing: &mut HashSet<String>, rng: &mut R) -> String {
    loop {
        let candidate = generate_candidate(rng);
        if existing.insert(candidate.clone()) {
            return candidate;
        }
        debug!("Profile ID collision on {}, drawing again", candidate);
    }
}

/// Identifier allocator owning the exclusion set for one run
#[derive(Debug)]
pub struct IdAllocator<R = ThreadRng> {
    existing: HashSet<String>,
    rng: R,
    max_attempts: Option<u64>,
}

impl IdAllocator<ThreadRng> {
    /// Create an allocator seeded with identifiers already in use
    pub fn new(existing: HashSet<String>) -> Self {
        Self::with_rng(existing, rand::rng())
    }
}

impl<R: Rng> IdAllocator<R> {
    pub fn with_rng(existing: HashSet<String>, rng: R) -> Self {
        Self {
            existing,
            rng,
            max_attempts: None,
        }
    }

    /// Bound the number of draws per allocation (None = retry until a miss)
    pub fn with_max_attempts(mut self, max_attempts: Option<u64>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn existing_ids(&self) -> &HashSet<String> {
        &self.existing
    }

    pub fn into_existing(self) -> HashSet<String> {
        self.existing
    }

    /// Allocate a fresh identifier and reserve it
    pub fn allocate(&mut self) -> Result<String> {
        let Some(max) = self.max_attempts else {
            return Ok(draw_unused(&mut self.existing, &mut self.rng));
        };

        for _ in 0..max {
            let candidate = generate_candidate(&mut self.rng);
            if self.existing.insert(candidate.clone()) {
                return Ok(candidate);
            }
            debug!("Profile ID collision on {}, drawing again", candidate);
        }
        Err(CtdError::IdSpaceExhausted { attempts: max })
    }

    /// Allocate `count` identifiers, in order
    pub fn allocate_many(&mut self, count: usize) -> Result<Vec<String>> {
        (0..count).map(|_| self.allocate()).collect()
    }

    /// Add a `profile_id` variable with one fresh identifier per profile
    ///
    /// Fails without allocating anything if the dataset already carries a
    /// profile identifier under either spelling.
    pub fn tag_dataset(&mut self, dataset: &mut Dataset) -> Result<usize> {
        for field in [PROFILE_ID, PROFILE_ID_LEGACY] {
            if dataset.contains(field) {
                return Err(CtdError::ProfileIdExists {
                    dataset: dataset.name().to_string(),
                    field: field.to_string(),
                });
            }
        }

        let count = dataset.profile_count()?;
        let ids = self.allocate_many(count)?;
        dataset.set_variable(PROFILE_DIM, Series::new(PROFILE_ID.into(), ids))?;

        debug!("Tagged {} profiles in {}", count, dataset.name());
        Ok(count)
    }
}
