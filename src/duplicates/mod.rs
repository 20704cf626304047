//! Exact duplicate detection.
//!
//! This module provides:
//! - Size-based file grouping
//! - Partial and full digest regrouping
//! - The staged [`DuplicateFinder`] pipeline

pub mod finder;
pub mod groups;

pub use crate::job::FinderError;
pub use finder::{DuplicateFinder, FinderConfig, FinderOutcome, ScanSummary};
pub use groups::{
    group_by_size, into_duplicate_groups, regroup_by_digest, sort_groups, DuplicateGroup,
    GroupingStats,
};
