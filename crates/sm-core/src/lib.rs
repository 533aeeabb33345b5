//! Layer Solid Merging
//!
//! This crate provides:
//! - Solid records parsed leniently from JSON documents
//! - Material continuity and flat layer grouping
//! - Boolean folding that skips steps the kernel cannot complete
//! - Reconstruction of output records from merged shapes
//! - STEP export of records through a geometry kernel

pub mod boolean;
pub mod constants;
pub mod document;
pub mod error;
pub mod export;
pub mod grouping;
pub mod merge;
pub mod options;
pub mod reconstruct;
pub mod record;

// Re-exports for convenience
pub use boolean::{FoldOutcome, Operation, SkipReason, StepFailure, StepOutcome};
pub use document::{ExportRequest, MergeRequest, export_request, merge_request};
pub use error::{MergeError, Result};
pub use export::{ExportSummary, Exporter};
pub use grouping::{Group, GroupMetadata, group_records, polygons_match};
pub use merge::{MergeResult, Merger, Statistics};
pub use options::{ExportOptions, MergeOptions};
pub use record::SolidRecord;
