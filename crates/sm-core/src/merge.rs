//! Run Orchestrator
//!
//! Drives one merge run: groups the input, folds and reconstructs every
//! group, and degrades a group to its original records when it cannot be
//! merged.

use serde::{Deserialize, Serialize};
use sm_cad::CadKernel;
use tracing::{info, warn};

use crate::boolean::{extrude_members, fold, Operation};
use crate::error::{MergeError, Result};
use crate::grouping::{group_records, Group};
use crate::options::MergeOptions;
use crate::reconstruct::reconstruct;
use crate::record::SolidRecord;

/// Counters reported with every merge result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub input_count: usize,
    pub output_count: usize,
    pub operation: Operation,
    pub layers_processed: usize,
}

/// Outcome of a merge run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub merged_solids: Vec<SolidRecord>,
    pub statistics: Statistics,
}

impl MergeResult {
    fn failure(message: impl Into<String>, operation: Operation) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            merged_solids: Vec::new(),
            statistics: Statistics {
                input_count: 0,
                output_count: 0,
                operation,
                layers_processed: 0,
            },
        }
    }
}

/// Merges solid records through a geometry kernel
pub struct Merger<'k> {
    kernel: &'k dyn CadKernel,
    options: MergeOptions,
}

impl<'k> Merger<'k> {
    /// Create a merger
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::KernelUnavailable`] if the kernel reports it
    /// cannot be used.
    pub fn new(kernel: &'k dyn CadKernel, options: MergeOptions) -> Result<Self> {
        if !kernel.is_available() {
            return Err(MergeError::KernelUnavailable(kernel.name().to_string()));
        }
        Ok(Self { kernel, options })
    }

    /// Merge all records
    ///
    /// Never fails as a whole: an empty input reports `success = false`, and a
    /// group that cannot be merged is passed through unmerged.
    pub fn merge(&self, records: Vec<SolidRecord>) -> MergeResult {
        let operation = self.options.operation;
        if records.is_empty() {
            warn!("Merge requested with no solids");
            return MergeResult::failure("No solids provided", operation);
        }

        let input_count = records.len();
        info!(
            "Merging {} solids with {} (precision {}, material grouping {})",
            input_count,
            operation,
            self.options.precision,
            self.options.use_material_grouping
        );

        let groups = group_records(
            records,
            self.options.precision,
            self.options.use_material_grouping,
        );
        let layers_processed = groups.len();

        let mut merged_solids = Vec::with_capacity(input_count);
        for group in groups {
            if group.is_singleton() {
                merged_solids.extend(group.into_members());
                continue;
            }

            match self.merge_group(&group) {
                Ok(record) => {
                    info!(
                        "Merged {} solids in group '{}'",
                        group.members().len(),
                        group.key()
                    );
                    merged_solids.push(record);
                }
                Err(e) => {
                    warn!(
                        "Failed to merge group '{}': {}. Keeping {} original solids",
                        group.key(),
                        e,
                        group.members().len()
                    );
                    merged_solids.extend(group.into_members());
                }
            }
        }

        let output_count = merged_solids.len();
        info!(
            "Merge complete: {} solids in, {} out, {} groups",
            input_count, output_count, layers_processed
        );

        MergeResult {
            success: true,
            error: None,
            merged_solids,
            statistics: Statistics {
                input_count,
                output_count,
                operation,
                layers_processed,
            },
        }
    }

    /// Extrude, fold and reconstruct one group
    ///
    /// # Errors
    ///
    /// Fails if any member cannot be extruded or the merged shape cannot be
    /// queried.
    pub fn merge_group(&self, group: &Group) -> Result<SolidRecord> {
        let solids = extrude_members(self.kernel, group.members())?;
        let outcome = fold(
            self.kernel,
            &solids,
            self.options.operation,
            self.options.precision,
        )
        .ok_or_else(|| MergeError::Validation(format!("group '{}' is empty", group.key())))?;

        if !outcome.skipped.is_empty() {
            warn!(
                "Group '{}': {} of {} steps skipped",
                group.key(),
                outcome.skipped.len(),
                outcome.skipped.len() + outcome.applied
            );
        }

        reconstruct(self.kernel, &outcome.shape, group)
    }
}
