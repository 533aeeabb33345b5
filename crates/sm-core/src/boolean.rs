//! Boolean Orchestrator
//!
//! Turns a group's records into kernel solids and folds them with the
//! requested operation. A step that does not complete is skipped: the
//! accumulator stays as it was and the fold moves on to the next operand.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sm_cad::{BooleanOutcome, BooleanType, CadError, CadKernel, Solid};
use tracing::{debug, warn};

use crate::error::{MergeError, Result};
use crate::record::SolidRecord;

/// Boolean operation applied across a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Fuse all members together
    #[default]
    Union,
    /// Keep only the volume common to all members
    Intersection,
    /// Subtract every later member from the first one
    Difference,
}

impl Operation {
    /// Lowercase operation name
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Union => "union",
            Operation::Intersection => "intersection",
            Operation::Difference => "difference",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "union" => Ok(Operation::Union),
            "intersection" => Ok(Operation::Intersection),
            "difference" => Ok(Operation::Difference),
            _ => Err(MergeError::Validation(format!(
                "Unknown operation '{}', expected union, intersection or difference",
                s
            ))),
        }
    }
}

impl From<Operation> for BooleanType {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Union => BooleanType::Union,
            Operation::Intersection => BooleanType::Intersect,
            Operation::Difference => BooleanType::Subtract,
        }
    }
}

/// Why a fold step left the accumulator unchanged
#[derive(Debug, Clone)]
pub enum SkipReason {
    /// The kernel ran the operation but reported it incomplete
    NotDone,
    /// The kernel raised an error
    Failed(CadError),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotDone => f.write_str("operation did not complete"),
            SkipReason::Failed(e) => write!(f, "{}", e),
        }
    }
}

/// Result of one fold step
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// The operand was combined into the accumulator
    Applied(Solid),
    /// The operand was skipped
    Skipped(SkipReason),
}

impl StepOutcome {
    fn from_kernel(result: sm_cad::CadResult<BooleanOutcome>) -> Self {
        match result {
            Ok(BooleanOutcome::Done(solid)) => StepOutcome::Applied(solid),
            Ok(BooleanOutcome::NotDone) => StepOutcome::Skipped(SkipReason::NotDone),
            Err(e) => StepOutcome::Skipped(SkipReason::Failed(e)),
        }
    }
}

/// A skipped fold step
#[derive(Debug, Clone)]
pub struct StepFailure {
    /// Index of the operand within the group (the base is 0)
    pub operand: usize,
    /// Why it was skipped
    pub reason: SkipReason,
}

/// Accumulated shape after folding a group
#[derive(Debug, Clone)]
pub struct FoldOutcome {
    /// Final accumulator
    pub shape: Solid,
    /// Number of steps that changed the accumulator
    pub applied: usize,
    /// Steps that were skipped
    pub skipped: Vec<StepFailure>,
}

/// Extrude one solid per record
///
/// # Errors
///
/// Fails on the first record that does not validate or that the kernel
/// cannot extrude.
pub fn extrude_members(kernel: &dyn CadKernel, members: &[SolidRecord]) -> Result<Vec<Solid>> {
    members
        .iter()
        .map(|record| -> Result<Solid> {
            let footprint = record.validated_footprint()?;
            Ok(kernel.extrude(&footprint, record.z_bottom, record.z_top)?)
        })
        .collect()
}

/// Fold solids left to right with `op`, skipping steps that fail
///
/// Returns `None` only when `solids` is empty.
pub fn fold(
    kernel: &dyn CadKernel,
    solids: &[Solid],
    op: Operation,
    fuzzy: f64,
) -> Option<FoldOutcome> {
    let (first, rest) = solids.split_first()?;
    let boolean_type = BooleanType::from(op);

    let mut outcome = FoldOutcome {
        shape: *first,
        applied: 0,
        skipped: Vec::new(),
    };

    for (i, operand) in rest.iter().enumerate() {
        let operand_index = i + 1;
        let step = StepOutcome::from_kernel(kernel.boolean(
            &outcome.shape,
            operand,
            boolean_type,
            fuzzy,
        ));

        match step {
            StepOutcome::Applied(solid) => {
                debug!(
                    "{} step {} applied",
                    boolean_type.primitive_name(),
                    operand_index
                );
                outcome.shape = solid;
                outcome.applied += 1;
            }
            StepOutcome::Skipped(reason) => {
                warn!("{} with operand {} skipped: {}", op, operand_index, reason);
                outcome.skipped.push(StepFailure {
                    operand: operand_index,
                    reason,
                });
            }
        }
    }

    Some(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec2;
    use sm_cad::{InjectedFailure, PrismKernel};

    fn square_record(x: f64, z_bottom: f64, z_top: f64) -> SolidRecord {
        SolidRecord::new(
            [
                DVec2::new(x, 0.0),
                DVec2::new(x + 1.0, 0.0),
                DVec2::new(x + 1.0, 1.0),
                DVec2::new(x, 1.0),
            ],
            z_bottom,
            z_top,
        )
    }

    #[test]
    fn test_operation_parsing() {
        assert_eq!("UNION".parse::<Operation>().unwrap(), Operation::Union);
        assert_eq!(
            "Difference".parse::<Operation>().unwrap(),
            Operation::Difference
        );
        assert!("xor".parse::<Operation>().unwrap_err().is_validation());
        assert_eq!(Operation::Intersection.to_string(), "intersection");
    }

    #[test]
    fn test_operation_maps_to_kernel_primitive() {
        assert_eq!(BooleanType::from(Operation::Union).primitive_name(), "fuse");
        assert_eq!(
            BooleanType::from(Operation::Intersection).primitive_name(),
            "common"
        );
        assert_eq!(
            BooleanType::from(Operation::Difference).primitive_name(),
            "cut"
        );
    }

    #[test]
    fn test_extrude_members_rejects_degenerate_before_kernel() {
        let kernel = PrismKernel::new();
        let bad = SolidRecord::new([DVec2::ZERO, DVec2::X], 0.0, 1.0);

        let err = extrude_members(&kernel, &[bad]).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(kernel.calls().extrude, 0);
    }

    #[test]
    fn test_fold_union_applies_every_step() {
        let kernel = PrismKernel::new();
        let solids = extrude_members(
            &kernel,
            &[
                square_record(0.0, 0.0, 1.0),
                square_record(2.0, 0.0, 1.0),
                square_record(4.0, 0.0, 1.0),
            ],
        )
        .unwrap();

        let outcome = fold(&kernel, &solids, Operation::Union, 1e-6).unwrap();
        assert_eq!(outcome.applied, 2);
        assert!(outcome.skipped.is_empty());
        assert_eq!(kernel.prism_count(&outcome.shape), Some(3));
    }

    #[test]
    fn test_fold_skips_failed_steps() {
        let kernel = PrismKernel::new()
            .with_boolean_failure(0, InjectedFailure::NotDone)
            .with_boolean_failure(1, InjectedFailure::Error);
        let solids = extrude_members(
            &kernel,
            &[
                square_record(0.0, 0.0, 1.0),
                square_record(2.0, 0.0, 1.0),
                square_record(4.0, 0.0, 1.0),
                square_record(6.0, 0.0, 1.0),
            ],
        )
        .unwrap();

        let outcome = fold(&kernel, &solids, Operation::Union, 1e-6).unwrap();
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.skipped.len(), 2);
        assert_eq!(outcome.skipped[0].operand, 1);
        assert!(matches!(outcome.skipped[0].reason, SkipReason::NotDone));
        assert!(matches!(outcome.skipped[1].reason, SkipReason::Failed(_)));
        // base plus the last operand
        assert_eq!(kernel.prism_count(&outcome.shape), Some(2));
    }

    #[test]
    fn test_fold_intersection_skips_failed_step() {
        let kernel = PrismKernel::new().with_boolean_failure(1, InjectedFailure::NotDone);
        let solids = extrude_members(
            &kernel,
            &[
                square_record(0.0, 0.0, 1.0),
                square_record(0.0, 0.0, 1.0),
                square_record(5.0, 0.0, 1.0),
            ],
        )
        .unwrap();

        let outcome = fold(&kernel, &solids, Operation::Intersection, 1e-6).unwrap();
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].operand, 2);
        // the disjoint operand would have emptied the result
        assert_eq!(kernel.prism_count(&outcome.shape), Some(1));
    }

    #[test]
    fn test_fold_single_solid_is_pass_through() {
        let kernel = PrismKernel::new();
        let solids = extrude_members(&kernel, &[square_record(0.0, 0.0, 1.0)]).unwrap();

        let outcome = fold(&kernel, &solids, Operation::Difference, 1e-6).unwrap();
        assert_eq!(outcome.shape, solids[0]);
        assert_eq!(outcome.applied, 0);
        assert_eq!(kernel.calls().boolean, 0);
    }

    #[test]
    fn test_fold_empty_is_none() {
        let kernel = PrismKernel::new();
        assert!(fold(&kernel, &[], Operation::Union, 1e-6).is_none());
    }
}
