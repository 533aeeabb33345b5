//! STEP export of solid records
//!
//! Each record becomes one extruded body; bodies are not combined.

use std::path::Path;

use sm_cad::{CadKernel, Solid, StepBody, StepSchema};
use tracing::{info, warn};

use crate::error::{MergeError, Result};
use crate::options::ExportOptions;
use crate::record::SolidRecord;

/// What an export wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    /// Bodies written to the file
    pub written: usize,
    /// Records that could not be extruded
    pub skipped: usize,
    /// Schema of the written file
    pub schema: StepSchema,
}

/// Writes solid records to a STEP file through a geometry kernel
pub struct Exporter<'k> {
    kernel: &'k dyn CadKernel,
    options: ExportOptions,
}

impl<'k> Exporter<'k> {
    /// Create an exporter
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::KernelUnavailable`] if the kernel cannot be used.
    pub fn new(kernel: &'k dyn CadKernel, options: ExportOptions) -> Result<Self> {
        if !kernel.is_available() {
            return Err(MergeError::KernelUnavailable(kernel.name().to_string()));
        }
        Ok(Self { kernel, options })
    }

    /// Extrude every record and write the bodies to `path`
    ///
    /// # Errors
    ///
    /// Fails if `records` is empty, if no record can be extruded, or if the
    /// kernel cannot write the file.
    pub fn export(&self, records: &[SolidRecord], path: &Path) -> Result<ExportSummary> {
        if records.is_empty() {
            return Err(MergeError::Validation("No solids to export".into()));
        }

        let mut built: Vec<(Solid, &SolidRecord)> = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            let solid = record
                .validated_footprint()
                .and_then(|footprint| {
                    self.kernel
                        .extrude(&footprint, record.z_bottom, record.z_top)
                        .map_err(MergeError::from)
                });
            match solid {
                Ok(solid) => built.push((solid, record)),
                Err(e) => warn!("Skipping solid {} ('{}'): {}", i, record.layer_name, e),
            }
        }

        if built.is_empty() {
            return Err(MergeError::Validation(
                "None of the solids could be built".into(),
            ));
        }

        let bodies: Vec<StepBody<'_>> = built
            .iter()
            .map(|(solid, record)| StepBody {
                solid,
                name: &record.layer_name,
                material: &record.material,
                color: &record.color,
            })
            .collect();

        self.kernel
            .export_step(&bodies, path, &self.options.step_options())?;

        let summary = ExportSummary {
            written: bodies.len(),
            skipped: records.len() - bodies.len(),
            schema: self.options.schema,
        };
        info!(
            "Exported {} solids to {} ({})",
            summary.written,
            path.display(),
            summary.schema.as_str()
        );
        Ok(summary)
    }
}
