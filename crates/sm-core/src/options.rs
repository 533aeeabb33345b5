//! Run configuration

use serde::{Deserialize, Serialize};
use sm_cad::{StepExportOptions, StepSchema};
use tracing::warn;

use crate::boolean::Operation;
use crate::constants::DEFAULT_PRECISION;
use crate::error::Result;

/// Accept a precision value, falling back to the default when unusable
pub fn sanitize_precision(precision: f64) -> f64 {
    if precision.is_finite() && precision > 0.0 {
        precision
    } else {
        warn!(
            "Invalid precision {}, using default {}",
            precision, DEFAULT_PRECISION
        );
        DEFAULT_PRECISION
    }
}

/// Options for a merge run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Boolean operation applied within each group
    pub operation: Operation,
    /// Tolerance for z matching, footprint matching and booleans
    pub precision: f64,
    /// Chain same-material solids vertically instead of grouping by layer only
    pub use_material_grouping: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            operation: Operation::Union,
            precision: DEFAULT_PRECISION,
            use_material_grouping: true,
        }
    }
}

impl MergeOptions {
    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }

    /// Set the operation from its name
    ///
    /// # Errors
    ///
    /// Returns a validation error for names other than union, intersection
    /// and difference.
    pub fn with_operation_name(self, name: &str) -> Result<Self> {
        Ok(self.with_operation(name.parse()?))
    }

    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = sanitize_precision(precision);
        self
    }

    pub fn with_material_grouping(mut self, enabled: bool) -> Self {
        self.use_material_grouping = enabled;
        self
    }
}

/// Options for STEP export
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExportOptions {
    /// Schema variant
    pub schema: StepSchema,
    /// Tolerance carried in the request (informational)
    pub precision: Option<f64>,
    /// Author recorded in the file header
    pub author: Option<String>,
    /// Organization recorded in the file header
    pub organization: Option<String>,
}

impl ExportOptions {
    pub fn with_schema(mut self, schema: StepSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Set the schema from a tag, falling back to AP203 for unknown tags
    pub fn with_format(self, tag: &str) -> Self {
        let schema = StepSchema::from_tag(tag).unwrap_or_else(|| {
            warn!("Unknown STEP format '{}', using AP203", tag);
            StepSchema::Ap203
        });
        self.with_schema(schema)
    }

    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = Some(sanitize_precision(precision));
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    /// Kernel-level export options
    pub fn step_options(&self) -> StepExportOptions {
        StepExportOptions {
            schema: self.schema,
            author: self.author.clone(),
            organization: self.organization.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_defaults() {
        let options = MergeOptions::default();
        assert_eq!(options.operation, Operation::Union);
        assert_eq!(options.precision, 1e-6);
        assert!(options.use_material_grouping);
    }

    #[test]
    fn test_invalid_precision_falls_back() {
        assert_eq!(MergeOptions::default().with_precision(-1.0).precision, 1e-6);
        assert_eq!(
            MergeOptions::default().with_precision(f64::NAN).precision,
            1e-6
        );
        assert_eq!(MergeOptions::default().with_precision(1e-3).precision, 1e-3);
    }

    #[test]
    fn test_operation_name() {
        let options = MergeOptions::default()
            .with_operation_name("intersection")
            .unwrap();
        assert_eq!(options.operation, Operation::Intersection);
        assert!(MergeOptions::default().with_operation_name("xor").is_err());
    }

    #[test]
    fn test_export_format_fallback() {
        assert_eq!(
            ExportOptions::default().with_format("ap214").schema,
            StepSchema::Ap214
        );
        assert_eq!(
            ExportOptions::default().with_format("IGES").schema,
            StepSchema::Ap203
        );
    }
}
