//! JSON documents
//!
//! Request documents carry the solids plus optional run settings. Optional
//! settings that are missing or malformed fall back to their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sm_cad::CadKernel;
use tracing::{debug, info};

use crate::error::Result;
use crate::export::{ExportSummary, Exporter};
use crate::merge::{MergeResult, Merger};
use crate::options::{ExportOptions, MergeOptions};
use crate::record::{lenient, SolidRecord};

fn read_document<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)?;
    debug!("Read {} bytes from {}", text.len(), path.display());
    Ok(serde_json::from_str(&text)?)
}

/// Input document for a merge run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeRequest {
    #[serde(default)]
    pub solids: Vec<SolidRecord>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub precision: Option<f64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub use_material_grouping: Option<bool>,
}

impl MergeRequest {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        read_document(path)
    }

    /// Build run options from the document
    ///
    /// `operation` overrides the document's operation; `force_flat` turns
    /// material grouping off regardless of the document.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unknown operation name.
    pub fn resolve_options(
        &self,
        operation: Option<&str>,
        force_flat: bool,
    ) -> Result<MergeOptions> {
        let mut options = MergeOptions::default();

        if let Some(name) = operation.or(self.operation.as_deref()) {
            options = options.with_operation_name(name)?;
        }
        if let Some(precision) = self.precision {
            options = options.with_precision(precision);
        }
        if let Some(enabled) = self.use_material_grouping {
            options = options.with_material_grouping(enabled);
        }
        if force_flat {
            options = options.with_material_grouping(false);
        }

        Ok(options)
    }
}

/// Run a merge request end to end
///
/// The operation is validated before the kernel is consulted.
///
/// # Errors
///
/// Fails on an unknown operation or an unavailable kernel. Problems inside
/// the run are reported through [`MergeResult`].
pub fn merge_request(
    kernel: &dyn CadKernel,
    request: MergeRequest,
    operation: Option<&str>,
    force_flat: bool,
) -> Result<MergeResult> {
    let options = request.resolve_options(operation, force_flat)?;
    let merger = Merger::new(kernel, options)?;
    Ok(merger.merge(request.solids))
}

impl MergeResult {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the result document to `path`
    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        info!("Wrote merge result to {}", path.display());
        Ok(())
    }
}

/// Input document for a STEP export
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub solids: Vec<SolidRecord>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub precision: Option<f64>,
    /// Length unit label (informational)
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    /// Author recorded in the STEP header
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Organization recorded in the STEP header
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

impl ExportRequest {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        read_document(path)
    }

    pub fn export_options(&self) -> ExportOptions {
        let mut options = ExportOptions::default();
        if let Some(format) = &self.format {
            options = options.with_format(format);
        }
        if let Some(precision) = self.precision {
            options = options.with_precision(precision);
        }
        if let Some(author) = &self.author {
            options = options.with_author(author.clone());
        }
        if let Some(organization) = &self.organization {
            options = options.with_organization(organization.clone());
        }
        options
    }
}

/// Run an export request end to end
pub fn export_request(
    kernel: &dyn CadKernel,
    request: &ExportRequest,
    path: &Path,
) -> Result<ExportSummary> {
    if let Some(units) = &request.units {
        debug!("Export units: {}", units);
    }
    let exporter = Exporter::new(kernel, request.export_options())?;
    exporter.export(&request.solids, path)
}
