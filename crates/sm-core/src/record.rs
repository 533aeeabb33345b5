//! Solid records
//!
//! A record is one layer's extruded polygon plus its tags. Records are parsed
//! leniently (missing or malformed tags fall back to defaults) and validated
//! only when they are about to be extruded, so one bad record can be isolated
//! without rejecting the whole document.

use glam::DVec2;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use sm_cad::Wire2D;

use crate::constants::{DEFAULT_LAYER_NAME, DEFAULT_MATERIAL};
use crate::error::{MergeError, Result};

/// One extruded polygon with its layer metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolidRecord {
    /// Footprint ring in the XY plane, as given in the input
    pub polygon: Vec<DVec2>,
    /// Bottom elevation
    pub z_bottom: f64,
    /// Top elevation
    pub z_top: f64,
    /// Material tag
    #[serde(default = "default_material", deserialize_with = "material")]
    pub material: String,
    /// Display color tag
    #[serde(default, deserialize_with = "color")]
    pub color: String,
    /// Layer name
    #[serde(default = "default_layer_name", deserialize_with = "layer_name")]
    pub layer_name: String,

    /// Enclosed volume (set by reconstruction only)
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    /// Center of mass (set by reconstruction only)
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub centroid: Option<[f64; 3]>,
    /// `[xmin, ymin, zmin, xmax, ymax, zmax]` (set by reconstruction only)
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 6]>,
    /// Whether this record is a continuity chain (set by reconstruction only)
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub merged: Option<bool>,
}

fn default_material() -> String {
    DEFAULT_MATERIAL.to_string()
}

fn default_layer_name() -> String {
    DEFAULT_LAYER_NAME.to_string()
}

/// Deserialize a value, treating `null` and mistyped values as absent
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn material<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(lenient(d)?.unwrap_or_else(default_material))
}

fn color<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(lenient(d)?.unwrap_or_default())
}

fn layer_name<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(lenient(d)?.unwrap_or_else(default_layer_name))
}

impl SolidRecord {
    /// Create a record with default tags
    pub fn new(polygon: impl IntoIterator<Item = DVec2>, z_bottom: f64, z_top: f64) -> Self {
        Self {
            polygon: polygon.into_iter().collect(),
            z_bottom,
            z_top,
            material: default_material(),
            color: String::new(),
            layer_name: default_layer_name(),
            volume: None,
            centroid: None,
            bbox: None,
            merged: None,
        }
    }

    /// Set the material tag
    pub fn with_material(mut self, material: impl Into<String>) -> Self {
        self.material = material.into();
        self
    }

    /// Set the color tag
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Set the layer name
    pub fn with_layer_name(mut self, layer_name: impl Into<String>) -> Self {
        self.layer_name = layer_name.into();
        self
    }

    /// The footprint without a closing duplicate point
    pub fn footprint(&self) -> Wire2D {
        Wire2D::closed(self.polygon.iter().copied())
    }

    /// Validate the record for extrusion and return its footprint
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::Validation`] if the footprint has fewer than three
    /// distinct vertices or the extrusion height is not above 1e-10.
    pub fn validated_footprint(&self) -> Result<Wire2D> {
        let footprint = self.footprint();
        footprint
            .validate_extrusion(self.z_bottom, self.z_top)
            .map_err(|e| MergeError::Validation(format!("layer '{}': {}", self.layer_name, e)))?;
        Ok(footprint)
    }
}
