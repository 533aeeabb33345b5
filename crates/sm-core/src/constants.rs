//! Global constants for sm-core

/// Default geometric tolerance for z matching, footprint matching and booleans
pub const DEFAULT_PRECISION: f64 = 1e-6;

/// Material tag used when a record does not name one
pub const DEFAULT_MATERIAL: &str = "unknown";

/// Layer name used when a record does not name one
pub const DEFAULT_LAYER_NAME: &str = "default";

/// Suffix appended to the material tag to name a continuity chain
pub const CONTINUOUS_LAYER_SUFFIX: &str = "_continuous";
