//! CAD Kernel trait definitions
//!
//! These traits define the interface that every geometry kernel must implement.

use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Smallest extrusion height a kernel accepts
pub const MIN_EXTRUSION_HEIGHT: f64 = 1e-10;

/// Unique identifier for a face within a solid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaceId {
    /// ID of the solid this face belongs to
    pub solid_id: Uuid,
    /// Index of the face within the solid
    pub index: u32,
}

impl FaceId {
    /// Create a new face ID
    pub fn new(solid_id: Uuid, index: u32) -> Self {
        Self { solid_id, index }
    }
}

/// Information about a face
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceInfo {
    /// Unique identifier for this face
    pub id: FaceId,
    /// Whether the face lies on a plane
    pub planar: bool,
}

impl FaceInfo {
    /// Create a new face info
    pub fn new(id: FaceId, planar: bool) -> Self {
        Self { id, planar }
    }
}

/// Error type for CAD kernel operations
#[derive(Debug, Clone, Error)]
pub enum CadError {
    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    #[error("Boolean operation failed: {0}")]
    BooleanFailed(String),

    #[error("Kernel not available: {0}")]
    KernelNotAvailable(String),

    #[error("Solid not found: {0}")]
    SolidNotFound(Uuid),

    #[error("Face not found: solid {} face {}", .0.solid_id, .0.index)]
    FaceNotFound(FaceId),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("STEP export failed: {0}")]
    StepExport(String),
}

/// Result type for CAD operations
pub type CadResult<T> = Result<T, CadError>;

/// A closed 2D profile in the XY plane, used as the extrusion footprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wire2D {
    /// Points defining the ring (in order, without a closing duplicate)
    pub points: Vec<DVec2>,
}

impl Wire2D {
    /// Create a profile from a ring of points
    ///
    /// A trailing point equal to the first one is dropped, so open and
    /// explicitly closed rings describe the same profile.
    pub fn closed(points: impl IntoIterator<Item = DVec2>) -> Self {
        let mut points: Vec<DVec2> = points.into_iter().collect();
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        Self { points }
    }

    /// Create an axis-aligned rectangle profile
    pub fn rectangle(min: DVec2, max: DVec2) -> Self {
        Self::closed([
            DVec2::new(min.x, min.y),
            DVec2::new(max.x, min.y),
            DVec2::new(max.x, max.y),
            DVec2::new(min.x, max.y),
        ])
    }

    /// Number of pairwise distinct vertices
    pub fn distinct_vertex_count(&self) -> usize {
        self.points
            .iter()
            .enumerate()
            .filter(|(i, p)| !self.points[..*i].contains(p))
            .count()
    }

    /// Signed area of the ring (positive when counter-clockwise)
    pub fn signed_area(&self) -> f64 {
        let n = self.points.len();
        (0..n)
            .map(|i| self.points[i].perp_dot(self.points[(i + 1) % n]))
            .sum::<f64>()
            * 0.5
    }

    /// Check that this profile can be extruded between two elevations
    pub fn validate_extrusion(&self, z_bottom: f64, z_top: f64) -> CadResult<()> {
        let distinct = self.distinct_vertex_count();
        if distinct < 3 {
            return Err(CadError::InvalidProfile(format!(
                "Polygon must have at least 3 distinct vertices, got {}",
                distinct
            )));
        }

        let height = z_top - z_bottom;
        if !height.is_finite() || height <= MIN_EXTRUSION_HEIGHT {
            return Err(CadError::InvalidProfile(format!(
                "Extrusion height too small: {}",
                height
            )));
        }

        Ok(())
    }
}

/// Opaque handle to a solid owned by a kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Solid {
    /// Unique identifier
    pub id: Uuid,
}

impl Solid {
    /// Create a new solid handle with the given ID
    pub fn new(id: Uuid) -> Self {
        Self { id }
    }
}

/// Boolean operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BooleanType {
    /// Union (fuse)
    Union,
    /// Subtraction (cut)
    Subtract,
    /// Intersection (common)
    Intersect,
}

impl BooleanType {
    /// Name of the kernel primitive that implements this operation
    pub fn primitive_name(self) -> &'static str {
        match self {
            BooleanType::Union => "fuse",
            BooleanType::Subtract => "cut",
            BooleanType::Intersect => "common",
        }
    }
}

/// Completion status of a boolean operation
///
/// A kernel may run an operation without raising an error and still report
/// that it did not complete. That case is `NotDone`, distinct from `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOutcome {
    /// The operation completed and produced a new solid
    Done(Solid),
    /// The kernel reported that the operation did not complete
    NotDone,
}

/// Mass properties of a solid
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VolumeProperties {
    /// Enclosed volume
    pub volume: f64,
    /// Center of mass
    pub centroid: DVec3,
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Minimum corner
    pub min: DVec3,
    /// Maximum corner
    pub max: DVec3,
}

impl BoundingBox {
    /// Create a bounding box from its corners
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Smallest box enclosing all points, or `None` for an empty iterator
    pub fn from_points(points: impl IntoIterator<Item = DVec3>) -> Option<Self> {
        points.into_iter().fold(None, |acc, p| {
            Some(match acc {
                None => Self::new(p, p),
                Some(bbox) => Self::new(bbox.min.min(p), bbox.max.max(p)),
            })
        })
    }

    /// Flatten to `[xmin, ymin, zmin, xmax, ymax, zmax]`
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z,
        ]
    }

    /// XY rectangle covering the box, as a closed profile
    pub fn footprint(&self) -> Wire2D {
        Wire2D::rectangle(self.min.truncate(), self.max.truncate())
    }
}

/// STEP application protocol used for the exchange document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StepSchema {
    /// AP203, configuration controlled 3D design
    #[default]
    Ap203,
    /// AP214, automotive design
    Ap214,
}

impl StepSchema {
    /// Parse a schema tag, case-insensitively
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "AP203" => Some(StepSchema::Ap203),
            "AP214" => Some(StepSchema::Ap214),
            _ => None,
        }
    }

    /// Canonical tag
    pub fn as_str(self) -> &'static str {
        match self {
            StepSchema::Ap203 => "AP203",
            StepSchema::Ap214 => "AP214",
        }
    }
}

/// Options for STEP file export
#[derive(Debug, Clone, Default)]
pub struct StepExportOptions {
    /// Schema variant
    pub schema: StepSchema,
    /// Author name in STEP header
    pub author: Option<String>,
    /// Organization name in STEP header
    pub organization: Option<String>,
}

/// A solid to export together with its descriptive labels
#[derive(Debug, Clone, Copy)]
pub struct StepBody<'a> {
    /// The solid to export
    pub solid: &'a Solid,
    /// Product name (layer name)
    pub name: &'a str,
    /// Material tag
    pub material: &'a str,
    /// Display color tag
    pub color: &'a str,
}

/// The main CAD kernel trait
///
/// Implementations provide the actual geometry operations using different
/// backends. Shapes stay inside the kernel; callers only hold `Solid` handles.
pub trait CadKernel: Send + Sync {
    /// Get the name of this kernel
    fn name(&self) -> &str;

    /// Check if the kernel is available
    fn is_available(&self) -> bool;

    /// Extrude a profile in the XY plane from `z_bottom` to `z_top`
    fn extrude(&self, profile: &Wire2D, z_bottom: f64, z_top: f64) -> CadResult<Solid>;

    /// Perform a boolean operation on two solids
    ///
    /// # Arguments
    /// * `a` - The first solid (the base for subtraction)
    /// * `b` - The second solid (the tool for subtraction)
    /// * `op` - The boolean operation type
    /// * `fuzzy` - Tolerance under which geometry is treated as coincident
    fn boolean(&self, a: &Solid, b: &Solid, op: BooleanType, fuzzy: f64)
    -> CadResult<BooleanOutcome>;

    /// Volume and center of mass of a solid
    fn volume_properties(&self, solid: &Solid) -> CadResult<VolumeProperties>;

    /// Axis-aligned bounding box of a solid
    fn bounding_box(&self, solid: &Solid) -> CadResult<BoundingBox>;

    /// Get all faces of a solid
    fn get_faces(&self, solid: &Solid) -> CadResult<Vec<FaceInfo>>;

    /// Ordered vertices of the outer boundary of a face
    fn face_boundary(&self, face: &FaceId) -> CadResult<Vec<DVec3>>;

    /// Export multiple solids to a single STEP file
    ///
    /// # Arguments
    /// * `bodies` - The solids to export, with their labels
    /// * `path` - Output file path
    /// * `options` - Export options
    fn export_step(
        &self,
        bodies: &[StepBody<'_>],
        path: &std::path::Path,
        options: &StepExportOptions,
    ) -> CadResult<()>;
}

/// A null kernel that always returns errors (used when no kernel is available)
#[derive(Debug, Default)]
pub struct NullKernel;

impl NullKernel {
    fn unavailable<T>() -> CadResult<T> {
        Err(CadError::KernelNotAvailable(
            "No CAD kernel available".into(),
        ))
    }
}

impl CadKernel for NullKernel {
    fn name(&self) -> &str {
        "null"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn extrude(&self, _profile: &Wire2D, _z_bottom: f64, _z_top: f64) -> CadResult<Solid> {
        Self::unavailable()
    }

    fn boolean(
        &self,
        _a: &Solid,
        _b: &Solid,
        _op: BooleanType,
        _fuzzy: f64,
    ) -> CadResult<BooleanOutcome> {
        Self::unavailable()
    }

    fn volume_properties(&self, _solid: &Solid) -> CadResult<VolumeProperties> {
        Self::unavailable()
    }

    fn bounding_box(&self, _solid: &Solid) -> CadResult<BoundingBox> {
        Self::unavailable()
    }

    fn get_faces(&self, _solid: &Solid) -> CadResult<Vec<FaceInfo>> {
        Self::unavailable()
    }

    fn face_boundary(&self, _face: &FaceId) -> CadResult<Vec<DVec3>> {
        Self::unavailable()
    }

    fn export_step(
        &self,
        _bodies: &[StepBody<'_>],
        _path: &std::path::Path,
        _options: &StepExportOptions,
    ) -> CadResult<()> {
        Err(CadError::KernelNotAvailable(
            "No CAD kernel available for STEP export".into(),
        ))
    }
}

/// Get the default CAD kernel based on available features
pub fn default_kernel() -> Box<dyn CadKernel> {
    #[cfg(feature = "truck")]
    {
        Box::new(super::TruckKernel::new())
    }

    #[cfg(not(feature = "truck"))]
    {
        Box::new(NullKernel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_drops_trailing_duplicate() {
        let wire = Wire2D::closed([
            DVec2::new(0.0, 0.0),
            DVec2::new(1.0, 0.0),
            DVec2::new(1.0, 1.0),
            DVec2::new(0.0, 0.0),
        ]);
        assert_eq!(wire.points.len(), 3);
    }

    #[test]
    fn test_validate_extrusion_rejects_degenerate_profile() {
        let wire = Wire2D::closed([
            DVec2::new(0.0, 0.0),
            DVec2::new(1.0, 0.0),
            DVec2::new(0.0, 0.0),
        ]);
        assert!(matches!(
            wire.validate_extrusion(0.0, 1.0),
            Err(CadError::InvalidProfile(_))
        ));

        let repeated = Wire2D::closed([
            DVec2::new(0.0, 0.0),
            DVec2::new(1.0, 0.0),
            DVec2::new(1.0, 0.0),
        ]);
        assert_eq!(repeated.distinct_vertex_count(), 2);
        assert!(repeated.validate_extrusion(0.0, 1.0).is_err());
    }

    #[test]
    fn test_validate_extrusion_rejects_flat_height() {
        let wire = Wire2D::rectangle(DVec2::ZERO, DVec2::ONE);
        assert!(wire.validate_extrusion(0.0, 1.0).is_ok());
        assert!(wire.validate_extrusion(1.0, 1.0 + 1e-12).is_err());
        assert!(wire.validate_extrusion(2.0, 1.0).is_err());
    }

    #[test]
    fn test_signed_area() {
        let ccw = Wire2D::rectangle(DVec2::ZERO, DVec2::new(2.0, 3.0));
        assert_eq!(ccw.signed_area(), 6.0);

        let cw = Wire2D::closed(ccw.points.iter().rev().copied());
        assert_eq!(cw.signed_area(), -6.0);
    }

    #[test]
    fn test_bounding_box_from_points() {
        let bbox = BoundingBox::from_points([
            DVec3::new(1.0, -1.0, 0.0),
            DVec3::new(-2.0, 4.0, 3.0),
        ])
        .unwrap();
        assert_eq!(bbox.to_array(), [-2.0, -1.0, 0.0, 1.0, 4.0, 3.0]);
        assert!(BoundingBox::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn test_step_schema_tags() {
        assert_eq!(StepSchema::from_tag("ap214"), Some(StepSchema::Ap214));
        assert_eq!(StepSchema::from_tag(" AP203 "), Some(StepSchema::Ap203));
        assert_eq!(StepSchema::from_tag("AP242"), None);
        assert_eq!(StepSchema::default().as_str(), "AP203");
    }

    #[test]
    fn test_null_kernel_is_unavailable() {
        let kernel = NullKernel;
        assert!(!kernel.is_available());
        let wire = Wire2D::rectangle(DVec2::ZERO, DVec2::ONE);
        assert!(matches!(
            kernel.extrude(&wire, 0.0, 1.0),
            Err(CadError::KernelNotAvailable(_))
        ));
    }
}
