//! Truck CAD Kernel Backend
//!
//! Pure Rust B-Rep kernel using the Truck library: `truck-modeling` builds the
//! prisms, `truck-shapeops` runs the booleans and `truck-stepio` writes STEP.
//!
//! Note: volume and centroid come from the oriented face loops, which is exact
//! for the planar-faced solids produced by layer extrusion.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use glam::DVec3;
use parking_lot::Mutex;
use tracing::warn;
use uuid::Uuid;

use truck_modeling::{
    Face, Point3, Solid as TruckSolid, Surface, Vector3, Vertex, Wire, builder,
};
use truck_stepio::out::{CompleteStepDisplay, StepHeaderDescriptor, StepModels};

use super::mass::volume_properties_from_loops;
use super::{
    BooleanOutcome, BooleanType, BoundingBox, CadError, CadKernel, CadResult, FaceId, FaceInfo,
    Solid, StepBody, StepExportOptions, VolumeProperties, Wire2D,
};

/// Smallest fuzzy value handed to truck-shapeops
const MIN_SHAPEOPS_TOLERANCE: f64 = 1.0e-6;

/// Serializes panic hook swaps
static PANIC_HOOK: Mutex<()> = parking_lot::const_mutex(());

/// Run `f`, turning a panic into its message without printing it
///
/// truck asserts on some degenerate topologies instead of returning an error.
fn catch_quietly<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    let _guard = PANIC_HOOK.lock();
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(|_| {}));
    let result = catch_unwind(AssertUnwindSafe(f));
    std::panic::set_hook(previous);
    result.map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

/// Truck-based CAD kernel
pub struct TruckKernel {
    /// Storage for solid data (keyed by UUID)
    solids: Mutex<HashMap<Uuid, TruckSolid>>,
}

impl TruckKernel {
    /// Create a new Truck kernel
    pub fn new() -> Self {
        Self {
            solids: Mutex::new(HashMap::new()),
        }
    }

    /// Store a solid and return a Solid reference
    fn store_solid(&self, solid: TruckSolid) -> Solid {
        let id = Uuid::new_v4();
        self.solids.lock().insert(id, solid);
        Solid::new(id)
    }

    /// Get a stored solid by ID
    fn get_solid(&self, id: Uuid) -> CadResult<TruckSolid> {
        self.solids
            .lock()
            .get(&id)
            .cloned()
            .ok_or(CadError::SolidNotFound(id))
    }

    /// Create a closed wire from a profile at the given elevation
    ///
    /// The wire is always counter-clockwise so the attached plane faces +Z.
    fn create_wire(&self, profile: &Wire2D, z: f64) -> Wire {
        let mut points = profile.points.clone();
        if profile.signed_area() < 0.0 {
            points.reverse();
        }

        let vertices: Vec<Vertex> = points
            .iter()
            .map(|p| builder::vertex(Point3::new(p.x, p.y, z)))
            .collect();

        let n = vertices.len();
        let edges: Vec<_> = (0..n)
            .map(|i| builder::line(&vertices[i], &vertices[(i + 1) % n]))
            .collect();

        edges.into()
    }

    fn faces(solid: &TruckSolid) -> impl Iterator<Item = &Face> {
        solid.boundaries().iter().flat_map(|shell| shell.face_iter())
    }

    fn loops(face: &Face) -> Vec<Vec<DVec3>> {
        face.boundaries()
            .iter()
            .map(|wire| wire.vertex_iter().map(|v| to_dvec3(v.point())).collect())
            .collect()
    }

    /// Distinct boundary vertices, sorted lexicographically
    fn vertex_cloud(solid: &TruckSolid, tolerance: f64) -> Vec<DVec3> {
        let mut points: Vec<DVec3> = Self::faces(solid).flat_map(Self::loops).flatten().collect();
        points.sort_by(|a, b| {
            a.x.total_cmp(&b.x)
                .then(a.y.total_cmp(&b.y))
                .then(a.z.total_cmp(&b.z))
        });
        points.dedup_by(|a, b| (*a - *b).abs().max_element() <= tolerance);
        points
    }

    /// Whether two solids have the same faces and vertices within `tolerance`
    ///
    /// truck-shapeops cannot fuse a solid with an exact copy of itself.
    fn coincident(a: &TruckSolid, b: &TruckSolid, tolerance: f64) -> bool {
        if Self::faces(a).count() != Self::faces(b).count() {
            return false;
        }
        let (pa, pb) = (
            Self::vertex_cloud(a, tolerance),
            Self::vertex_cloud(b, tolerance),
        );
        pa.len() == pb.len()
            && pa
                .iter()
                .zip(&pb)
                .all(|(p, q)| (*p - *q).abs().max_element() <= tolerance)
    }
}

fn to_dvec3(p: Point3) -> DVec3 {
    DVec3::new(p.x, p.y, p.z)
}

impl Default for TruckKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl CadKernel for TruckKernel {
    fn name(&self) -> &str {
        "truck"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn extrude(&self, profile: &Wire2D, z_bottom: f64, z_top: f64) -> CadResult<Solid> {
        profile.validate_extrusion(z_bottom, z_top)?;

        let wire = self.create_wire(profile, z_bottom);

        let face = builder::try_attach_plane(&[wire])
            .map_err(|e| CadError::OperationFailed(format!("Failed to create face: {:?}", e)))?;

        let solid = builder::tsweep(&face, Vector3::new(0.0, 0.0, z_top - z_bottom));

        Ok(self.store_solid(solid))
    }

    fn boolean(
        &self,
        a: &Solid,
        b: &Solid,
        op: BooleanType,
        fuzzy: f64,
    ) -> CadResult<BooleanOutcome> {
        let solid_a = self.get_solid(a.id)?;
        let solid_b = self.get_solid(b.id)?;
        let tol = fuzzy.max(MIN_SHAPEOPS_TOLERANCE);

        if op != BooleanType::Subtract && Self::coincident(&solid_a, &solid_b, tol) {
            return Ok(BooleanOutcome::Done(self.store_solid(solid_a)));
        }

        let result = catch_quietly(|| match op {
            BooleanType::Union => truck_shapeops::or(&solid_a, &solid_b, tol),
            BooleanType::Intersect => truck_shapeops::and(&solid_a, &solid_b, tol),
            BooleanType::Subtract => {
                let mut tool = solid_b.clone();
                tool.not();
                truck_shapeops::and(&solid_a, &tool, tol)
            }
        });

        match result {
            Ok(Some(solid)) => Ok(BooleanOutcome::Done(self.store_solid(solid))),
            Ok(None) => Ok(BooleanOutcome::NotDone),
            Err(message) => {
                warn!("truck-shapeops panicked during {}: {}", op.primitive_name(), message);
                Err(CadError::BooleanFailed(format!(
                    "{} aborted: {}",
                    op.primitive_name(),
                    message
                )))
            }
        }
    }

    fn volume_properties(&self, solid: &Solid) -> CadResult<VolumeProperties> {
        let truck_solid = self.get_solid(solid.id)?;
        let loops: Vec<Vec<DVec3>> = Self::faces(&truck_solid).flat_map(Self::loops).collect();

        volume_properties_from_loops(loops.iter().map(Vec::as_slice))
            .ok_or_else(|| CadError::QueryFailed("Solid encloses no volume".into()))
    }

    fn bounding_box(&self, solid: &Solid) -> CadResult<BoundingBox> {
        let truck_solid = self.get_solid(solid.id)?;
        let points = Self::faces(&truck_solid)
            .flat_map(Self::loops)
            .flatten()
            .collect::<Vec<_>>();

        BoundingBox::from_points(points)
            .ok_or_else(|| CadError::QueryFailed("Solid has no vertices".into()))
    }

    fn get_faces(&self, solid: &Solid) -> CadResult<Vec<FaceInfo>> {
        let truck_solid = self.get_solid(solid.id)?;

        Ok(Self::faces(&truck_solid)
            .enumerate()
            .map(|(index, face)| {
                FaceInfo::new(
                    FaceId::new(solid.id, index as u32),
                    matches!(face.surface(), Surface::Plane(_)),
                )
            })
            .collect())
    }

    fn face_boundary(&self, face: &FaceId) -> CadResult<Vec<DVec3>> {
        let truck_solid = self.get_solid(face.solid_id)?;

        let truck_face = Self::faces(&truck_solid)
            .nth(face.index as usize)
            .ok_or(CadError::FaceNotFound(*face))?;

        Self::loops(truck_face)
            .into_iter()
            .next()
            .ok_or_else(|| CadError::QueryFailed("Face has no boundary".into()))
    }

    fn export_step(
        &self,
        bodies: &[StepBody<'_>],
        path: &std::path::Path,
        options: &StepExportOptions,
    ) -> CadResult<()> {
        if bodies.is_empty() {
            return Err(CadError::StepExport("No solids to export".into()));
        }

        let solids = bodies
            .iter()
            .map(|body| self.get_solid(body.solid.id))
            .collect::<CadResult<Vec<_>>>()?;
        let compressed: Vec<_> = solids.iter().map(|s| s.compress()).collect();

        let header = StepHeaderDescriptor {
            file_name: path.to_string_lossy().to_string(),
            authors: options.author.iter().cloned().collect(),
            organization: options.organization.iter().cloned().collect(),
            organization_system: format!("solid-merge ({})", options.schema.as_str()),
            ..Default::default()
        };

        let step = catch_quietly(|| {
            CompleteStepDisplay::new(StepModels::from_iter(compressed.iter()), header).to_string()
        })
        .map_err(|message| {
            CadError::StepExport(format!("Failed to transfer shapes: {}", message))
        })?;

        tracing::debug!(
            "Writing {} bodies ({}) to {:?}",
            bodies.len(),
            options.schema.as_str(),
            path
        );

        std::fs::write(path, step)
            .map_err(|e| CadError::StepExport(format!("Failed to write STEP file: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::DVec2;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Wire2D {
        Wire2D::rectangle(DVec2::new(x0, y0), DVec2::new(x1, y1))
    }

    #[test]
    fn test_extrude_volume_and_bbox() {
        let kernel = TruckKernel::new();
        let solid = kernel.extrude(&rect(0.0, 0.0, 2.0, 3.0), 0.0, 1.0).unwrap();

        let props = kernel.volume_properties(&solid).unwrap();
        assert_relative_eq!(props.volume, 6.0, epsilon = 1e-9);
        assert_relative_eq!(props.centroid.x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(props.centroid.y, 1.5, epsilon = 1e-9);
        assert_relative_eq!(props.centroid.z, 0.5, epsilon = 1e-9);

        let bbox = kernel.bounding_box(&solid).unwrap();
        assert_eq!(bbox.to_array(), [0.0, 0.0, 0.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn test_clockwise_profile_extrudes_outward() {
        let kernel = TruckKernel::new();
        let ccw = rect(0.0, 0.0, 2.0, 3.0);
        let cw = Wire2D::closed(ccw.points.iter().rev().copied());
        let solid = kernel.extrude(&cw, 1.0, 2.0).unwrap();

        let props = kernel.volume_properties(&solid).unwrap();
        assert_relative_eq!(props.volume, 6.0, epsilon = 1e-9);
        assert_relative_eq!(props.centroid.z, 1.5, epsilon = 1e-9);
    }

    #[test]
    fn test_faces_include_bottom_outline() {
        let kernel = TruckKernel::new();
        let solid = kernel.extrude(&rect(0.0, 0.0, 2.0, 3.0), 4.0, 5.0).unwrap();
        let faces = kernel.get_faces(&solid).unwrap();
        assert_eq!(faces.len(), 6);
        assert!(faces.iter().all(|f| f.planar));

        let bottom = faces
            .iter()
            .map(|f| kernel.face_boundary(&f.id).unwrap())
            .find(|boundary| boundary.iter().all(|p| p.z == 4.0))
            .unwrap();
        assert_eq!(bottom.len(), 4);
        for corner in [
            DVec2::new(0.0, 0.0),
            DVec2::new(2.0, 0.0),
            DVec2::new(2.0, 3.0),
            DVec2::new(0.0, 3.0),
        ] {
            assert!(bottom.iter().any(|p| p.truncate() == corner));
        }

        let missing = FaceId::new(solid.id, 99);
        assert!(matches!(
            kernel.face_boundary(&missing),
            Err(CadError::FaceNotFound(_))
        ));
    }

    #[test]
    fn test_union_with_identical_copy() {
        let kernel = TruckKernel::new();
        let a = kernel.extrude(&rect(0.0, 0.0, 2.0, 3.0), 0.0, 1.0).unwrap();
        let b = kernel.extrude(&rect(0.0, 0.0, 2.0, 3.0), 0.0, 1.0).unwrap();

        let BooleanOutcome::Done(fused) = kernel.boolean(&a, &b, BooleanType::Union, 1e-6).unwrap()
        else {
            panic!("union of identical solids did not complete");
        };
        let props = kernel.volume_properties(&fused).unwrap();
        assert_relative_eq!(props.volume, 6.0, epsilon = 1e-9);
    }

    #[test]
    fn test_union_of_coplanar_overlap_is_not_done() {
        // truck-shapeops gives up on boxes that share their top and bottom planes
        let kernel = TruckKernel::new();
        let a = kernel.extrude(&rect(0.0, 0.0, 2.0, 3.0), 0.0, 1.0).unwrap();
        let b = kernel.extrude(&rect(1.0, 0.0, 3.0, 3.0), 0.0, 1.0).unwrap();

        assert_eq!(
            kernel.boolean(&a, &b, BooleanType::Union, 1e-6).unwrap(),
            BooleanOutcome::NotDone
        );
    }

    #[test]
    fn test_boolean_with_unknown_solid() {
        let kernel = TruckKernel::new();
        let a = kernel.extrude(&rect(0.0, 0.0, 1.0, 1.0), 0.0, 1.0).unwrap();
        let ghost = Solid::new(Uuid::new_v4());
        assert!(matches!(
            kernel.boolean(&a, &ghost, BooleanType::Union, 1e-6),
            Err(CadError::SolidNotFound(_))
        ));
    }

    #[test]
    fn test_export_step_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layers.step");
        let kernel = TruckKernel::new();
        let solid = kernel.extrude(&rect(0.0, 0.0, 1.0, 1.0), 0.0, 1.0).unwrap();

        let body = StepBody {
            solid: &solid,
            name: "M1",
            material: "copper",
            color: "",
        };
        kernel
            .export_step(&[body], &path, &StepExportOptions::default())
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("ISO-10303-21;"));
        assert!(text.contains("AP203"));
        assert!(kernel.export_step(&[], &path, &StepExportOptions::default()).is_err());
    }
}
