//! In-memory prism kernel
//!
//! A deterministic stand-in for a real B-rep kernel. Every shape is a set of
//! vertical prisms; booleans work on whole prisms (two prisms are the same
//! operand when their footprints and elevations agree within the fuzzy
//! tolerance). It counts calls per capability and can be told to fail
//! individual boolean steps, which is what the merge pipeline tests need.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use glam::{DVec2, DVec3};
use parking_lot::Mutex;
use uuid::Uuid;

use super::{
    BooleanOutcome, BooleanType, BoundingBox, CadError, CadKernel, CadResult, FaceId, FaceInfo,
    Solid, StepBody, StepExportOptions, VolumeProperties, Wire2D,
};

#[derive(Debug, Clone, PartialEq)]
struct Prism {
    profile: Wire2D,
    z_bottom: f64,
    z_top: f64,
}

impl Prism {
    fn same_as(&self, other: &Prism, tolerance: f64) -> bool {
        (self.z_bottom - other.z_bottom).abs() <= tolerance
            && (self.z_top - other.z_top).abs() <= tolerance
            && self.profile.points.len() == other.profile.points.len()
            && self
                .profile
                .points
                .iter()
                .zip(&other.profile.points)
                .all(|(a, b)| (*a - *b).abs().max_element() <= tolerance)
    }

    /// Face loops in kernel order: lateral faces, then bottom, then top
    fn face_loops(&self) -> Vec<Vec<DVec3>> {
        let ring = &self.profile.points;
        let n = ring.len();
        let at = |p: DVec2, z: f64| p.extend(z);

        let mut loops: Vec<Vec<DVec3>> = (0..n)
            .map(|i| {
                let (a, b) = (ring[i], ring[(i + 1) % n]);
                vec![
                    at(a, self.z_bottom),
                    at(b, self.z_bottom),
                    at(b, self.z_top),
                    at(a, self.z_top),
                ]
            })
            .collect();
        loops.push(ring.iter().map(|p| at(*p, self.z_bottom)).collect());
        loops.push(ring.iter().map(|p| at(*p, self.z_top)).collect());
        loops
    }

    fn area_and_centroid(&self) -> (f64, DVec2) {
        let ring = &self.profile.points;
        let n = ring.len();
        let signed = self.profile.signed_area();
        if signed.abs() <= f64::EPSILON {
            let mean = ring.iter().copied().sum::<DVec2>() / n.max(1) as f64;
            return (0.0, mean);
        }
        let weighted: DVec2 = (0..n)
            .map(|i| {
                let (a, b) = (ring[i], ring[(i + 1) % n]);
                (a + b) * a.perp_dot(b)
            })
            .sum();
        (signed.abs(), weighted / (6.0 * signed))
    }
}

/// A failure to inject into a boolean call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    /// The kernel reports that the operation did not complete
    NotDone,
    /// The kernel raises an error
    Error,
}

/// Number of calls received per capability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub extrude: usize,
    pub boolean: usize,
    pub volume_properties: usize,
    pub bounding_box: usize,
    pub get_faces: usize,
    pub face_boundary: usize,
    pub export_step: usize,
}

impl CallCounts {
    /// Calls that build or combine geometry
    pub fn constructive(&self) -> usize {
        self.extrude + self.boolean
    }

    /// All calls
    pub fn total(&self) -> usize {
        self.constructive()
            + self.volume_properties
            + self.bounding_box
            + self.get_faces
            + self.face_boundary
            + self.export_step
    }
}

#[derive(Debug, Default)]
struct Counters {
    extrude: AtomicUsize,
    boolean: AtomicUsize,
    volume_properties: AtomicUsize,
    bounding_box: AtomicUsize,
    get_faces: AtomicUsize,
    face_boundary: AtomicUsize,
    export_step: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) -> usize {
        counter.fetch_add(1, Ordering::SeqCst)
    }
}

/// Prism-based test kernel
#[derive(Debug, Default)]
pub struct PrismKernel {
    /// Storage for shape data (keyed by UUID)
    shapes: Mutex<HashMap<Uuid, Vec<Prism>>>,
    /// Failures keyed by the zero-based index of the boolean call
    boolean_failures: Mutex<HashMap<usize, InjectedFailure>>,
    fail_face_queries: bool,
    fail_export: bool,
    counters: Counters,
}

impl PrismKernel {
    /// Create a new prism kernel
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `index`-th boolean call (zero-based) fail
    pub fn with_boolean_failure(self, index: usize, failure: InjectedFailure) -> Self {
        self.boolean_failures.lock().insert(index, failure);
        self
    }

    /// Make face decomposition fail for every shape
    pub fn with_failing_face_queries(mut self) -> Self {
        self.fail_face_queries = true;
        self
    }

    /// Make STEP export fail at the transfer stage
    pub fn with_failing_export(mut self) -> Self {
        self.fail_export = true;
        self
    }

    /// Snapshot of the calls received so far
    pub fn calls(&self) -> CallCounts {
        let c = &self.counters;
        CallCounts {
            extrude: c.extrude.load(Ordering::SeqCst),
            boolean: c.boolean.load(Ordering::SeqCst),
            volume_properties: c.volume_properties.load(Ordering::SeqCst),
            bounding_box: c.bounding_box.load(Ordering::SeqCst),
            get_faces: c.get_faces.load(Ordering::SeqCst),
            face_boundary: c.face_boundary.load(Ordering::SeqCst),
            export_step: c.export_step.load(Ordering::SeqCst),
        }
    }

    /// Number of prisms making up a shape
    pub fn prism_count(&self, solid: &Solid) -> Option<usize> {
        self.shapes.lock().get(&solid.id).map(Vec::len)
    }

    fn store(&self, prisms: Vec<Prism>) -> Solid {
        let id = Uuid::new_v4();
        self.shapes.lock().insert(id, prisms);
        Solid::new(id)
    }

    fn get(&self, solid: &Solid) -> CadResult<Vec<Prism>> {
        self.shapes
            .lock()
            .get(&solid.id)
            .cloned()
            .ok_or(CadError::SolidNotFound(solid.id))
    }
}

impl CadKernel for PrismKernel {
    fn name(&self) -> &str {
        "prism"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn extrude(&self, profile: &Wire2D, z_bottom: f64, z_top: f64) -> CadResult<Solid> {
        Counters::bump(&self.counters.extrude);
        profile.validate_extrusion(z_bottom, z_top)?;

        Ok(self.store(vec![Prism {
            profile: profile.clone(),
            z_bottom,
            z_top,
        }]))
    }

    fn boolean(
        &self,
        a: &Solid,
        b: &Solid,
        op: BooleanType,
        fuzzy: f64,
    ) -> CadResult<BooleanOutcome> {
        let call = Counters::bump(&self.counters.boolean);
        match self.boolean_failures.lock().get(&call) {
            Some(InjectedFailure::NotDone) => return Ok(BooleanOutcome::NotDone),
            Some(InjectedFailure::Error) => {
                return Err(CadError::BooleanFailed(format!(
                    "injected failure in {} call {}",
                    op.primitive_name(),
                    call
                )));
            }
            None => {}
        }

        let lhs = self.get(a)?;
        let rhs = self.get(b)?;
        let in_rhs = |p: &Prism| rhs.iter().any(|q| p.same_as(q, fuzzy));

        let result = match op {
            BooleanType::Union => {
                let mut out = lhs.clone();
                for q in &rhs {
                    if !out.iter().any(|p| p.same_as(q, fuzzy)) {
                        out.push(q.clone());
                    }
                }
                out
            }
            BooleanType::Intersect => lhs.into_iter().filter(|p| in_rhs(p)).collect(),
            BooleanType::Subtract => lhs.into_iter().filter(|p| !in_rhs(p)).collect(),
        };

        Ok(BooleanOutcome::Done(self.store(result)))
    }

    fn volume_properties(&self, solid: &Solid) -> CadResult<VolumeProperties> {
        Counters::bump(&self.counters.volume_properties);
        let prisms = self.get(solid)?;

        let mut volume = 0.0;
        let mut moment = DVec3::ZERO;
        for prism in &prisms {
            let (area, center) = prism.area_and_centroid();
            let v = area * (prism.z_top - prism.z_bottom);
            volume += v;
            moment += center.extend((prism.z_bottom + prism.z_top) * 0.5) * v;
        }

        let centroid = if volume > 0.0 {
            moment / volume
        } else {
            DVec3::ZERO
        };
        Ok(VolumeProperties { volume, centroid })
    }

    fn bounding_box(&self, solid: &Solid) -> CadResult<BoundingBox> {
        Counters::bump(&self.counters.bounding_box);
        let prisms = self.get(solid)?;
        BoundingBox::from_points(
            prisms
                .iter()
                .flat_map(|p| p.face_loops())
                .flatten(),
        )
        .ok_or_else(|| CadError::QueryFailed("Shape is empty".into()))
    }

    fn get_faces(&self, solid: &Solid) -> CadResult<Vec<FaceInfo>> {
        Counters::bump(&self.counters.get_faces);
        if self.fail_face_queries {
            return Err(CadError::QueryFailed("face decomposition disabled".into()));
        }
        let prisms = self.get(solid)?;
        let count: usize = prisms.iter().map(|p| p.profile.points.len() + 2).sum();

        Ok((0..count as u32)
            .map(|i| FaceInfo::new(FaceId::new(solid.id, i), true))
            .collect())
    }

    fn face_boundary(&self, face: &FaceId) -> CadResult<Vec<DVec3>> {
        Counters::bump(&self.counters.face_boundary);
        let prisms = self.get(&Solid::new(face.solid_id))?;
        prisms
            .iter()
            .flat_map(|p| p.face_loops())
            .nth(face.index as usize)
            .ok_or(CadError::FaceNotFound(*face))
    }

    fn export_step(
        &self,
        bodies: &[StepBody<'_>],
        path: &std::path::Path,
        options: &StepExportOptions,
    ) -> CadResult<()> {
        Counters::bump(&self.counters.export_step);
        if bodies.is_empty() {
            return Err(CadError::StepExport("No solids to export".into()));
        }
        if self.fail_export {
            return Err(CadError::StepExport("transfer failed".into()));
        }

        let mut doc = String::from("ISO-10303-21;\nHEADER;\n");
        doc.push_str(&format!("FILE_SCHEMA(('{}'));\n", options.schema.as_str()));
        doc.push_str("ENDSEC;\nDATA;\n");
        for (i, body) in bodies.iter().enumerate() {
            let prisms = self.get(body.solid)?;
            doc.push_str(&format!(
                "#{}=PRODUCT('{}','{}','{}',{});\n",
                i + 1,
                body.name,
                body.material,
                body.color,
                prisms.len()
            ));
        }
        doc.push_str("ENDSEC;\nEND-ISO-10303-21;\n");

        std::fs::write(path, doc).map_err(|e| CadError::StepExport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(size: f64) -> Wire2D {
        Wire2D::rectangle(DVec2::ZERO, DVec2::splat(size))
    }

    #[test]
    fn test_union_with_itself_keeps_volume() {
        let kernel = PrismKernel::new();
        let a = kernel.extrude(&square(2.0), 0.0, 1.0).unwrap();
        let b = kernel.extrude(&square(2.0), 0.0, 1.0).unwrap();

        let BooleanOutcome::Done(fused) = kernel.boolean(&a, &b, BooleanType::Union, 1e-6).unwrap()
        else {
            panic!("union did not complete");
        };
        let props = kernel.volume_properties(&fused).unwrap();
        assert_relative_eq!(props.volume, 4.0, epsilon = 1e-12);
        assert_relative_eq!(props.centroid.z, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_injected_failures() {
        let kernel = PrismKernel::new()
            .with_boolean_failure(0, InjectedFailure::NotDone)
            .with_boolean_failure(1, InjectedFailure::Error);
        let a = kernel.extrude(&square(1.0), 0.0, 1.0).unwrap();
        let b = kernel.extrude(&square(1.0), 1.0, 2.0).unwrap();

        assert_eq!(
            kernel.boolean(&a, &b, BooleanType::Union, 1e-6).unwrap(),
            BooleanOutcome::NotDone
        );
        assert!(kernel.boolean(&a, &b, BooleanType::Union, 1e-6).is_err());
        assert!(matches!(
            kernel.boolean(&a, &b, BooleanType::Union, 1e-6).unwrap(),
            BooleanOutcome::Done(_)
        ));
        assert_eq!(kernel.calls().boolean, 3);
    }

    #[test]
    fn test_face_order_puts_bottom_after_sides() {
        let kernel = PrismKernel::new();
        let solid = kernel.extrude(&square(1.0), 2.0, 5.0).unwrap();
        let faces = kernel.get_faces(&solid).unwrap();
        assert_eq!(faces.len(), 6);

        let bottom = kernel.face_boundary(&faces[4].id).unwrap();
        assert!(bottom.iter().all(|p| p.z == 2.0));
        let top = kernel.face_boundary(&faces[5].id).unwrap();
        assert!(top.iter().all(|p| p.z == 5.0));
    }

    #[test]
    fn test_subtract_and_intersect() {
        let kernel = PrismKernel::new();
        let a = kernel.extrude(&square(1.0), 0.0, 1.0).unwrap();
        let b = kernel.extrude(&square(1.0), 0.0, 1.0).unwrap();

        let BooleanOutcome::Done(common) =
            kernel.boolean(&a, &b, BooleanType::Intersect, 1e-6).unwrap()
        else {
            panic!("common did not complete");
        };
        assert_eq!(kernel.prism_count(&common), Some(1));

        let BooleanOutcome::Done(cut) = kernel.boolean(&a, &b, BooleanType::Subtract, 1e-6).unwrap()
        else {
            panic!("cut did not complete");
        };
        assert_eq!(kernel.prism_count(&cut), Some(0));
    }

    #[test]
    fn test_export_step_labels_bodies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bodies.step");
        let kernel = PrismKernel::new();
        let solid = kernel.extrude(&square(1.0), 0.0, 1.0).unwrap();

        let body = StepBody {
            solid: &solid,
            name: "M1",
            material: "copper",
            color: "orange",
        };
        kernel
            .export_step(&[body], &path, &StepExportOptions::default())
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("FILE_SCHEMA(('AP203'))"));
        assert!(text.contains("'M1','copper','orange'"));
        assert!(kernel.export_step(&[], &path, &StepExportOptions::default()).is_err());
    }
}
