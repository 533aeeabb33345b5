//! Result Reconstructor
//!
//! Builds the output record for a folded group. Continuity chains keep the
//! footprint of their first member. Layer groups recover a footprint from the
//! merged shape's bottom face, or from its bounding rectangle when no such
//! face can be found.

use glam::{DVec2, DVec3};
use sm_cad::{CadKernel, Solid};
use tracing::{debug, warn};

use crate::error::{MergeError, Result};
use crate::grouping::Group;
use crate::record::SolidRecord;

/// Build the output record for a merged group
///
/// # Errors
///
/// Fails when the volume or bounding box of a layer group's shape cannot be
/// queried. Face lookup failures fall back to the bounding rectangle.
pub fn reconstruct(kernel: &dyn CadKernel, shape: &Solid, group: &Group) -> Result<SolidRecord> {
    let meta = group.metadata();

    let base = |polygon: Vec<DVec2>| {
        SolidRecord::new(polygon, meta.z_bottom, meta.z_top)
            .with_layer_name(meta.layer_name.clone())
            .with_material(meta.material.clone())
            .with_color(meta.color.clone())
    };

    if meta.merged {
        let first = group
            .members()
            .first()
            .ok_or_else(|| MergeError::Validation(format!("group '{}' is empty", group.key())))?;
        let mut record = base(first.polygon.clone());
        record.merged = Some(true);
        return Ok(record);
    }

    let props = kernel.volume_properties(shape)?;
    let bbox = kernel.bounding_box(shape)?;

    let polygon = match bottom_face_polygon(kernel, shape, meta.z_bottom, meta.z_top) {
        Some(polygon) => polygon,
        None => {
            debug!(
                "No bottom face found for '{}', using bounding rectangle",
                group.key()
            );
            bbox.footprint().points
        }
    };

    let mut record = base(polygon);
    record.volume = Some(props.volume);
    record.centroid = Some(props.centroid.to_array());
    record.bbox = Some(bbox.to_array());
    record.merged = Some(false);
    Ok(record)
}

/// XY outline of the first planar face lying closer to `z_bottom` than `z_top`
fn bottom_face_polygon(
    kernel: &dyn CadKernel,
    shape: &Solid,
    z_bottom: f64,
    z_top: f64,
) -> Option<Vec<DVec2>> {
    let faces = match kernel.get_faces(shape) {
        Ok(faces) => faces,
        Err(e) => {
            warn!("Face decomposition failed: {}", e);
            return None;
        }
    };

    faces
        .iter()
        .filter(|face| face.planar)
        .filter_map(|face| kernel.face_boundary(&face.id).ok())
        .map(drop_closing_point)
        .filter(|boundary| boundary.len() >= 3)
        .find(|boundary| {
            let mean_z = boundary.iter().map(|p| p.z).sum::<f64>() / boundary.len() as f64;
            (mean_z - z_bottom).abs() < (mean_z - z_top).abs()
        })
        .map(|boundary| boundary.iter().map(|p| p.truncate()).collect())
}

fn drop_closing_point(mut boundary: Vec<DVec3>) -> Vec<DVec3> {
    if boundary.len() > 1 && boundary.first() == boundary.last() {
        boundary.pop();
    }
    boundary
}
