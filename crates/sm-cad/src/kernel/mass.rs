//! Mass properties of closed, planar-faced solids
//!
//! Kernels that expose their faces as oriented vertex loops can derive volume
//! and center of mass with the divergence theorem: every loop is fanned into
//! triangles, and each triangle spans a signed tetrahedron with the origin.

use glam::DVec3;

use super::VolumeProperties;

/// Volume and centroid of a closed surface given as oriented boundary loops
///
/// Loops must be oriented counter-clockwise when seen from outside the solid
/// (inner loops of a face clockwise). Returns `None` when the enclosed volume
/// vanishes.
pub fn volume_properties_from_loops<'a>(
    loops: impl IntoIterator<Item = &'a [DVec3]>,
) -> Option<VolumeProperties> {
    let mut six_volume = 0.0;
    let mut moment = DVec3::ZERO;

    for ring in loops {
        let Some((&apex, rest)) = ring.split_first() else {
            continue;
        };
        for pair in rest.windows(2) {
            let (b, c) = (pair[0], pair[1]);
            let v = apex.dot(b.cross(c));
            six_volume += v;
            moment += (apex + b + c) * v;
        }
    }

    if six_volume.abs() <= f64::EPSILON {
        return None;
    }

    Some(VolumeProperties {
        volume: (six_volume / 6.0).abs(),
        centroid: moment / (4.0 * six_volume),
    })
}
