//! Path densification
//!
//! Inserts evenly spaced points between consecutive vertices so the flow
//! window has enough points to animate smoothly. Original vertices are kept
//! as an exact subsequence; interpolated points sit strictly between them.

use glam::DVec3;
use tracing::{debug, trace};

use super::geometry::Polyline;
use super::origin::{to_local, GeoTransform};

/// Number of interior points inserted between two vertices `distance` apart.
///
/// `floor(distance * density) - 2`, or 0 when that is not positive.
pub fn interpolation_count(distance: f64, density: f64) -> usize {
    let n = (distance * density).floor() - 2.0;
    if n.is_finite() && n > 0.0 {
        n as usize
    } else {
        0
    }
}

/// Densify an already re-centered point sequence.
pub fn densify_points(points: &[DVec3], density: f64) -> Vec<DVec3> {
    let inserted: usize = points
        .windows(2)
        .map(|pair| interpolation_count(pair[0].distance(pair[1]), density))
        .sum();

    let mut dense = Vec::with_capacity(points.len() + inserted);
    let Some((first, rest)) = points.split_first() else {
        return dense;
    };

    dense.push(*first);
    let mut prev = *first;
    for &p in rest {
        let n = interpolation_count(prev.distance(p), density);
        let step = 1.0 / (n + 1) as f64;
        for k in 1..=n {
            dense.push(prev.lerp(p, k as f64 * step));
        }
        dense.push(p);
        prev = p;
    }

    trace!(input = points.len(), output = dense.len(), "Path densified");
    dense
}

/// Transform every path of `polyline` into the local frame and densify it.
///
/// Returns one dense line per input path, in path order.
pub fn densify_polyline<T: GeoTransform + ?Sized>(
    host: &T,
    polyline: &Polyline,
    origin: DVec3,
    density: f64,
) -> Vec<Vec<DVec3>> {
    let sr = &polyline.spatial_reference;
    let mut local = Vec::new();

    let lines: Vec<Vec<DVec3>> = polyline
        .paths
        .iter()
        .map(|path| {
            local.clear();
            local.extend(path.iter().map(|v| to_local(host, v.0, sr, origin)));
            densify_points(&local, density)
        })
        .collect();

    debug!(
        paths = lines.len(),
        input_points = polyline.point_count(),
        dense_points = lines.iter().map(Vec::len).sum::<usize>(),
        density,
        "Polyline densified"
    );
    lines
}
