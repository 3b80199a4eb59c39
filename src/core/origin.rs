//! Local origin handling
//!
//! Host render coordinates can be millions of units from the world origin
//! (earth-centered frames), far beyond what `f32` resolves. Every point is
//! re-centered on a local origin near the data, and the origin is folded
//! back into the model-view matrix in `f64` before narrowing.

use glam::{DMat4, DVec3, Mat4};
use tracing::{debug, warn};

use super::geometry::{Polyline, SpatialReference};

/// Geo to render space transforms provided by the scene host.
pub trait GeoTransform {
    /// Convert a point from `sr` into render coordinates.
    fn to_render_coordinates(&self, point: DVec3, sr: &SpatialReference) -> Option<DVec3>;

    /// Local frame at `point`; the translation column is the point in render coordinates.
    fn render_coordinate_transform_at(&self, point: DVec3, sr: &SpatialReference)
        -> Option<DMat4>;
}

/// Render-space origin for `polyline`: its extent center at z = 0, or the
/// world origin when the polyline is empty or the host cannot transform it.
pub fn local_origin<T: GeoTransform + ?Sized>(host: &T, polyline: &Polyline) -> DVec3 {
    let (cx, cy) = polyline.extent().map(|e| e.center()).unwrap_or((0.0, 0.0));
    let center = DVec3::new(cx, cy, 0.0);

    match host.to_render_coordinates(center, &polyline.spatial_reference) {
        Some(origin) if origin.is_finite() => {
            debug!(?center, ?origin, "Local origin computed");
            origin
        }
        _ => {
            warn!(?center, "Host could not transform local origin, using zero");
            DVec3::ZERO
        }
    }
}

/// Render-space position of a raw input point, before re-centering.
///
/// Tries the per-point frame first, then the plain coordinate transform;
/// if both fail the raw coordinates pass through unchanged.
pub fn to_render<T: GeoTransform + ?Sized>(host: &T, point: DVec3, sr: &SpatialReference) -> DVec3 {
    if let Some(frame) = host.render_coordinate_transform_at(point, sr) {
        let translated = frame.w_axis.truncate();
        if translated.is_finite() {
            return translated;
        }
    }
    match host.to_render_coordinates(point, sr) {
        Some(p) if p.is_finite() => p,
        _ => point,
    }
}

/// Point in the local frame: render position minus `origin`.
pub fn to_local<T: GeoTransform + ?Sized>(
    host: &T,
    point: DVec3,
    sr: &SpatialReference,
    origin: DVec3,
) -> DVec3 {
    to_render(host, point, sr) - origin
}

/// Model-view matrix for locally re-centered geometry: `view * translate(origin)`.
pub fn model_view(view: &DMat4, origin: DVec3) -> Mat4 {
    (*view * DMat4::from_translation(origin)).as_mat4()
}
