//! Input geometry: polylines as the scene host hands them over
//!
//! The JSON shape matches the host's polyline JSON:
//! `{"paths": [[[x, y, z?], ...], ...], "spatialReference": {"wkid": 4326}}`.

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Spatial reference of the input coordinates.
///
/// Opaque to the pipeline: it is only handed back to the host transform.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wkid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_wkid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wkt: Option<String>,
}

impl SpatialReference {
    /// Geographic WGS84 (lon/lat degrees)
    pub const WGS84: Self = Self::from_wkid(4326);
    /// Web Mercator (meters)
    pub const WEB_MERCATOR: Self = Self::from_wkid(3857);

    pub const fn from_wkid(wkid: u32) -> Self {
        Self {
            wkid: Some(wkid),
            latest_wkid: None,
            wkt: None,
        }
    }
}

/// Axis-aligned 2D extent in the polyline's spatial reference.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Extent {
    pub fn center(&self) -> (f64, f64) {
        ((self.xmin + self.xmax) * 0.5, (self.ymin + self.ymax) * 0.5)
    }

    fn include(&mut self, x: f64, y: f64) {
        self.xmin = self.xmin.min(x);
        self.ymin = self.ymin.min(y);
        self.xmax = self.xmax.max(x);
        self.ymax = self.ymax.max(y);
    }
}

/// Single input vertex, encoded as `[x, y]` or `[x, y, z]`.
///
/// Missing components read as 0; extra components (M values) are dropped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<f64>", into = "[f64; 3]")]
pub struct Vertex(pub DVec3);

impl From<Vec<f64>> for Vertex {
    fn from(coords: Vec<f64>) -> Self {
        let at = |i: usize| coords.get(i).copied().unwrap_or(0.0);
        Self(DVec3::new(at(0), at(1), at(2)))
    }
}

impl From<Vertex> for [f64; 3] {
    fn from(v: Vertex) -> Self {
        v.0.to_array()
    }
}

impl From<DVec3> for Vertex {
    fn from(v: DVec3) -> Self {
        Self(v)
    }
}

/// Ordered point sequence of one line
pub type Path = Vec<Vertex>;

/// One or more paths sharing a spatial reference.
///
/// Never mutated by the pipeline; an update replaces the whole value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Polyline {
    #[serde(default)]
    pub paths: Vec<Path>,
    #[serde(default)]
    pub spatial_reference: SpatialReference,
    /// Host-provided extent; computed from the paths when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<Extent>,
}

impl Polyline {
    pub fn new(paths: Vec<Vec<DVec3>>, spatial_reference: SpatialReference) -> Self {
        Self {
            paths: paths
                .into_iter()
                .map(|path| path.into_iter().map(Vertex).collect())
                .collect(),
            spatial_reference,
            extent: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Explicit extent if the host sent one, otherwise the bounding box of all points.
    /// `None` when the polyline has no points at all.
    pub fn extent(&self) -> Option<Extent> {
        if self.extent.is_some() {
            return self.extent;
        }

        let mut points = self.paths.iter().flatten();
        let first = points.next()?;
        let mut extent = Extent {
            xmin: first.0.x,
            ymin: first.0.y,
            xmax: first.0.x,
            ymax: first.0.y,
        };
        for p in points {
            extent.include(p.0.x, p.0.y);
        }
        Some(extent)
    }

    /// Total number of input vertices across all paths
    pub fn point_count(&self) -> usize {
        self.paths.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_json() {
        let json = r#"{
            "paths": [[[116.3, 39.9], [116.4, 39.95, 12.5]], [[0, 0, 0, 7]]],
            "spatialReference": {"wkid": 4326},
            "hasZ": true
        }"#;
        let line = Polyline::from_json(json).unwrap();

        assert_eq!(line.paths.len(), 2);
        assert_eq!(line.paths[0][0].0, DVec3::new(116.3, 39.9, 0.0));
        assert_eq!(line.paths[0][1].0, DVec3::new(116.4, 39.95, 12.5));
        // M value dropped
        assert_eq!(line.paths[1][0].0, DVec3::ZERO);
        assert_eq!(line.spatial_reference, SpatialReference::WGS84);
        assert_eq!(line.point_count(), 3);
    }

    #[test]
    fn test_extent_computed_from_points() {
        let line = Polyline::new(
            vec![
                vec![DVec3::new(-2.0, 1.0, 0.0), DVec3::new(4.0, 3.0, 0.0)],
                vec![DVec3::new(0.0, -5.0, 9.0)],
            ],
            SpatialReference::WEB_MERCATOR,
        );
        let extent = line.extent().unwrap();
        assert_eq!(extent.xmin, -2.0);
        assert_eq!(extent.xmax, 4.0);
        assert_eq!(extent.ymin, -5.0);
        assert_eq!(extent.ymax, 3.0);
        assert_eq!(extent.center(), (1.0, -1.0));
    }

    #[test]
    fn test_explicit_extent_wins() {
        let json = r#"{
            "paths": [[[0, 0], [10, 10]]],
            "extent": {"xmin": 100, "ymin": 100, "xmax": 200, "ymax": 300}
        }"#;
        let line = Polyline::from_json(json).unwrap();
        assert_eq!(line.extent().unwrap().center(), (150.0, 200.0));
    }

    #[test]
    fn test_empty_polyline_has_no_extent() {
        assert!(Polyline::default().extent().is_none());
        let only_empty_paths = Polyline::new(vec![vec![], vec![]], SpatialReference::default());
        assert!(only_empty_paths.extent().is_none());
    }
}
