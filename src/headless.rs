//! Headless host and pass
//!
//! Stand-ins for a scene host and a GPU when there is neither: the CLI
//! simulation and the unit tests drive the full frame pipeline through
//! these and read back what would have been drawn.

use std::cell::Cell;

use glam::{DMat4, DVec3};

use crate::core::{GeoTransform, SpatialReference, VertexStream};
use crate::error::FlowResult;
use crate::renderer::{FrameUniforms, PointPass, SceneHost};

/// Host whose render space is the input space shifted by `offset`.
#[derive(Debug, Default)]
pub struct IdentityHost {
    offset: DVec3,
    requests: Cell<usize>,
}

impl IdentityHost {
    pub fn with_offset(offset: DVec3) -> Self {
        Self {
            offset,
            requests: Cell::new(0),
        }
    }

    /// Number of redraws requested so far
    pub fn render_requests(&self) -> usize {
        self.requests.get()
    }
}

impl GeoTransform for IdentityHost {
    fn to_render_coordinates(&self, point: DVec3, _sr: &SpatialReference) -> Option<DVec3> {
        Some(point + self.offset)
    }

    fn render_coordinate_transform_at(
        &self,
        point: DVec3,
        _sr: &SpatialReference,
    ) -> Option<DMat4> {
        Some(DMat4::from_translation(point + self.offset))
    }
}

impl SceneHost for IdentityHost {
    fn request_render(&self) {
        self.requests.set(self.requests.get() + 1);
    }
}

/// Pass that records frame statistics instead of drawing.
#[derive(Debug, Default)]
pub struct StatsPass {
    frames: u64,
    total_vertices: u64,
    last_vertex_count: usize,
    peak_vertex_count: usize,
    last_uniforms: Option<FrameUniforms>,
}

impl StatsPass {
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn total_vertices(&self) -> u64 {
        self.total_vertices
    }

    pub fn last_vertex_count(&self) -> usize {
        self.last_vertex_count
    }

    pub fn peak_vertex_count(&self) -> usize {
        self.peak_vertex_count
    }

    pub fn last_uniforms(&self) -> Option<&FrameUniforms> {
        self.last_uniforms.as_ref()
    }

    /// Mean vertices per frame
    pub fn mean_vertex_count(&self) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        self.total_vertices as f64 / self.frames as f64
    }
}

impl PointPass for StatsPass {
    type Device = ();

    fn setup(&mut self, _device: &()) -> FlowResult<()> {
        *self = Self::default();
        Ok(())
    }

    fn draw(
        &mut self,
        _device: &(),
        stream: &VertexStream,
        uniforms: &FrameUniforms,
    ) -> FlowResult<()> {
        self.frames += 1;
        self.total_vertices += stream.len() as u64;
        self.last_vertex_count = stream.len();
        self.peak_vertex_count = self.peak_vertex_count.max(stream.len());
        self.last_uniforms = Some(*uniforms);
        Ok(())
    }
}
