//! Per-frame vertex stream
//!
//! Interleaved point-sprite vertices plus a trivial index stream, rebuilt
//! from the current flow windows every frame. The backing vectors are kept
//! between frames so steady-state rendering does not allocate.

use bytemuck::{Pod, Zeroable};
use glam::DVec3;

use super::style::LineStyle;

/// Floats per vertex: position (3), color + alpha (4), width (1)
pub const FLOATS_PER_VERTEX: usize = 8;
/// Byte stride of [`FlowVertex`]
pub const VERTEX_STRIDE: usize = FLOATS_PER_VERTEX * std::mem::size_of::<f32>();
/// Byte offset of the color attribute
pub const COLOR_OFFSET: usize = 3 * std::mem::size_of::<f32>();
/// Byte offset of the width attribute
pub const WIDTH_OFFSET: usize = 7 * std::mem::size_of::<f32>();

/// GPU vertex (32 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FlowVertex {
    /// Local render-space position
    pub position: [f32; 3],
    /// RGB normalized to 0..1, alpha from the fade
    pub color: [f32; 4],
    /// Point size in pixels
    pub width: f32,
}

/// Cubic ease-in fade: `((j + 1) / m)^3`, 1.0 at the head of the flow.
pub fn fade_alpha(j: usize, m: usize) -> f32 {
    if m == 0 {
        return 0.0;
    }
    let t = (j + 1) as f64 / m as f64;
    (t * t * t) as f32
}

/// Reusable vertex + index arena.
#[derive(Clone, Debug, Default)]
pub struct VertexStream {
    vertices: Vec<FlowVertex>,
    indices: Vec<u32>,
}

impl VertexStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the previous frame's contents, keeping capacity.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
    }

    /// Append one line's window, ordered tail to head.
    pub fn push_window<'a, I>(&mut self, points: I, style: &LineStyle)
    where
        I: ExactSizeIterator<Item = &'a DVec3>,
    {
        let m = points.len();
        let [r, g, b] = style.rgb_normalized();
        let base = self.vertices.len() as u32;

        self.vertices.reserve(m);
        self.indices.reserve(m);
        for (j, p) in points.enumerate() {
            self.vertices.push(FlowVertex {
                position: p.as_vec3().to_array(),
                color: [r, g, b, fade_alpha(j, m)],
                width: style.width,
            });
            self.indices.push(base + j as u32);
        }
    }

    pub fn vertices(&self) -> &[FlowVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Number of vertices (and indices) in the stream
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Vertex data as uploaded to the array buffer
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Index data as uploaded to the element buffer
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Flat `f32` view of the interleaved attributes
    pub fn as_floats(&self) -> &[f32] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn capacity(&self) -> usize {
        self.vertices.capacity()
    }
}
