//! Point-sprite pass over a `glow` context
//!
//! Shader sources are compile-time constants; the `#version` header is
//! picked at setup from the context (GLSL ES 3.00 on WebGL2 / GLES,
//! GLSL 3.30 core on desktop). Vertex and index buffers are allocated once
//! and grown geometrically, then updated in place every frame.

use glow::HasContext;
use tracing::{debug, info, warn};

use crate::core::stream::{COLOR_OFFSET, VERTEX_STRIDE, WIDTH_OFFSET};
use crate::core::VertexStream;
use crate::error::{FlowError, FlowResult};
use crate::renderer::{FrameUniforms, PointPass};

pub const VERTEX_SHADER: &str = include_str!("point.vert");
pub const FRAGMENT_SHADER: &str = include_str!("point.frag");

const HEADER_ES: &str = "#version 300 es\nprecision mediump float;\n";
const HEADER_CORE: &str = "#version 330 core\n";

/// Initial buffer size in vertices
const INITIAL_CAPACITY: usize = 4096;

/// GPU handles created in `setup`
struct GpuResources<G: HasContext> {
    program: G::Program,
    vao: G::VertexArray,
    vbo: G::Buffer,
    ibo: G::Buffer,
    u_projection: Option<G::UniformLocation>,
    u_model_view: Option<G::UniformLocation>,
    /// Buffer capacity in vertices (same for both buffers)
    capacity: usize,
}

/// Create a VAO and two buffers (vertex, index). On failure every handle
/// created so far is deleted before the error is returned.
fn create_handles<V, B, E>(
    create_vao: impl FnOnce() -> Result<V, E>,
    mut create_buffer: impl FnMut() -> Result<B, E>,
    delete_vao: impl FnOnce(V),
    mut delete_buffer: impl FnMut(B),
) -> Result<(V, B, B), E> {
    let vao = create_vao()?;
    let vbo = match create_buffer() {
        Ok(vbo) => vbo,
        Err(e) => {
            delete_vao(vao);
            return Err(e);
        }
    };
    match create_buffer() {
        Ok(ibo) => Ok((vao, vbo, ibo)),
        Err(e) => {
            delete_buffer(vbo);
            delete_vao(vao);
            Err(e)
        }
    }
}

/// [`PointPass`] implementation over any `glow` context.
pub struct GlowPointPass<G: HasContext> {
    resources: Option<GpuResources<G>>,
}

impl<G: HasContext> Default for GlowPointPass<G> {
    fn default() -> Self {
        Self { resources: None }
    }
}

impl<G: HasContext> GlowPointPass<G> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.resources.is_some()
    }

    unsafe fn compile_program(gl: &G) -> FlowResult<G::Program> {
        let header = if gl.version().is_embedded {
            HEADER_ES
        } else {
            HEADER_CORE
        };

        let program = gl.create_program().map_err(FlowError::resource)?;
        let stages = [
            (glow::VERTEX_SHADER, "vertex", VERTEX_SHADER),
            (glow::FRAGMENT_SHADER, "fragment", FRAGMENT_SHADER),
        ];

        let mut shaders = Vec::with_capacity(stages.len());
        for (kind, stage, body) in stages {
            let shader = match gl.create_shader(kind) {
                Ok(shader) => shader,
                Err(e) => {
                    Self::discard(gl, program, &shaders);
                    return Err(FlowError::resource(e));
                }
            };
            gl.shader_source(shader, &format!("{header}{body}"));
            gl.compile_shader(shader);
            if !gl.get_shader_compile_status(shader) {
                let log = gl.get_shader_info_log(shader);
                gl.delete_shader(shader);
                Self::discard(gl, program, &shaders);
                return Err(FlowError::ShaderCompile { stage, log });
            }
            gl.attach_shader(program, shader);
            shaders.push(shader);
        }

        gl.link_program(program);
        let linked = gl.get_program_link_status(program);
        let log = if linked {
            String::new()
        } else {
            gl.get_program_info_log(program)
        };
        for &shader in &shaders {
            gl.detach_shader(program, shader);
            gl.delete_shader(shader);
        }
        if !linked {
            gl.delete_program(program);
            return Err(FlowError::ProgramLink(log));
        }
        Ok(program)
    }

    unsafe fn discard(gl: &G, program: G::Program, shaders: &[G::Shader]) {
        for &shader in shaders {
            gl.detach_shader(program, shader);
            gl.delete_shader(shader);
        }
        gl.delete_program(program);
    }

    unsafe fn attribute(gl: &G, program: G::Program, name: &str) -> FlowResult<u32> {
        gl.get_attrib_location(program, name)
            .ok_or_else(|| FlowError::resource(format!("attribute {name} not found")))
    }

    unsafe fn create_resources(gl: &G) -> FlowResult<GpuResources<G>> {
        let program = Self::compile_program(gl)?;

        let locations = (|| {
            Ok::<_, FlowError>((
                Self::attribute(gl, program, "aPosition")?,
                Self::attribute(gl, program, "aColor")?,
                Self::attribute(gl, program, "aWidth")?,
            ))
        })();
        let (a_position, a_color, a_width) = match locations {
            Ok(locations) => locations,
            Err(e) => {
                gl.delete_program(program);
                return Err(e);
            }
        };

        let u_projection = gl.get_uniform_location(program, "uProjectionMatrix");
        let u_model_view = gl.get_uniform_location(program, "uModelViewMatrix");
        if u_projection.is_none() || u_model_view.is_none() {
            warn!("Flow shader uniform missing, points may not be visible");
        }

        let handles = create_handles(
            || gl.create_vertex_array(),
            || gl.create_buffer(),
            |vao| gl.delete_vertex_array(vao),
            |buffer| gl.delete_buffer(buffer),
        );
        let (vao, vbo, ibo) = match handles {
            Ok(handles) => handles,
            Err(e) => {
                gl.delete_program(program);
                return Err(FlowError::resource(e));
            }
        };
        let capacity = INITIAL_CAPACITY;

        gl.bind_vertex_array(Some(vao));

        gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
        gl.buffer_data_size(
            glow::ARRAY_BUFFER,
            (capacity * VERTEX_STRIDE) as i32,
            glow::DYNAMIC_DRAW,
        );
        let stride = VERTEX_STRIDE as i32;
        gl.enable_vertex_attrib_array(a_position);
        gl.vertex_attrib_pointer_f32(a_position, 3, glow::FLOAT, false, stride, 0);
        gl.enable_vertex_attrib_array(a_color);
        gl.vertex_attrib_pointer_f32(a_color, 4, glow::FLOAT, false, stride, COLOR_OFFSET as i32);
        gl.enable_vertex_attrib_array(a_width);
        gl.vertex_attrib_pointer_f32(a_width, 1, glow::FLOAT, false, stride, WIDTH_OFFSET as i32);

        // Element binding is VAO state
        gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(ibo));
        gl.buffer_data_size(
            glow::ELEMENT_ARRAY_BUFFER,
            (capacity * std::mem::size_of::<u32>()) as i32,
            glow::DYNAMIC_DRAW,
        );

        gl.bind_vertex_array(None);
        gl.bind_buffer(glow::ARRAY_BUFFER, None);

        Ok(GpuResources {
            program,
            vao,
            vbo,
            ibo,
            u_projection,
            u_model_view,
            capacity,
        })
    }

    unsafe fn release(gl: &G, res: GpuResources<G>) {
        gl.delete_vertex_array(res.vao);
        gl.delete_buffer(res.vbo);
        gl.delete_buffer(res.ibo);
        gl.delete_program(res.program);
    }
}

impl<G: HasContext> PointPass for GlowPointPass<G> {
    type Device = G;

    fn setup(&mut self, gl: &G) -> FlowResult<()> {
        // A re-setup on the same context replaces the old handles
        if let Some(old) = self.resources.take() {
            unsafe { Self::release(gl, old) };
        }
        let resources = unsafe { Self::create_resources(gl)? };
        info!(
            embedded = gl.version().is_embedded,
            capacity = resources.capacity,
            "Flow shader program linked"
        );
        self.resources = Some(resources);
        Ok(())
    }

    fn draw(&mut self, gl: &G, stream: &VertexStream, uniforms: &FrameUniforms) -> FlowResult<()> {
        let res = self.resources.as_mut().ok_or(FlowError::NotReady)?;
        if stream.is_empty() {
            return Ok(());
        }

        unsafe {
            gl.disable(glow::DEPTH_TEST);
            gl.enable(glow::BLEND);
            gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
            if !gl.version().is_embedded {
                gl.enable(glow::PROGRAM_POINT_SIZE);
            }

            gl.use_program(Some(res.program));
            gl.uniform_matrix_4_f32_slice(
                res.u_projection.as_ref(),
                false,
                &uniforms.projection.to_cols_array(),
            );
            gl.uniform_matrix_4_f32_slice(
                res.u_model_view.as_ref(),
                false,
                &uniforms.model_view.to_cols_array(),
            );

            gl.bind_vertex_array(Some(res.vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(res.vbo));
            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(res.ibo));

            if stream.len() > res.capacity {
                let capacity = stream.len().next_power_of_two();
                debug!(from = res.capacity, to = capacity, "Growing flow vertex buffers");
                gl.buffer_data_size(
                    glow::ARRAY_BUFFER,
                    (capacity * VERTEX_STRIDE) as i32,
                    glow::DYNAMIC_DRAW,
                );
                gl.buffer_data_size(
                    glow::ELEMENT_ARRAY_BUFFER,
                    (capacity * std::mem::size_of::<u32>()) as i32,
                    glow::DYNAMIC_DRAW,
                );
                res.capacity = capacity;
            }
            gl.buffer_sub_data_u8_slice(glow::ARRAY_BUFFER, 0, stream.vertex_bytes());
            gl.buffer_sub_data_u8_slice(glow::ELEMENT_ARRAY_BUFFER, 0, stream.index_bytes());

            gl.draw_elements(glow::POINTS, stream.len() as i32, glow::UNSIGNED_INT, 0);

            gl.bind_vertex_array(None);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
            gl.use_program(None);
        }
        Ok(())
    }

    fn dispose(&mut self, gl: &G) {
        if let Some(res) = self.resources.take() {
            unsafe { Self::release(gl, res) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[test]
    fn test_shader_interface_matches_pass() {
        for name in ["aPosition", "aColor", "aWidth", "uProjectionMatrix", "uModelViewMatrix"] {
            assert!(VERTEX_SHADER.contains(name), "vertex shader lacks {name}");
        }
        assert!(VERTEX_SHADER.contains("gl_PointSize = aWidth"));
        assert!(FRAGMENT_SHADER.contains("vColor"));
    }

    #[test]
    fn test_shader_sources_have_no_version_line() {
        // The header is chosen per context at setup
        assert!(!VERTEX_SHADER.contains("#version"));
        assert!(!FRAGMENT_SHADER.contains("#version"));
        assert!(HEADER_ES.starts_with("#version 300 es"));
        assert!(HEADER_CORE.starts_with("#version 330"));
    }

    /// Buffer factory that fails on call number `fail_at` (1-based)
    fn run_create(fail_vao: bool, fail_at: usize) -> (Result<(u32, u32, u32), String>, Vec<String>) {
        let log = RefCell::new(Vec::new());
        let calls = Cell::new(0);
        let result = create_handles(
            || if fail_vao { Err("no vao".to_string()) } else { Ok(1) },
            || {
                calls.set(calls.get() + 1);
                if calls.get() == fail_at {
                    Err(format!("no buffer {fail_at}"))
                } else {
                    Ok(10 + calls.get() as u32)
                }
            },
            |vao| log.borrow_mut().push(format!("vao {vao}")),
            |buffer| log.borrow_mut().push(format!("buffer {buffer}")),
        );
        (result, log.into_inner())
    }

    #[test]
    fn test_create_handles_success_deletes_nothing() {
        let (result, deleted) = run_create(false, 0);
        assert_eq!(result, Ok((1, 11, 12)));
        assert!(deleted.is_empty());
    }

    #[test]
    fn test_create_handles_cleans_up_on_failure() {
        let (result, deleted) = run_create(true, 0);
        assert_eq!(result, Err("no vao".to_string()));
        assert!(deleted.is_empty());

        let (result, deleted) = run_create(false, 1);
        assert_eq!(result, Err("no buffer 1".to_string()));
        assert_eq!(deleted, vec!["vao 1"]);

        let (result, deleted) = run_create(false, 2);
        assert_eq!(result, Err("no buffer 2".to_string()));
        assert_eq!(deleted, vec!["buffer 11", "vao 1"]);
    }

    #[test]
    fn test_new_pass_is_not_ready() {
        let pass: GlowPointPass<glow::Context> = GlowPointPass::new();
        assert!(!pass.is_ready());
    }
}
