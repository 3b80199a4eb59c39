//! wasm-bindgen surface for a JavaScript scene host
//!
//! ```js
//! const layer = new FlowLineLayer(host, polyline, { color: "#ff8800" });
//! layer.setup(gl);                 // WebGL2RenderingContext
//! layer.render(projection, view);  // column-major Float64Array(16) each
//! layer.updateLine(otherPolyline);
//! ```

mod host;

use glam::DMat4;
use js_sys::Function;
use tracing::{info, warn};
use wasm_bindgen::prelude::*;

use crate::core::{FlowConfig, Polyline};
use crate::gl::GlowPointPass;
use crate::renderer::{Camera, FlowLineRenderer, RenderContext, SharedRenderer};
use host::JsHost;

type WebRenderer = SharedRenderer<JsHost, GlowPointPass<glow::Context>>;

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();

    // Initialize tracing for browser console
    tracing_wasm::set_as_global_default();
}

/// Serialize a JS value and parse it into `T` with serde.
fn from_js<T: serde::de::DeserializeOwned>(value: &JsValue) -> Result<T, JsError> {
    let json = js_sys::JSON::stringify(value)
        .map_err(|_| JsError::new("value is not JSON-serializable"))?;
    let json: String = json.into();
    Ok(serde_json::from_str(&json)?)
}

fn camera_matrix(values: &[f64], name: &str) -> DMat4 {
    match values.get(..16).and_then(|v| <[f64; 16]>::try_from(v).ok()) {
        Some(cols) => DMat4::from_cols_array(&cols),
        None => {
            warn!(matrix = name, len = values.len(), "Camera matrix needs 16 values, using identity");
            DMat4::IDENTITY
        }
    }
}

/// Per-call context: the WebGL device plus this frame's camera.
struct WebContext<'a> {
    gl: &'a glow::Context,
    camera: Camera,
    reset: Option<&'a Function>,
}

impl RenderContext for WebContext<'_> {
    type Device = glow::Context;

    fn device(&self) -> &glow::Context {
        self.gl
    }

    fn camera(&self) -> Camera {
        self.camera
    }

    fn reset_state(&self) {
        if let Some(reset) = self.reset {
            if let Err(e) = reset.call0(&JsValue::NULL) {
                warn!(error = ?e, "resetWebGLState threw");
            }
        }
    }
}

/// Flowing highlight over a polyline, rendered into the host's WebGL2 context.
#[wasm_bindgen]
pub struct FlowLineLayer {
    renderer: WebRenderer,
    gl: Option<glow::Context>,
    reset: Option<Function>,
}

#[wasm_bindgen]
impl FlowLineLayer {
    /// `config` may be `undefined`; malformed fields fall back to defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(host: JsValue, polyline: JsValue, config: JsValue) -> Result<FlowLineLayer, JsError> {
        let reset = host::function(&host, "resetWebGLState")?;
        let host = JsHost::new(host)?;
        let polyline: Polyline = from_js(&polyline)?;
        let config = if config.is_undefined() || config.is_null() {
            FlowConfig::default()
        } else {
            match js_sys::JSON::stringify(&config) {
                Ok(json) => FlowConfig::from_json_lenient(&String::from(json)),
                Err(_) => {
                    warn!("Flow config is not JSON-serializable, using defaults");
                    FlowConfig::default()
                }
            }
        };

        info!(
            paths = polyline.paths.len(),
            points = polyline.point_count(),
            "Flow layer created"
        );
        let renderer = FlowLineRenderer::new(host, GlowPointPass::new(), polyline, &config);
        Ok(Self {
            renderer: SharedRenderer::new(renderer),
            gl: None,
            reset,
        })
    }

    /// Bind to a WebGL2 context and build GPU resources.
    pub fn setup(&mut self, gl: web_sys::WebGl2RenderingContext) {
        let gl = glow::Context::from_webgl2_context(gl);
        let ctx = WebContext {
            gl: &gl,
            camera: Camera::default(),
            reset: self.reset.as_ref(),
        };
        if let Err(e) = self.renderer.setup(&ctx) {
            warn!(error = %e, "setup skipped");
            return;
        }
        self.gl = Some(gl);
    }

    /// Draw one frame; `requestRender` is called when done.
    pub fn render(&self, projection: &[f64], view: &[f64]) {
        let Some(gl) = self.gl.as_ref() else {
            warn!("render called before setup");
            return;
        };
        let ctx = WebContext {
            gl,
            camera: Camera {
                projection: camera_matrix(projection, "projection"),
                view: camera_matrix(view, "view"),
            },
            reset: self.reset.as_ref(),
        };
        // requestRender may re-enter synchronously
        self.renderer.render(&ctx);
    }

    #[wasm_bindgen(js_name = updateLine)]
    pub fn update_line(&self, polyline: JsValue) -> Result<(), JsError> {
        let polyline: Polyline = from_js(&polyline)?;
        Ok(self.renderer.update_line(polyline)?)
    }

    /// Release GPU resources; `setup` may be called again afterwards.
    pub fn dispose(&mut self) {
        if let Some(gl) = self.gl.take() {
            let ctx = WebContext {
                gl: &gl,
                camera: Camera::default(),
                reset: self.reset.as_ref(),
            };
            if let Err(e) = self.renderer.dispose(&ctx) {
                warn!(error = %e, "dispose skipped");
                self.gl = Some(gl);
            }
        }
    }

    #[wasm_bindgen(getter, js_name = vertexCount)]
    pub fn vertex_count(&self) -> usize {
        self.renderer.with(|r| r.stream().len()).unwrap_or(0)
    }
}
