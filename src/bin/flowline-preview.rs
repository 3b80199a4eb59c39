//! Native preview window for the flow effect
//!
//! Run with: cargo run --features preview --bin flowline-preview
//!
//! `FLOWLINE_POLYLINE` / `FLOWLINE_CONFIG` point at JSON files; without them
//! a few sample lines are shown. Drag to orbit, scroll to zoom.

use std::f64::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use eframe::egui;
use eframe::egui_glow;
use glam::{DMat4, DVec3};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use flowline::core::GeoTransform;
use flowline::gl::GlowPointPass;
use flowline::time::{now_ms, FpsCounter};
use flowline::{Camera, FlowConfig, FlowLineRenderer, Polyline, RenderContext, SceneHost, SpatialReference};

/// Far from the world origin so the local-origin rebasing matters in f32.
const SAMPLE_CENTER: DVec3 = DVec3::new(1_250_000.0, 6_100_000.0, 0.0);

type PreviewRenderer = FlowLineRenderer<PreviewHost, GlowPointPass<glow::Context>>;

/// Render space is the input space; redraws go through egui.
struct PreviewHost {
    egui_ctx: egui::Context,
    requests: AtomicUsize,
}

impl GeoTransform for PreviewHost {
    fn to_render_coordinates(&self, point: DVec3, _sr: &SpatialReference) -> Option<DVec3> {
        Some(point)
    }

    fn render_coordinate_transform_at(&self, point: DVec3, _sr: &SpatialReference) -> Option<DMat4> {
        Some(DMat4::from_translation(point))
    }
}

impl SceneHost for PreviewHost {
    fn request_render(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.egui_ctx.request_repaint();
    }
}

struct PreviewContext<'a> {
    gl: &'a glow::Context,
    camera: Camera,
}

impl RenderContext for PreviewContext<'_> {
    type Device = glow::Context;

    fn device(&self) -> &glow::Context {
        self.gl
    }

    fn camera(&self) -> Camera {
        self.camera
    }

    fn reset_state(&self) {
        use glow::HasContext;
        // egui_glow re-applies the rest of its state after each callback
        unsafe { self.gl.disable(glow::PROGRAM_POINT_SIZE) };
    }
}

/// Orbit camera around the polyline's local origin.
struct OrbitCamera {
    yaw: f64,
    pitch: f64,
    distance: f64,
}

impl OrbitCamera {
    fn camera(&self, target: DVec3, aspect: f64) -> Camera {
        let dir = DVec3::new(
            self.pitch.cos() * self.yaw.cos(),
            self.pitch.cos() * self.yaw.sin(),
            self.pitch.sin(),
        );
        let eye = target + dir * self.distance;
        Camera {
            projection: DMat4::perspective_rh_gl(PI / 4.0, aspect, self.distance * 0.01, self.distance * 10.0),
            view: DMat4::look_at_rh(eye, target, DVec3::Z),
        }
    }
}

fn sample_polyline() -> Polyline {
    let spiral = (0..=240)
        .map(|i| {
            let t = i as f64 / 240.0 * 6.0 * PI;
            SAMPLE_CENTER + DVec3::new(t.cos() * (50.0 + t * 20.0), t.sin() * (50.0 + t * 20.0), t * 15.0)
        })
        .collect();
    let wave = (0..=80)
        .map(|i| {
            let x = i as f64 * 10.0 - 400.0;
            SAMPLE_CENTER + DVec3::new(x, -500.0, (x / 60.0).sin() * 40.0)
        })
        .collect();
    let square = [(-450.0, -450.0), (450.0, -450.0), (450.0, 450.0), (-450.0, 450.0), (-450.0, -450.0)]
        .into_iter()
        .map(|(x, y)| SAMPLE_CENTER + DVec3::new(x, y, 0.0))
        .collect();
    Polyline::new(vec![spiral, wave, square], SpatialReference::WEB_MERCATOR)
}

fn sample_config() -> FlowConfig {
    FlowConfig::from_json_lenient(
        r##"{
            "color": ["#00ffff", "#ff8800", [120, 255, 120]],
            "flowRatio": [0.08, 0.2, 0.05],
            "speed": [400, 150, 600],
            "density": 0.5,
            "width": [4, 6, 3]
        }"##,
    )
}

fn load_inputs() -> (Polyline, FlowConfig) {
    let polyline = match std::env::var("FLOWLINE_POLYLINE") {
        Ok(path) => match std::fs::read_to_string(&path).map_err(|e| e.to_string()).and_then(|json| {
            Polyline::from_json(&json).map_err(|e| e.to_string())
        }) {
            Ok(polyline) => polyline,
            Err(e) => {
                warn!(path = %path, error = %e, "Cannot load polyline, using samples");
                return (sample_polyline(), sample_config());
            }
        },
        Err(_) => return (sample_polyline(), sample_config()),
    };
    let config = std::env::var("FLOWLINE_CONFIG")
        .ok()
        .and_then(|path| std::fs::read_to_string(path).ok())
        .map(|json| FlowConfig::from_json_lenient(&json))
        .unwrap_or_default();
    (polyline, config)
}

struct PreviewApp {
    renderer: Arc<Mutex<PreviewRenderer>>,
    orbit: OrbitCamera,
    fps_counter: FpsCounter,
}

impl PreviewApp {
    fn new(cc: &eframe::CreationContext<'_>) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let gl = cc.gl.as_ref().ok_or("eframe was not started with the glow renderer")?;
        let (polyline, config) = load_inputs();
        info!(paths = polyline.paths.len(), points = polyline.point_count(), "Preview polyline");

        let host = PreviewHost {
            egui_ctx: cc.egui_ctx.clone(),
            requests: AtomicUsize::new(0),
        };
        let mut renderer = FlowLineRenderer::new(host, GlowPointPass::new(), polyline, &config);
        renderer.setup(&PreviewContext {
            gl,
            camera: Camera::default(),
        });
        if !renderer.is_ready() {
            error!("Flow pass unavailable, window will stay empty");
        }

        let extent = renderer.polyline().extent();
        let span = extent.map_or(1000.0, |e| (e.xmax - e.xmin).max(e.ymax - e.ymin));
        Ok(Self {
            renderer: Arc::new(Mutex::new(renderer)),
            orbit: OrbitCamera {
                yaw: -PI / 4.0,
                pitch: 0.6,
                distance: span.max(1.0) * 1.5,
            },
            fps_counter: FpsCounter::new(),
        })
    }

    fn draw_scene(&mut self, ui: &mut egui::Ui) {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), egui::Sense::drag());

        let drag = response.drag_delta();
        self.orbit.yaw -= f64::from(drag.x) * 0.01;
        self.orbit.pitch = (self.orbit.pitch + f64::from(drag.y) * 0.01).clamp(-1.5, 1.5);
        if response.hovered() {
            let scroll = ui.input(|i| i.smooth_scroll_delta.y);
            self.orbit.distance = (self.orbit.distance * (1.0 - f64::from(scroll) * 0.002)).max(1.0);
        }

        let Ok(renderer) = self.renderer.lock() else {
            return;
        };
        let target = renderer.local_origin();
        drop(renderer);
        let aspect = f64::from(rect.width() / rect.height().max(1.0));
        let camera = self.orbit.camera(target, aspect);

        let renderer = self.renderer.clone();
        let callback = egui::PaintCallback {
            rect,
            callback: Arc::new(egui_glow::CallbackFn::new(move |_info, painter| {
                let ctx = PreviewContext {
                    gl: painter.gl(),
                    camera,
                };
                if let Ok(mut renderer) = renderer.lock() {
                    renderer.render(&ctx);
                }
            })),
        };
        ui.painter().add(callback);
    }
}

impl eframe::App for PreviewApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.fps_counter.tick(now_ms());

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(egui::RichText::new(format!("{:.0} fps", self.fps_counter.fps())).monospace().size(11.0));
                if let Ok(renderer) = self.renderer.lock() {
                    ui.label(
                        egui::RichText::new(format!(
                            "{} lines / {} points drawn / {} redraws requested",
                            renderer.lines().len(),
                            renderer.stream().len(),
                            renderer.host().requests.load(Ordering::Relaxed),
                        ))
                        .monospace()
                        .size(11.0),
                    );
                }
            });
        });

        egui::CentralPanel::default()
            .frame(egui::Frame::new().fill(egui::Color32::from_rgb(12, 14, 20)))
            .show(ctx, |ui| self.draw_scene(ui));
    }

    fn on_exit(&mut self, gl: Option<&glow::Context>) {
        let (Some(gl), Ok(mut renderer)) = (gl, self.renderer.lock()) else {
            return;
        };
        renderer.dispose(&PreviewContext {
            gl,
            camera: Camera::default(),
        });
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,flowline=debug"));
    fmt().with_env_filter(filter).with_target(true).init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_title("flowline preview"),
        renderer: eframe::Renderer::Glow,
        ..Default::default()
    };

    eframe::run_native(
        "flowline preview",
        options,
        Box::new(|cc| Ok(Box::new(PreviewApp::new(cc)?))),
    )?;
    Ok(())
}
