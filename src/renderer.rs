//! Frame driver for the flow effect
//!
//! [`FlowLineRenderer`] is what a scene host plugs into its render loop:
//! `setup` once per GPU context, `render` every frame, `update_line` when
//! the observed geometry changes. The host and GPU context are injected per
//! call; the renderer keeps only its own geometry and animation state.

use std::cell::RefCell;

use glam::{DMat4, DVec3, Mat4};
use tracing::{debug, error, info, trace, warn};

use crate::core::{
    densify_polyline, local_origin, model_view, FlowConfig, FlowLine, FlowStyle, GeoTransform,
    Polyline, VertexStream,
};
use crate::error::{FlowError, FlowResult};
use crate::time::FrameClock;

/// Scene host services used by the renderer.
pub trait SceneHost: GeoTransform {
    /// Ask the host to schedule another frame.
    fn request_render(&self);
}

/// Camera matrices for the current frame, as the host provides them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub projection: DMat4,
    pub view: DMat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: DMat4::IDENTITY,
            view: DMat4::IDENTITY,
        }
    }
}

/// Uniforms handed to the GPU pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameUniforms {
    pub projection: Mat4,
    pub model_view: Mat4,
}

/// Host render context for a single callback.
pub trait RenderContext {
    type Device: ?Sized;

    /// GPU device the pass issues its calls against
    fn device(&self) -> &Self::Device;

    fn camera(&self) -> Camera;

    /// Restore whatever GPU state the host expects after our draw.
    fn reset_state(&self) {}

    /// Frame timestamp in milliseconds
    fn now_ms(&self) -> f64 {
        crate::time::now_ms()
    }
}

/// GPU side of the effect: owns program and buffer handles, borrows the
/// device on every call.
pub trait PointPass {
    type Device: ?Sized;

    fn setup(&mut self, device: &Self::Device) -> FlowResult<()>;

    /// Upload `stream` and draw it as points.
    fn draw(
        &mut self,
        device: &Self::Device,
        stream: &VertexStream,
        uniforms: &FrameUniforms,
    ) -> FlowResult<()>;

    /// Release GPU resources.
    fn dispose(&mut self, _device: &Self::Device) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PassState {
    Pending,
    Ready,
    Failed,
}

/// Animated flow highlight over every path of a polyline.
pub struct FlowLineRenderer<H, P> {
    host: H,
    pass: P,
    polyline: Polyline,
    style: FlowStyle,
    origin: DVec3,
    lines: Vec<FlowLine>,
    stream: VertexStream,
    clock: FrameClock,
    state: PassState,
}

impl<H: SceneHost, P: PointPass> FlowLineRenderer<H, P> {
    /// Configuration is fixed for the lifetime of the renderer.
    /// Geometry is processed on [`setup`](Self::setup).
    pub fn new(host: H, pass: P, polyline: Polyline, config: &FlowConfig) -> Self {
        let style = FlowStyle::from_config(config);
        debug!(defaults = ?style.defaults(), density = style.density(), "Flow renderer created");
        Self {
            host,
            pass,
            polyline,
            style,
            origin: DVec3::ZERO,
            lines: Vec::new(),
            stream: VertexStream::new(),
            clock: FrameClock::new(),
            state: PassState::Pending,
        }
    }

    /// Build GPU resources and process the current geometry.
    ///
    /// Called once per GPU context (again after context loss). A failed
    /// shader build is logged and leaves the effect inert.
    pub fn setup<C>(&mut self, ctx: &C)
    where
        C: RenderContext<Device = P::Device>,
    {
        match self.pass.setup(ctx.device()) {
            Ok(()) => {
                info!("Flow point pass ready");
                self.state = PassState::Ready;
            }
            Err(e) => {
                error!(error = %e, "Flow point pass setup failed, effect disabled");
                self.state = PassState::Failed;
            }
        }
        self.rebuild_lines();
        self.clock.reset();
        ctx.reset_state();
    }

    /// Replace the observed geometry; the whole pipeline re-runs before the
    /// next frame.
    pub fn update_line(&mut self, polyline: Polyline) {
        self.polyline = polyline;
        self.rebuild_lines();
    }

    /// Draw one frame and ask the host for the next.
    pub fn render<C>(&mut self, ctx: &C)
    where
        C: RenderContext<Device = P::Device>,
    {
        if self.state != PassState::Ready {
            trace!(state = ?self.state, "Flow pass not ready, skipping frame");
            return;
        }

        let dt = self.clock.tick(ctx.now_ms());
        self.advance(dt);

        let camera = ctx.camera();
        let uniforms = FrameUniforms {
            projection: camera.projection.as_mat4(),
            model_view: model_view(&camera.view, self.origin),
        };

        if let Err(e) = self.pass.draw(ctx.device(), &self.stream, &uniforms) {
            error!(error = %e, "Flow draw failed, effect disabled");
            self.state = PassState::Failed;
            ctx.reset_state();
            return;
        }

        self.host.request_render();
        ctx.reset_state();
    }

    /// Release GPU resources; a later `setup` brings the effect back.
    pub fn dispose<C>(&mut self, ctx: &C)
    where
        C: RenderContext<Device = P::Device>,
    {
        self.pass.dispose(ctx.device());
        self.state = PassState::Pending;
        debug!("Flow point pass disposed");
    }

    /// Advance every line by `dt_ms` and rebuild the vertex stream.
    pub fn advance(&mut self, dt_ms: f64) -> &VertexStream {
        self.stream.clear();
        for (i, line) in self.lines.iter_mut().enumerate() {
            let style = self.style.line(i);
            let window = line.step(&style, dt_ms);
            if !window.is_empty() {
                self.stream.push_window(window.points(line.points()), &style);
            }
        }
        trace!(dt_ms, vertices = self.stream.len(), "Flow frame built");
        &self.stream
    }

    fn rebuild_lines(&mut self) {
        self.origin = local_origin(&self.host, &self.polyline);
        self.lines = densify_polyline(&self.host, &self.polyline, self.origin, self.style.density())
            .into_iter()
            .map(FlowLine::new)
            .collect();
    }

    pub fn is_ready(&self) -> bool {
        self.state == PassState::Ready
    }

    pub fn lines(&self) -> &[FlowLine] {
        &self.lines
    }

    pub fn local_origin(&self) -> DVec3 {
        self.origin
    }

    pub fn stream(&self) -> &VertexStream {
        &self.stream
    }

    pub fn style(&self) -> &FlowStyle {
        &self.style
    }

    pub fn polyline(&self) -> &Polyline {
        &self.polyline
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn pass(&self) -> &P {
        &self.pass
    }
}

/// Renderer shared with host callbacks on a single thread.
///
/// A host may call back into the layer from inside a frame (for example
/// `request_render` drawing synchronously). Every entry point takes the
/// renderer with `try_borrow_mut`, so a nested call is refused instead of
/// panicking.
pub struct SharedRenderer<H, P> {
    inner: RefCell<FlowLineRenderer<H, P>>,
}

impl<H: SceneHost, P: PointPass> SharedRenderer<H, P> {
    pub fn new(renderer: FlowLineRenderer<H, P>) -> Self {
        Self {
            inner: RefCell::new(renderer),
        }
    }

    pub fn setup<C>(&self, ctx: &C) -> FlowResult<()>
    where
        C: RenderContext<Device = P::Device>,
    {
        self.inner.try_borrow_mut().map_err(|_| FlowError::Busy)?.setup(ctx);
        Ok(())
    }

    /// Draw one frame; returns `false` when the frame was skipped because
    /// the renderer is already in use further up the stack.
    pub fn render<C>(&self, ctx: &C) -> bool
    where
        C: RenderContext<Device = P::Device>,
    {
        match self.inner.try_borrow_mut() {
            Ok(mut renderer) => {
                renderer.render(ctx);
                true
            }
            Err(_) => {
                warn!("Re-entrant render skipped");
                false
            }
        }
    }

    pub fn update_line(&self, polyline: Polyline) -> FlowResult<()> {
        self.inner
            .try_borrow_mut()
            .map_err(|_| FlowError::Busy)?
            .update_line(polyline);
        Ok(())
    }

    pub fn dispose<C>(&self, ctx: &C) -> FlowResult<()>
    where
        C: RenderContext<Device = P::Device>,
    {
        self.inner.try_borrow_mut().map_err(|_| FlowError::Busy)?.dispose(ctx);
        Ok(())
    }

    /// Read access; `None` while a mutating call is in progress.
    pub fn with<R>(&self, f: impl FnOnce(&FlowLineRenderer<H, P>) -> R) -> Option<R> {
        self.inner.try_borrow().ok().map(|renderer| f(&renderer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SpatialReference;
    use crate::error::FlowError;
    use crate::headless::{IdentityHost, StatsPass};
    use std::cell::Cell;

    struct TestContext {
        now: Cell<f64>,
        resets: Cell<usize>,
        camera: Camera,
    }

    impl TestContext {
        fn new() -> Self {
            Self {
                now: Cell::new(0.0),
                resets: Cell::new(0),
                camera: Camera::default(),
            }
        }

        fn at(&self, ms: f64) -> &Self {
            self.now.set(ms);
            self
        }
    }

    impl RenderContext for TestContext {
        type Device = ();

        fn device(&self) -> &() {
            &()
        }

        fn camera(&self) -> Camera {
            self.camera
        }

        fn reset_state(&self) {
            self.resets.set(self.resets.get() + 1);
        }

        fn now_ms(&self) -> f64 {
            self.now.get()
        }
    }

    /// Pass whose shaders never compile
    struct BrokenPass;

    impl PointPass for BrokenPass {
        type Device = ();

        fn setup(&mut self, _: &()) -> FlowResult<()> {
            Err(FlowError::ProgramLink("no".into()))
        }

        fn draw(&mut self, _: &(), _: &VertexStream, _: &FrameUniforms) -> FlowResult<()> {
            panic!("draw on a broken pass")
        }
    }

    fn straight_line(len: f64) -> Polyline {
        Polyline::new(
            vec![vec![DVec3::new(1000.0, 0.0, 0.0), DVec3::new(1000.0 + len, 0.0, 0.0)]],
            SpatialReference::WEB_MERCATOR,
        )
    }

    fn renderer(polyline: Polyline, config: &str) -> FlowLineRenderer<IdentityHost, StatsPass> {
        FlowLineRenderer::new(
            IdentityHost::default(),
            StatsPass::default(),
            polyline,
            &FlowConfig::from_json(config).unwrap(),
        )
    }

    #[test]
    fn test_setup_densifies_and_recenters() {
        let ctx = TestContext::new();
        let mut r = renderer(straight_line(4.0), "{}");
        assert!(r.lines().is_empty());

        r.setup(&ctx);
        assert!(r.is_ready());
        assert_eq!(r.local_origin(), DVec3::new(1002.0, 0.0, 0.0));
        assert_eq!(r.lines().len(), 1);
        assert_eq!(r.lines()[0].len(), 12);
        assert_eq!(r.lines()[0].points()[0], DVec3::new(-2.0, 0.0, 0.0));
        assert_eq!(ctx.resets.get(), 1);
    }

    #[test]
    fn test_render_requests_next_frame() {
        let ctx = TestContext::new();
        let mut r = renderer(straight_line(40.0), "{}");
        r.setup(&ctx);

        r.render(ctx.at(100.0));
        r.render(ctx.at(116.0));
        r.render(ctx.at(132.0));

        assert_eq!(r.host().render_requests(), 3);
        assert_eq!(r.pass().frames(), 3);
        assert_eq!(ctx.resets.get(), 4);
    }

    #[test]
    fn test_first_frame_has_zero_delta() {
        let ctx = TestContext::new();
        let mut r = renderer(straight_line(40.0), "{}");
        r.setup(&ctx);

        r.render(ctx.at(5_000.0));
        assert_eq!(r.lines()[0].cursor().index(), 0.0);

        // 100 points/s for 30 ms: 3 points
        let mut r = renderer(straight_line(40.0), r#"{"speed": 100}"#);
        r.setup(&ctx);
        r.render(ctx.at(1_000.0));
        r.render(ctx.at(1_030.0));
        assert!((r.lines()[0].cursor().index() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_frame_stream_matches_windows() {
        let ctx = TestContext::new();
        // 40 units at density 3: 118 interior points plus both endpoints
        let mut r = renderer(straight_line(40.0), r#"{"flowRatio": 0.1, "speed": 1000}"#);
        r.setup(&ctx);
        assert_eq!(r.lines()[0].len(), 120);

        r.render(ctx.at(0.0));
        r.render(ctx.at(50.0));
        // cursor 50, highlight 12 -> points [38, 50)
        assert_eq!(r.lines()[0].cursor().index(), 50.0);
        assert_eq!(r.stream().len(), 12);
        assert_eq!(r.pass().last_vertex_count(), 12);
        let head = r.stream().vertices().last().unwrap();
        assert_eq!(head.color[3], 1.0);
        let expected = r.lines()[0].points()[49].as_vec3().to_array();
        assert_eq!(head.position, expected);
    }

    #[test]
    fn test_update_line_resets_cursor() {
        let ctx = TestContext::new();
        let mut r = renderer(straight_line(40.0), "{}");
        r.setup(&ctx);
        r.render(ctx.at(0.0));
        r.render(ctx.at(100.0));
        assert!(r.lines()[0].cursor().index() > 0.0);

        r.update_line(straight_line(10.0));
        assert_eq!(r.lines()[0].cursor().index(), 0.0);
        assert_eq!(r.lines()[0].len(), 30);
        assert_eq!(r.local_origin(), DVec3::new(1005.0, 0.0, 0.0));
    }

    #[test]
    fn test_per_line_styles_apply() {
        let ctx = TestContext::new();
        let polyline = Polyline::new(
            vec![
                vec![DVec3::ZERO, DVec3::new(40.0, 0.0, 0.0)],
                vec![DVec3::new(0.0, 10.0, 0.0), DVec3::new(40.0, 10.0, 0.0)],
            ],
            SpatialReference::WEB_MERCATOR,
        );
        let mut r = renderer(polyline, r##"{"color": ["#ff0000"], "width": [8]}"##);
        r.setup(&ctx);
        r.render(ctx.at(0.0));
        r.render(ctx.at(20.0));

        let verts = r.stream().vertices();
        let (first, second) = verts.split_at(verts.len() / 2);
        assert!(first.iter().all(|v| v.color[..3] == [1.0, 0.0, 0.0] && v.width == 8.0));
        assert!(second.iter().all(|v| v.color[..3] == [0.0, 1.0, 1.0] && v.width == 3.0));
    }

    #[test]
    fn test_degenerate_paths_draw_nothing() {
        let ctx = TestContext::new();
        let polyline = Polyline::new(
            vec![vec![], vec![DVec3::new(3.0, 3.0, 3.0)]],
            SpatialReference::default(),
        );
        let mut r = renderer(polyline, "{}");
        r.setup(&ctx);
        r.render(ctx.at(0.0));
        r.render(ctx.at(16.0));

        assert!(r.stream().is_empty());
        // Still animating: host keeps the loop alive
        assert_eq!(r.host().render_requests(), 2);
    }

    #[test]
    fn test_failed_setup_is_inert() {
        let ctx = TestContext::new();
        let mut r = FlowLineRenderer::new(
            IdentityHost::default(),
            BrokenPass,
            straight_line(4.0),
            &FlowConfig::default(),
        );
        r.setup(&ctx);
        assert!(!r.is_ready());
        // Geometry is still processed
        assert_eq!(r.lines().len(), 1);

        r.render(ctx.at(16.0));
        assert_eq!(r.host().render_requests(), 0);
    }

    #[test]
    fn test_dispose_then_setup_again() {
        let ctx = TestContext::new();
        let mut r = renderer(straight_line(4.0), "{}");
        r.setup(&ctx);
        r.dispose(&ctx);
        assert!(!r.is_ready());
        r.render(ctx.at(16.0));
        assert_eq!(r.host().render_requests(), 0);

        r.setup(&ctx);
        r.render(ctx.at(32.0));
        assert_eq!(r.host().render_requests(), 1);
    }

    #[test]
    fn test_shared_renderer_refuses_nested_calls() {
        let ctx = TestContext::new();
        let shared = SharedRenderer::new(renderer(straight_line(40.0), "{}"));
        shared.setup(&ctx).unwrap();

        // A host callback re-entering while the renderer is held
        let nested = shared
            .with(|r| {
                let updated = shared.update_line(straight_line(10.0));
                let rendered = shared.render(ctx.at(16.0));
                (r.lines()[0].len(), updated, rendered, shared.dispose(&ctx))
            })
            .unwrap();
        assert!(matches!(nested.1, Err(FlowError::Busy)));
        assert!(!nested.2);
        assert!(matches!(nested.3, Err(FlowError::Busy)));
        assert_eq!(shared.with(|r| r.host().render_requests()), Some(0));
        assert_eq!(shared.with(|r| r.lines()[0].len()), Some(nested.0));

        // Outside a callback the same calls go through
        assert!(shared.render(ctx.at(32.0)));
        shared.update_line(straight_line(10.0)).unwrap();
        assert_eq!(shared.with(|r| r.lines()[0].len()), Some(30));
        shared.dispose(&ctx).unwrap();
        assert_eq!(shared.with(|r| r.is_ready()), Some(false));
    }

    #[test]
    fn test_uniforms_carry_origin() {
        let mut ctx = TestContext::new();
        ctx.camera.view = DMat4::from_translation(DVec3::new(0.0, 0.0, -50.0));
        let mut r = renderer(straight_line(4.0), "{}");
        r.setup(&ctx);
        r.render(ctx.at(0.0));

        let uniforms = r.pass().last_uniforms().unwrap();
        assert_eq!(uniforms.projection, Mat4::IDENTITY);
        let origin_in_view = uniforms.model_view.transform_point3(glam::Vec3::ZERO);
        assert_eq!(origin_in_view, glam::Vec3::new(1002.0, 0.0, -50.0));
    }
}
