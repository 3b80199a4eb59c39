//! Headless frame simulation for a polyline file
//!
//! Run with: cargo run --features cli --bin flowline-cli -- --polyline line.json

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use glam::DVec3;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use flowline::headless::{IdentityHost, StatsPass};
use flowline::{Camera, FlowConfig, FlowError, FlowLineRenderer, Polyline, RenderContext};

#[derive(Parser, Debug)]
#[command(name = "flowline-cli", version)]
struct Args {
    /// Polyline JSON (`{"paths": [[[x, y, z], ...]], "spatialReference": {...}}`).
    #[arg(long)]
    polyline: PathBuf,

    /// Flow config JSON; defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Simulated frames per second.
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// Stop after this many seconds; runs until Ctrl-C when omitted.
    #[arg(long)]
    duration: Option<f64>,

    /// Render-space offset applied by the host, as `x,y,z`.
    #[arg(long, value_delimiter = ',', default_values_t = [0.0, 0.0, 0.0])]
    offset: Vec<f64>,

    /// Seconds between stats lines.
    #[arg(long, default_value_t = 5)]
    stats_secs: u64,
}

/// Wall-clock context over the statistics pass.
struct SimContext {
    start: Instant,
}

impl RenderContext for SimContext {
    type Device = ();

    fn device(&self) -> &() {
        &()
    }

    fn camera(&self) -> Camera {
        Camera::default()
    }

    fn now_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<FlowConfig, FlowError> {
    match path {
        Some(path) => Ok(FlowConfig::from_json(&std::fs::read_to_string(path)?)?),
        None => Ok(FlowConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,flowline=debug"));
    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    let polyline = Polyline::from_json(&std::fs::read_to_string(&args.polyline)?)?;
    let config = load_config(args.config.as_ref())?;
    let [x, y, z] = <[f64; 3]>::try_from(args.offset.as_slice())
        .map_err(|_| format!("--offset needs 3 values, got {}", args.offset.len()))?;
    let offset = DVec3::new(x, y, z);
    info!(
        path = %args.polyline.display(),
        paths = polyline.paths.len(),
        points = polyline.point_count(),
        "Polyline loaded"
    );

    let ctx = SimContext {
        start: Instant::now(),
    };
    let mut renderer = FlowLineRenderer::new(
        IdentityHost::with_offset(offset),
        StatsPass::default(),
        polyline,
        &config,
    );
    renderer.setup(&ctx);
    if !renderer.is_ready() {
        warn!("Renderer not ready, nothing to simulate");
        return Ok(());
    }
    for (i, line) in renderer.lines().iter().enumerate() {
        info!(line = i, points = line.len(), "Line densified");
    }

    let frame_period = Duration::from_secs_f64(1.0 / f64::from(args.fps.max(1)));
    let mut frame_interval = tokio::time::interval(frame_period);
    let mut stats_interval = tokio::time::interval(Duration::from_secs(args.stats_secs.max(1)));
    let deadline = args.duration.map(|secs| ctx.start + Duration::from_secs_f64(secs.max(0.0)));
    let mut frames_last_interval = 0u64;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = frame_interval.tick() => {
                renderer.render(&ctx);
                frames_last_interval += 1;
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    break;
                }
            }
            _ = stats_interval.tick() => {
                let cursors: Vec<String> = renderer
                    .lines()
                    .iter()
                    .map(|l| format!("{:.1}", l.cursor().index()))
                    .collect();
                info!(
                    frames = renderer.pass().frames(),
                    fps = format!("{:.1}", frames_last_interval as f64 / args.stats_secs.max(1) as f64),
                    vertices = renderer.pass().last_vertex_count(),
                    peak = renderer.pass().peak_vertex_count(),
                    cursors = %cursors.join(","),
                    "stats"
                );
                frames_last_interval = 0;
            }
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
        }
    }

    let pass = renderer.pass();
    info!(
        frames = pass.frames(),
        mean_vertices = format!("{:.1}", pass.mean_vertex_count()),
        peak_vertices = pass.peak_vertex_count(),
        render_requests = renderer.host().render_requests(),
        "Simulation finished"
    );
    Ok(())
}
