//! Flowing highlight along 3D polylines
//!
//! A scene host hands over a polyline; every frame a short, fading run of
//! points travels along each path and is drawn as point sprites:
//! - `core`: normalization, densification, flow windows, vertex streams
//! - `renderer`: per-frame driver behind the host and GPU traits
//! - `gl`: glow point pass (WebGL2 / OpenGL 3.3)
//! - `web`: wasm-bindgen layer for JavaScript hosts (`wasm` feature)

pub mod core;
pub mod error;
pub mod headless;
pub mod renderer;
pub mod time;

#[cfg(feature = "glow")]
pub mod gl;

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
mod web;

pub use crate::core::{FlowConfig, Polyline, SpatialReference};
pub use error::{FlowError, FlowResult};
pub use renderer::{Camera, FlowLineRenderer, PointPass, RenderContext, SceneHost, SharedRenderer};

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
pub use web::FlowLineLayer;
