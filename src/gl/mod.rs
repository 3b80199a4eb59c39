//! OpenGL / WebGL point pass
//!
//! Draws the per-frame vertex stream as point sprites through `glow`, so
//! the same code runs against a browser WebGL2 context and a native GL
//! context.

mod renderer;

pub use renderer::{GlowPointPass, FRAGMENT_SHADER, VERTEX_SHADER};
