//! Platform-agnostic core - geometry pipeline and per-frame flow state
//!
//! Nothing in here touches a GPU or a host; everything the host provides
//! comes in through [`GeoTransform`].

pub mod densify;
pub mod flow;
pub mod geometry;
pub mod origin;
pub mod stream;
pub mod style;

pub use densify::{densify_points, densify_polyline, interpolation_count};
pub use flow::{highlight_count, select_window, FlowCursor, FlowLine, FlowWindow};
pub use geometry::{Extent, Path, Polyline, SpatialReference, Vertex};
pub use origin::{local_origin, model_view, to_local, GeoTransform};
pub use stream::{fade_alpha, FlowVertex, VertexStream};
pub use style::{FlowConfig, FlowStyle, LineStyle};
