#![forbid(unsafe_code)]

//! Headless org-chart rendering.
//!
//! Charts are laid out and drawn as SVG by a [`ChartEngine`], captured through an
//! [`OffscreenRenderer`] and rasterized with `resvg`.

pub mod bounds;
pub mod css;
pub mod engine;
pub mod error;
pub mod layout;
pub mod postprocess;
pub mod raster;
pub mod surface;
pub mod svg;
pub mod text;

pub use bounds::{DEFAULT_BOUNDS_PADDING, measure_content_bounds};
pub use css::{CssRule, Stylesheet, embeddable_css};
pub use engine::{ChartEngine, SvgChartEngine};
pub use error::{RasterError, RenderError, Result};
pub use layout::{ExpandPolicy, TreeLayout, layout_chart};
pub use postprocess::{
    ImageFormat, RasterImage, compress, crop_to_bounds, preview, serialize_vector,
};
pub use raster::Rasterizer;
pub use surface::{
    FrameScheduler, OffscreenRenderer, RenderSurface, RenderedChart, RendererOptions,
    SurfaceGuard, TokioFrameScheduler, is_stable, next_streak, stability_budget, surface_size,
};
pub use svg::CHART_STYLESHEET;
pub use text::{DeterministicTextMeasurer, TextMeasurer, TextMetrics, TextStyle};
