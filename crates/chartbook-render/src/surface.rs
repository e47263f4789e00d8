//! Off-screen surfaces and the per-chart render pipeline.
//!
//! A chart is rendered into a hidden [`RenderSurface`] sized from its [`TreeAnalysis`], polled
//! frame by frame until the engine's node count settles, fitted, and finally measured and
//! rasterized into a fixed capture area.

use crate::bounds::{DEFAULT_BOUNDS_PADDING, measure_content_bounds};
use crate::css::Stylesheet;
use crate::engine::ChartEngine;
use crate::error::{RenderError, Result};
use crate::postprocess::{RasterImage, crop_to_bounds, serialize_vector};
use crate::raster::Rasterizer;
use crate::svg::svg_open_tag;
use chartbook_core::{ChartDocument, ContentBounds, ScaleInfo, TreeAnalysis, fit_to_target};
use futures::FutureExt as _;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Assumed node height when sizing a surface, before any layout has run.
const AVG_NODE_HEIGHT: f64 = 120.0;
const SURFACE_SLACK_X: f64 = 400.0;
const SURFACE_SLACK_Y: f64 = 300.0;
/// Consecutive equal node counts needed before a render counts as stable.
const STABLE_STREAK: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RendererOptions {
    pub base_width: f64,
    pub base_height: f64,
    pub max_width: f64,
    pub max_height: f64,
    pub capture_width: u32,
    pub capture_height: u32,
    pub capture_fill: f64,
    pub settle_delay_ms: u64,
    pub frame_interval_ms: u64,
    pub bounds_padding: f64,
    pub background: String,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            base_width: 2400.0,
            base_height: 1600.0,
            max_width: 4500.0,
            max_height: 3500.0,
            capture_width: 2000,
            capture_height: 1128,
            capture_fill: 0.95,
            settle_delay_ms: 200,
            frame_interval_ms: 16,
            bounds_padding: DEFAULT_BOUNDS_PADDING,
            background: "white".to_string(),
        }
    }
}

/// Surface dimensions for a chart of the given shape.
pub fn surface_size(analysis: &TreeAnalysis, options: &RendererOptions) -> (f64, f64) {
    let p = &analysis.layout_params;
    let need_w =
        analysis.max_breadth as f64 * (p.node_width + p.compact_margin_between) + SURFACE_SLACK_X;
    let need_h = analysis.depth as f64 * (AVG_NODE_HEIGHT + p.children_margin) + SURFACE_SLACK_Y;
    let width = if need_w > options.base_width {
        need_w.min(options.max_width)
    } else {
        options.base_width
    };
    let height = if need_h > options.base_height {
        need_h.min(options.max_height)
    } else {
        options.base_height
    };
    (width, height)
}

/// How long a chart with `node_count` nodes may take to stabilize.
pub fn stability_budget(node_count: usize) -> Duration {
    let ms = match node_count {
        0..10 => 500,
        10..30 => 800,
        30..50 => 1200,
        50..100 => 1800,
        _ => 2500,
    };
    Duration::from_millis(ms)
}

/// Advances the run of equal non-zero node counts.
pub fn next_streak(observed: usize, previous: usize, streak: u32) -> u32 {
    if observed == 0 {
        0
    } else if observed == previous {
        streak.saturating_add(1)
    } else {
        1
    }
}

pub fn is_stable(streak: u32) -> bool {
    streak >= STABLE_STREAK
}

/// Source of frame ticks and delays for the render loop.
pub trait FrameScheduler {
    fn next_frame(&self) -> BoxFuture<'_, ()>;
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()>;
}

#[derive(Debug, Clone, Copy)]
pub struct TokioFrameScheduler {
    frame: Duration,
}

impl TokioFrameScheduler {
    pub fn new(frame: Duration) -> Self {
        Self { frame }
    }
}

impl Default for TokioFrameScheduler {
    fn default() -> Self {
        Self::new(Duration::from_millis(16))
    }
}

impl FrameScheduler for TokioFrameScheduler {
    fn next_frame(&self) -> BoxFuture<'_, ()> {
        tokio::time::sleep(self.frame).boxed()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        tokio::time::sleep(duration).boxed()
    }
}

/// A hidden drawing area. `body` holds everything between the root `<svg>` tags.
#[derive(Debug, Clone, Default)]
pub struct RenderSurface {
    pub width: f64,
    pub height: f64,
    pub body: String,
    /// Stylesheets injected by the engine for this surface only.
    pub styles: Vec<String>,
}

impl RenderSurface {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn inject_stylesheet(&mut self, css: &str) {
        if !self.styles.iter().any(|s| s == css) {
            self.styles.push(css.to_string());
        }
    }

    /// Live vector markup, without injected styles.
    pub fn markup(&self) -> String {
        let mut out = svg_open_tag(self.width, self.height);
        out.push_str(&self.body);
        out.push_str("</svg>");
        out
    }

    pub fn stylesheet(&self) -> Stylesheet {
        Stylesheet::parse(&self.styles.join("\n"))
    }
}

/// Scoped ownership of a mounted surface. Dropping it detaches the surface and removes the
/// stylesheets injected into it.
pub struct SurfaceGuard {
    surface: RenderSurface,
    live: Arc<AtomicUsize>,
}

impl Deref for SurfaceGuard {
    type Target = RenderSurface;

    fn deref(&self) -> &RenderSurface {
        &self.surface
    }
}

impl DerefMut for SurfaceGuard {
    fn deref_mut(&mut self) -> &mut RenderSurface {
        &mut self.surface
    }
}

impl Drop for SurfaceGuard {
    fn drop(&mut self) {
        self.surface.styles.clear();
        self.surface.body.clear();
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A self-contained document whose viewport is exactly `bounds`, with node styles inlined.
fn vector_document(markup: &str, bounds: &ContentBounds, stylesheet: &Stylesheet) -> Option<String> {
    crop_to_bounds(markup, bounds).and_then(|cropped| serialize_vector(&cropped, stylesheet))
}

/// What the renderer hands back for one chart.
#[derive(Debug, Clone)]
pub struct RenderedChart {
    pub markup: String,
    pub stylesheet: Stylesheet,
    pub bounds: ContentBounds,
    pub scale: ScaleInfo,
    /// The document the raster was captured from. `None` when the bounds were degenerate.
    pub vector: Option<String>,
    pub raster: RasterImage,
    pub node_count: usize,
}

pub struct OffscreenRenderer<E, S = TokioFrameScheduler> {
    engine: E,
    scheduler: S,
    rasterizer: Rasterizer,
    options: RendererOptions,
    live: Arc<AtomicUsize>,
}

impl<E: ChartEngine> OffscreenRenderer<E, TokioFrameScheduler> {
    pub fn new(engine: E, options: RendererOptions) -> Result<Self> {
        let scheduler = TokioFrameScheduler::new(Duration::from_millis(options.frame_interval_ms));
        Self::with_scheduler(engine, scheduler, options)
    }
}

impl<E: ChartEngine, S: FrameScheduler> OffscreenRenderer<E, S> {
    pub fn with_scheduler(engine: E, scheduler: S, options: RendererOptions) -> Result<Self> {
        let rasterizer = Rasterizer::new(&options.background)?;
        Ok(Self {
            engine,
            scheduler,
            rasterizer,
            options,
            live: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn options(&self) -> &RendererOptions {
        &self.options
    }

    /// Number of surfaces currently mounted.
    pub fn live_surfaces(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn mount(&self, width: f64, height: f64) -> SurfaceGuard {
        self.live.fetch_add(1, Ordering::SeqCst);
        SurfaceGuard {
            surface: RenderSurface::new(width, height),
            live: Arc::clone(&self.live),
        }
    }

    /// Renders `chart` off-screen and captures it.
    ///
    /// The surface is released on every return path.
    pub async fn render(
        &mut self,
        chart: &ChartDocument,
        analysis: &TreeAnalysis,
    ) -> Result<RenderedChart> {
        if analysis.total_nodes == 0 {
            return Err(RenderError::EmptyChart {
                chart_id: chart.id.clone(),
            });
        }

        let (width, height) = surface_size(analysis, &self.options);
        tracing::debug!(chart = %chart.id, width, height, "mounting surface");
        let mut surface = self.mount(width, height);

        self.engine
            .render(chart, &analysis.layout_params, &mut surface)?;
        let node_count = self
            .wait_until_stable(&chart.id, &surface, stability_budget(analysis.total_nodes))
            .await?;

        self.engine.fit_to_content(&mut surface)?;
        self.scheduler
            .sleep(Duration::from_millis(self.options.settle_delay_ms))
            .await;

        let markup = surface.markup();
        let bounds = measure_content_bounds(&markup, self.options.bounds_padding);
        let (cw, ch) = (self.options.capture_width, self.options.capture_height);
        let scale = fit_to_target(&bounds, cw as f64, ch as f64, self.options.capture_fill);
        let stylesheet = surface.stylesheet();
        let vector = vector_document(&markup, &bounds, &stylesheet);
        let raster = self
            .rasterizer
            .capture(vector.as_deref().unwrap_or(&markup), &scale, cw, ch)?;

        tracing::debug!(
            chart = %chart.id,
            nodes = node_count,
            scale = scale.scale,
            "chart captured"
        );
        Ok(RenderedChart {
            markup,
            stylesheet,
            bounds,
            scale,
            vector,
            raster,
            node_count,
        })
    }

    async fn wait_until_stable(
        &mut self,
        chart_id: &str,
        surface: &RenderSurface,
        budget: Duration,
    ) -> Result<usize> {
        let deadline = tokio::time::Instant::now() + budget;
        let (mut previous, mut streak) = (0usize, 0u32);
        loop {
            self.scheduler.next_frame().await;
            let observed = self.engine.rendered_node_count(surface);
            streak = next_streak(observed, previous, streak);
            previous = observed;
            if is_stable(streak) {
                return Ok(observed);
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(
                    chart = %chart_id,
                    budget_ms = budget.as_millis() as u64,
                    last_count = observed,
                    "render did not stabilize"
                );
                return Err(RenderError::Timeout {
                    chart_id: chart_id.to_string(),
                    budget_ms: budget.as_millis() as u64,
                    last_count: observed,
                });
            }
        }
    }
}
