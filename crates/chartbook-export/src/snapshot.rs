use chartbook_core::{ChartDocument, ContentBounds, NO_COVER, ScaleInfo};
use chartbook_render::{RasterImage, RenderedChart, compress, preview};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotOptions {
    pub jpeg_quality: f32,
    pub preview_width: u32,
    pub keep_vector: bool,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: 0.85,
            preview_width: 480,
            keep_vector: true,
        }
    }
}

/// Everything the assembler needs about one captured chart.
#[derive(Debug, Clone)]
pub struct ChartSnapshot {
    pub chart_id: String,
    pub name: String,
    pub department_tag: Option<String>,
    pub description: Option<String>,
    pub cover_id: Option<String>,
    pub cover_order_index: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub primary: RasterImage,
    pub preview: Option<RasterImage>,
    /// Standalone SVG cropped to `bounds`, with node styles inlined.
    pub svg: Option<String>,
    pub bounds: ContentBounds,
    pub scale: ScaleInfo,
}

impl ChartSnapshot {
    pub fn from_render(
        chart: &ChartDocument,
        rendered: RenderedChart,
        options: &SnapshotOptions,
    ) -> Self {
        let primary = compress(&rendered.raster, options.jpeg_quality);
        let preview = preview(&primary, options.preview_width);
        let svg = rendered.vector.filter(|_| options.keep_vector);
        Self {
            chart_id: chart.id.clone(),
            name: chart.name.clone(),
            department_tag: chart.department_tag.clone(),
            description: chart.description.clone(),
            cover_id: chart.cover_id.clone(),
            cover_order_index: chart.cover_order_index,
            created_at: chart.created_at,
            primary,
            preview,
            svg,
            bounds: rendered.bounds,
            scale: rendered.scale,
        }
    }

    /// Group key; the same rule as [`ChartDocument::cover_key`].
    pub fn cover_key(&self) -> &str {
        self.cover_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(NO_COVER)
    }

    /// `department · description`, skipping empty parts.
    pub fn subtitle(&self) -> Option<String> {
        let parts: Vec<&str> = [self.department_tag.as_deref(), self.description.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(" · "))
    }
}
