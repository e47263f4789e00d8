#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("failed to parse SVG")]
    SvgParse,
    #[error("failed to allocate pixmap for raster rendering")]
    PixmapAlloc,
    #[error("failed to encode PNG")]
    PngEncode,
    #[error("invalid background color: {0}")]
    Background(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("chart {chart_id} has no nodes to render")]
    EmptyChart { chart_id: String },
    #[error(
        "chart {chart_id} did not stabilize within {budget_ms}ms (last node count {last_count})"
    )]
    Timeout {
        chart_id: String,
        budget_ms: u64,
        last_count: usize,
    },
    #[error("chart engine failed: {message}")]
    Engine { message: String },
    #[error(transparent)]
    Raster(#[from] RasterError),
}

pub type Result<T> = std::result::Result<T, RenderError>;
