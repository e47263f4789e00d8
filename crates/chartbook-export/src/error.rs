use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid chart data from {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("chart listing did not end after {pages} pages")]
    TooManyPages { pages: usize },
    #[error("background task failed: {0}")]
    Task(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("asset not found: {path}")]
    NotFound { path: String },
    #[error("failed to read asset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("request for {url} failed: {message}")]
    Http { url: String, message: String },
    #[error("invalid asset url {path}: {source}")]
    Url {
        path: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid JSON in asset {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("background task failed: {0}")]
    Task(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("nothing to assemble")]
    NoPages,
    #[error("page of {width}x{height}pt leaves no room for content")]
    Geometry { width: f32, height: f32 },
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to fetch charts: {0}")]
    Fetch(#[from] SourceError),
    #[error("no charts to export")]
    NoCharts,
    #[error("no chart could be rendered ({skipped} skipped)")]
    NothingCaptured { skipped: usize },
    #[error("export aborted at chart {chart_name}: {reason}")]
    Aborted { chart_name: String, reason: String },
    #[error("failed to assemble document: {0}")]
    Assembly(#[from] AssemblyError),
    #[error("failed to save document: {0}")]
    Save(#[from] SinkError),
}

pub type Result<T> = std::result::Result<T, ExportError>;
