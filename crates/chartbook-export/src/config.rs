use crate::error::ConfigError;
use chartbook_render::{
    ExpandPolicy, OffscreenRenderer, RenderError, RendererOptions, SvgChartEngine,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_OUTPUT_FILE_NAME: &str = "org-charts.pdf";

/// Knobs for one export run. Every field has a default, so `{}` is a valid config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportConfig {
    pub render: RendererOptions,
    pub expand_policy: ExpandPolicy,
    /// JPEG quality of the primary snapshot, in `[0, 1]`.
    pub jpeg_quality: f32,
    pub preview_width: u32,
    /// Prefer vector pages when a chart's markup converts cleanly.
    pub vector_pages: bool,
    pub output_file_name: String,
    pub source_page_size: usize,
    pub max_source_pages: usize,
    pub template_path: String,
    pub cover_mapping_path: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            render: RendererOptions::default(),
            expand_policy: ExpandPolicy::default(),
            jpeg_quality: 0.85,
            preview_width: 480,
            vector_pages: true,
            output_file_name: DEFAULT_OUTPUT_FILE_NAME.to_string(),
            source_page_size: 50,
            max_source_pages: 1000,
            template_path: "template.json".to_string(),
            cover_mapping_path: "covers.json".to_string(),
        }
    }
}

impl ExportConfig {
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The built-in renderer configured from this export config.
    pub fn renderer(&self) -> Result<OffscreenRenderer<SvgChartEngine>, RenderError> {
        OffscreenRenderer::new(
            SvgChartEngine::new(self.expand_policy),
            self.render.clone(),
        )
    }
}
