use crate::error::{RenderError, Result};
use crate::layout::{ExpandPolicy, TreeLayout, layout_chart};
use crate::surface::RenderSurface;
use crate::svg::{CHART_STYLESHEET, render_chart_body};
use crate::text::DeterministicTextMeasurer;
use chartbook_core::{ChartDocument, LayoutParams};

/// Margin around the tree on the first, un-fitted render.
const INITIAL_OFFSET: f64 = 40.0;

/// A chart-rendering engine driving one off-screen surface at a time.
///
/// Engines may finish drawing over several frames; the renderer polls
/// [`ChartEngine::rendered_node_count`] until it stops changing.
pub trait ChartEngine {
    fn render(
        &mut self,
        chart: &ChartDocument,
        params: &LayoutParams,
        surface: &mut RenderSurface,
    ) -> Result<()>;

    fn rendered_node_count(&mut self, surface: &RenderSurface) -> usize;

    /// Repositions the drawn tree inside the surface. Spacing is never changed.
    fn fit_to_content(&mut self, surface: &mut RenderSurface) -> Result<()>;
}

/// Lays the tree out in-process and emits SVG in a single frame.
#[derive(Debug, Default)]
pub struct SvgChartEngine {
    measurer: DeterministicTextMeasurer,
    policy: ExpandPolicy,
    current: Option<(ChartDocument, TreeLayout)>,
}

impl SvgChartEngine {
    pub fn new(policy: ExpandPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> ExpandPolicy {
        self.policy
    }
}

impl ChartEngine for SvgChartEngine {
    fn render(
        &mut self,
        chart: &ChartDocument,
        params: &LayoutParams,
        surface: &mut RenderSurface,
    ) -> Result<()> {
        let layout = layout_chart(chart, params, self.policy);
        surface.inject_stylesheet(CHART_STYLESHEET);
        surface.body = render_chart_body(
            chart,
            &layout,
            INITIAL_OFFSET,
            INITIAL_OFFSET,
            &self.measurer,
        );
        tracing::debug!(
            chart = %chart.id,
            nodes = layout.nodes.len(),
            width = layout.width,
            height = layout.height,
            "chart laid out"
        );
        self.current = Some((chart.clone(), layout));
        Ok(())
    }

    fn rendered_node_count(&mut self, surface: &RenderSurface) -> usize {
        surface.body.matches(r#"<g class="node"#).count()
    }

    fn fit_to_content(&mut self, surface: &mut RenderSurface) -> Result<()> {
        let Some((chart, layout)) = self.current.as_ref() else {
            return Err(RenderError::Engine {
                message: "fit requested before render".to_string(),
            });
        };
        let dx = ((surface.width - layout.width) / 2.0).max(0.0);
        let dy = ((surface.height - layout.height) / 2.0).max(0.0);
        surface.body = render_chart_body(chart, layout, dx, dy, &self.measurer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart() -> ChartDocument {
        let mut chart = ChartDocument::new("c1", "Chart");
        chart.nodes = vec![
            chartbook_core::ChartNode::new("a", None),
            chartbook_core::ChartNode::new("b", Some("a")),
            chartbook_core::ChartNode::new("c", Some("a")),
        ];
        chart
    }

    #[test]
    fn render_counts_nodes_and_injects_styles() {
        let mut engine = SvgChartEngine::default();
        let mut surface = RenderSurface::new(2000.0, 1500.0);
        engine
            .render(&chart(), &LayoutParams::default(), &mut surface)
            .unwrap();
        assert_eq!(engine.rendered_node_count(&surface), 3);
        assert_eq!(surface.styles.len(), 1);
    }

    #[test]
    fn fit_centers_without_rescaling() {
        let mut engine = SvgChartEngine::default();
        let mut surface = RenderSurface::new(3000.0, 2000.0);
        assert!(engine.fit_to_content(&mut surface).is_err());

        engine
            .render(&chart(), &LayoutParams::default(), &mut surface)
            .unwrap();
        let before = crate::bounds::measure_content_bounds(&surface.markup(), 0.0);
        engine.fit_to_content(&mut surface).unwrap();
        let after = crate::bounds::measure_content_bounds(&surface.markup(), 0.0);

        assert_eq!(before.width, after.width);
        assert_eq!(before.height, after.height);
        let left = after.x;
        let right = 3000.0 - (after.x + after.width);
        assert!((left - right).abs() < 1.0);
    }
}
