use chartbook_core::{ChartDocument, ChartNode, LayoutParams, Person, RoleGroup, analyze_tree};
use chartbook_render::{
    ChartEngine, ImageFormat, OffscreenRenderer, RenderError, RenderSurface, RendererOptions,
    SvgChartEngine,
};

fn sample_chart() -> ChartDocument {
    let mut chart = ChartDocument::new("eng", "Engineering");
    let mut root = ChartNode::new("cto", None);
    root.members.push(RoleGroup {
        role: "Office of the CTO".to_string(),
        people: vec![
            Person {
                name: "Ada Lovelace".to_string(),
                title: Some("CTO".to_string()),
            },
            Person {
                name: "Charles Babbage".to_string(),
                title: None,
            },
        ],
    });
    chart.nodes.push(root);
    for team in ["platform", "apps", "data"] {
        chart.nodes.push(ChartNode::new(team, Some("cto")));
        for i in 0..3 {
            chart
                .nodes
                .push(ChartNode::new(format!("{team}-{i}"), Some(team)));
        }
    }
    chart
}

/// Reports a growing node count forever.
#[derive(Default)]
struct NeverSettles {
    frames: usize,
}

impl ChartEngine for NeverSettles {
    fn render(
        &mut self,
        _chart: &ChartDocument,
        _params: &LayoutParams,
        surface: &mut RenderSurface,
    ) -> chartbook_render::Result<()> {
        surface.inject_stylesheet(".node-container { fill: #fff; }");
        Ok(())
    }

    fn rendered_node_count(&mut self, _surface: &RenderSurface) -> usize {
        self.frames += 1;
        self.frames
    }

    fn fit_to_content(&mut self, _surface: &mut RenderSurface) -> chartbook_render::Result<()> {
        Ok(())
    }
}

struct Broken;

impl ChartEngine for Broken {
    fn render(
        &mut self,
        _chart: &ChartDocument,
        _params: &LayoutParams,
        _surface: &mut RenderSurface,
    ) -> chartbook_render::Result<()> {
        Err(RenderError::Engine {
            message: "engine crashed".to_string(),
        })
    }

    fn rendered_node_count(&mut self, _surface: &RenderSurface) -> usize {
        0
    }

    fn fit_to_content(&mut self, _surface: &mut RenderSurface) -> chartbook_render::Result<()> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn renders_and_captures_a_chart() {
    let chart = sample_chart();
    let analysis = analyze_tree(&chart.nodes);
    let mut renderer =
        OffscreenRenderer::new(SvgChartEngine::default(), RendererOptions::default()).unwrap();

    let out = renderer.render(&chart, &analysis).await.unwrap();

    assert_eq!(out.node_count, 13);
    assert_eq!(out.raster.format, ImageFormat::Png);
    assert_eq!((out.raster.width, out.raster.height), (2000, 1128));
    assert!(!out.bounds.is_degenerate());
    assert_eq!(out.bounds.margin, 50.0);
    assert!(out.scale.final_width <= 2000.0 && out.scale.final_height <= 1128.0);
    assert!(out.markup.contains(r#"data-node-id="cto""#));
    assert!(!out.stylesheet.is_empty());
    let vector = out.vector.as_deref().unwrap();
    assert!(vector.contains("<style>"));
    assert!(vector.contains(r#"data-node-id="cto""#));
    assert!(vector.starts_with("<svg") && vector.contains("viewBox="));
    assert_eq!(renderer.live_surfaces(), 0);
}

#[tokio::test(start_paused = true)]
async fn unstable_engine_times_out_and_releases_surface() {
    let chart = sample_chart();
    let analysis = analyze_tree(&chart.nodes);
    let mut renderer =
        OffscreenRenderer::new(NeverSettles::default(), RendererOptions::default()).unwrap();

    let started = tokio::time::Instant::now();
    let err = renderer.render(&chart, &analysis).await.unwrap_err();

    match err {
        RenderError::Timeout { budget_ms, .. } => assert_eq!(budget_ms, 800),
        other => panic!("unexpected error: {other}"),
    }
    assert!(started.elapsed() >= std::time::Duration::from_millis(800));
    assert_eq!(renderer.live_surfaces(), 0);
}

#[tokio::test(start_paused = true)]
async fn engine_failure_releases_surface() {
    let chart = sample_chart();
    let analysis = analyze_tree(&chart.nodes);
    let mut renderer = OffscreenRenderer::new(Broken, RendererOptions::default()).unwrap();

    let err = renderer.render(&chart, &analysis).await.unwrap_err();
    assert!(matches!(err, RenderError::Engine { .. }));
    assert_eq!(renderer.live_surfaces(), 0);
}

#[tokio::test(start_paused = true)]
async fn empty_chart_is_rejected_without_mounting() {
    let chart = ChartDocument::new("empty", "Empty");
    let analysis = analyze_tree(&chart.nodes);
    let mut renderer =
        OffscreenRenderer::new(SvgChartEngine::default(), RendererOptions::default()).unwrap();

    let err = renderer.render(&chart, &analysis).await.unwrap_err();
    assert!(matches!(err, RenderError::EmptyChart { ref chart_id } if chart_id == "empty"));
    assert_eq!(renderer.live_surfaces(), 0);
}
