use chartbook::ChartDocument;
use chartbook::export::{
    AbortOnFailure, AlwaysContinue, AssetSource, CancelHandle, ChartSource, ConfigError,
    Continuation, ContinuationPolicy, DirectoryChartSource, ExportConfig, ExportError,
    ExportServices, ExportSession, ExportStatus, FileSink, FsAssetSource, HttpAssetSource,
    HttpPageFetcher, LogProgress, PagedChartSource,
};
use chartbook::render::RenderError;
use futures::FutureExt as _;
use futures::future::BoxFuture;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

#[derive(Debug)]
enum CliError {
    Usage(&'static str),
    Io(std::io::Error),
    Json(serde_json::Error),
    Config(ConfigError),
    Url(url::ParseError),
    Render(RenderError),
    Export(ExportError),
    Cancelled(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Usage(msg) => write!(f, "{msg}"),
            CliError::Io(err) => write!(f, "I/O error: {err}"),
            CliError::Json(err) => write!(f, "JSON error: {err}"),
            CliError::Config(err) => write!(f, "{err}"),
            CliError::Url(err) => write!(f, "invalid URL: {err}"),
            CliError::Render(err) => write!(f, "{err}"),
            CliError::Export(err) => write!(f, "{err}"),
            CliError::Cancelled(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<ConfigError> for CliError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<url::ParseError> for CliError {
    fn from(value: url::ParseError) -> Self {
        Self::Url(value)
    }
}

impl From<RenderError> for CliError {
    fn from(value: RenderError) -> Self {
        Self::Render(value)
    }
}

impl From<ExportError> for CliError {
    fn from(value: ExportError) -> Self {
        Self::Export(value)
    }
}

#[derive(Debug, Clone, Copy, Default)]
enum Command {
    #[default]
    Export,
    Analyze,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum OnError {
    #[default]
    Continue,
    Abort,
    Prompt,
}

impl FromStr for OnError {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(Self::Continue),
            "abort" => Ok(Self::Abort),
            "prompt" => Ok(Self::Prompt),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Default)]
struct Args {
    command: Command,
    charts_dir: Option<PathBuf>,
    api: Option<String>,
    token: Option<String>,
    assets: Option<String>,
    config: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    out: Option<String>,
    on_error: OnError,
    quality: Option<f32>,
    raster_only: bool,
    input: Option<PathBuf>,
}

fn usage() -> &'static str {
    "chartbook-cli\n\
\n\
USAGE:\n\
  chartbook-cli [export] (--charts-dir <dir> | --api <url> [--token <t>]) [--assets <dir|url>] [--config <json>] [--out-dir <dir>] [--out <file-name>] [--on-error continue|abort|prompt] [--quality <0..1>] [--raster-only]\n\
  chartbook-cli analyze <chart.json>\n\
\n\
NOTES:\n\
  - export renders every owned chart and writes one PDF (default ./org-charts.pdf).\n\
  - --token falls back to the CHARTBOOK_TOKEN environment variable.\n\
  - --assets holds template.json, covers.json and cover images (default: current directory).\n\
  - Ctrl-C stops the export before the next chart.\n\
  - analyze prints the tree analysis of each chart in a JSON file.\n\
  - Set RUST_LOG to control log output (default: info).\n\
"
}

fn parse_args(argv: &[String]) -> Result<Args, CliError> {
    let mut args = Args::default();

    let mut it = argv.iter().skip(1);
    while let Some(a) = it.next() {
        match a.as_str() {
            "--help" | "-h" => return Err(CliError::Usage(usage())),
            "export" => args.command = Command::Export,
            "analyze" => args.command = Command::Analyze,
            "--raster-only" => args.raster_only = true,
            "--charts-dir" => {
                let Some(dir) = it.next() else {
                    return Err(CliError::Usage(usage()));
                };
                args.charts_dir = Some(PathBuf::from(dir));
            }
            "--api" => {
                let Some(url) = it.next() else {
                    return Err(CliError::Usage(usage()));
                };
                args.api = Some(url.clone());
            }
            "--token" => {
                let Some(token) = it.next() else {
                    return Err(CliError::Usage(usage()));
                };
                args.token = Some(token.clone());
            }
            "--assets" => {
                let Some(assets) = it.next() else {
                    return Err(CliError::Usage(usage()));
                };
                args.assets = Some(assets.clone());
            }
            "--config" => {
                let Some(path) = it.next() else {
                    return Err(CliError::Usage(usage()));
                };
                args.config = Some(PathBuf::from(path));
            }
            "--out-dir" => {
                let Some(dir) = it.next() else {
                    return Err(CliError::Usage(usage()));
                };
                args.out_dir = Some(PathBuf::from(dir));
            }
            "--out" => {
                let Some(name) = it.next() else {
                    return Err(CliError::Usage(usage()));
                };
                if name.trim().is_empty() {
                    return Err(CliError::Usage(usage()));
                }
                args.out = Some(name.trim().to_string());
            }
            "--on-error" => {
                let Some(mode) = it.next() else {
                    return Err(CliError::Usage(usage()));
                };
                args.on_error = mode.parse().map_err(|_| CliError::Usage(usage()))?;
            }
            "--quality" => {
                let Some(q) = it.next() else {
                    return Err(CliError::Usage(usage()));
                };
                let q = q.parse::<f32>().map_err(|_| CliError::Usage(usage()))?;
                if !(q.is_finite() && q > 0.0 && q <= 1.0) {
                    return Err(CliError::Usage(usage()));
                }
                args.quality = Some(q);
            }
            other if other.starts_with('-') => return Err(CliError::Usage(usage())),
            path => {
                if args.input.is_some() {
                    return Err(CliError::Usage(usage()));
                }
                args.input = Some(PathBuf::from(path));
            }
        }
    }

    match args.command {
        Command::Export => {
            if args.input.is_some() || args.charts_dir.is_some() == args.api.is_some() {
                return Err(CliError::Usage(usage()));
            }
        }
        Command::Analyze => {
            if args.input.is_none() {
                return Err(CliError::Usage(usage()));
            }
        }
    }
    Ok(args)
}

/// Asks on the terminal whether to keep going after a chart fails.
struct PromptPolicy;

impl ContinuationPolicy for PromptPolicy {
    fn decide<'a>(
        &'a self,
        error: &'a RenderError,
        chart_name: &'a str,
    ) -> BoxFuture<'a, Continuation> {
        let question = format!(
            "Chart \"{chart_name}\" could not be rendered: {error}\nContinue with the remaining charts? [Y/n] "
        );
        async move {
            let answer = tokio::task::spawn_blocking(move || {
                eprint!("{question}");
                let mut line = String::new();
                std::io::stdin().read_line(&mut line).map(|_| line)
            })
            .await;
            match answer {
                Ok(Ok(line)) => match line.trim().to_ascii_lowercase().as_str() {
                    "n" | "no" => Continuation::Abort,
                    _ => Continuation::Continue,
                },
                _ => Continuation::Abort,
            }
        }
        .boxed()
    }
}

fn load_config(args: &Args) -> Result<ExportConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => ExportConfig::load(path)?,
        None => ExportConfig::default(),
    };
    if let Some(q) = args.quality {
        config.jpeg_quality = q;
    }
    if args.raster_only {
        config.vector_pages = false;
    }
    if let Some(name) = &args.out {
        config.output_file_name = name.clone();
    }
    Ok(config)
}

fn chart_source(args: &Args, config: &ExportConfig) -> Result<Box<dyn ChartSource>, CliError> {
    if let Some(dir) = &args.charts_dir {
        return Ok(Box::new(DirectoryChartSource::new(dir)));
    }
    let Some(api) = &args.api else {
        return Err(CliError::Usage(usage()));
    };
    let token = args
        .token
        .clone()
        .or_else(|| std::env::var("CHARTBOOK_TOKEN").ok())
        .filter(|t| !t.trim().is_empty());
    let fetcher = HttpPageFetcher::new(Url::parse(api)?, token);
    Ok(Box::new(PagedChartSource::new(
        fetcher,
        config.source_page_size,
        config.max_source_pages,
    )))
}

fn asset_source(args: &Args) -> Result<Box<dyn AssetSource>, CliError> {
    match args.assets.as_deref() {
        Some(loc) if loc.starts_with("http://") || loc.starts_with("https://") => {
            Ok(Box::new(HttpAssetSource::new(Url::parse(loc)?)))
        }
        Some(dir) => Ok(Box::new(FsAssetSource::new(dir))),
        None => Ok(Box::new(FsAssetSource::new("."))),
    }
}

async fn export(args: Args) -> Result<(), CliError> {
    let config = load_config(&args)?;
    let source = chart_source(&args, &config)?;
    let assets = asset_source(&args)?;
    let sink = FileSink::new(args.out_dir.clone().unwrap_or_else(|| PathBuf::from(".")));
    let policy: Box<dyn ContinuationPolicy> = match args.on_error {
        OnError::Continue => Box::new(AlwaysContinue),
        OnError::Abort => Box::new(AbortOnFailure),
        OnError::Prompt => Box::new(PromptPolicy),
    };

    let mut renderer = config.renderer()?;
    let cancel = CancelHandle::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("cancellation requested, stopping after the current chart");
            on_signal.cancel();
        }
    });

    let mut session = ExportSession::new(config, cancel);
    let services = ExportServices {
        source: source.as_ref(),
        assets: assets.as_ref(),
        sink: &sink,
        policy: policy.as_ref(),
        progress: &LogProgress,
    };
    let summary = session.run(&services, &mut renderer).await?;
    for skipped in &summary.skipped {
        eprintln!("skipped {} ({}): {}", skipped.name, skipped.chart_id, skipped.reason);
    }
    if summary.status == ExportStatus::Cancelled {
        return Err(CliError::Cancelled(summary.message()));
    }
    eprintln!("{}", summary.message());
    Ok(())
}

fn analyze(path: &std::path::Path) -> Result<(), CliError> {
    let text = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&text)?;
    let charts: Vec<ChartDocument> = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    let out: Vec<serde_json::Value> = charts
        .iter()
        .map(|chart| {
            serde_json::json!({
                "id": chart.id,
                "name": chart.name,
                "analysis": chartbook::analyze_tree(&chart.nodes),
            })
        })
        .collect();
    serde_json::to_writer_pretty(std::io::stdout().lock(), &out)?;
    println!();
    Ok(())
}

fn run(args: Args) -> Result<(), CliError> {
    match args.command {
        Command::Analyze => match &args.input {
            Some(path) => analyze(path),
            None => Err(CliError::Usage(usage())),
        },
        Command::Export => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(export(args))
        }
    }
}

fn main() {
    let args = match parse_args(&std::env::args().collect::<Vec<_>>()) {
        Ok(v) => v,
        Err(CliError::Usage(msg)) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args) {
        Ok(()) => {}
        Err(err @ CliError::Export(ExportError::NoCharts)) => {
            eprintln!("{err}");
            std::process::exit(3);
        }
        Err(err @ CliError::Cancelled(_)) => {
            eprintln!("{err}");
            std::process::exit(130);
        }
        Err(CliError::Usage(msg)) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}
