//! The export state machine.
//!
//! One [`ExportSession`] drives a whole run: fetch every owned chart, render them one by one,
//! assemble the PDF and hand it to the sink. Rendering failures go to a
//! [`ContinuationPolicy`]; cancellation is checked between charts only.

use crate::assemble::{AssemblyOptions, assemble_pdf};
use crate::assets::{AssetSource, ExportAssets};
use crate::config::ExportConfig;
use crate::error::{ExportError, Result};
use crate::sink::{DocumentSink, SavedDocument};
use crate::snapshot::{ChartSnapshot, SnapshotOptions};
use crate::source::ChartSource;
use chartbook_core::analyze_tree;
use chartbook_render::{ChartEngine, FrameScheduler, OffscreenRenderer, RenderError};
use futures::FutureExt as _;
use futures::future::BoxFuture;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::Instrument as _;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    Idle,
    Fetching,
    Rendering,
    Assembling,
    Downloading,
    Complete,
    Cancelled,
    Failed,
}

impl ExportStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExportStatus::Complete | ExportStatus::Cancelled | ExportStatus::Failed
        )
    }

    pub fn can_transition_to(self, next: ExportStatus) -> bool {
        use ExportStatus::*;
        match (self, next) {
            (Idle, Fetching)
            | (Fetching, Rendering)
            | (Rendering, Assembling)
            | (Assembling, Downloading)
            | (Downloading, Complete) => true,
            (Fetching | Rendering, Cancelled) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExportStatus::Idle => "idle",
            ExportStatus::Fetching => "fetching",
            ExportStatus::Rendering => "rendering",
            ExportStatus::Assembling => "assembling",
            ExportStatus::Downloading => "downloading",
            ExportStatus::Complete => "complete",
            ExportStatus::Cancelled => "cancelled",
            ExportStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportProgress<'a> {
    pub status: ExportStatus,
    /// 1-based index of the chart being rendered, 0 outside the render loop.
    pub index: usize,
    pub total: usize,
    pub chart_name: Option<&'a str>,
}

pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: &ExportProgress<'_>);
}

/// Reports progress through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, progress: &ExportProgress<'_>) {
        match progress.chart_name {
            Some(name) => tracing::debug!(
                index = progress.index,
                total = progress.total,
                chart = name,
                "rendering chart"
            ),
            None => tracing::info!(status = %progress.status, total = progress.total, "export status"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    Continue,
    Abort,
}

/// Decides whether a chart that failed to render stops the whole export.
pub trait ContinuationPolicy: Send + Sync {
    fn decide<'a>(
        &'a self,
        error: &'a RenderError,
        chart_name: &'a str,
    ) -> BoxFuture<'a, Continuation>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysContinue;

impl ContinuationPolicy for AlwaysContinue {
    fn decide<'a>(&'a self, _: &'a RenderError, _: &'a str) -> BoxFuture<'a, Continuation> {
        futures::future::ready(Continuation::Continue).boxed()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AbortOnFailure;

impl ContinuationPolicy for AbortOnFailure {
    fn decide<'a>(&'a self, _: &'a RenderError, _: &'a str) -> BoxFuture<'a, Continuation> {
        futures::future::ready(Continuation::Abort).boxed()
    }
}

/// Cooperative cancellation flag shared with whoever may stop the export.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedChart {
    pub chart_id: String,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub status: ExportStatus,
    pub total: usize,
    pub included: usize,
    pub skipped: Vec<SkippedChart>,
    pub page_count: usize,
    pub saved: Option<SavedDocument>,
}

impl ExportSummary {
    /// One-line notice for the user.
    pub fn message(&self) -> String {
        let skipped = match self.skipped.len() {
            0 => String::new(),
            n => format!(", {n} skipped"),
        };
        match (&self.status, &self.saved) {
            (ExportStatus::Complete, Some(saved)) => format!(
                "Exported {} of {} charts to {}{skipped}",
                self.included, self.total, saved.location
            ),
            (ExportStatus::Cancelled, _) => format!(
                "Export cancelled after {} of {} charts{skipped}",
                self.included, self.total
            ),
            (status, _) => format!("Export {status}: {} charts included{skipped}", self.included),
        }
    }
}

/// The collaborators one export run talks to.
pub struct ExportServices<'a> {
    pub source: &'a dyn ChartSource,
    pub assets: &'a dyn AssetSource,
    pub sink: &'a dyn DocumentSink,
    pub policy: &'a dyn ContinuationPolicy,
    pub progress: &'a dyn ProgressSink,
}

pub struct ExportSession {
    id: Uuid,
    config: ExportConfig,
    status: ExportStatus,
    current_index: usize,
    total: usize,
    captured: Vec<ChartSnapshot>,
    skipped: Vec<SkippedChart>,
    cancel: CancelHandle,
}

impl ExportSession {
    pub fn new(config: ExportConfig, cancel: CancelHandle) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            status: ExportStatus::Idle,
            current_index: 0,
            total: 0,
            captured: Vec::new(),
            skipped: Vec::new(),
            cancel,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> ExportStatus {
        self.status
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn captured(&self) -> &[ChartSnapshot] {
        &self.captured
    }

    pub fn skipped(&self) -> &[SkippedChart] {
        &self.skipped
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn set_status(&mut self, next: ExportStatus, progress: &dyn ProgressSink) {
        if !self.status.can_transition_to(next) {
            debug_assert!(false, "illegal export transition {} -> {next}", self.status);
            tracing::error!(from = %self.status, to = %next, "ignoring illegal export transition");
            return;
        }
        self.status = next;
        progress.report(&ExportProgress {
            status: next,
            index: 0,
            total: self.total,
            chart_name: None,
        });
    }

    fn summary(&self, page_count: usize, included: usize, saved: Option<SavedDocument>) -> ExportSummary {
        ExportSummary {
            status: self.status,
            total: self.total,
            included,
            skipped: self.skipped.clone(),
            page_count,
            saved,
        }
    }

    fn cancelled(&mut self, progress: &dyn ProgressSink) -> ExportSummary {
        tracing::info!(captured = self.captured.len(), "export cancelled");
        self.set_status(ExportStatus::Cancelled, progress);
        let included = self.captured.len();
        self.captured.clear();
        self.summary(0, included, None)
    }

    /// Runs the export to a terminal state.
    ///
    /// Returns `Ok` for completed and cancelled runs and `Err` for failed ones. Snapshots are
    /// released in every case.
    pub async fn run<E, S>(
        &mut self,
        services: &ExportServices<'_>,
        renderer: &mut OffscreenRenderer<E, S>,
    ) -> Result<ExportSummary>
    where
        E: ChartEngine,
        S: FrameScheduler,
    {
        let span = tracing::info_span!("export", session = %self.id);
        let result = self.drive(services, renderer).instrument(span).await;
        if let Err(err) = &result {
            tracing::error!(session = %self.id, error = %err, "export failed");
            self.captured.clear();
            if !self.status.is_terminal() {
                self.set_status(ExportStatus::Failed, services.progress);
            }
        }
        result
    }

    async fn drive<E, S>(
        &mut self,
        services: &ExportServices<'_>,
        renderer: &mut OffscreenRenderer<E, S>,
    ) -> Result<ExportSummary>
    where
        E: ChartEngine,
        S: FrameScheduler,
    {
        let progress = services.progress;
        self.set_status(ExportStatus::Fetching, progress);
        let charts = services.source.list_owned_charts().await?;
        if charts.is_empty() {
            return Err(ExportError::NoCharts);
        }
        self.total = charts.len();
        let assets = ExportAssets::load(
            services.assets,
            &self.config.template_path,
            &self.config.cover_mapping_path,
        )
        .await;
        tracing::info!(charts = self.total, "charts fetched");

        self.set_status(ExportStatus::Rendering, progress);
        let snapshot_options = SnapshotOptions {
            jpeg_quality: self.config.jpeg_quality,
            preview_width: self.config.preview_width,
            keep_vector: self.config.vector_pages,
        };
        for (i, chart) in charts.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Ok(self.cancelled(progress));
            }
            self.current_index = i;
            progress.report(&ExportProgress {
                status: ExportStatus::Rendering,
                index: i + 1,
                total: self.total,
                chart_name: Some(&chart.name),
            });

            let analysis = analyze_tree(&chart.nodes);
            match renderer.render(chart, &analysis).await {
                Ok(rendered) => {
                    self.captured
                        .push(ChartSnapshot::from_render(chart, rendered, &snapshot_options));
                }
                Err(err) => {
                    tracing::warn!(chart = %chart.id, error = %err, "chart failed to render");
                    let decision = services.policy.decide(&err, &chart.name).await;
                    self.skipped.push(SkippedChart {
                        chart_id: chart.id.clone(),
                        name: chart.name.clone(),
                        reason: err.to_string(),
                    });
                    if decision == Continuation::Abort {
                        return Err(ExportError::Aborted {
                            chart_name: chart.name.clone(),
                            reason: err.to_string(),
                        });
                    }
                }
            }
        }
        if self.cancel.is_cancelled() {
            return Ok(self.cancelled(progress));
        }
        if self.captured.is_empty() {
            return Err(ExportError::NothingCaptured {
                skipped: self.skipped.len(),
            });
        }

        self.set_status(ExportStatus::Assembling, progress);
        let document = assemble_pdf(
            &self.captured,
            &assets,
            &AssemblyOptions {
                vector_pages: self.config.vector_pages,
                jpeg_quality: self.config.jpeg_quality,
                ..AssemblyOptions::default()
            },
        )?;
        self.captured.clear();

        self.set_status(ExportStatus::Downloading, progress);
        let saved = services
            .sink
            .save(&self.config.output_file_name, &document.bytes)
            .await?;

        self.set_status(ExportStatus::Complete, progress);
        Ok(self.summary(document.page_count, document.chart_ids.len(), Some(saved)))
    }
}
