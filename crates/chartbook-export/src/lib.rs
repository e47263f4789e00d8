#![forbid(unsafe_code)]

//! Bulk export of org charts into a single PDF.
//!
//! An [`ExportSession`] pulls every chart the user owns from a [`ChartSource`], renders each
//! one through `chartbook-render`, groups the captures by cover and writes one document to a
//! [`DocumentSink`].

pub mod assemble;
pub mod assets;
pub mod config;
pub mod error;
pub mod session;
pub mod sink;
pub mod snapshot;
pub mod source;
pub mod template;

pub use assemble::{
    AssembledDocument, AssemblyOptions, PagePlan, PlannedPage, assemble_pdf, plan_pages,
};
pub use assets::{AssetSource, CoverImage, ExportAssets, FsAssetSource, HttpAssetSource};
pub use config::{DEFAULT_OUTPUT_FILE_NAME, ExportConfig};
pub use error::{
    AssemblyError, AssetError, ConfigError, ExportError, Result, SinkError, SourceError,
};
pub use session::{
    AbortOnFailure, AlwaysContinue, CancelHandle, Continuation, ContinuationPolicy,
    ExportProgress, ExportServices, ExportSession, ExportStatus, ExportSummary, LogProgress,
    ProgressSink, SkippedChart,
};
pub use sink::{DocumentSink, FileSink, MemorySink, SavedDocument};
pub use snapshot::{ChartSnapshot, SnapshotOptions};
pub use source::{
    ChartPage, ChartSource, DirectoryChartSource, HttpPageFetcher, OWNER_ROLE, PageFetcher,
    PagedChartSource, StaticChartSource,
};
pub use template::{CoverMapping, FooterLayout, FontRefs, PageGeometry, Palette, TemplateConfig};
