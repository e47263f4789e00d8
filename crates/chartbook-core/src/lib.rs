#![forbid(unsafe_code)]

//! `chartbook-core` holds the pieces of the export pipeline that are pure data and math:
//!
//! - [`model`]: chart documents as they arrive from the chart store
//! - [`tree`]: breadth/depth analysis that picks adaptive layout spacing
//! - [`geom`]: content bounds and the scale-to-fit calculation
//!
//! Nothing in this crate performs I/O.

pub mod geom;
pub mod model;
pub mod tree;

pub use geom::{ContentBounds, ScaleInfo, fit_to_target};
pub use model::{
    ChartDocument, ChartNode, LayoutDirection, NO_COVER, NodeMeta, Person, RoleGroup, ViewState,
};
pub use tree::{LayoutParams, TreeAnalysis, analyze_links, analyze_tree};
