#![forbid(unsafe_code)]

//! `chartbook` renders org charts headlessly and exports whole chart collections as one PDF.
//!
//! # Features
//!
//! - `render`: off-screen layout, SVG drawing and rasterization (`chartbook::render`)
//! - `export`: chart sources, PDF assembly and the export session (`chartbook::export`)

pub use chartbook_core::*;

#[cfg(feature = "render")]
pub mod render {
    pub use chartbook_render::*;
}

#[cfg(feature = "export")]
pub mod export {
    pub use chartbook_export::*;
}
