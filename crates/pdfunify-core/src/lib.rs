//! Merge PDFs and SVG graphics into one PDF with a uniform page width.
//!
//! The pipeline:
//! - `container`: lopdf-backed page container (load, inspect, serialize)
//! - `render`: SVG to single-page container via svg2pdf
//! - `merge`: copy a page and its object closure into another container
//! - `normalize`: scale every page to a target width, aspect preserved
//! - `pipeline`: the state machine tying the steps together

pub mod config;
pub mod container;
pub mod error;
pub mod geometry;
pub mod merge;
pub mod normalize;
pub mod pipeline;
pub mod render;
pub mod report;

pub use config::{UnifyOptions, A4_WIDTH_PT};
pub use container::{Container, Page};
pub use error::{Result, UnifyError};
pub use geometry::{Matrix, Rect};
pub use merge::{merge_all, merge_page};
pub use normalize::normalize;
pub use pipeline::{unify, PipelineState, Source, SourceKind, Unifier};
pub use render::{keep_last_page, GraphicRenderer, SvgRenderer};
pub use report::UnifyReport;

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<u32> {
    Ok(Container::load(bytes)?.page_count() as u32)
}
