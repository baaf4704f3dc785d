//! Vector graphic to page conversion.

use crate::container::Container;
use crate::error::{Result, UnifyError};
use tracing::{debug, warn};

/// Turns vector-graphic markup into a page container.
pub trait GraphicRenderer {
    fn render(&self, markup: &[u8]) -> Result<Container>;
}

impl<R: GraphicRenderer + ?Sized> GraphicRenderer for &R {
    fn render(&self, markup: &[u8]) -> Result<Container> {
        (**self).render(markup)
    }
}

impl<R: GraphicRenderer + ?Sized> GraphicRenderer for Box<R> {
    fn render(&self, markup: &[u8]) -> Result<Container> {
        (**self).render(markup)
    }
}

/// SVG renderer backed by usvg + svg2pdf. The page takes the graphic's
/// intrinsic size.
#[derive(Debug, Clone)]
pub struct SvgRenderer {
    font_family: String,
    load_system_fonts: bool,
}

impl Default for SvgRenderer {
    fn default() -> Self {
        Self::new("Arial")
    }
}

impl SvgRenderer {
    pub fn new(font_family: impl Into<String>) -> Self {
        Self {
            font_family: font_family.into(),
            load_system_fonts: true,
        }
    }

    /// Skip the system font scan. Text in the SVG will not render.
    pub fn without_system_fonts(mut self) -> Self {
        self.load_system_fonts = false;
        self
    }
}

impl GraphicRenderer for SvgRenderer {
    fn render(&self, markup: &[u8]) -> Result<Container> {
        let svg = std::str::from_utf8(markup)
            .map_err(|e| UnifyError::RenderError(format!("SVG is not valid UTF-8: {}", e)))?;

        let mut opt = svg2pdf::usvg::Options::default();
        if self.load_system_fonts {
            opt.fontdb_mut().load_system_fonts();
        }
        opt.font_family = self.font_family.clone();

        let tree = svg2pdf::usvg::Tree::from_str(svg, &opt)
            .map_err(|e| UnifyError::RenderError(format!("Failed to parse SVG: {}", e)))?;

        let pdf = svg2pdf::to_pdf(
            &tree,
            svg2pdf::ConversionOptions::default(),
            svg2pdf::PageOptions::default(),
        )
        .map_err(|e| UnifyError::RenderError(format!("Failed to convert SVG to PDF: {:?}", e)))?;

        debug!(bytes = pdf.len(), "rendered SVG");
        Container::load(&pdf)
            .map_err(|e| UnifyError::RenderError(format!("Renderer produced an unreadable PDF: {}", e)))
    }
}

/// Reduce a rendered graphic to its final page.
///
/// Some backends paginate a single graphic across several pages; only the
/// last one carries the complete drawing. An empty render is an error.
pub fn keep_last_page(container: &mut Container) -> Result<()> {
    let count = container.page_count();
    match count {
        0 => Err(UnifyError::RenderError("Renderer produced no pages".into())),
        1 => Ok(()),
        _ => {
            warn!(pages = count, "rendered graphic spans several pages, keeping the last");
            container.retain_last_page();
            Ok(())
        }
    }
}
