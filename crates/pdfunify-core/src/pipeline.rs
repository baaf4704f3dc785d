//! Import, convert, merge, normalize and serialize a list of sources.

use crate::config::UnifyOptions;
use crate::container::Container;
use crate::error::{Result, UnifyError};
use crate::merge::merge_all;
use crate::normalize::normalize;
use crate::render::{keep_last_page, GraphicRenderer, SvgRenderer};
use crate::report::UnifyReport;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Document,
    VectorGraphic,
}

impl SourceKind {
    /// Classify by file extension: `.pdf` or `.svg`, any case.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("pdf") => Ok(SourceKind::Document),
            Some("svg") => Ok(SourceKind::VectorGraphic),
            _ => Err(UnifyError::InputError(format!(
                "Unsupported file type: {}",
                path.display()
            ))),
        }
    }
}

/// One input: its kind, raw bytes and a label used in errors and logs.
#[derive(Debug, Clone)]
pub struct Source {
    pub kind: SourceKind,
    pub bytes: Vec<u8>,
    pub label: String,
}

impl Source {
    pub fn new(kind: SourceKind, bytes: Vec<u8>, label: impl Into<String>) -> Self {
        Self {
            kind,
            bytes,
            label: label.into(),
        }
    }

    pub fn document(bytes: Vec<u8>) -> Self {
        Self::new(SourceKind::Document, bytes, "document")
    }

    pub fn graphic(bytes: Vec<u8>) -> Self {
        Self::new(SourceKind::VectorGraphic, bytes, "graphic")
    }
}

/// Where a unify run currently is. Runs only move forward; any error ends
/// in `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Idle,
    Importing,
    Converting,
    Merging,
    Normalizing,
    Serialized,
    Done,
    Failed(String),
}

impl PipelineState {
    fn rank(&self) -> Option<u8> {
        match self {
            PipelineState::Idle => Some(0),
            PipelineState::Importing => Some(1),
            PipelineState::Converting => Some(2),
            PipelineState::Merging => Some(3),
            PipelineState::Normalizing => Some(4),
            PipelineState::Serialized => Some(5),
            PipelineState::Done => Some(6),
            PipelineState::Failed(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed(_))
    }

    /// Forward steps only; `Failed` is reachable from any live state.
    pub fn can_advance_to(&self, next: &PipelineState) -> bool {
        match (self.rank(), next.rank()) {
            (Some(from), Some(to)) => to == from + 1,
            (Some(_), None) => !self.is_terminal(),
            (None, _) => false,
        }
    }
}

/// Drives one or more unify runs with a fixed renderer and options.
pub struct Unifier<R = SvgRenderer> {
    renderer: R,
    options: UnifyOptions,
    state: PipelineState,
}

impl Unifier<SvgRenderer> {
    pub fn new(options: UnifyOptions) -> Self {
        let renderer = SvgRenderer::new(options.font_family.clone());
        Self::with_renderer(renderer, options)
    }
}

impl<R: GraphicRenderer> Unifier<R> {
    pub fn with_renderer(renderer: R, options: UnifyOptions) -> Self {
        Self {
            renderer,
            options,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn options(&self) -> &UnifyOptions {
        &self.options
    }

    pub fn unify(&mut self, sources: Vec<Source>) -> Result<Vec<u8>> {
        self.unify_with_report(sources).map(|(bytes, _)| bytes)
    }

    pub fn unify_with_report(&mut self, sources: Vec<Source>) -> Result<(Vec<u8>, UnifyReport)> {
        let start = Instant::now();
        let source_count = sources.len();
        let input_size_bytes = sources.iter().map(|s| s.bytes.len()).sum();

        self.state = PipelineState::Idle;
        match self.run(sources) {
            Ok((bytes, page_count)) => {
                self.advance(PipelineState::Done);
                let report = UnifyReport {
                    source_count,
                    input_size_bytes,
                    output_size_bytes: bytes.len(),
                    page_count,
                    processing_time_ms: start.elapsed().as_millis() as u64,
                };
                info!(
                    pages = report.page_count,
                    bytes = report.output_size_bytes,
                    ms = report.processing_time_ms,
                    "unify finished"
                );
                Ok((bytes, report))
            }
            Err(e) => {
                self.advance(PipelineState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    fn run(&mut self, sources: Vec<Source>) -> Result<(Vec<u8>, u32)> {
        if sources.is_empty() {
            return Err(UnifyError::InputError("No sources to unify".into()));
        }

        // Slots are indexed by input position, so output order never depends
        // on which phase resolved a source.
        self.advance(PipelineState::Importing);
        let mut slots: Vec<Option<Container>> = Vec::with_capacity(sources.len());
        for source in &sources {
            let resolved = match source.kind {
                SourceKind::Document => {
                    debug!(source = %source.label, "loading document");
                    Some(Container::load(&source.bytes).map_err(|e| label_error(e, source))?)
                }
                SourceKind::VectorGraphic => None,
            };
            slots.push(resolved);
        }

        self.advance(PipelineState::Converting);
        for (slot, source) in slots.iter_mut().zip(&sources) {
            if slot.is_some() {
                continue;
            }
            debug!(source = %source.label, "rendering graphic");
            let mut rendered = self
                .renderer
                .render(&source.bytes)
                .map_err(|e| label_error(e, source))?;
            keep_last_page(&mut rendered).map_err(|e| label_error(e, source))?;
            *slot = Some(rendered);
        }

        self.advance(PipelineState::Merging);
        let mut dest = Container::new();
        for (slot, source) in slots.iter().zip(&sources) {
            let Some(container) = slot else {
                continue;
            };
            let merged = merge_all(&mut dest, container).map_err(|e| label_error(e, source))?;
            debug!(source = %source.label, pages = merged, "merged source");
        }

        self.advance(PipelineState::Normalizing);
        normalize(&mut dest, self.options.target_width)?;

        if self.options.compress {
            dest.compress();
        }
        let page_count = dest.page_count() as u32;
        let bytes = dest.serialize()?;
        self.advance(PipelineState::Serialized);

        Ok((bytes, page_count))
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_advance_to(&next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        info!(from = ?self.state, to = ?next, "pipeline transition");
        self.state = next;
    }
}

/// Unify `sources` with default options and the SVG renderer.
pub fn unify(sources: Vec<Source>) -> Result<Vec<u8>> {
    Unifier::new(UnifyOptions::default()).unify(sources)
}

fn label_error(error: UnifyError, source: &Source) -> UnifyError {
    match error {
        UnifyError::ParseError(msg) => UnifyError::ParseError(format!("{}: {}", source.label, msg)),
        UnifyError::RenderError(msg) => {
            UnifyError::RenderError(format!("{}: {}", source.label, msg))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::test_support::{create_test_document, create_test_pdf};
    use std::cell::RefCell;

    /// Renders every graphic as a fixed multi-page document and records calls.
    struct FakeRenderer {
        pages: Vec<(f64, f64)>,
        calls: RefCell<Vec<Vec<u8>>>,
    }

    impl FakeRenderer {
        fn new(pages: &[(f64, f64)]) -> Self {
            Self {
                pages: pages.to_vec(),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl GraphicRenderer for FakeRenderer {
        fn render(&self, markup: &[u8]) -> Result<Container> {
            self.calls.borrow_mut().push(markup.to_vec());
            Ok(Container::from_document(create_test_document(&self.pages, "Rendered")))
        }
    }

    struct FailingRenderer;

    impl GraphicRenderer for FailingRenderer {
        fn render(&self, _markup: &[u8]) -> Result<Container> {
            Err(UnifyError::RenderError("backend unavailable".into()))
        }
    }

    #[test]
    fn test_source_kind_from_path() {
        assert_eq!(
            SourceKind::from_path(Path::new("a/b/Report.PDF")).unwrap(),
            SourceKind::Document
        );
        assert_eq!(
            SourceKind::from_path(Path::new("logo.svg")).unwrap(),
            SourceKind::VectorGraphic
        );
        assert!(SourceKind::from_path(Path::new("notes.txt")).is_err());
        assert!(SourceKind::from_path(Path::new("no_extension")).is_err());
    }

    #[test]
    fn test_state_transitions_only_move_forward() {
        assert!(PipelineState::Idle.can_advance_to(&PipelineState::Importing));
        assert!(PipelineState::Merging.can_advance_to(&PipelineState::Normalizing));
        assert!(!PipelineState::Merging.can_advance_to(&PipelineState::Importing));
        assert!(!PipelineState::Idle.can_advance_to(&PipelineState::Merging));
        assert!(PipelineState::Converting.can_advance_to(&PipelineState::Failed("x".into())));
        assert!(!PipelineState::Done.can_advance_to(&PipelineState::Failed("x".into())));
        assert!(!PipelineState::Failed("x".into()).can_advance_to(&PipelineState::Idle));
    }

    #[test]
    fn test_unify_ends_in_done() {
        let renderer = FakeRenderer::new(&[(100.0, 100.0)]);
        let mut unifier = Unifier::with_renderer(&renderer, UnifyOptions::default());
        let bytes = unifier
            .unify(vec![Source::document(create_test_pdf(&[(612.0, 792.0)], "Doc"))])
            .unwrap();

        assert_eq!(unifier.state(), &PipelineState::Done);
        assert_eq!(Container::load(&bytes).unwrap().page_count(), 1);
    }

    #[test]
    fn test_graphic_contributes_only_last_page() {
        let renderer = FakeRenderer::new(&[(10.0, 10.0), (20.0, 20.0), (100.0, 50.0)]);
        let mut unifier = Unifier::with_renderer(&renderer, UnifyOptions::default());
        let bytes = unifier
            .unify(vec![
                Source::document(create_test_pdf(&[(612.0, 792.0), (612.0, 792.0)], "Doc")),
                Source::graphic(b"<svg/>".to_vec()),
            ])
            .unwrap();

        let merged = Container::load(&bytes).unwrap();
        assert_eq!(merged.page_count(), 3);
        let last = merged.page(2).unwrap();
        assert!((last.height() / last.width() - 0.5).abs() < 1e-3);
        assert_eq!(renderer.calls.borrow().len(), 1);
    }

    #[test]
    fn test_graphics_render_in_input_order() {
        let renderer = FakeRenderer::new(&[(100.0, 100.0)]);
        let mut unifier = Unifier::with_renderer(&renderer, UnifyOptions::default());
        unifier
            .unify(vec![
                Source::graphic(b"first".to_vec()),
                Source::document(create_test_pdf(&[(612.0, 792.0)], "Doc")),
                Source::graphic(b"second".to_vec()),
            ])
            .unwrap();

        let calls = renderer.calls.borrow();
        assert_eq!(calls.as_slice(), &[b"first".to_vec(), b"second".to_vec()]);
    }

    #[test]
    fn test_empty_sources_fail() {
        let mut unifier = Unifier::with_renderer(FailingRenderer, UnifyOptions::default());
        assert!(matches!(unifier.unify(vec![]), Err(UnifyError::InputError(_))));
        assert!(matches!(unifier.state(), PipelineState::Failed(_)));
    }

    #[test]
    fn test_render_failure_aborts_pipeline() {
        let mut unifier = Unifier::with_renderer(FailingRenderer, UnifyOptions::default());
        let result = unifier.unify(vec![
            Source::document(create_test_pdf(&[(612.0, 792.0)], "Doc")),
            Source::new(SourceKind::VectorGraphic, b"<svg/>".to_vec(), "logo.svg"),
        ]);

        let err = result.unwrap_err();
        assert!(matches!(err, UnifyError::RenderError(ref m) if m.starts_with("logo.svg")));
        assert!(matches!(unifier.state(), PipelineState::Failed(_)));
    }

    #[test]
    fn test_unifier_can_be_reused() {
        let renderer = FakeRenderer::new(&[(100.0, 100.0)]);
        let mut unifier = Unifier::with_renderer(&renderer, UnifyOptions::default());
        let pdf = create_test_pdf(&[(300.0, 300.0)], "Again");

        assert!(unifier.unify(vec![Source::document(b"junk".to_vec())]).is_err());
        assert!(unifier.unify(vec![Source::document(pdf)]).is_ok());
        assert_eq!(unifier.state(), &PipelineState::Done);
    }
}
