//! Format-native highlight annotation for stored documents.
//!
//! A document's kind is classified from its stored name. Each supported kind
//! has one [`Annotator`]; the annotator reports an [`AnnotateOutcome`] rather
//! than an error so callers can fall back to the original document without
//! special-casing failures.
//!
//! | Kind | Extension | Annotation |
//! |------|-----------|------------|
//! | [`DocumentKind::Flow`] | `.docx` | `w:highlight` on matching runs |
//! | [`DocumentKind::Fixed`] | `.pdf` | `/Highlight` annotations over matches |

pub mod docx;
pub mod pdf;

use crate::query::Query;

/// Result of annotating one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotateOutcome {
    /// Serialized document with highlights applied (or the input unchanged
    /// when nothing needed highlighting).
    Annotated(Vec<u8>),
    /// The format is not one we annotate.
    Unsupported,
    /// Parsing, searching, or serializing failed.
    Failed(String),
}

/// Internal failure raised while annotating; surfaced as
/// [`AnnotateOutcome::Failed`].
#[derive(Debug, thiserror::Error)]
pub enum AnnotateError {
    #[error("zip container: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("xml: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("pdf: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("pdf text layout: {0}")]
    Layout(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Malformed(String),
}

/// Format-specific highlighter.
pub trait Annotator: Send + Sync {
    /// Applies highlights for every term of `query` to `bytes`.
    ///
    /// An empty query returns the input unchanged.
    fn annotate(&self, bytes: &[u8], query: &Query) -> Result<Vec<u8>, AnnotateError>;
}

/// Document formats that can carry highlight annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Paragraph/run model (WordprocessingML).
    Flow,
    /// Page/glyph model (PDF).
    Fixed,
}

impl DocumentKind {
    /// Classifies a stored name by its extension. Returns `None` for
    /// formats that are served as-is.
    pub fn from_name(name: &str) -> Option<Self> {
        match extension(name).as_str() {
            "docx" => Some(DocumentKind::Flow),
            "pdf" => Some(DocumentKind::Fixed),
            _ => None,
        }
    }

    pub fn annotator(self) -> &'static dyn Annotator {
        match self {
            DocumentKind::Flow => &docx::DocxAnnotator,
            DocumentKind::Fixed => &pdf::PdfAnnotator,
        }
    }
}

/// Lower-cased extension of a stored name, or `""` when it has none.
pub fn extension(name: &str) -> String {
    let file = name.rsplit('/').next().unwrap_or(name);
    match file.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    }
}

/// Classifies `name` and annotates `bytes` with the matching annotator.
///
/// Never panics on malformed input.
pub fn annotate(name: &str, bytes: &[u8], query: &Query) -> AnnotateOutcome {
    let Some(kind) = DocumentKind::from_name(name) else {
        return AnnotateOutcome::Unsupported;
    };
    annotate_kind(kind, bytes, query)
}

/// Annotates `bytes` as a document of the given kind.
pub fn annotate_kind(kind: DocumentKind, bytes: &[u8], query: &Query) -> AnnotateOutcome {
    if query.is_empty() {
        return AnnotateOutcome::Annotated(bytes.to_vec());
    }
    match kind.annotator().annotate(bytes, query) {
        Ok(out) => AnnotateOutcome::Annotated(out),
        Err(e) => AnnotateOutcome::Failed(e.to_string()),
    }
}
