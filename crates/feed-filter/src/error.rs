use quick_xml::events::attributes::AttrError;
use quick_xml::escape::EscapeError;

/// Failures raised while filtering an XMLTV guide.
///
/// Any of these aborts the whole pass; the filter never returns a partial document.
#[derive(Debug, thiserror::Error)]
pub enum GuideError {
    #[error("missing root element")]
    MissingRoot,

    #[error("unexpected end of document inside <{element}>")]
    UnexpectedEof { element: String },

    #[error("XML syntax error at byte {position}: {source}")]
    Syntax {
        position: usize,
        #[source]
        source: quick_xml::Error,
    },

    #[error("invalid attribute: {0}")]
    Attribute(#[from] AttrError),

    #[error("invalid escape sequence: {0}")]
    Escape(#[from] EscapeError),

    #[error("invalid UTF-8 in markup: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}
