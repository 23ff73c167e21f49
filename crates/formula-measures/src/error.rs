pub type MeasureResult<T> = Result<T, MeasureError>;

/// Maximum number of input characters echoed back by [`MeasureError::Structure`].
const STRUCTURE_EXCERPT_CHARS: usize = 512;

/// A single syntax diagnostic produced while parsing a measure script.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("({line}, {column}) {message}")]
pub struct ParseError {
    /// 1-based line.
    pub line: usize,
    /// 1-based column, counted in characters.
    pub column: usize,
    pub message: String,
}

impl ParseError {
    #[must_use]
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

/// Aggregate raised when a script fails to parse.
///
/// `errors` is sorted by position and capped by `ParseOptions::max_reported_errors`; the number of
/// diagnostics that did not fit is kept in `suppressed`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} error(s) parsing measure script:{}", self.total(), self.listing())]
pub struct ParseErrors {
    pub input: String,
    pub errors: Vec<ParseError>,
    pub suppressed: usize,
}

impl ParseErrors {
    pub(crate) fn new(input: &str, mut errors: Vec<ParseError>, cap: usize) -> Self {
        errors.sort_by(|a, b| (a.line, a.column).cmp(&(b.line, b.column)));
        let suppressed = errors.len().saturating_sub(cap);
        errors.truncate(cap);
        Self {
            input: input.to_string(),
            errors,
            suppressed,
        }
    }

    /// Total number of diagnostics, including suppressed ones.
    #[must_use]
    pub fn total(&self) -> usize {
        self.errors.len() + self.suppressed
    }

    fn listing(&self) -> String {
        let mut out: String = self
            .errors
            .iter()
            .map(|error| format!("\n  {error}"))
            .collect();
        if self.suppressed > 0 {
            out.push_str(&format!("\n  ... and {} more errors", self.suppressed));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("wrong calculation property type: {0}")]
    UnknownKind(String),

    #[error("invalid attribute list {input:?}: {reason}")]
    AttributeList { input: String, reason: String },

    #[error("invalid KPI annotation list {input:?}: {reason}")]
    AnnotationList { input: String, reason: String },

    #[error("invalid <Format> element: {0}")]
    Fragment(String),

    #[error("<{0}> is missing required element <{1}>")]
    MissingElement(&'static str, &'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum MeasureError {
    #[error("{0}")]
    Parse(#[from] ParseErrors),

    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("invalid model document: {}\n{}", .message, excerpt(.input))]
    Structure { message: String, input: String },

    #[error("measure {table}[{measure}] belongs to a table that is not in the model")]
    UnknownTable { table: String, measure: String },

    #[error("KPI of {table}[{measure}] sets its {field} but has no {kind} measure to carry it")]
    KpiField {
        table: String,
        measure: String,
        field: &'static str,
        kind: &'static str,
    },

    #[error("xml error: {0}")]
    XmlParse(#[from] roxmltree::Error),

    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl MeasureError {
    pub(crate) fn structure(message: impl Into<String>, input: &str) -> Self {
        Self::Structure {
            message: message.into(),
            input: input.to_string(),
        }
    }
}

fn excerpt(input: &str) -> String {
    match input.char_indices().nth(STRUCTURE_EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &input[..idx]),
        None => input.to_string(),
    }
}
