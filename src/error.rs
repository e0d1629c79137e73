//! Error types for covgap

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// covgap errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("Missing input: {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("Malformed document {}: {source}", path.display())]
    MalformedDocument {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error("Cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Suggestion collaborator failed: {0}")]
    Collaborator(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_norway::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Attach the originating document path to a parse failure
    pub fn malformed(path: impl Into<PathBuf>, source: ParseError) -> Self {
        Error::MalformedDocument {
            path: path.into(),
            source,
        }
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

/// Structural failure while normalizing a raw document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{format} parse failed: {message} (near `{fragment}`)")]
pub struct ParseError {
    pub format: &'static str,
    pub message: String,
    /// Short window of the raw input around the failure position
    pub fragment: String,
}

const FRAGMENT_RADIUS: usize = 40;

impl ParseError {
    pub fn new(format: &'static str, message: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            format,
            message: message.into(),
            fragment: fragment.into(),
        }
    }

    /// Build an error whose fragment is cut from `raw` around byte `offset`
    pub fn at_offset(format: &'static str, message: impl Into<String>, raw: &str, offset: usize) -> Self {
        Self::new(format, message, fragment_around(raw, offset))
    }
}

/// Extract a single-line window of `raw` centred on `offset`
pub(crate) fn fragment_around(raw: &str, offset: usize) -> String {
    let offset = offset.min(raw.len());
    let mut start = offset.saturating_sub(FRAGMENT_RADIUS);
    let mut end = (offset + FRAGMENT_RADIUS).min(raw.len());
    while !raw.is_char_boundary(start) {
        start -= 1;
    }
    while !raw.is_char_boundary(end) {
        end += 1;
    }
    raw[start..end].split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Which input a diagnostic came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticSource {
    Coverage,
    Trace,
    Contract,
    Requirements,
    Suggestions,
}

impl std::fmt::Display for DiagnosticSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticSource::Coverage => write!(f, "coverage"),
            DiagnosticSource::Trace => write!(f, "trace"),
            DiagnosticSource::Contract => write!(f, "contract"),
            DiagnosticSource::Requirements => write!(f, "requirements"),
            DiagnosticSource::Suggestions => write!(f, "suggestions"),
        }
    }
}

/// Kind of non-fatal condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Unexpected schema variant inside an otherwise valid document
    UnrecognizedFieldShape,
    /// A whole source was dropped because partial analysis was allowed
    SourceSkipped,
    /// Suggestion collaborator unavailable or returned unusable content
    CollaboratorFailure,
}

/// A recorded non-fatal skip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Diagnostic {
    pub source: DiagnosticSource,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(source: DiagnosticSource, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::warn!(%source, ?kind, "{}", message);
        Self {
            source,
            kind,
            message,
        }
    }

    pub fn unrecognized(source: DiagnosticSource, message: impl Into<String>) -> Self {
        Self::new(source, DiagnosticKind::UnrecognizedFieldShape, message)
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.source, self.message)
    }
}
