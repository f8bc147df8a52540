//! Error sink and landmark reporting (spec.md §4.B, §7).

use std::fmt;

/// A source-location tag attached to a reported message, in the style of
/// a parser's `"%f:%l"` landmark pattern.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Landmark {
    pub file: String,
    pub line: u32,
}

impl Landmark {
    pub fn new(file: impl Into<String>, line: u32) -> Landmark {
        Landmark { file: file.into(), line }
    }

    pub fn unknown() -> Landmark {
        Landmark::default()
    }
}

impl fmt::Display for Landmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file.is_empty() {
            write!(f, "<unknown>")
        } else {
            write!(f, "{}:{}", self.file, self.line)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Message,
    Warning,
    Error,
}

/// One reported diagnostic, landmark-tagged.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub landmark: Landmark,
    pub text: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.landmark, self.text)
    }
}

/// Collects diagnostics during configure/initialize, also logging each one
/// as a `tracing` event so the same information reaches structured logs.
pub trait ErrorSink {
    fn report(&mut self, severity: Severity, landmark: &Landmark, text: &str);

    fn message(&mut self, landmark: &Landmark, text: &str) {
        self.report(Severity::Message, landmark, text);
    }

    fn warning(&mut self, landmark: &Landmark, text: &str) {
        self.report(Severity::Warning, landmark, text);
    }

    fn error(&mut self, landmark: &Landmark, text: &str) {
        self.report(Severity::Error, landmark, text);
    }

    fn has_errors(&self) -> bool;
}

/// The default sink: accumulates every diagnostic and forwards it to
/// `tracing`, matching the teacher's pattern of pairing structured events
/// with an in-memory record for later inspection.
#[derive(Default)]
pub struct VecErrorSink {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
}

impl VecErrorSink {
    pub fn new() -> VecErrorSink {
        VecErrorSink::default()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

impl ErrorSink for VecErrorSink {
    fn report(&mut self, severity: Severity, landmark: &Landmark, text: &str) {
        match severity {
            Severity::Message => tracing::info!(%landmark, "{text}"),
            Severity::Warning => tracing::warn!(%landmark, "{text}"),
            Severity::Error => tracing::error!(%landmark, "{text}"),
        }
        if severity == Severity::Error {
            self.error_count += 1;
        }
        self.diagnostics.push(Diagnostic {
            severity,
            landmark: landmark.clone(),
            text: text.to_string(),
        });
    }

    fn has_errors(&self) -> bool {
        self.error_count > 0
    }
}

/// Fatal errors surfaced from router bring-up (spec.md §7 "Configuration"/
/// "Flow-direction"/"Initialization" rows). Aggregates the full diagnostic
/// list rather than stopping at the first failure, so "surface full list of
/// errors before abort" is literal.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("{count} configuration error(s) during router bring-up", count = .0.len())]
    Configuration(Vec<Diagnostic>),
    #[error("flow-direction conflict: {0}")]
    FlowDirection(String),
    #[error("{count} initialization error(s), router rolled back", count = .0.len())]
    Initialization(Vec<Diagnostic>),
    #[error("unknown element class {0:?}")]
    UnknownClass(String),
    #[error("port count mismatch on {element}: {detail}")]
    PortCountMismatch { element: String, detail: String },
}

impl RouterError {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            RouterError::Configuration(d) | RouterError::Initialization(d) => d,
            _ => &[],
        }
    }
}
