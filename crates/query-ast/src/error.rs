//! Error taxonomy shared by the compiler, the binder, and the pipeline
//! executor.
//!
//! Modeled on a hand-rolled `Error`/`Reason` pair rather than a derive-macro
//! error type: a closed `ErrorKind` plus a message and an optional offending
//! token/snippet, so every error can point at the piece of the query that
//! caused it.

use std::fmt;

/// The closed error taxonomy from the system's error-handling design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller invoked an object API on a trait query or vice versa.
    QueryKindMismatch,
    /// Predicate is not legal in the requested context.
    UnsupportedPredicate,
    /// Self-ref binding invalid in current context.
    SelfRefContext,
    /// Resolver returned multiple candidates for a wikilink token.
    AmbiguousReference,
    /// `target`, `sub_query`, and `is_self_ref` all absent where one is required.
    MissingBinding,
    /// `min`/`max`/`sum` used with a shape the aggregation doesn't support.
    AggregationShape,
    /// Underlying store driver error.
    StoreError,
    /// Propagated unchanged from the external parser.
    ParseError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::QueryKindMismatch => "query kind mismatch",
            ErrorKind::UnsupportedPredicate => "unsupported predicate",
            ErrorKind::SelfRefContext => "invalid self-reference context",
            ErrorKind::AmbiguousReference => "ambiguous reference",
            ErrorKind::MissingBinding => "missing binding",
            ErrorKind::AggregationShape => "invalid aggregation shape",
            ErrorKind::StoreError => "store error",
            ErrorKind::ParseError => "parse error",
        };
        f.write_str(s)
    }
}

/// An error produced anywhere in the query middle-end.
#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    /// The offending token or sub-query snippet, when one is available.
    pub snippet: Option<String>,
}

impl Error {
    pub fn new<S: ToString>(kind: ErrorKind, message: S) -> Self {
        Error {
            kind,
            message: message.to_string(),
            snippet: None,
        }
    }

    pub fn with_snippet<S: ToString>(mut self, snippet: S) -> Self {
        self.snippet = Some(snippet.to_string());
        self
    }

    pub fn query_kind_mismatch<S: ToString>(message: S) -> Self {
        Error::new(ErrorKind::QueryKindMismatch, message)
    }

    pub fn unsupported_predicate<S: ToString>(message: S) -> Self {
        Error::new(ErrorKind::UnsupportedPredicate, message)
    }

    pub fn self_ref_context<S: ToString>(message: S) -> Self {
        Error::new(ErrorKind::SelfRefContext, message)
    }

    pub fn ambiguous_reference(token: &str, candidates: &[String]) -> Self {
        Error::new(
            ErrorKind::AmbiguousReference,
            format!(
                "`{token}` is ambiguous: matches {}",
                candidates.join(", ")
            ),
        )
        .with_snippet(token)
    }

    pub fn missing_binding<S: ToString>(message: S) -> Self {
        Error::new(ErrorKind::MissingBinding, message)
    }

    pub fn aggregation_shape<S: ToString>(message: S) -> Self {
        Error::new(ErrorKind::AggregationShape, message)
    }

    pub fn store<S: ToString>(message: S, sql: &str) -> Self {
        Error::new(ErrorKind::StoreError, message).with_snippet(sql)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(snippet) = &self.snippet {
            write!(f, " (in `{snippet}`)")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

pub type Result<T, E = Error> = std::result::Result<T, E>;
