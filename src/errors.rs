//! Layered error types and user-facing error formatting.
//!
//! Each layer wraps the one below with added context:
//! - [`ParseError`] for parser pool / parser manager failures
//! - [`QueryError`] for query compilation and execution failures
//! - [`ExtractError`] for per-file extraction, naming the query kind
//! - [`GleanError`] as the unified top-level error type
//!
//! [`GleanError`] carries contextual hints and exit codes so that `main()`
//! can present human-readable diagnostics on stderr.

use thiserror::Error;

use crate::lang::Grammar;
use crate::query::QueryKind;

// ---------------------------------------------------------------------------
// Exit codes
// ---------------------------------------------------------------------------

/// Process exit codes.
///
/// * `0` - success
/// * `1` - general runtime error
/// * `2` - usage / argument error (bad CLI invocation)
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

// ---------------------------------------------------------------------------
// Layer-specific error types
// ---------------------------------------------------------------------------

/// Errors from the parser pools and the parser manager.
///
/// Syntax errors in the source are not represented here; they are a flag
/// on the returned tree.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("cannot parse unknown language")]
    UnknownLanguage,

    #[error("failed to get pool: {0}")]
    Pool(Box<ParseError>),

    #[error("failed to acquire parser: {0}")]
    Acquire(Box<ParseError>),

    /// The grammar could not be bound to a fresh parser (ABI mismatch).
    #[error("cannot bind {grammar} grammar to parser: {message}")]
    LanguageBinding { grammar: Grammar, message: String },

    #[error("parser pool for {0} is closed")]
    PoolClosed(Grammar),

    #[error("parser manager is closed")]
    ManagerClosed,

    #[error("parser produced no tree")]
    NoTree,
}

/// Errors from query compilation and execution.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("unsupported language for {kind} queries")]
    Unsupported { kind: QueryKind },

    #[error("failed to compile {kind} query for {grammar}: {message}")]
    Compile {
        kind: QueryKind,
        grammar: Grammar,
        message: String,
    },

    /// A query compiled for one grammar was run against another's tree.
    #[error("{kind} query compiled for {query} cannot run on a {tree} tree")]
    GrammarMismatch {
        kind: QueryKind,
        query: Grammar,
        tree: Grammar,
    },

    /// The source buffer is not the one the tree was parsed from.
    #[error("source is {actual} bytes but the tree was parsed from {expected}")]
    SourceMismatch { expected: usize, actual: usize },

    #[error("query manager is closed")]
    Closed,
}

/// Per-file extraction failures. Any of these means no partial result.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("failed to get {kind} query: {source}")]
    GetQuery {
        kind: QueryKind,
        #[source]
        source: QueryError,
    },

    #[error("failed to execute {kind} query: {source}")]
    ExecuteQuery {
        kind: QueryKind,
        #[source]
        source: QueryError,
    },
}

// ---------------------------------------------------------------------------
// Unified application error
// ---------------------------------------------------------------------------

/// Unified error type for the entire application.
#[derive(Error, Debug)]
pub enum GleanError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A usage / argument error (exit code 2).
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GleanError {
    /// Return the appropriate process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            GleanError::Usage(_) => EXIT_USAGE,
            _ => EXIT_ERROR,
        }
    }

    /// Return an optional human-readable hint that may help the user fix
    /// the problem.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            GleanError::Extract(ExtractError::UnsupportedLanguage(_)) => {
                Some("supported extensions: .ts .mts .cts .tsx .js .jsx .mjs .cjs")
            }
            GleanError::Extract(ExtractError::GetQuery { .. }) => {
                Some("a bundled query failed to compile; the grammar version may not match")
            }
            GleanError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Some("verify the file or directory exists")
            }
            GleanError::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Some("check file permissions")
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
