//! Unified Error Type System
//!
//! Centralized error type for the storage core.
//! Classifies every failure so callers (CLI, API handlers, the checkpoint
//! thread) can decide whether to abort, report or keep going.
//!
//! ## Error Kinds
//!
//! - **Configuration**: invalid settings or migration sets (fatal, never retried)
//! - **NotInitialized**: operation attempted before `Database::initialize()`
//! - **Transient**: engine busy or locked, or a closed handle still borrowed
//! - **Migration**: a script failed and the batch was rolled back
//! - **Query**: malformed SQL handed to the analyzer
//! - **Storage** / **Io**: everything else from SQLite or the filesystem

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

// =============================================================================
// Error Kinds
// =============================================================================

/// Error classification used for propagation decisions and API payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid configuration or migration set - fail fast
    Configuration,
    /// Connection not opened yet
    NotInitialized,
    /// Busy/locked engine - expected, caller may try again
    Transient,
    /// Migration batch rolled back
    Migration,
    /// SQL could not be prepared or explained
    Query,
    /// SQLite failure outside the categories above
    Storage,
    /// Filesystem failure
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::NotInitialized => write!(f, "NOT_INITIALIZED"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Migration => write!(f, "MIGRATION"),
            Self::Query => write!(f, "QUERY"),
            Self::Storage => write!(f, "STORAGE"),
            Self::Io => write!(f, "IO"),
        }
    }
}

impl ErrorKind {
    /// Whether the same call may succeed if issued again later
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid {option}: {reason}")]
    InvalidOption { option: String, reason: String },

    /// Pending migrations do not form a contiguous run
    #[error(
        "Migration sequence error: expected version {expected}, found {found} ({filename})"
    )]
    MigrationSequence {
        expected: u32,
        found: u32,
        filename: String,
    },

    // -------------------------------------------------------------------------
    // Runtime Errors
    // -------------------------------------------------------------------------
    #[error("Database not initialized: call initialize() first")]
    NotInitialized,

    #[error("Database already initialized")]
    AlreadyInitialized,

    /// A closed handle is still borrowed, so its connection is still open
    #[error("Previous connection still in use; retry once it is released")]
    HandleInUse,

    /// A migration script failed; the whole batch was rolled back
    #[error("Migration {filename} failed: {message}")]
    MigrationFailed { filename: String, message: String },

    /// SQL rejected by the engine while preparing or explaining
    #[error("{}", format_query_error(.sql, .message, .offset))]
    Query {
        sql: String,
        message: String,
        offset: Option<usize>,
    },

    #[error("Storage error: {0}")]
    Storage(String),
}

fn format_query_error(sql: &str, message: &str, offset: &Option<usize>) -> String {
    match offset {
        Some(offset) => format!("Query error at offset {}: {} in `{}`", offset, message, sql),
        None => format!("Query error: {} in `{}`", message, sql),
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

// =============================================================================
// Helper Functions
// =============================================================================

impl StoreError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::Database(e) if is_busy(e) => ErrorKind::Transient,
            Self::HandleInUse => ErrorKind::Transient,
            Self::Database(_) | Self::Json(_) | Self::Storage(_) => ErrorKind::Storage,
            Self::Config(_)
            | Self::InvalidOption { .. }
            | Self::MigrationSequence { .. }
            | Self::AlreadyInitialized => ErrorKind::Configuration,
            Self::NotInitialized => ErrorKind::NotInitialized,
            Self::MigrationFailed { .. } => ErrorKind::Migration,
            Self::Query { .. } => ErrorKind::Query,
        }
    }

    /// Short type name used in API error payloads
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Io(_) => "IoError",
            Self::Database(_) => "DatabaseError",
            Self::Json(_) => "SerializationError",
            Self::Config(_) => "ConfigError",
            Self::InvalidOption { .. } => "ValidationError",
            Self::MigrationSequence { .. } => "MigrationSequenceError",
            Self::NotInitialized => "NotInitializedError",
            Self::AlreadyInitialized => "AlreadyInitializedError",
            Self::HandleInUse => "HandleInUseError",
            Self::MigrationFailed { .. } => "MigrationError",
            Self::Query { .. } => "QueryError",
            Self::Storage(_) => "StorageError",
        }
    }

    /// Structured details for API payloads (None when the message says it all)
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InvalidOption { option, reason } => Some(serde_json::json!({
                "option": option,
                "reason": reason,
            })),
            Self::MigrationSequence {
                expected,
                found,
                filename,
            } => Some(serde_json::json!({
                "expected": expected,
                "found": found,
                "filename": filename,
            })),
            Self::MigrationFailed { filename, .. } => {
                Some(serde_json::json!({ "filename": filename }))
            }
            Self::Query { sql, offset, .. } => Some(serde_json::json!({
                "sql": sql,
                "offset": offset,
            })),
            Self::Database(rusqlite::Error::SqliteFailure(err, _)) => Some(serde_json::json!({
                "code": format!("{:?}", err.code),
                "extended_code": err.extended_code,
            })),
            _ => None,
        }
    }

    /// Create an invalid-option error
    pub fn invalid_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an engine error raised while preparing `sql`.
    ///
    /// The byte offset comes from the engine's input error when it reports
    /// one, otherwise from an "at offset N" suffix in the message.
    pub fn query(sql: impl Into<String>, err: rusqlite::Error) -> Self {
        let (message, offset) = match &err {
            rusqlite::Error::SqlInputError { msg, offset, .. } => {
                (msg.clone(), usize::try_from(*offset).ok())
            }
            rusqlite::Error::SqliteFailure(_, Some(msg)) => (msg.clone(), offset_in(msg)),
            other => {
                let rendered = other.to_string();
                let offset = offset_in(&rendered);
                (rendered, offset)
            }
        };
        Self::Query {
            sql: sql.into(),
            message,
            offset,
        }
    }

    /// Check if this error is transient (engine busy or locked)
    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }
}

static OFFSET_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"at offset (\d+)").expect("valid offset regex"));

fn offset_in(message: &str) -> Option<usize> {
    OFFSET_PATTERN
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// SQLITE_BUSY / SQLITE_LOCKED
fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
    )
}

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| StoreError::Storage(format!("{}: {}", context.into(), e)))
    }
}

// =============================================================================
// Tests
// =============================================================================
