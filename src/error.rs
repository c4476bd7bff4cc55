// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
// Error taxonomy for the query fan-out engine.
//
// Mirrors the teacher's `thiserror`-at-the-leaves idiom: a single enum per
// crate-facing boundary, with enough structure for callers to branch on
// without downcasting strings.

use thiserror::Error;

/// Subcategories of a failed SQL execution against a shard, per spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlErrorKind {
    Syntax,
    MissingColumn,
    MissingTable,
    Timeout,
    Permission,
    Connection,
}

impl std::fmt::Display for SqlErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SqlErrorKind::Syntax => "syntax",
            SqlErrorKind::MissingColumn => "missing_column",
            SqlErrorKind::MissingTable => "missing_table",
            SqlErrorKind::Timeout => "timeout",
            SqlErrorKind::Permission => "permission",
            SqlErrorKind::Connection => "connection",
        };
        f.write_str(s)
    }
}

/// Why a single shard was dropped from a request. Folded into `ShardOutcome`
/// at the shard boundary; never escapes as a panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardFailureKind {
    Sql(SqlErrorKind),
    OutOfMemory,
    Cancelled,
    Other,
}

impl std::fmt::Display for ShardFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShardFailureKind::Sql(kind) => write!(f, "sql({kind})"),
            ShardFailureKind::OutOfMemory => f.write_str("out_of_memory"),
            ShardFailureKind::Cancelled => f.write_str("cancelled"),
            ShardFailureKind::Other => f.write_str("other"),
        }
    }
}

/// Top-level engine error. Everything before Phase A (estimation) surfaces
/// as one of these; everything inside a per-shard loop is recovered locally
/// into a `ShardOutcome::Failed` and never reaches this type.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {}", .fields.join(", "))]
    Validation { fields: Vec<String> },

    #[error("query template not found: {code}")]
    QueryNotFound { code: String },

    #[error("sql execution failed ({kind}): {detail}")]
    SqlExecution {
        kind: SqlErrorKind,
        detail: String,
    },

    #[error("task not ready: {task_id}")]
    NotReady { task_id: String },

    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("task cannot be cancelled in its current state")]
    NotCancellable,

    #[error("internal error (trace_id={trace_id}): {message}")]
    Internal { message: String, trace_id: String },
}

impl EngineError {
    pub fn validation(fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        EngineError::Validation {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        EngineError::Internal {
            message: message.into(),
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
