//! Error categories and loud reporting
//!
//! - Recoverable: one file failed, the batch continues
//! - Fatal: the operation stops before (or without) touching more files
//! - Optional: a soft outcome worth a report line, never an error

use crate::errors::CurateError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Recoverable,
    Fatal,
    Optional,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Recoverable => write!(f, "RECOVERABLE"),
            ErrorCategory::Fatal => write!(f, "FATAL"),
            ErrorCategory::Optional => write!(f, "OPTIONAL"),
        }
    }
}

/// Print an error and its whole cause chain to stderr and to the log.
pub fn report_anyhow(error: &anyhow::Error) {
    for line in cause_chain(error) {
        eprintln!("{}", line);
    }
    tracing::error!("Error occurred: {:#}", error);
}

/// Process exit code for an error that ended the run: 2 for batch-fatal
/// errors (bad root, missing tool, protected directory), 1 otherwise.
pub fn exit_code(error: &anyhow::Error) -> i32 {
    match curate_error(error) {
        Some(e) if e.is_fatal() => 2,
        _ => 1,
    }
}

fn curate_error(error: &anyhow::Error) -> Option<&CurateError> {
    error.chain().find_map(|e| e.downcast_ref::<CurateError>())
}

fn cause_chain(error: &anyhow::Error) -> Vec<String> {
    let head = match curate_error(error) {
        Some(e) => format!("🔥 ERROR [{}]: {}", e.category(), error),
        None => format!("🔥 ERROR: {}", error),
    };
    let mut lines = vec![head];
    for (level, cause) in error.chain().skip(1).enumerate() {
        lines.push(format!("   {}. Caused by: {}", level + 1, cause));
    }
    lines
}
