//! Error taxonomy for the lightweight object runtime

use thiserror::Error;

/// Errors surfaced by the lightweight object runtime
///
/// All of these are recoverable at the call boundary; nothing in this
/// crate aborts the host process.
#[derive(Debug, Error)]
pub enum LwError {
    /// Blueprint path does not exist
    #[error("program not found: {0}")]
    NotFound(String),

    /// Blueprint path exists but could not be compiled
    #[error("compile error in {path}: {message}")]
    Compile {
        /// Load path of the failing program
        path: String,
        /// Compiler diagnostic
        message: String,
    },

    /// Declared-type construction resolved to a different blueprint
    #[error("type mismatch: declared {declared}, actual {actual}")]
    TypeMismatch {
        /// The declared (expected) blueprint path
        declared: String,
        /// The blueprint path actually resolved
        actual: String,
    },

    /// Construction hook failed; the instance was unwound
    #[error("initialization failed: {0}")]
    Init(String),

    /// Copy hook failed; the new instance was unwound
    #[error("copy failed: {0}")]
    Copy(String),

    /// Restore hook failed; the restored graph was unwound
    #[error("restore failed: {0}")]
    Restore(String),

    /// Strict dispatch against a method the blueprint does not define
    #[error("no method '{name}' in {path}")]
    MethodNotFound {
        /// Load path of the receiver's blueprint
        path: String,
        /// The method name that missed
        name: String,
    },

    /// Malformed serialized form
    #[error("parse error at byte {position}: {message}")]
    Parse {
        /// Byte offset into the input
        position: usize,
        /// What went wrong
        message: String,
    },

    /// Failure raised inside a user method body or hook closure
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Result alias used throughout the crate
pub type LwResult<T> = Result<T, LwError>;

impl LwError {
    /// Shorthand for a parse error at a byte position
    pub(crate) fn parse(position: usize, message: impl Into<String>) -> Self {
        LwError::Parse {
            position,
            message: message.into(),
        }
    }
}
