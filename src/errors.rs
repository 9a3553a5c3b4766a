//! Error Types
//!
//! The crate follows a best-effort philosophy: missing lookup steps resolve
//! to [`Value::Null`](crate::value::Value::Null), absent timer hardware
//! degrades to "no scheduler", and the buffer pool never fails. The only
//! fallible public surface is the dynamic path resolver, which strictly
//! rejects malformed input.
//!
//! Contract violations (unknown procedure names, arity mismatches, unmatched
//! begin/end pairing) are caller programming errors and panic; they are not
//! represented here.

use thiserror::Error;

/// The error type for the wisp command-compiler core.
#[derive(Error, Debug)]
pub enum WispError {
    /// A dynamic property path could not be tokenized.
    ///
    /// Raised for empty paths, empty segments (leading/trailing/doubled
    /// separators), unterminated quotes, and stray bracket characters.
    #[error("invalid accessor path {path:?}: {reason}")]
    InvalidPath {
        /// The offending path string, as given by the caller.
        path: String,
        /// Short description of the malformation.
        reason: &'static str,
    },
}

/// Alias for `Result<T, WispError>`.
pub type Result<T> = std::result::Result<T, WispError>;
