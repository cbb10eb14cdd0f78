//! Infrastructure error types.
//!
//! These cover failures in the embedding surface (malformed descriptors,
//! unknown symbols). Exceptions thrown by executing bytecode are heap
//! objects and travel through the thread's pending-exception slot, not
//! through these types.

use thiserror::Error;

/// Failure to parse a method descriptor string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("descriptor does not start with '('")]
    MissingOpenParen,
    #[error("descriptor ends before its return type")]
    Truncated,
    #[error("invalid type letter '{0}' in descriptor")]
    BadTypeLetter(char),
}
