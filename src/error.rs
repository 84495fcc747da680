//! Error kinds returned by the engine. No part of the public API panics or
//! raises on a caller-reachable path; every fallible operation returns a
//! `Result<_, ConfluoError>`.

use std::fmt;

/// The error kinds a caller of this crate can observe.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfluoError {
    /// An operation was invoked on a type that does not support it.
    UnsupportedOp(String),
    /// A numeric cast was attempted across non-coercible types.
    InvalidCast(String),
    /// A malformed expression or literal was parsed.
    ParseError(String),
    /// Management-queue rejection: duplicate/missing name, bad field, bad periodicity.
    ManagementError(String),
    /// Semantic misuse at runtime, e.g. comparing mismatched types.
    InvalidOp(String),
    /// A name lookup failed.
    NotFound(String),
    /// The requested offset is at or beyond the read tail.
    NotYetCommitted { offset: u64, tail: u64 },
    /// The maximum block count for a log was exceeded.
    Overflow(String),
    /// An optional value was read while absent, or an invariant was violated.
    IllegalState(String),
}

impl fmt::Display for ConfluoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfluoError::UnsupportedOp(s) => write!(f, "unsupported operation: {s}"),
            ConfluoError::InvalidCast(s) => write!(f, "invalid cast: {s}"),
            ConfluoError::ParseError(s) => write!(f, "parse error: {s}"),
            ConfluoError::ManagementError(s) => write!(f, "management error: {s}"),
            ConfluoError::InvalidOp(s) => write!(f, "invalid operation: {s}"),
            ConfluoError::NotFound(s) => write!(f, "not found: {s}"),
            ConfluoError::NotYetCommitted { offset, tail } => {
                write!(f, "offset {offset} not yet committed (tail = {tail})")
            }
            ConfluoError::Overflow(s) => write!(f, "overflow: {s}"),
            ConfluoError::IllegalState(s) => write!(f, "illegal state: {s}"),
        }
    }
}

impl std::error::Error for ConfluoError {}

pub type Result<T> = std::result::Result<T, ConfluoError>;
