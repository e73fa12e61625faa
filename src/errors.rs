//! Error taxonomy for the trusted side.
//!
//! [`TaError`] values reach the caller as a [`ResultCode`]. A parse gap
//! does so only under strict parsing. Overflow refusals stay inside the
//! serializer: they degrade the result (fewer voters, shorter output) and
//! are logged and counted, but never fail the call.
//!
//! Messages describe what failed. They never echo untrusted input bytes.

use std::fmt;

use crate::dispatch::ResultCode;

/// Failure of a single field extraction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractError {
    /// No opening or closing quote before the scan limit.
    Malformed,
    /// The captured string plus its terminator does not fit the destination.
    Overflow {
        /// Captured length in bytes.
        needed: usize,
        /// Destination capacity, terminator included.
        capacity: usize,
    },
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "unterminated or missing quoted string"),
            Self::Overflow { needed, capacity } => write!(
                f,
                "string of {needed} bytes does not fit destination of {capacity} bytes"
            ),
        }
    }
}

impl std::error::Error for ExtractError {}

/// A bounded append that was refused. The buffer is left unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Overflow {
    /// Bytes already written.
    pub current: usize,
    /// Length of the refused fragment.
    pub fragment: usize,
    /// Buffer capacity, terminator included.
    pub capacity: usize,
}

impl fmt::Display for Overflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "append of {} bytes at length {} refused (capacity {})",
            self.fragment, self.current, self.capacity
        )
    }
}

impl std::error::Error for Overflow {}

/// Why the report parser stopped accumulating records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseGap {
    /// A record was missing the named field.
    MissingField(&'static str),
    /// A string field could not be extracted.
    BadString {
        field: &'static str,
        cause: ExtractError,
    },
    /// The record's closing `}` was never found.
    UnterminatedRecord,
}

impl fmt::Display for ParseGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "record missing field `{field}`"),
            Self::BadString { field, cause } => write!(f, "field `{field}`: {cause}"),
            Self::UnterminatedRecord => write!(f, "record not terminated by `}}`"),
        }
    }
}

impl std::error::Error for ParseGap {}

/// Errors produced while handling one invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaError {
    /// Invocation parameters do not match the expected shape, or the command
    /// is not supported. Fatal to the call.
    Shape(String),
    /// The bounded working set could not be allocated. Fatal to the call.
    Resource(String),
    /// A record was malformed mid-batch. Fatal only under strict parsing.
    ParseGap(ParseGap),
}

impl TaError {
    /// Result code reported to the caller when this error aborts a call.
    pub fn result_code(&self) -> ResultCode {
        match self {
            Self::Resource(_) => ResultCode::OutOfMemory,
            Self::Shape(_) | Self::ParseGap(_) => ResultCode::BadParameters,
        }
    }
}

impl fmt::Display for TaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shape(msg) => write!(f, "bad parameters: {msg}"),
            Self::Resource(msg) => write!(f, "out of memory: {msg}"),
            Self::ParseGap(gap) => write!(f, "parse gap: {gap}"),
        }
    }
}

impl std::error::Error for TaError {}

impl From<ParseGap> for TaError {
    fn from(gap: ParseGap) -> Self {
        Self::ParseGap(gap)
    }
}
