//! Crate-level error types.
//!
//! Parse errors represent a contract violation between this library and the
//! backend's actual wire format. They are never silently defaulted: guessing
//! a value here risks presenting wrong itinerary data to a traveler.

use crate::transport::TransportError;

/// Failure while normalizing a backend response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// A field the protocol guarantees was absent.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// An enumerated backend code outside the known set.
    #[error("unexpected value for {field}: {value:?}")]
    UnexpectedValue { field: &'static str, value: String },

    /// An index-based cross-reference pointed outside its lookup table.
    #[error("index {index} out of range for {list}")]
    IndexOutOfRange { list: &'static str, index: usize },

    /// A date or time string that does not match the protocol's encoding.
    #[error("invalid date/time: {0}")]
    InvalidDate(String),

    /// A coordinate that does not match the protocol's encoding.
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),

    /// The XML document could not be tokenized at all.
    #[error("malformed XML: {0}")]
    Xml(String),

    /// The JSON document could not be deserialized.
    #[error("malformed JSON: {0}")]
    Json(String),

    /// Anything else, with a descriptive reason.
    #[error("{0}")]
    Other(String),
}

impl From<roxmltree::Error> for ParseError {
    fn from(err: roxmltree::Error) -> Self {
        ParseError::Xml(err.to_string())
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        ParseError::Json(err.to_string())
    }
}

/// Any failure a query can surface.
///
/// Domain outcomes (no trips, ambiguous location, ...) are *not* errors;
/// they are variants of the typed result enums in [`crate::provider`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The network transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response arrived but could not be normalized.
    #[error(transparent)]
    Parse(#[from] ParseError),
}
