//! Decode error types.

use thiserror::Error;

/// Errors raised while turning an untyped JSON payload into a typed view.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload text is not valid JSON.
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The shape expects a JSON object but got something else.
    #[error("{shape}: expected a JSON object")]
    NotAnObject {
        /// Name of the shape being decoded.
        shape: &'static str,
    },

    /// A field failed to decode (missing required field, wrong type,
    /// unknown enum constant).
    #[error("{shape}: {source}")]
    Fields {
        /// Name of the shape being decoded.
        shape: &'static str,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// A required field that is accessed lazily was absent.
    #[error("{shape}: missing field `{field}`")]
    MissingField {
        /// Name of the shape being decoded.
        shape: &'static str,
        /// The absent field.
        field: &'static str,
    },

    /// None of the declared subtype conditions matched and there is no fallback.
    #[error("{shape}: no subtype matches the payload")]
    NoMatchingSubtype {
        /// Name of the polymorphic shape.
        shape: &'static str,
    },

    /// A cast was requested to a subtype whose condition does not hold.
    #[error("{shape}: payload does not satisfy subtype `{subtype}`")]
    SubtypeMismatch {
        /// Name of the polymorphic shape.
        shape: &'static str,
        /// The requested subtype.
        subtype: String,
    },

    /// A cast named a subtype the shape does not declare.
    #[error("{shape}: no subtype named `{subtype}`")]
    UnknownSubtype {
        /// Name of the polymorphic shape.
        shape: &'static str,
        /// The requested subtype.
        subtype: String,
    },
}
