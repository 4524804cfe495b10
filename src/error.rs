//! Error types for the publish/import codec
//!
//! Only entry-point validation escapes a publish. Everything else in either
//! pipeline is absorbed and logged, so these types are mostly seen by callers
//! that want the typed detail behind a logged warning.

/// Errors produced while encoding or decoding an embedded object
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("failed to serialize object: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("object is not valid percent-encoded UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("failed to parse decoded object: {0}")]
    Parse(#[source] serde_json::Error),
}

/// Errors that block a publish before any output is produced
#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("no entry point: the story has no start passage")]
    MissingEntryPoint,

    #[error("entry point missing: start passage {0:?} does not exist in the story")]
    UnknownEntryPoint(String),

    #[error("failed to encode story data: {0}")]
    Encoding(#[from] CodecError),
}

/// Errors raised by explicit settings edits
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SettingsError {
    #[error("settings group {0:?} is not registered")]
    UnknownGroup(String),

    #[error("settings property {group:?}.{property:?} is not registered")]
    UnknownProperty { group: String, property: String },
}
