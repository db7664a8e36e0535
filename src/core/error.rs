//! Error types for Scribe operations.
//!
//! This module defines the canonical error type used throughout Scribe.
//! All subsystems return `Result<T, ScribeError>`. Engine-level failures
//! carry a stable machine-readable code plus structured diagnostics so
//! callers can locate the problem without parsing prose.

use rusqlite;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::io;
use thiserror::Error;

/// Stable failure codes surfaced across the engine boundary.
///
/// The set is closed: adapters match on these codes, so new failure modes
/// must add a variant here rather than overload an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    DocNotFound,
    SectionNotFound,
    AnchorNotFound,
    AmbiguousAnchor,
    TokenNotFound,
    RangeOutOfBounds,
    MissingMetadata,
    BadMetaValue,
    DuplicateDoc,
    PathCollision,
    PathEscape,
    StaleSource,
    LockTimeout,
    HashMismatch,
    RotationChainBroken,
    IoTemporary,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DocNotFound => "DOC_NOT_FOUND",
            ErrorCode::SectionNotFound => "SECTION_NOT_FOUND",
            ErrorCode::AnchorNotFound => "ANCHOR_NOT_FOUND",
            ErrorCode::AmbiguousAnchor => "AMBIGUOUS_ANCHOR",
            ErrorCode::TokenNotFound => "TOKEN_NOT_FOUND",
            ErrorCode::RangeOutOfBounds => "RANGE_OUT_OF_BOUNDS",
            ErrorCode::MissingMetadata => "MISSING_METADATA",
            ErrorCode::BadMetaValue => "BAD_META_VALUE",
            ErrorCode::DuplicateDoc => "DUPLICATE_DOC",
            ErrorCode::PathCollision => "PATH_COLLISION",
            ErrorCode::PathEscape => "PATH_ESCAPE",
            ErrorCode::StaleSource => "STALE_SOURCE",
            ErrorCode::LockTimeout => "LOCK_TIMEOUT",
            ErrorCode::HashMismatch => "HASH_MISMATCH",
            ErrorCode::RotationChainBroken => "ROTATION_CHAIN_BROKEN",
            ErrorCode::IoTemporary => "IO_TEMPORARY",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured engine failure: code, human message, machine diagnostics.
///
/// Diagnostics are operation-specific, e.g. `AMBIGUOUS_ANCHOR` carries the
/// offending body line numbers, `MISSING_METADATA` the missing keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default)]
    pub diagnostics: JsonValue,
}

impl EngineError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            diagnostics: JsonValue::Null,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: JsonValue) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Canonical error type for all Scribe operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait
/// implementations. IO and SQLite errors auto-convert via `#[from]` and are
/// classified `IO_TEMPORARY` at the envelope boundary; everything else is an
/// `Engine` failure with its own stable code.
#[derive(Error, Debug)]
pub enum ScribeError {
    /// Structured engine failure (stable code + diagnostics)
    #[error("{0}")]
    Engine(EngineError),

    /// SQLite database error (auto-converts from `rusqlite::Error`)
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O error (auto-converts from `std::io::Error`)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error (auto-converts from `serde_json::Error`)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file missing, unparsable, or self-contradictory
    #[error("Config error: {0}")]
    Config(String),
}

impl ScribeError {
    pub fn engine(code: ErrorCode, message: impl Into<String>) -> Self {
        ScribeError::Engine(EngineError::new(code, message))
    }

    pub fn engine_with(
        code: ErrorCode,
        message: impl Into<String>,
        diagnostics: JsonValue,
    ) -> Self {
        ScribeError::Engine(EngineError::new(code, message).with_diagnostics(diagnostics))
    }

    /// Stable code for the envelope; transients collapse to `IO_TEMPORARY`.
    pub fn code(&self) -> ErrorCode {
        match self {
            ScribeError::Engine(e) => e.code,
            ScribeError::Sqlite(_) | ScribeError::Io(_) | ScribeError::Json(_) => {
                ErrorCode::IoTemporary
            }
            ScribeError::Config(_) => ErrorCode::IoTemporary,
        }
    }

    /// Render as the structured result envelope handed to adapters.
    pub fn envelope(&self) -> JsonValue {
        match self {
            ScribeError::Engine(e) => serde_json::json!({
                "ok": false,
                "error_code": e.code,
                "message": e.message,
                "diagnostics": e.diagnostics,
            }),
            other => serde_json::json!({
                "ok": false,
                "error_code": self.code(),
                "message": other.to_string(),
                "diagnostics": JsonValue::Null,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_strings_are_screaming_snake() {
        assert_eq!(ErrorCode::DocNotFound.as_str(), "DOC_NOT_FOUND");
        assert_eq!(ErrorCode::AmbiguousAnchor.as_str(), "AMBIGUOUS_ANCHOR");
        assert_eq!(
            ErrorCode::RotationChainBroken.as_str(),
            "ROTATION_CHAIN_BROKEN"
        );
    }

    #[test]
    fn test_error_code_serde_matches_as_str() {
        let json = serde_json::to_string(&ErrorCode::RangeOutOfBounds).unwrap();
        assert_eq!(json, "\"RANGE_OUT_OF_BOUNDS\"");
    }

    #[test]
    fn test_engine_error_display() {
        let err = ScribeError::engine(ErrorCode::StaleSource, "source hash changed");
        assert_eq!(format!("{}", err), "STALE_SOURCE: source hash changed");
    }

    #[test]
    fn test_envelope_carries_diagnostics() {
        let err = ScribeError::engine_with(
            ErrorCode::AmbiguousAnchor,
            "anchor 'phase_0' appears 2 times",
            serde_json::json!({"lines": [10, 42]}),
        );
        let env = err.envelope();
        assert_eq!(env["ok"], false);
        assert_eq!(env["error_code"], "AMBIGUOUS_ANCHOR");
        assert_eq!(env["diagnostics"]["lines"][0], 10);
    }

    #[test]
    fn test_io_errors_classify_as_transient() {
        let err: ScribeError = io::Error::other("disk sneeze").into();
        assert_eq!(err.code(), ErrorCode::IoTemporary);
    }

    #[test]
    fn test_json_errors_classify_as_transient() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: ScribeError = json_err.into();
        assert_eq!(err.code(), ErrorCode::IoTemporary);
        assert!(format!("{}", err).starts_with("JSON error:"));
    }
}
