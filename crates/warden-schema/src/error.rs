//! Schema validation error types.

use serde::Serialize;
use thiserror::Error;

/// Error returned when a configuration mapping does not match its schema.
///
/// Carries the offending key and a rendering of the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{message}")]
pub struct SchemaValidationError {
    /// The kind of validation failure.
    pub kind: SchemaErrorKind,
    /// The offending key (`(root)` when the mapping itself is wrong).
    pub key: String,
    /// The expected shape of the key's value.
    pub expected: String,
    /// Human-readable error message.
    pub message: String,
}

impl SchemaValidationError {
    /// Create a new schema validation error.
    pub fn new(
        kind: SchemaErrorKind,
        key: impl Into<String>,
        expected: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            key: key.into(),
            expected: expected.into(),
            message: message.into(),
        }
    }

    /// The configuration is not a mapping.
    pub fn not_a_mapping(type_name: &str) -> Self {
        Self::new(
            SchemaErrorKind::NotAMapping,
            "(root)",
            "object",
            format!("configuration for '{}' must be a mapping", type_name),
        )
    }

    /// A required key is absent.
    pub fn missing_required(type_name: &str, key: &str, expected: &str) -> Self {
        Self::new(
            SchemaErrorKind::MissingRequired,
            key,
            expected,
            format!(
                "'{}' requires option '{}' (expected {})",
                type_name, key, expected
            ),
        )
    }

    /// A key is not part of the declared option set.
    pub fn unknown_key(type_name: &str, key: &str, allowed: &[&str]) -> Self {
        Self::new(
            SchemaErrorKind::UnknownKey,
            key,
            format!("one of [{}]", allowed.join(", ")),
            format!(
                "'{}' does not accept option '{}' (allowed: {})",
                type_name,
                key,
                allowed.join(", ")
            ),
        )
    }

    /// A present key's value does not match its declared shape.
    pub fn invalid_value(type_name: &str, key: &str, expected: &str, detail: &str) -> Self {
        Self::new(
            SchemaErrorKind::InvalidValue,
            key,
            expected,
            format!(
                "invalid value for option '{}' of '{}': {} (expected {})",
                key, type_name, detail, expected
            ),
        )
    }

    /// The declared schema itself is broken.
    pub fn invalid_schema(type_name: &str, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self::new(
            SchemaErrorKind::InvalidSchema,
            "(schema)",
            "a valid schema",
            format!("schema for '{}' is invalid: {}", type_name, detail),
        )
    }
}

/// Categories of schema validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaErrorKind {
    /// Configuration is not a mapping.
    NotAMapping,
    /// A required key is missing.
    MissingRequired,
    /// A key is not declared and extras are not allowed.
    UnknownKey,
    /// A value does not match its declared type or enum.
    InvalidValue,
    /// The schema could not be compiled.
    InvalidSchema,
}
