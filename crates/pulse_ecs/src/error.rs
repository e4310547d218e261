//! Error type for the boundary validations of the runtime.
//!
//! The hot paths (component add/remove, entity and system registration,
//! the frame update) are deliberately infallible no-ops on absent or
//! duplicate input. Errors are reserved for structurally invalid input
//! that would otherwise corrupt the matching index.

use thiserror::Error;

/// Errors raised at the validation boundary of the runtime.
#[derive(Debug, Error)]
pub enum EcsError {
    /// A component kind was registered with defaults that are not a JSON object.
    #[error("component defaults must be a JSON object, got {found}")]
    InvalidDefaults {
        /// The JSON type that was supplied instead.
        found: &'static str,
    },

    /// A component instance was constructed with overrides that are not a JSON object.
    #[error("component overrides must be a JSON object, got {found}")]
    InvalidOverrides {
        /// The JSON type that was supplied instead.
        found: &'static str,
    },

    /// A system was constructed with a frequency cap that is negative or not finite.
    #[error("system frequency must be finite and non-negative, got {0}")]
    InvalidFrequency(f64),

    /// A value template could not be serialised into a field mapping.
    #[error("failed to serialise component template: {0}")]
    Template(#[from] serde_json::Error),
}

/// Returns the JSON type name of a value, for error messages.
pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
