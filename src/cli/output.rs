//! Output formatting for CLI commands.

use crate::error::Error;

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses the `--format` flag, defaulting to text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Renders a JSON value per the selected format.
///
/// Text mode still prints JSON (the surfaces are JSON-shaped), but
/// compactly for single-line values and pretty otherwise.
#[must_use]
pub fn format_value(value: &serde_json::Value, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        OutputFormat::Text => match value {
            serde_json::Value::String(s) => s.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        },
    }
}

/// Renders an error per the selected format.
#[must_use]
pub fn format_error(error: &Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::json!({
            "success": false,
            "status": "error",
            "kind": error.kind(),
            "error": error.to_string(),
        })
        .to_string(),
        OutputFormat::Text => error.to_string(),
    }
}
