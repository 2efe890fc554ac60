//! JSON rendering of verb results for MCP tool responses
//!
//! Successful results are serialized as-is. Failures are rendered as
//!
//! ```json
//! {"error": "FileTooLarge", "message": "File exceeds 1MB limit"}
//! ```
//!
//! so a client can branch on `error` without parsing the message.

use serde::Serialize;

use crate::repolens::Result;

/// Converts a verb result into the `Result<String, String>` shape tools return
pub fn render<T: Serialize>(result: Result<T>) -> std::result::Result<String, String> {
    match result {
        Ok(value) => to_json(&value).map_err(|e| {
            tracing::error!("Failed to serialize tool response: {}", e);
            e
        }),
        Err(err) => {
            tracing::warn!("Tool call failed: {}", err);
            Err(to_json(&err.to_response())?)
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> std::result::Result<String, String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to serialize response: {}", e))
}
