//! Conversion from the typed turn history to Gemini's request format.
//!
//! Gemini uses `role: "user" | "model"` and a `parts` array where each
//! part is `{ "text": ... }` or `{ "fileData": { "mimeType", "fileUri" } }`.

use gemrelay_sessions::{Part, Role, Turn};

pub(crate) fn to_contents(turns: &[Turn]) -> Vec<serde_json::Value> {
    turns.iter().map(to_content).collect()
}

fn to_content(turn: &Turn) -> serde_json::Value {
    let role = match turn.role {
        Role::User => "user",
        Role::Model => "model",
    };
    let parts: Vec<serde_json::Value> = turn
        .parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => serde_json::json!({ "text": text }),
            Part::File { uri, mime_type } => serde_json::json!({
                "fileData": {
                    "mimeType": mime_type,
                    "fileUri": uri,
                }
            }),
        })
        .collect();
    serde_json::json!({ "role": role, "parts": parts })
}
