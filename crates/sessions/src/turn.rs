//! Typed turn structures for the conversation history.
//!
//! Only LLM-relevant fields exist here — role and content parts — so
//! nothing else can leak into backend API requests.

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

/// A single content part of a turn: plain text or an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    File { uri: String, mime_type: String },
}

/// One role-tagged unit of conversation content, possibly multi-part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    /// A user turn with plain text content.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text(text.into())],
        }
    }

    /// A user turn carrying an uploaded file reference.
    pub fn user_file(uri: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::File {
                uri: uri.into(),
                mime_type: mime_type.into(),
            }],
        }
    }

    /// A model turn with plain text content.
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            if let Part::Text(t) = part {
                out.push_str(t);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_turn_has_user_role_and_text_part() {
        let turn = Turn::user("hello");
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.parts, vec![Part::Text("hello".into())]);
    }

    #[test]
    fn file_turn_keeps_uri_and_mime() {
        let turn = Turn::user_file("files/abc", "image/jpeg");
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.parts, vec![Part::File {
            uri: "files/abc".into(),
            mime_type: "image/jpeg".into(),
        }]);
    }

    #[test]
    fn text_skips_file_parts() {
        let turn = Turn {
            role: Role::User,
            parts: vec![
                Part::File {
                    uri: "files/abc".into(),
                    mime_type: "image/png".into(),
                },
                Part::Text("caption".into()),
            ],
        };
        assert_eq!(turn.text(), "caption");
    }
}
