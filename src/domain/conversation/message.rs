//! Messaging boundary types.
//!
//! The engine never talks to a gateway. It receives an [`InboundMessage`]
//! and returns an [`OutboundPayload`]; the HTTP adapter translates both.
//!
//! Interactive elements follow the limits of the common chat gateways:
//! at most three buttons with titles of 20 characters, or a list of up to
//! ten rows with 24-character titles. The constructors here enforce those
//! limits by truncation so no workflow can produce an undeliverable payload.

use serde::{Deserialize, Serialize};

use super::text::{normalize, truncate_chars};
use crate::domain::foundation::UserId;

/// Maximum number of reply buttons.
pub const MAX_BUTTONS: usize = 3;
/// Maximum characters in a button title.
pub const MAX_BUTTON_TITLE: usize = 20;
/// Maximum rows in a list.
pub const MAX_LIST_ROWS: usize = 10;
/// Maximum characters in the list title.
pub const MAX_LIST_TITLE: usize = 24;
/// Maximum characters in a list row title.
pub const MAX_ROW_TITLE: usize = 24;
/// Maximum characters in a list row description.
pub const MAX_ROW_DESCRIPTION: usize = 72;

/// What the gateway delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    /// Voice note; `content` carries the boundary's transcript.
    Audio,
    /// Picture; `content` carries the media reference or caption.
    Image,
    /// Button or list selection; `content` carries the selected id.
    InteractiveSelection,
}

/// A message as received from the messaging boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub user_id: UserId,
    pub kind: MessageKind,
    pub content: String,
}

impl InboundMessage {
    pub fn text(user_id: UserId, content: impl Into<String>) -> Self {
        Self {
            user_id,
            kind: MessageKind::Text,
            content: content.into(),
        }
    }

    pub fn selection(user_id: UserId, id: impl Into<String>) -> Self {
        Self {
            user_id,
            kind: MessageKind::InteractiveSelection,
            content: id.into(),
        }
    }

    pub fn image(user_id: UserId, media_ref: impl Into<String>) -> Self {
        Self {
            user_id,
            kind: MessageKind::Image,
            content: media_ref.into(),
        }
    }

    pub fn audio(user_id: UserId, transcript: impl Into<String>) -> Self {
        Self {
            user_id,
            kind: MessageKind::Audio,
            content: transcript.into(),
        }
    }
}

/// Inbound content prepared for the routing rules and the machines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInput {
    pub kind: MessageKind,
    /// Content exactly as received.
    pub raw: String,
    /// Output of [`normalize`] over `raw`.
    pub normalized: String,
}

impl UserInput {
    pub fn new(kind: MessageKind, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = normalize(&raw);
        Self {
            kind,
            raw,
            normalized,
        }
    }

    pub fn text(raw: impl Into<String>) -> Self {
        Self::new(MessageKind::Text, raw)
    }

    pub fn selection(id: impl Into<String>) -> Self {
        Self::new(MessageKind::InteractiveSelection, id)
    }

    pub fn is_selection(&self) -> bool {
        self.kind == MessageKind::InteractiveSelection
    }

    pub fn is_image(&self) -> bool {
        self.kind == MessageKind::Image
    }
}

impl From<&InboundMessage> for UserInput {
    fn from(message: &InboundMessage) -> Self {
        Self::new(message.kind, message.content.trim())
    }
}

/// A reply button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub id: String,
    pub title: String,
}

/// A row in an interactive list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRow {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ListRow {
    pub fn new(id: impl Into<String>, title: &str) -> Self {
        Self {
            id: id.into(),
            title: truncate_chars(title, MAX_ROW_TITLE),
            description: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(truncate_chars(description, MAX_ROW_DESCRIPTION));
        self
    }
}

/// Optional interactive element attached to a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Interactive {
    Buttons { buttons: Vec<Button> },
    List { title: String, rows: Vec<ListRow> },
}

impl Interactive {
    /// Button set, truncated to the gateway limits.
    pub fn buttons<I, S, T>(items: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: AsRef<str>,
    {
        let buttons = items
            .into_iter()
            .take(MAX_BUTTONS)
            .map(|(id, title)| Button {
                id: id.into(),
                title: truncate_chars(title.as_ref(), MAX_BUTTON_TITLE),
            })
            .collect();
        Interactive::Buttons { buttons }
    }

    /// List, truncated to the gateway limits.
    pub fn list(title: &str, rows: Vec<ListRow>) -> Self {
        Interactive::List {
            title: truncate_chars(title, MAX_LIST_TITLE),
            rows: rows.into_iter().take(MAX_LIST_ROWS).collect(),
        }
    }

    /// Ids the user can select from this element.
    pub fn option_ids(&self) -> Vec<&str> {
        match self {
            Interactive::Buttons { buttons } => buttons.iter().map(|b| b.id.as_str()).collect(),
            Interactive::List { rows, .. } => rows.iter().map(|r| r.id.as_str()).collect(),
        }
    }
}

/// What a workflow wants to say, before it is addressed to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Reply {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interactive: Option<Interactive>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            interactive: None,
        }
    }

    pub fn with_buttons<I, S, T>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: AsRef<str>,
    {
        self.interactive = Some(Interactive::buttons(items));
        self
    }

    pub fn with_list(mut self, title: &str, rows: Vec<ListRow>) -> Self {
        self.interactive = Some(Interactive::list(title, rows));
        self
    }

    /// Prepends a paragraph, keeping the interactive element.
    pub fn prefixed(mut self, prefix: &str) -> Self {
        if !prefix.is_empty() {
            self.text = format!("{}\n\n{}", prefix, self.text);
        }
        self
    }

    /// Appends another reply's text; its interactive element wins if present.
    pub fn followed_by(mut self, next: Reply) -> Self {
        if self.text.is_empty() {
            self.text = next.text;
        } else if !next.text.is_empty() {
            self.text = format!("{}\n\n{}", self.text, next.text);
        }
        if next.interactive.is_some() {
            self.interactive = next.interactive;
        }
        self
    }
}

/// A reply addressed to a user, as handed back to the messaging boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundPayload {
    pub user_id: UserId,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interactive: Option<Interactive>,
}

impl OutboundPayload {
    pub fn new(user_id: UserId, reply: Reply) -> Self {
        Self {
            user_id,
            text: reply.text,
            interactive: reply.interactive,
        }
    }

    /// Rows of the attached list, empty when there is none.
    pub fn list_rows(&self) -> &[ListRow] {
        match &self.interactive {
            Some(Interactive::List { rows, .. }) => rows,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buttons_are_capped_and_truncated() {
        let interactive = Interactive::buttons(vec![
            ("a", "Confirmar la hora elegida"),
            ("b", "Cambiar"),
            ("c", "Salir"),
            ("d", "Otra cosa"),
        ]);
        match interactive {
            Interactive::Buttons { buttons } => {
                assert_eq!(buttons.len(), MAX_BUTTONS);
                assert!(buttons.iter().all(|b| b.title.chars().count() <= MAX_BUTTON_TITLE));
                assert_eq!(buttons[0].title, "Confirmar la hora el");
            }
            other => panic!("expected buttons, got {:?}", other),
        }
    }

    #[test]
    fn list_is_capped_and_truncated() {
        let rows = (0..15)
            .map(|i| ListRow::new(format!("row-{}", i), "Evaluación del Desarrollo Infantil"))
            .collect();
        match Interactive::list("Servicios disponibles en la clínica", rows) {
            Interactive::List { title, rows } => {
                assert_eq!(rows.len(), MAX_LIST_ROWS);
                assert!(title.chars().count() <= MAX_LIST_TITLE);
                assert!(rows.iter().all(|r| r.title.chars().count() <= MAX_ROW_TITLE));
            }
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn user_input_normalizes_content() {
        let user = UserId::new("56911112222").unwrap();
        let message = InboundMessage::text(user, "  Quiero AGENDAR mañana ");
        let input = UserInput::from(&message);
        assert_eq!(input.raw, "Quiero AGENDAR mañana");
        assert_eq!(input.normalized, "quiero agendar manana");
    }

    #[test]
    fn followed_by_joins_text_and_keeps_latest_interactive() {
        let first = Reply::text("Tu cobertura está confirmada.");
        let second = Reply::text("Estas son las horas:").with_buttons(vec![("x", "Lun 09:00")]);
        let joined = first.followed_by(second);
        assert_eq!(joined.text, "Tu cobertura está confirmada.\n\nEstas son las horas:");
        assert!(joined.interactive.is_some());
    }

    #[test]
    fn outbound_payload_serializes_without_empty_interactive() {
        let user = UserId::new("u1").unwrap();
        let payload = OutboundPayload::new(user, Reply::text("Hola"));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["text"], "Hola");
        assert!(json.get("interactive").is_none());
    }
}
