use serde::{Deserialize, Serialize};

/// Who a turn is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// Text typed by the person at the keyboard
    User,
    /// Reply produced by the remote agent
    Agent,
}

impl Sender {
    pub fn display_name(&self) -> &'static str {
        match self {
            Sender::User => "You",
            Sender::Agent => "Agent",
        }
    }
}

/// One message in the conversation.
///
/// For agent turns kept in a [`Transcript`], `text` is always finalized
/// markup, never the raw streamed text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub sender: Sender,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
        }
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Agent,
            text: text.into(),
        }
    }
}

/// Ordered history of completed turns for the current session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Every turn except the most recent one
    pub fn without_last(&self) -> &[Turn] {
        match self.turns.split_last() {
            Some((_, rest)) => rest,
            None => &[],
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

impl From<Vec<Turn>> for Transcript {
    fn from(turns: Vec<Turn>) -> Self {
        Self { turns }
    }
}

/// Body of the outbound `POST /chat` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_message: String,
    pub history: Vec<Turn>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_serialize_with_lowercase_sender() {
        let transcript = Transcript::from(vec![Turn::user("hola"), Turn::agent("<p>hi</p>\n")]);
        let json = transcript.to_json().unwrap();
        assert_eq!(
            json,
            r#"[{"sender":"user","text":"hola"},{"sender":"agent","text":"<p>hi</p>\n"}]"#
        );
    }

    #[test]
    fn unknown_sender_is_rejected() {
        assert!(Transcript::from_json(r#"[{"sender":"system","text":"x"}]"#).is_err());
    }

    #[test]
    fn without_last_drops_only_the_newest_turn() {
        let mut transcript = Transcript::new();
        assert!(transcript.without_last().is_empty());

        transcript.push(Turn::user("one"));
        transcript.push(Turn::agent("two"));
        transcript.push(Turn::user("three"));
        assert_eq!(
            transcript.without_last(),
            &[Turn::user("one"), Turn::agent("two")]
        );
    }

    #[test]
    fn request_body_uses_snake_case_fields() {
        let request = ChatRequest {
            user_message: "hi".to_string(),
            history: vec![Turn::user("before")],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["user_message"], "hi");
        assert_eq!(value["history"][0]["sender"], "user");
    }
}
