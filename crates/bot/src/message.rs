//! Messages exchanged between adapters and the bot runtime.

use std::fmt;

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

// ── Destinations ────────────────────────────────────────────────────────────

/// Where an output should be delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Room(String),
    Thread { room: String, thread: String },
    User(String),
    /// Adapter-specific target the core does not interpret.
    Raw(serde_json::Value),
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Room(room) => write!(f, "room:{room}"),
            Self::Thread { room, thread } => write!(f, "room:{room}/thread:{thread}"),
            Self::User(user) => write!(f, "user:{user}"),
            Self::Raw(value) => write!(f, "raw:{value}"),
        }
    }
}

// ── Inputs ──────────────────────────────────────────────────────────────────

/// One inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct InputMessage {
    /// Identifies the participant (and usually the room) for context lookup.
    pub sender_key: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub reply_to: Destination,
}

impl InputMessage {
    /// A message received now.
    pub fn new(
        sender_key: impl Into<String>,
        text: impl Into<String>,
        reply_to: Destination,
    ) -> Self {
        Self {
            sender_key: sender_key.into(),
            text: text.into(),
            sent_at: Utc::now(),
            reply_to,
        }
    }
}

/// Input handed to a bot by its adapter.
///
/// Adapters decide which messages mean "help" or "abort"; the bot only
/// looks at the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Message(InputMessage),
    /// Request for the list of available commands.
    Help(InputMessage),
    /// Request to leave the current conversation.
    Abort(InputMessage),
}

impl Input {
    pub fn message(&self) -> &InputMessage {
        match self {
            Self::Message(m) | Self::Help(m) | Self::Abort(m) => m,
        }
    }

    pub fn into_message(self) -> InputMessage {
        match self {
            Self::Message(m) | Self::Help(m) | Self::Abort(m) => m,
        }
    }

    pub fn sender_key(&self) -> &str {
        &self.message().sender_key
    }

    pub fn text(&self) -> &str {
        &self.message().text
    }

    pub fn sent_at(&self) -> DateTime<Utc> {
        self.message().sent_at
    }

    pub fn reply_to(&self) -> &Destination {
        &self.message().reply_to
    }

    pub fn is_help(&self) -> bool {
        matches!(self, Self::Help(_))
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Abort(_))
    }
}

// ── Outputs ─────────────────────────────────────────────────────────────────

/// Instruction shown for one command in help output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandHelp {
    pub identifier: String,
    pub instruction: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandHelps(pub Vec<CommandHelp>);

impl CommandHelps {
    pub fn iter(&self) -> impl Iterator<Item = &CommandHelp> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CommandHelps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, help) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}: {}", help.identifier, help.instruction)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputContent {
    Text(String),
    Help(CommandHelps),
    /// Adapter-specific payload (e.g. a rich attachment).
    Raw(serde_json::Value),
}

impl From<String> for OutputContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for OutputContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// One outbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub destination: Destination,
    pub content: OutputContent,
}

impl Output {
    pub fn new(destination: Destination, content: impl Into<OutputContent>) -> Self {
        Self {
            destination,
            content: content.into(),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_share_the_wrapped_message() {
        let msg = InputMessage::new("U1@C1", ".help", Destination::Room("C1".into()));
        let help = Input::Help(msg.clone());
        assert!(help.is_help());
        assert!(!help.is_abort());
        assert_eq!(help.sender_key(), "U1@C1");
        assert_eq!(help.into_message(), msg);
    }

    #[test]
    fn help_renders_one_line_per_command() {
        let helps = CommandHelps(vec![
            CommandHelp {
                identifier: "echo".into(),
                instruction: ".echo <text>".into(),
            },
            CommandHelp {
                identifier: "guess".into(),
                instruction: ".guess".into(),
            },
        ]);
        assert_eq!(helps.to_string(), "echo: .echo <text>\nguess: .guess");
    }

    #[test]
    fn destination_serializes_with_variant_tag() {
        let json = serde_json::to_value(Destination::Thread {
            room: "C1".into(),
            thread: "T9".into(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"thread": {"room": "C1", "thread": "T9"}})
        );
    }
}
