use serde::Deserialize;

/// Command sent by a chat client over `/ws/chat`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatCommand {
    Send {
        conversation_id: String,
        #[serde(default)]
        content: String,
        #[serde(default)]
        reply_to_id: Option<String>,
    },
    Typing {
        conversation_id: String,
    },
    Read {
        conversation_id: String,
    },
    Ping,
}

/// Result of reading one text frame from a chat client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInbound {
    Command(ChatCommand),
    /// Unknown type, missing fields, or not JSON at all.
    Ignored,
}

impl ChatInbound {
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        // Bare keepalive from clients that do not speak JSON.
        if text == "ping" {
            return Self::Command(ChatCommand::Ping);
        }
        match serde_json::from_str::<ChatCommand>(text) {
            Ok(command) => Self::Command(command),
            Err(_) => Self::Ignored,
        }
    }
}
