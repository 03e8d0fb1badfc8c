use std::{borrow::Borrow, fmt};

use serde::{Deserialize, Serialize};

/// Identifies one chat-service integration (e.g. "slack", "gitter").
///
/// Used as a map key throughout the runtime; each registered bot must have a
/// distinct value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BotType(String);

impl BotType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory name used for this bot's plugin configuration files.
    pub fn config_dir_name(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for BotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BotType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for BotType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for BotType {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for BotType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_dir_name_is_lowercased() {
        assert_eq!(BotType::new("Slack").config_dir_name(), "slack");
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&BotType::from("gitter")).unwrap_or_default();
        assert_eq!(json, "\"gitter\"");
    }
}
