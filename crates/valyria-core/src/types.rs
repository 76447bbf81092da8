use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the person Valyria is talking to (the `x-user-id` header).
pub type UserId = String;

/// Identifier of a registered bracelet.
pub type DeviceId = String;

/// Operating mode of the guardian. One mode is active for the whole process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    #[default]
    Chat,
    Read,
    Public,
    Emergency,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "CHAT",
            Self::Read => "READ",
            Self::Public => "PUBLIC",
            Self::Emergency => "EMERGENCY",
        }
    }

    pub fn is_emergency(&self) -> bool {
        matches!(self, Self::Emergency)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability requested from the policy gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolKind {
    #[default]
    Chat,
    ReadClean,
    PublicInternet,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "CHAT",
            Self::ReadClean => "READ_CLEAN",
            Self::PublicInternet => "PUBLIC_INTERNET",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DecisionType {
    Allow,
    Block,
    Review,
}

impl DecisionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "ALLOW",
            Self::Block => "BLOCK",
            Self::Review => "REVIEW",
        }
    }
}

impl fmt::Display for DecisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A policy verdict together with its human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub decision: DecisionType,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_serialize_upper_case() {
        assert_eq!(serde_json::to_string(&Mode::Emergency).unwrap(), "\"EMERGENCY\"");
        assert_eq!(
            serde_json::to_string(&ToolKind::PublicInternet).unwrap(),
            "\"PUBLIC_INTERNET\""
        );
        assert_eq!(serde_json::to_string(&DecisionType::Review).unwrap(), "\"REVIEW\"");
    }

    #[test]
    fn display_matches_wire_names() {
        assert_eq!(Mode::Read.to_string(), "READ");
        assert_eq!(ToolKind::ReadClean.to_string(), "READ_CLEAN");
        assert_eq!(DecisionType::Allow.to_string(), "ALLOW");
    }
}
