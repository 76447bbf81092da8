use tracing::debug;
use valyria_core::{Decision, DecisionType, Mode, ToolKind};

/// Plain-text description of the baseline policy, served at `/policy`.
pub const POLICY_TEXT: &str = "Valyria policy (baseline):\n\
- CHAT allowed in CHAT mode\n\
- PUBLIC_INTERNET requires PUBLIC mode\n\
- otherwise REVIEW\n";

fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_ascii_uppercase())
        .filter(|v| !v.is_empty())
}

/// Parse a user-supplied mode name. Unknown or empty input means `Chat`.
pub fn parse_mode(value: Option<&str>) -> Mode {
    match normalize(value).as_deref() {
        Some("READ" | "READ_CLEAN" | "CLEAN_READ") => Mode::Read,
        Some("PUBLIC" | "PUBLIC_INTERNET" | "INTERNET" | "WEB") => Mode::Public,
        Some("EMERGENCY" | "URGENT" | "CRITICAL") => Mode::Emergency,
        _ => Mode::Chat,
    }
}

/// Parse a requested capability. Unknown or empty input means `Chat`.
pub fn parse_tool(value: Option<&str>) -> ToolKind {
    match normalize(value).as_deref() {
        Some("READ" | "READ_CLEAN" | "CLEAN_READ") => ToolKind::ReadClean,
        Some("PUBLIC" | "PUBLIC_INTERNET" | "INTERNET" | "WEB") => ToolKind::PublicInternet,
        _ => ToolKind::Chat,
    }
}

/// Evaluate a request under the given mode.
///
/// Internet access outside PUBLIC mode goes to review; everything else is
/// allowed. The gate never blocks on its own, but callers must still honor
/// a `Block` verdict.
pub fn decide(mode: Mode, tool: ToolKind, intent: &str, uncertain: bool) -> Decision {
    let decision = if tool == ToolKind::PublicInternet && mode != Mode::Public {
        Decision {
            decision: DecisionType::Review,
            reason: "Internet tool requested outside PUBLIC mode.".into(),
        }
    } else {
        Decision {
            decision: DecisionType::Allow,
            reason: "Allowed by baseline policy.".into(),
        }
    };
    debug!(
        %mode,
        %tool,
        uncertain,
        intent_len = intent.len(),
        decision = %decision.decision,
        "policy decision"
    );
    decision
}
