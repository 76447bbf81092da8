#[cfg(test)]
mod tests {
    use valyria_core::{DecisionType, Mode, ToolKind};
    use valyria_policy::*;

    // ── Parsing ────────────────────────────────────────────────

    #[test]
    fn test_parse_mode_aliases() {
        for raw in ["READ", "read_clean", "Clean_Read"] {
            assert_eq!(parse_mode(Some(raw)), Mode::Read, "{raw}");
        }
        for raw in ["PUBLIC", "public_internet", "Internet", "web"] {
            assert_eq!(parse_mode(Some(raw)), Mode::Public, "{raw}");
        }
        for raw in ["EMERGENCY", "urgent", "Critical"] {
            assert_eq!(parse_mode(Some(raw)), Mode::Emergency, "{raw}");
        }
    }

    #[test]
    fn test_parse_mode_falls_back_to_chat() {
        assert_eq!(parse_mode(None), Mode::Chat);
        assert_eq!(parse_mode(Some("")), Mode::Chat);
        assert_eq!(parse_mode(Some("   ")), Mode::Chat);
        assert_eq!(parse_mode(Some("party")), Mode::Chat);
    }

    #[test]
    fn test_parse_tool_aliases() {
        assert_eq!(parse_tool(Some("read")), ToolKind::ReadClean);
        assert_eq!(parse_tool(Some("READ_CLEAN")), ToolKind::ReadClean);
        assert_eq!(parse_tool(Some("internet")), ToolKind::PublicInternet);
        assert_eq!(parse_tool(Some("chat")), ToolKind::Chat);
        // modes that are not capabilities
        assert_eq!(parse_tool(Some("emergency")), ToolKind::Chat);
        assert_eq!(parse_tool(None), ToolKind::Chat);
    }

    // ── Decisions ──────────────────────────────────────────────

    #[test]
    fn test_internet_outside_public_needs_review() {
        for mode in [Mode::Chat, Mode::Read, Mode::Emergency] {
            let d = decide(mode, ToolKind::PublicInternet, "search the web", false);
            assert_eq!(d.decision, DecisionType::Review);
            assert_eq!(d.reason, "Internet tool requested outside PUBLIC mode.");
        }
    }

    #[test]
    fn test_internet_in_public_allowed() {
        let d = decide(Mode::Public, ToolKind::PublicInternet, "look up weather", true);
        assert_eq!(d.decision, DecisionType::Allow);
        assert_eq!(d.reason, "Allowed by baseline policy.");
    }

    #[test]
    fn test_chat_and_read_always_allowed() {
        for mode in [Mode::Chat, Mode::Read, Mode::Public, Mode::Emergency] {
            for tool in [ToolKind::Chat, ToolKind::ReadClean] {
                assert_eq!(decide(mode, tool, "", false).decision, DecisionType::Allow);
            }
        }
    }

    // ── Mode state ─────────────────────────────────────────────

    #[test]
    fn test_mode_state_shared_between_clones() {
        let state = ModeState::default();
        let other = state.clone();
        assert_eq!(state.get(), Mode::Chat);
        assert_eq!(other.set(Mode::Read), Mode::Chat);
        assert_eq!(state.get(), Mode::Read);
    }

    #[test]
    fn test_escalate_reports_change_once() {
        let state = ModeState::new(Mode::Public);
        assert!(state.escalate("fall detected"));
        assert!(!state.escalate("fall detected again"));
        assert_eq!(state.get(), Mode::Emergency);
    }
}
