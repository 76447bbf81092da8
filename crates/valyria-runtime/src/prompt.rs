use valyria_core::Mode;
use valyria_store::{ConversationTurn, PlaybookRule, Playbooks};

/// Shorthand that marks a user as texting rather than writing prose.
const TEXT_SPEAK: &[&str] = &[
    "wuu2", "tbh", "tbf", "fyi", "btw", "ur", "u", "2", "4", "bc", "thx", "ty", "np", "omg",
    "lol", "ngl", "imo", "rn",
];

/// Rendered playbook rules are capped so the prompt stays short.
const MAX_PROMPT_RULES: usize = 3;

const EMERGENCY_PERSONALITY: &str = "EMERGENCY MODE:
- Direct and fast
- Clear numbered steps
- If life at risk: call 911 FIRST
- Focus on immediate safety";

const TOOL_SECTION: &str = "TOOL ACCESS:
You have tools to read/write your own code:
- read_file: See your code files
- write_file: Modify/improve code
- list_files: See what files exist
- run_command: Execute safe commands

TOOL RULES:
1. Ask permission before major changes
2. Explain before using write_file
3. Read files before modifying
4. ONLY modify valyria_core/* files
5. Respect boundaries";

/// Whether the user writes in text speak, judged from their last three
/// turns plus the new message.
pub fn detect_text_speak(history: &[ConversationTurn], message: &str) -> bool {
    let start = history.len().saturating_sub(3);
    let mut text = history[start..]
        .iter()
        .map(|turn| turn.user.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    text.push(' ');
    text.push_str(message);
    text.to_lowercase()
        .split_whitespace()
        .any(|token| TEXT_SPEAK.contains(&token))
}

/// Enabled rules relevant to a message, highest priority first. A rule is
/// relevant when its topic appears in the message or its topic is `general`.
pub fn active_rules<'a>(playbooks: &'a Playbooks, message: &str) -> Vec<&'a PlaybookRule> {
    let message = message.to_lowercase();
    let mut rules: Vec<&PlaybookRule> = playbooks
        .rules
        .iter()
        .filter(|r| r.enabled)
        .filter(|r| {
            let topic = r.topic.to_lowercase();
            topic == "general" || message.contains(&topic)
        })
        .collect();
    // stable, so equal priorities keep insertion order
    rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    rules
}

fn render_rules(rules: &[&PlaybookRule]) -> String {
    if rules.is_empty() {
        return String::new();
    }
    let mut out = String::from("ACTIVE PLAYBOOK RULES:\n");
    for rule in rules.iter().take(MAX_PROMPT_RULES) {
        out.push_str(&format!("- [{}] {}\n", rule.topic, rule.rule));
    }
    out
}

/// Build the system prompt for one chat turn.
///
/// EMERGENCY mode gets a terse crisis personality with no playbooks or
/// tools; every other mode gets the guardian personality.
pub fn system_prompt(
    mode: Mode,
    playbooks: &Playbooks,
    message: &str,
    text_speak: bool,
    tools_enabled: bool,
) -> String {
    let personality = if mode.is_emergency() {
        EMERGENCY_PERSONALITY.to_string()
    } else {
        let style = if text_speak {
            "COMMUNICATION STYLE: Mirror user's text speak naturally."
        } else {
            "COMMUNICATION STYLE: Write out full words."
        };
        let mut sections = vec![
            "You are Valyria, a protective AI guardian.".to_string(),
            "CORE IDENTITY:\n- Protector, not controller\n- Respect user autonomy\n- When uncertain: hand control back explicitly".to_string(),
        ];
        if tools_enabled {
            sections.push(TOOL_SECTION.to_string());
        }
        let rules = render_rules(&active_rules(playbooks, message));
        if !rules.is_empty() {
            sections.push(rules.trim_end().to_string());
        }
        sections.push(format!("You're a partner. Protect, don't restrict.\n\n{style}"));
        sections.join("\n\n")
    };
    format!("You are Valyria.\n\n{personality}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rule(id: i64, topic: &str, text: &str, priority: i64, enabled: bool) -> PlaybookRule {
        PlaybookRule {
            id,
            topic: topic.into(),
            rule: text.into(),
            priority,
            enabled,
            created_at: Utc::now(),
        }
    }

    fn turn(user: &str) -> ConversationTurn {
        ConversationTurn {
            user: user.into(),
            assistant: "ok".into(),
            timestamp: Utc::now(),
            mode: "CHAT".into(),
        }
    }

    #[test]
    fn text_speak_uses_whole_tokens() {
        assert!(detect_text_speak(&[], "thx for that"));
        assert!(detect_text_speak(&[], "see U later"));
        assert!(!detect_text_speak(&[], "your turn, thanks"));
    }

    #[test]
    fn text_speak_only_looks_at_last_three_turns() {
        let history = vec![turn("lol"), turn("hello"), turn("fine"), turn("good")];
        assert!(!detect_text_speak(&history, "great"));
        let history = vec![turn("hello"), turn("ngl that was hard"), turn("fine")];
        assert!(detect_text_speak(&history, "great"));
    }

    #[test]
    fn active_rules_filter_and_order() {
        let playbooks = Playbooks {
            rules: vec![
                rule(1, "Coding", "use cat examples", 40, true),
                rule(2, "general", "be kind", 10, true),
                rule(3, "coding", "short answers", 90, true),
                rule(4, "coding", "disabled", 100, false),
                rule(5, "cooking", "metric units", 80, true),
            ],
        };
        let ids: Vec<i64> = active_rules(&playbooks, "help me with CODING")
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn prompt_renders_at_most_three_rules() {
        let playbooks = Playbooks {
            rules: (1..=5).map(|i| rule(i, "general", &format!("rule {i}"), i, true)).collect(),
        };
        let prompt = system_prompt(Mode::Chat, &playbooks, "hi", false, true);
        assert!(prompt.contains("ACTIVE PLAYBOOK RULES:"));
        assert!(prompt.contains("- [general] rule 5"));
        assert!(prompt.contains("- [general] rule 3"));
        assert!(!prompt.contains("rule 2"));
        assert!(prompt.contains("TOOL RULES:"));
        assert!(prompt.ends_with("COMMUNICATION STYLE: Write out full words."));
    }

    #[test]
    fn emergency_prompt_is_terse() {
        let playbooks = Playbooks {
            rules: vec![rule(1, "general", "be kind", 50, true)],
        };
        let prompt = system_prompt(Mode::Emergency, &playbooks, "help", true, true);
        assert!(prompt.starts_with("You are Valyria.\n\nEMERGENCY MODE:"));
        assert!(!prompt.contains("PLAYBOOK"));
        assert!(!prompt.contains("TOOL"));
    }

    #[test]
    fn tool_section_follows_config() {
        let prompt = system_prompt(Mode::Read, &Playbooks::default(), "hi", true, false);
        assert!(!prompt.contains("TOOL ACCESS"));
        assert!(prompt.ends_with("Mirror user's text speak naturally."));
    }
}
