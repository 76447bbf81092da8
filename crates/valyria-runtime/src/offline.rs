//! Rule-based answers used when the online brain is unreachable.
//!
//! Safety comes first: anything that looks like an emergency, or any
//! message while in EMERGENCY mode, gets a protocol. Matching is by plain
//! substring so that "helping" still counts as a call for help.

use valyria_core::Mode;
use valyria_store::Playbooks;

const EMERGENCY_KEYWORDS: &[&str] = &[
    "fire",
    "smoke",
    "bleeding",
    "chest pain",
    "unconscious",
    "emergency",
    "urgent",
    "help",
    "danger",
];

const CODING_KEYWORDS: &[&str] = &[
    "code",
    "coding",
    "python",
    "javascript",
    "program",
    "loop",
    "function",
    "variable",
];

const GREETINGS: &[&str] = &["hello", "hi", "hey"];

const FIRE_PROTOCOL: &str = "EMERGENCY PROTOCOL:
1. GET OUT of the building NOW
2. Call 911/emergency services immediately
3. Do NOT go back inside
4. Meet at designated safe spot
5. Alert neighbors if safe to do so

If small contained fire and you have extinguisher: PASS method (Pull, Aim, Squeeze, Sweep)
If grease fire: Cover with lid, turn off heat, NEVER use water";

const BLEEDING_PROTOCOL: &str = "EMERGENCY - BLEEDING PROTOCOL:
1. Call 911 if severe bleeding
2. Apply DIRECT PRESSURE with clean cloth
3. Keep pressure for 10+ minutes without checking
4. Elevate wound above heart if possible
5. Do NOT remove cloth if soaked - add more on top

Severe = spurting blood, won't stop after 10 min pressure, or large wound";

const GENERIC_PROTOCOL: &str = "EMERGENCY PROTOCOL:
1. If life-threatening: Call 911/emergency services NOW
2. Stay calm, speak clearly
3. Follow dispatcher instructions
4. Do not hang up until told to

I'm operating in offline mode with limited capability. Emergency services can provide immediate expert help.";

const CAT_LOOP: &str = "A for loop repeats code for each item. Here's a cat example:

cats = [\"Whiskers\", \"Mittens\", \"Shadow\"]
for cat in cats:
    print(f\"{cat} says meow!\")

This prints each cat's name with \"says meow!\"

The loop goes through the list one cat at a time.";

const LOOP: &str = "A for loop repeats code for each item in a sequence.

Basic structure:
for item in sequence:
    # do something with item

Example:
for number in range(5):
    print(number)

This prints 0, 1, 2, 3, 4";

const GREETING: &str = "Hello! I'm Valyria, operating in offline mode. I have limited capabilities right now but I'm here to help with safety and basic guidance. What do you need?";

const IDENTITY: &str = "I'm Valyria, your AI guardian from the Senseless project. I'm currently in offline mode, so my responses are simpler than usual. I can still help with emergencies, basic coding questions, and safety guidance. When I'm back online, I'll have my full intelligence available.";

const DEFAULT_REPLY: &str = "I'm operating in offline mode with limited intelligence. I can help with:

- Emergency situations (fire, medical, safety)
- Basic coding questions
- Simple guidance following my playbook rules

For complex questions, I'll need to reconnect to my online brain. Is there something specific I can help with right now?";

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

/// Answer without the online model. Deterministic for a given input.
pub fn offline_reply(message: &str, mode: Mode, playbooks: &Playbooks) -> String {
    let lower = message.to_lowercase();

    if mode.is_emergency() || contains_any(&lower, EMERGENCY_KEYWORDS) {
        let protocol = if lower.contains("fire") || lower.contains("smoke") {
            FIRE_PROTOCOL
        } else if lower.contains("bleeding") {
            BLEEDING_PROTOCOL
        } else {
            GENERIC_PROTOCOL
        };
        return protocol.to_string();
    }

    if contains_any(&lower, CODING_KEYWORDS) && lower.contains("loop") {
        let cat_rule = playbooks.rules.iter().any(|r| {
            r.topic.to_lowercase().contains("cat") || r.rule.to_lowercase().contains("cat")
        });
        return if cat_rule { CAT_LOOP } else { LOOP }.to_string();
    }

    // Greetings match whole words; "this" is not "hi"
    let greeted = lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| GREETINGS.contains(&word));
    if greeted {
        return GREETING.to_string();
    }

    if lower.contains("who are you") || lower.contains("what are you") {
        return IDENTITY.to_string();
    }

    DEFAULT_REPLY.to_string()
}
