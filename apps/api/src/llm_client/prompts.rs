// Shared prompt constants and prompt-building utilities.
// Each service that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// Instruction appended to system prompts that expect JSON back.
pub const JSON_ONLY_INSTRUCTION: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Output language rule shared by every user-facing generation.
pub const JAPANESE_OUTPUT_INSTRUCTION: &str = "\
    すべての出力は自然な日本語で書いてください。\
    就職活動中の学生に向けた丁寧語（です・ます調）を使ってください。";

/// Builds a system prompt from a role description plus the JSON-only rule.
pub fn json_system(role: &str) -> String {
    format!("{role} {JSON_ONLY_INSTRUCTION}")
}

/// Renders a list of strings as a bulleted block for prompt templates.
pub fn bullet_list<S: AsRef<str>>(items: &[S]) -> String {
    if items.is_empty() {
        return "- (なし)".to_string();
    }
    items
        .iter()
        .map(|i| format!("- {}", i.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_system_appends_rule() {
        let s = json_system("You are an evaluator.");
        assert!(s.starts_with("You are an evaluator."));
        assert!(s.ends_with(JSON_ONLY_INSTRUCTION));
    }

    #[test]
    fn test_bullet_list_empty_placeholder() {
        let empty: [&str; 0] = [];
        assert_eq!(bullet_list(&empty), "- (なし)");
        assert_eq!(bullet_list(&["a", "b"]), "- a\n- b");
    }
}
