/// Heading that only appears in risk prompts.
pub const RISK_PROMPT_MARKER: &str = "POLICY RISKS";

const RULE_INSTRUCTIONS: &str = r#"You are a compliance analyst extracting POLICY RULES from a policy document.
Extract ONLY obligations, prohibitions and requirements explicitly stated in the document.
Do not invent rules. If the document states none, return an empty array: []

Return ONLY a JSON array. Each element:
{
  "name": "short unique rule name",
  "description": "what the rule requires",
  "category": "e.g. security, privacy, finance, hr",
  "priority": "low | medium | high",
  "tags": ["keyword", "keyword"]
}"#;

const RISK_INSTRUCTIONS: &str = r#"You are a compliance analyst identifying POLICY RISKS in a policy document.
List risks the organisation faces if the document's rules are not followed, or gaps the document leaves open.
If there are none, return an empty array: []

Return ONLY a JSON array. Each element:
{
  "title": "short unique risk title",
  "description": "what could go wrong",
  "category": "e.g. security, privacy, operational, legal",
  "probability": "low | medium | high",
  "impact": "low | medium | high",
  "linked_rules": ["name of a known rule this risk relates to"],
  "mitigations": [
    {"description": "action", "responsible_party": "team or null", "due_date": "YYYY-MM-DD or null"}
  ]
}"#;

/// Prompt asking for rule candidates.
pub fn build_rule_prompt(document_text: &str, max_chars: usize) -> String {
    format!(
        "{RULE_INSTRUCTIONS}\n\n<document>\n{}\n</document>\n",
        truncate_for_prompt(document_text, max_chars)
    )
}

/// Prompt asking for risk candidates. `known_rules` are listed as
/// enumerated facts so the model can link risks to them by name.
pub fn build_risk_prompt(document_text: &str, known_rules: &[String], max_chars: usize) -> String {
    let facts = if known_rules.is_empty() {
        String::new()
    } else {
        let listed = known_rules
            .iter()
            .enumerate()
            .map(|(i, name)| format!("{}. {name}", i + 1))
            .collect::<Vec<_>>()
            .join("\n");
        format!("\nKnown rules for this document:\n{listed}\n")
    };

    format!(
        "{RISK_INSTRUCTIONS}\n{facts}\n<document>\n{}\n</document>\n",
        truncate_for_prompt(document_text, max_chars)
    )
}

/// Cut `text` to at most `max_chars` characters, on a line break when one
/// is close to the limit.
pub fn truncate_for_prompt(text: &str, max_chars: usize) -> &str {
    let end = match text.char_indices().nth(max_chars) {
        Some((idx, _)) => idx,
        None => return text,
    };
    let head = &text[..end];
    match head.rfind('\n') {
        Some(nl) if nl >= end * 3 / 4 => &head[..nl],
        _ => head,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_prompt_embeds_document() {
        let prompt = build_rule_prompt("Passwords rotate every 90 days.", 1000);
        assert!(prompt.contains("<document>\nPasswords rotate every 90 days.\n</document>"));
        assert!(prompt.contains("JSON array"));
        assert!(!prompt.contains(RISK_PROMPT_MARKER));
    }

    #[test]
    fn risk_prompt_enumerates_known_rules() {
        let rules = vec!["Password Rotation".to_string(), "MFA Required".to_string()];
        let prompt = build_risk_prompt("text", &rules, 1000);
        assert!(prompt.contains(RISK_PROMPT_MARKER));
        assert!(prompt.contains("1. Password Rotation\n2. MFA Required"));
    }

    #[test]
    fn risk_prompt_without_rules_has_no_fact_list() {
        assert!(!build_risk_prompt("text", &[], 1000).contains("Known rules"));
    }

    #[test]
    fn truncation_prefers_line_break_near_limit() {
        let text = "aaaaaaaaa\nbbbbbbbbbb";
        assert_eq!(truncate_for_prompt(text, 12), "aaaaaaaaa");
        assert_eq!(truncate_for_prompt(text, 100), text);
    }

    #[test]
    fn truncation_is_char_safe() {
        assert_eq!(truncate_for_prompt("ééééé", 3), "ééé");
    }
}
