//! Built-in document templates and `{NAME}` substitution.

/// Rendered to `PERSONA.md` in the workspace root.
pub const PERSONA_TEMPLATE: &str = "\
# {AI_NAME}

## Identity

You are {AI_NAME}, a {PERSONALITY_TYPE} AI companion.

## Communication Style

{COMMUNICATION_STYLE}

## Special Instructions

{SPECIAL_INSTRUCTIONS}
";

/// Rendered to `PROFILE.md` in the workspace root.
pub const PROFILE_TEMPLATE: &str = "\
# User Profile

- **Name:** {USER_NAME}
- **Role:** {USER_ROLE}
- **Timezone:** {USER_TIMEZONE}

## Preferences

{USER_PREFERENCES}
";

/// Written verbatim to `MEMORY.md` — no placeholders.
pub const MEMORY_TEMPLATE: &str = "\
# Long-Term Memory

Durable facts live here. Day-to-day notes go in `memory/YYYY-MM-DD.md`.
";

/// Replace every `{KEY}` token with its value. Substitution is whole-token:
/// a key only matches inside braces, and unknown tokens are left in place so
/// [`has_placeholders`] can flag them later.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in values {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

/// True when the text still contains an unfilled `{UPPER_SNAKE}` token.
pub fn has_placeholders(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            let mut j = i + 1;
            while j < bytes.len() && (bytes[j].is_ascii_uppercase() || bytes[j] == b'_') {
                j += 1;
            }
            if j > i + 1 && j < bytes.len() && bytes[j] == b'}' {
                return true;
            }
        }
        i += 1;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_replaces_whole_tokens() {
        let out = render("Hello {NAME}, NAME is not a token", &[("NAME", "Ada")]);
        assert_eq!(out, "Hello Ada, NAME is not a token");
    }

    #[test]
    fn render_leaves_unknown_tokens() {
        let out = render("{KNOWN} and {UNKNOWN}", &[("KNOWN", "x")]);
        assert_eq!(out, "x and {UNKNOWN}");
        assert!(has_placeholders(&out));
    }

    #[test]
    fn placeholder_detection() {
        assert!(has_placeholders("left over {AI_NAME} here"));
        assert!(!has_placeholders("all filled in"));
        // Lowercase or mixed braces are not templates.
        assert!(!has_placeholders("a json {\"key\": 1} blob"));
        assert!(!has_placeholders("{lowercase}"));
        assert!(!has_placeholders("empty {} braces"));
    }

    #[test]
    fn persona_template_fills_completely() {
        let out = render(
            PERSONA_TEMPLATE,
            &[
                ("AI_NAME", "Wren"),
                ("PERSONALITY_TYPE", "pragmatic"),
                ("COMMUNICATION_STYLE", "Direct and brief."),
                ("SPECIAL_INSTRUCTIONS", "None."),
            ],
        );
        assert!(!has_placeholders(&out));
        assert!(out.contains("# Wren"));
    }

    #[test]
    fn memory_template_has_no_placeholders() {
        assert!(!has_placeholders(MEMORY_TEMPLATE));
    }
}
