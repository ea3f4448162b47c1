//! Message template rendering.
//!
//! Templates use `{key}` placeholders. Unknown keys render as an empty
//! string; text outside placeholders is copied verbatim.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("placeholder pattern is valid")
});

/// Values available to a notification template.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub username: &'a str,
    pub device_id: &'a str,
    pub device_name: &'a str,
    pub job_name: &'a str,
    pub status: &'a str,
    /// Direct-message identity, used for the `{mention}` token.
    pub recipient_id: Option<&'a str>,
}

impl TemplateContext<'_> {
    fn lookup(&self, key: &str) -> String {
        match key {
            "username" | "user" => self.username.to_string(),
            "device_id" => self.device_id.to_string(),
            "device_name" | "printer" => self.device_name.to_string(),
            "job_name" | "job" => self.job_name.to_string(),
            "status" => self.status.to_string(),
            "mention" => self
                .recipient_id
                .map(|id| format!("<@{id}>"))
                .unwrap_or_default(),
            _ => String::new(),
        }
    }
}

/// Render a template. Never fails.
pub fn render(template: &str, context: &TemplateContext<'_>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| context.lookup(&caps[1]))
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::DEFAULT_TEMPLATE;

    fn context() -> TemplateContext<'static> {
        TemplateContext {
            username: "anna",
            device_id: "01P00A000000001",
            device_name: "Werkstatt P1S",
            job_name: "benchy",
            status: "success",
            recipient_id: Some("4242"),
        }
    }

    #[test]
    fn test_render_all_keys() {
        let out = render(
            "{user}/{username}: {job_name} on {device_name} ({device_id}) is {status} {mention}",
            &context(),
        );
        assert_eq!(
            out,
            "anna/anna: benchy on Werkstatt P1S (01P00A000000001) is success <@4242>"
        );
    }

    #[test]
    fn test_unknown_key_renders_empty() {
        assert_eq!(render("a{nope}b", &context()), "ab");
    }

    #[test]
    fn test_unbalanced_braces_are_literal() {
        assert_eq!(render("{job_name} {oops", &context()), "benchy {oops");
        assert_eq!(render("{ job_name }", &context()), "{ job_name }");
    }

    #[test]
    fn test_default_template_without_recipient() {
        let ctx = TemplateContext {
            recipient_id: None,
            ..context()
        };
        assert_eq!(
            render(DEFAULT_TEMPLATE, &ctx),
            "Druckauftrag \"benchy\" auf Werkstatt P1S ist beendet (success)."
        );
    }
}
