//! Secret redaction for agent output shown in chat.
//!
//! Anything the agent prints (answers, stderr diagnostics, progress lines,
//! git output) passes through [`redact`] before it is posted, so credentials
//! the agent stumbles over in a workspace never reach the channel.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

/// `(pattern, replacement)` pairs, applied in order.
///
/// Specific token formats come first so the generic `KEY=value` rule sees
/// their placeholders instead of the raw values.
const RULE_SOURCES: &[(&str, &str)] = &[
    (
        r"\b(?:xox[abposr]|xapp)-[A-Za-z0-9-]{10,}",
        "[SLACK_TOKEN_REDACTED]",
    ),
    (r"\bAKIA[0-9A-Z]{16}\b", "[AWS_KEY_REDACTED]"),
    (r"\bgh[pous]_[A-Za-z0-9]{36}\b", "[GITHUB_TOKEN_REDACTED]"),
    (r"\bsk-ant-[A-Za-z0-9-]{40,}", "[ANTHROPIC_KEY_REDACTED]"),
    (r"\bsk-[A-Za-z0-9]{48}\b", "[OPENAI_KEY_REDACTED]"),
    (
        r#"(?i)((?:API_KEY|SECRET|TOKEN|PASSWORD|PRIVATE_KEY|ACCESS_KEY)["']?\s*[=:]\s*["']?)([A-Za-z0-9_\-/+=]{16,})(["']?)"#,
        "${1}[REDACTED]${3}",
    ),
    (
        r"\beyJ[A-Za-z0-9_-]*\.eyJ[A-Za-z0-9_-]*\.[A-Za-z0-9_-]*",
        "[JWT_REDACTED]",
    ),
    (
        r"(?i)((?:postgres|mysql|mongodb|redis)(?:ql)?://[^:\s]+:)([^@\s]+)(@)",
        "${1}[REDACTED]${3}",
    ),
];

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    RULE_SOURCES
        .iter()
        .filter_map(|&(source, replacement)| match Regex::new(source) {
            Ok(pattern) => Some(Rule {
                pattern,
                replacement,
            }),
            Err(err) => {
                warn!(%err, source, "invalid redaction pattern skipped");
                None
            }
        })
        .collect()
});

/// Replace credentials in `text` with placeholders.
#[must_use]
pub fn redact(text: &str) -> String {
    let mut out = text.to_owned();
    for rule in &*RULES {
        let replaced = match rule.pattern.replace_all(&out, rule.replacement) {
            Cow::Borrowed(_) => continue,
            Cow::Owned(replaced) => replaced,
        };
        out = replaced;
    }
    out
}
