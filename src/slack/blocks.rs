//! Slack Block Kit message builders.
//!
//! Provides helpers for constructing approval cards with diff rendering
//! and action buttons, plus plain text sections split to Slack's limits.

use slack_morphism::prelude::{
    SlackActionBlockElement, SlackActionsBlock, SlackBlock, SlackBlockButtonElement, SlackBlockId,
    SlackBlockPlainTextOnly, SlackBlockText, SlackSectionBlock,
};

use crate::models::mutation::{MutationKind, MutationRequest};

/// Action id of the approve button.
pub const APPROVE_ACTION: &str = "gate_approve";
/// Action id of the reject button.
pub const REJECT_ACTION: &str = "gate_reject";
/// Prefix shared by all approval gate actions.
pub const GATE_ACTION_PREFIX: &str = "gate_";

/// Characters of new-file content shown on a create card.
pub const CREATE_PREVIEW_CHARS: usize = 1000;

/// Slack rejects section text above 3000 characters.
const MAX_SECTION_CHARS: usize = 2900;

/// Build a plain text section block.
#[must_use]
pub fn text_section(text: &str) -> SlackBlock {
    SlackBlock::Section(SlackSectionBlock::new().with_text(SlackBlockText::MarkDown(text.into())))
}

/// Build as many text sections as `text` needs to stay under Slack's limit.
#[must_use]
pub fn text_sections(text: &str) -> Vec<SlackBlock> {
    split_chunks(text, MAX_SECTION_CHARS)
        .iter()
        .map(|chunk| text_section(chunk))
        .collect()
}

/// Cut `text` into pieces of at most `max` characters.
///
/// A piece ends at the last newline inside its window when there is one;
/// that newline is dropped.
#[must_use]
pub fn split_chunks(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while rest.chars().count() > max {
        let window_end = rest.char_indices().nth(max).map_or(rest.len(), |(i, _)| i);
        let cut = match rest[..window_end].rfind('\n') {
            Some(i) if i > 0 => i,
            _ => window_end,
        };
        chunks.push(rest[..cut].to_owned());
        rest = rest[cut..].strip_prefix('\n').unwrap_or(&rest[cut..]);
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_owned());
    }
    chunks
}

/// Build a code-fenced section block, cut to fit Slack's limits.
#[must_use]
pub fn code_section(body: &str) -> SlackBlock {
    let body = clip(body, MAX_SECTION_CHARS);
    text_section(&format!("```\n{body}\n```"))
}

/// Build an actions block with the given buttons.
#[must_use]
pub fn action_buttons(block_id: &str, buttons: &[(&str, &str, &str)]) -> SlackBlock {
    let elements: Vec<SlackActionBlockElement> = buttons
        .iter()
        .map(|(action_id, text, value)| {
            SlackActionBlockElement::Button(
                SlackBlockButtonElement::new(
                    (*action_id).into(),
                    SlackBlockPlainTextOnly::from(*text),
                )
                .with_value((*value).into()),
            )
        })
        .collect();
    SlackBlock::Actions(
        SlackActionsBlock::new(elements).with_block_id(SlackBlockId(block_id.into())),
    )
}

/// Build the decision buttons for an approval card.
#[must_use]
pub fn approval_buttons(approval_id: &str, kind: MutationKind) -> SlackBlock {
    let (approve, reject) = match kind {
        MutationKind::Modify => ("Approve", "Reject"),
        MutationKind::Create => ("Create", "Cancel"),
    };
    action_buttons(
        &format!("gate_{approval_id}"),
        &[
            (APPROVE_ACTION, approve, approval_id),
            (REJECT_ACTION, reject, approval_id),
        ],
    )
}

/// Full approval card for a pending mutation.
#[must_use]
pub fn approval_blocks(approval_id: &str, request: &MutationRequest) -> Vec<SlackBlock> {
    let (heading, body) = match request.kind {
        MutationKind::Modify => (
            format!("\u{1f4dd} *Edit requested:* `{}`", request.file_name()),
            render_diff(&request.prior, &request.proposed),
        ),
        MutationKind::Create => (
            format!("\u{1f4c4} *New file requested:* `{}`", request.file_name()),
            create_preview(&request.proposed),
        ),
    };

    vec![
        text_section(&format!("{heading}\n_{}_", request.file_path)),
        code_section(&body),
        approval_buttons(approval_id, request.kind),
    ]
}

/// Notification text accompanying an approval card.
#[must_use]
pub fn approval_fallback_text(request: &MutationRequest) -> String {
    match request.kind {
        MutationKind::Modify => format!("Approval needed: edit {}", request.file_name()),
        MutationKind::Create => format!("Approval needed: create {}", request.file_name()),
    }
}

/// Unified diff hunks between `prior` and `proposed`.
#[must_use]
pub fn render_diff(prior: &str, proposed: &str) -> String {
    let patch = diffy::create_patch(prior, proposed).to_string();
    let hunks: Vec<&str> = patch
        .lines()
        .skip_while(|line| line.starts_with("---") || line.starts_with("+++"))
        .collect();
    if hunks.is_empty() {
        "(no textual change)".to_owned()
    } else {
        hunks.join("\n")
    }
}

/// First [`CREATE_PREVIEW_CHARS`] characters of new file content.
#[must_use]
pub fn create_preview(content: &str) -> String {
    if content.chars().count() <= CREATE_PREVIEW_CHARS {
        return content.to_owned();
    }
    let mut preview: String = content.chars().take(CREATE_PREVIEW_CHARS).collect();
    preview.push_str("...");
    preview
}

fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("\n...");
    out
}
