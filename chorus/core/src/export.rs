//! Markdown chat export and chat titles

use chrono::{DateTime, Local, TimeZone};

use crate::messages::Message;

/// Title used when none was set and no question exists
pub const UNTITLED_CHAT: &str = "Untitled Chat";

/// Maximum length of a generated title, in characters
const DEFAULT_TITLE_CHARS: usize = 50;

/// Title generated from the earliest question
///
/// Whitespace runs (newlines included) collapse to one space and the result
/// is cut to 50 characters. `None` when there is no non-blank question.
#[must_use]
pub fn default_title(messages: &[Message]) -> Option<String> {
    let first = messages
        .iter()
        .filter(|m| m.is_question() && !m.is_blank())
        .min_by_key(|m| m.created_at)?;
    let collapsed = first.content.split_whitespace().collect::<Vec<_>>().join(" ");
    Some(collapsed.chars().take(DEFAULT_TITLE_CHARS).collect())
}

/// The title to show: the stored one, else a generated one, else [`UNTITLED_CHAT`]
#[must_use]
pub fn chat_title(stored: Option<&str>, messages: &[Message]) -> String {
    stored
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .or_else(|| default_title(messages))
        .unwrap_or_else(|| UNTITLED_CHAT.to_string())
}

/// Title made safe for use inside a file name
fn file_stem(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// A rendered export
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatExport {
    /// Suggested file name, `export_<title>_<millis>.md`
    pub file_name: String,
    /// Markdown document
    pub markdown: String,
}

/// Render `messages` as a Markdown document stamped with the current time
#[must_use]
pub fn export_markdown(title: &str, messages: &[Message]) -> ChatExport {
    export_markdown_at(title, messages, Local::now())
}

/// Render `messages` as a Markdown document stamped with `at`
///
/// Questions are headed `**User:**`, answers with their provider ID.
#[must_use]
pub fn export_markdown_at<Tz>(title: &str, messages: &[Message], at: DateTime<Tz>) -> ChatExport
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut markdown = String::new();
    markdown.push_str(&format!("# Chat Export: \"{title}\"\n\n"));
    markdown.push_str(&format!(
        "**Exported on:** {}\n\n",
        at.format("%Y-%m-%d %I:%M %p")
    ));
    markdown.push_str("---\n\n");
    markdown.push_str("## Chat History\n\n");

    for message in messages {
        let sender = message.provider.as_ref().map_or("User", |p| p.as_str());
        markdown.push_str(&format!("**{sender}:**\n"));
        markdown.push_str(&message.content);
        markdown.push_str("\n\n");
    }

    ChatExport {
        file_name: format!("export_{}_{}.md", file_stem(title), at.timestamp_millis()),
        markdown,
    }
}
