//! Discord markdown helpers.

use crate::platform::{RoleId, UserId};

const ZERO_WIDTH_SPACE: char = '\u{200b}';

/// Wraps `text` in an inline code span that survives embedded backticks.
pub fn inline_code(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    if !text.contains('`') {
        return format!("`{text}`");
    }
    // Double backticks allow single ones inside; break up any run of two.
    let escaped = text.replace("``", &format!("`{ZERO_WIDTH_SPACE}`"));
    format!("`` {escaped} ``")
}

/// Wraps `text` in a fenced code block.
pub fn code_block(text: &str) -> String {
    format!("```\n{}\n```", escape_fences(text))
}

/// Breaks up every ```` ``` ```` so `text` can't close a code block.
pub fn escape_fences(text: &str) -> String {
    text.replace("```", &format!("``{ZERO_WIDTH_SPACE}`"))
}

pub fn bold(text: &str) -> String {
    let escaped = text.replace("**", &format!("*{ZERO_WIDTH_SPACE}*"));
    format!("**{escaped}**")
}

pub fn mention_user(user_id: UserId) -> String {
    format!("<@{user_id}>")
}

pub fn mention_role(role_id: RoleId) -> String {
    format!("<@&{role_id}>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_code_plain_and_escaped() {
        assert_eq!(inline_code("modmail"), "`modmail`");
        assert_eq!(inline_code("a`b"), "`` a`b ``");
        assert!(!inline_code("a``b").contains("a``b"));
        assert_eq!(inline_code(""), "");
    }

    #[test]
    fn code_block_breaks_inner_fences() {
        let block = code_block("x ``` y");
        assert!(block.starts_with("```\n"));
        assert!(block.ends_with("\n```"));
        assert_eq!(block.matches("```").count(), 2);
    }

    #[test]
    fn mentions() {
        assert_eq!(mention_user(42), "<@42>");
        assert_eq!(mention_role(7), "<@&7>");
        assert_eq!(bold("From x"), "**From x**");
    }
}
