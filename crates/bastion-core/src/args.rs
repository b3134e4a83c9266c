//! Command argument parsing.
//!
//! A command line is split into typed arguments once, at parse time:
//! bare or double-quoted words, `inline code` spans, and ```code blocks```.
//! Handlers branch on the variant instead of inspecting raw text.

use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// A bare word, or a double-quoted string with escapes resolved.
    Text(String),
    /// Contents of a `` `...` `` span.
    InlineCode(String),
    /// Contents of a ```` ```...``` ```` block, language tag removed.
    CodeBlock {
        language: Option<String>,
        code: String,
    },
}

impl Arg {
    /// The argument's text, whatever its kind.
    pub fn text(&self) -> &str {
        match self {
            Arg::Text(text) | Arg::InlineCode(text) => text,
            Arg::CodeBlock { code, .. } => code,
        }
    }

    pub fn is_code(&self) -> bool {
        matches!(self, Arg::InlineCode(_) | Arg::CodeBlock { .. })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Arg::Text(text) => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgError {
    #[error("unterminated code block starting at {0}")]
    UnterminatedBlock(usize),
    #[error("unterminated inline code starting at {0}")]
    UnterminatedInline(usize),
    #[error("unterminated quote starting at {0}")]
    UnterminatedQuote(usize),
}

/// Parsed arguments, consumed front to back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    items: VecDeque<Arg>,
}

impl Args {
    pub fn parse(input: &str) -> Result<Self, ArgError> {
        parse(input).map(|items| Self {
            items: items.into(),
        })
    }

    pub fn next_arg(&mut self) -> Option<Arg> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Iterator for Args {
    type Item = Arg;

    fn next(&mut self) -> Option<Arg> {
        self.next_arg()
    }
}

impl From<Vec<Arg>> for Args {
    fn from(items: Vec<Arg>) -> Self {
        Self {
            items: items.into(),
        }
    }
}

const FENCE: &str = "```";

pub fn parse(input: &str) -> Result<Vec<Arg>, ArgError> {
    let mut args = Vec::new();
    let mut pos = 0;

    while pos < input.len() {
        let rest = &input[pos..];
        let Some(ch) = rest.chars().next() else {
            break;
        };

        if ch.is_whitespace() {
            pos += ch.len_utf8();
            continue;
        }

        if let Some(body) = rest.strip_prefix(FENCE) {
            let end = body
                .find(FENCE)
                .ok_or(ArgError::UnterminatedBlock(pos))?;
            args.push(code_block(&body[..end]));
            pos += FENCE.len() * 2 + end;
        } else if let Some(body) = rest.strip_prefix('`') {
            let end = body.find('`').ok_or(ArgError::UnterminatedInline(pos))?;
            args.push(Arg::InlineCode(body[..end].to_string()));
            pos += 2 + end;
        } else if ch == '"' {
            let (text, consumed) = quoted(&rest[1..]).ok_or(ArgError::UnterminatedQuote(pos))?;
            args.push(Arg::Text(text));
            pos += 1 + consumed;
        } else {
            let end = rest
                .find(|c: char| c.is_whitespace() || c == '`')
                .unwrap_or(rest.len());
            args.push(Arg::Text(rest[..end].to_string()));
            pos += end;
        }
    }

    Ok(args)
}

/// Splits an optional language tag off the first line of a block.
fn code_block(body: &str) -> Arg {
    if let Some((first, code)) = body.split_once('\n') {
        let tag = first.trim();
        let is_tag = !tag.is_empty()
            && tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '_'));
        if is_tag {
            return Arg::CodeBlock {
                language: Some(tag.to_string()),
                code: code.to_string(),
            };
        }
        if tag.is_empty() {
            return Arg::CodeBlock {
                language: None,
                code: code.to_string(),
            };
        }
    }
    Arg::CodeBlock {
        language: None,
        code: body.to_string(),
    }
}

/// Reads up to the closing quote. Returns the text and bytes consumed,
/// closing quote included.
fn quoted(body: &str) -> Option<(String, usize)> {
    let mut text = String::new();
    let mut chars = body.char_indices();
    while let Some((index, ch)) = chars.next() {
        match ch {
            '"' => return Some((text, index + 1)),
            '\\' => {
                let (_, escaped) = chars.next()?;
                text.push(escaped);
            }
            other => text.push(other),
        }
    }
    None
}
