//! Tokenizer for plain or lightly HTML-tagged input text.
//!
//! The input may be plain text or contain a small, closed inline tag
//! vocabulary (`b`/`strong`, `i`/`em`, `u`, `h1`-`h3`, `ul`/`ol`/`li`,
//! `br`, `p`/`div`, `img`). Anything else is treated as literal text; the
//! tokenizer never fails. Whitespace inside text tokens is preserved
//! verbatim; interpreting it is the line builder's job.

use std::collections::HashMap;

/// The closed tag vocabulary. Dispatch on this enum rather than on tag-name
/// strings keeps cursor-state transitions in one explicit table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagName {
    Bold,
    Italic,
    Underline,
    Heading(u8),
    UnorderedList,
    OrderedList,
    ListItem,
    LineBreak,
    Paragraph,
    Image,
}

impl TagName {
    /// Resolve a raw tag name. Returns `None` for anything outside the
    /// vocabulary, which the tokenizer then degrades to literal text.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "b" | "strong" => Some(TagName::Bold),
            "i" | "em" => Some(TagName::Italic),
            "u" => Some(TagName::Underline),
            "h1" => Some(TagName::Heading(1)),
            "h2" => Some(TagName::Heading(2)),
            "h3" => Some(TagName::Heading(3)),
            "ul" => Some(TagName::UnorderedList),
            "ol" => Some(TagName::OrderedList),
            "li" => Some(TagName::ListItem),
            "br" => Some(TagName::LineBreak),
            "p" | "div" => Some(TagName::Paragraph),
            "img" => Some(TagName::Image),
            _ => None,
        }
    }
}

/// One token of the input stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A run of literal text, whitespace preserved.
    Text(String),
    /// A recognized tag.
    Tag {
        name: TagName,
        closing: bool,
        attributes: HashMap<String, String>,
    },
}

impl Token {
    fn open(name: TagName) -> Self {
        Token::Tag {
            name,
            closing: false,
            attributes: HashMap::new(),
        }
    }
}

/// Convert raw input into a flat ordered token sequence.
///
/// Pure function over the input string: malformed or unknown tags degrade to
/// literal text, never an error.
pub fn tokenize(markup: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut text = String::new();
    let chars: Vec<char> = markup.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '<' {
            if let Some((token, consumed)) = parse_tag(&chars[i..]) {
                if !text.is_empty() {
                    tokens.push(Token::Text(std::mem::take(&mut text)));
                }
                tokens.push(token);
                i += consumed;
                continue;
            }
        }
        text.push(chars[i]);
        i += 1;
    }
    if !text.is_empty() {
        tokens.push(Token::Text(text));
    }
    tokens
}

/// Try to parse a tag starting at `chars[0] == '<'`. Returns the token and
/// the number of characters consumed, or `None` if this is not a recognized
/// well-formed tag.
fn parse_tag(chars: &[char]) -> Option<(Token, usize)> {
    let close_idx = chars.iter().position(|&c| c == '>')?;
    let inner: String = chars[1..close_idx].iter().collect();
    let inner = inner.trim().trim_end_matches('/').trim();
    if inner.is_empty() {
        return None;
    }

    let (closing, body) = match inner.strip_prefix('/') {
        Some(rest) => (true, rest.trim()),
        None => (false, inner),
    };

    let name_end = body
        .find(|c: char| c.is_whitespace())
        .unwrap_or(body.len());
    let name = TagName::parse(&body[..name_end])?;
    let attributes = parse_attributes(&body[name_end..]);

    Some((
        Token::Tag {
            name,
            closing,
            attributes,
        },
        close_idx + 1,
    ))
}

/// Parse `key="value"` pairs. Forgiving: unquoted values run to the next
/// whitespace, bare keys map to an empty string.
fn parse_attributes(input: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    let mut rest = input.trim_start();
    while !rest.is_empty() {
        let key_end = rest
            .find(|c: char| c == '=' || c.is_whitespace())
            .unwrap_or(rest.len());
        let key = rest[..key_end].to_ascii_lowercase();
        rest = rest[key_end..].trim_start();
        if key.is_empty() {
            break;
        }
        if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            if let Some(stripped) = after_eq.strip_prefix('"') {
                let end = stripped.find('"').unwrap_or(stripped.len());
                attrs.insert(key, stripped[..end].to_string());
                rest = stripped.get(end + 1..).unwrap_or("").trim_start();
            } else {
                let end = after_eq
                    .find(|c: char| c.is_whitespace())
                    .unwrap_or(after_eq.len());
                attrs.insert(key, after_eq[..end].to_string());
                rest = after_eq[end..].trim_start();
            }
        } else {
            attrs.insert(key, String::new());
            rest = rest.trim_start();
        }
    }
    attrs
}

/// Active character style at one point of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StyleState {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    /// Heading level 1-3 while inside `<hN>`, scales the font size.
    pub heading: Option<u8>,
}

impl StyleState {
    /// Font-size multiplier for the current heading context.
    pub fn size_factor(&self) -> f32 {
        match self.heading {
            Some(1) => 1.6,
            Some(2) => 1.4,
            Some(3) => 1.2,
            _ => 1.0,
        }
    }
}

/// Maps plain-text character offsets to the style active at that offset.
///
/// Built once per render pass from the token stream; the compositor looks up
/// styles by each line's source offset instead of re-walking tags inside the
/// draw loop.
#[derive(Debug, Clone, Default)]
pub struct StyleMap {
    /// (start_offset, state) transitions, ascending by offset.
    spans: Vec<(usize, StyleState)>,
}

impl StyleMap {
    /// Derive the style transition table from a token stream.
    pub fn from_tokens(tokens: &[Token]) -> Self {
        let mut spans = vec![(0usize, StyleState::default())];
        let mut state = StyleState::default();
        let mut offset = 0usize;

        for token in tokens {
            match token {
                Token::Text(text) => {
                    offset += text.chars().count();
                }
                Token::Tag { name, closing, .. } => {
                    let next = apply_tag(state, *name, *closing);
                    if next != state {
                        state = next;
                        spans.push((offset, state));
                    }
                }
            }
        }
        Self { spans }
    }

    /// Style active at a plain-text character offset.
    pub fn state_at(&self, offset: usize) -> StyleState {
        match self.spans.binary_search_by_key(&offset, |&(o, _)| o) {
            Ok(idx) => self.spans[idx].1,
            Err(0) => StyleState::default(),
            Err(idx) => self.spans[idx - 1].1,
        }
    }
}

/// The open/close transition table for style-affecting tags. Structural tags
/// (lists, breaks, paragraphs, images) do not change character style.
fn apply_tag(mut state: StyleState, name: TagName, closing: bool) -> StyleState {
    match name {
        TagName::Bold => state.bold = !closing,
        TagName::Italic => state.italic = !closing,
        TagName::Underline => state.underline = !closing,
        TagName::Heading(level) => state.heading = if closing { None } else { Some(level) },
        _ => {}
    }
    state
}
