//! Line builder: turns raw text or a token stream into logical lines.
//!
//! Paragraphs are processed independently: direction detection, list-marker
//! detection, greedy word wrap against a character budget, and hard
//! character splits for words longer than a full line. Every flushed line
//! records the character offset where its text began in the original input,
//! which is what makes click-to-cursor reverse mapping exact.

use crate::token::{TagName, Token};
use serde::{Deserialize, Serialize};

/// Kind of a logical line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineKind {
    Plain,
    Bullet,
    Numbered,
    Empty,
    /// First line slot reserved for an inline image; follow-up slots for a
    /// tall image are emitted as `Empty`.
    Image { src: String },
}

/// Text direction of a line, detected per paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Ltr,
    Rtl,
}

/// One logical line, the unit the paginator and compositor work with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineRecord {
    pub text: String,
    pub kind: LineKind,
    /// Indent level; reduces the character budget of list continuation lines.
    pub indent: usize,
    pub direction: Direction,
    /// Character offset into the source text where this line's text begins.
    pub source_offset: usize,
    /// Source character offset of each word on the line, in order. Wrapping
    /// collapses whitespace runs, so offsets cannot be re-derived from the
    /// line text; style lookups need the original positions.
    pub word_offsets: Vec<usize>,
    /// Index of the paragraph this line belongs to. Consecutive lines with
    /// the same index form one paragraph; the paginator needs this for
    /// orphan/widow control.
    pub paragraph: usize,
    /// Ordinal for numbered list items produced from `<ol>` markup, where
    /// the marker is not part of the source text.
    pub ordinal: Option<usize>,
}

impl LineRecord {
    fn empty(source_offset: usize, paragraph: usize) -> Self {
        Self {
            text: String::new(),
            kind: LineKind::Empty,
            indent: 0,
            direction: Direction::Ltr,
            source_offset,
            word_offsets: Vec::new(),
            paragraph,
            ordinal: None,
        }
    }
}

/// Scan for right-to-left script code points (Hebrew, Arabic, and the
/// Arabic presentation forms). One hit marks the whole paragraph RTL.
pub fn detect_direction(text: &str) -> Direction {
    for c in text.chars() {
        let cp = c as u32;
        if (0x0590..=0x05FF).contains(&cp)
            || (0x0600..=0x06FF).contains(&cp)
            || (0x0750..=0x077F).contains(&cp)
            || (0x08A0..=0x08FF).contains(&cp)
            || (0xFB50..=0xFDFF).contains(&cp)
            || (0xFE70..=0xFEFF).contains(&cp)
        {
            return Direction::Rtl;
        }
    }
    Direction::Ltr
}

/// Detect a list marker at the start of a paragraph. Returns the kind and
/// the marker length in characters (including the trailing space).
fn detect_list_marker(text: &str) -> Option<(LineKind, usize)> {
    let trimmed = text.trim_start();
    let lead = text.chars().count() - trimmed.chars().count();

    for marker in ["* ", "- ", "+ "] {
        if trimmed.starts_with(marker) {
            return Some((LineKind::Bullet, lead + 2));
        }
    }

    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let after: Vec<char> = trimmed.chars().skip(digits).take(2).collect();
        if matches!(after.as_slice(), ['.', ' ', ..] | [')', ' ', ..])
            || matches!(after.as_slice(), ['.'] | [')'])
        {
            return Some((LineKind::Numbered, lead + digits + 2));
        }
    }
    None
}

/// Build logical lines from plain text against a per-line character budget.
///
/// Zero-length input yields a single empty line, never an empty sequence:
/// the paginator downstream assumes at least one page always exists.
pub fn build_lines(text: &str, chars_per_line: usize) -> Vec<LineRecord> {
    let chars_per_line = chars_per_line.max(1);
    let mut lines = Vec::new();
    let mut offset = 0usize;

    for (paragraph, para) in text.split('\n').enumerate() {
        wrap_paragraph(para, offset, paragraph, chars_per_line, None, &mut lines);
        offset += para.chars().count() + 1;
    }

    if lines.is_empty() {
        lines.push(LineRecord::empty(0, 0));
    }
    lines
}

/// Wrap one paragraph into lines, appending to `out`.
fn wrap_paragraph(
    para: &str,
    para_offset: usize,
    paragraph: usize,
    chars_per_line: usize,
    ordinal: Option<usize>,
    out: &mut Vec<LineRecord>,
) {
    if para.trim().is_empty() {
        out.push(LineRecord::empty(para_offset, paragraph));
        return;
    }

    let direction = detect_direction(para);
    let (kind, indent) = match detect_list_marker(para) {
        Some((kind, _marker_len)) => (kind, 1usize),
        None if ordinal.is_some() => (LineKind::Numbered, 1),
        None => (LineKind::Plain, 0),
    };

    // Continuation lines of a list item hang under the marker, so their
    // budget shrinks by the indent.
    let continuation_budget = chars_per_line.saturating_sub(indent * 2).max(1);

    let mut current = String::new();
    let mut current_offset = para_offset;
    let mut current_words: Vec<usize> = Vec::new();
    let mut first_flushed = false;

    let mut flush = |current: &mut String,
                     current_offset: usize,
                     current_words: &mut Vec<usize>,
                     first_flushed: &mut bool,
                     out: &mut Vec<LineRecord>| {
        out.push(LineRecord {
            text: std::mem::take(current),
            kind: kind.clone(),
            indent,
            direction,
            source_offset: current_offset,
            word_offsets: std::mem::take(current_words),
            paragraph,
            ordinal: if *first_flushed { None } else { ordinal },
        });
        *first_flushed = true;
    };

    for (word, word_offset) in words_with_offsets(para, para_offset) {
        let limit = if first_flushed {
            continuation_budget
        } else {
            chars_per_line
        };
        let word_len = word.chars().count();
        let current_len = current.chars().count();

        if word_len > limit && current_len == 0 {
            // Hard split: the word alone exceeds a full line.
            hard_split_word(
                &word,
                word_offset,
                chars_per_line,
                continuation_budget,
                &mut first_flushed,
                kind.clone(),
                indent,
                direction,
                paragraph,
                ordinal,
                out,
            );
            continue;
        }

        if current_len == 0 {
            current = word;
            current_offset = word_offset;
            current_words.push(word_offset);
        } else if current_len + 1 + word_len <= limit {
            current.push(' ');
            current.push_str(&word);
            current_words.push(word_offset);
        } else {
            flush(
                &mut current,
                current_offset,
                &mut current_words,
                &mut first_flushed,
                out,
            );
            if word_len > continuation_budget {
                hard_split_word(
                    &word,
                    word_offset,
                    continuation_budget,
                    continuation_budget,
                    &mut first_flushed,
                    kind.clone(),
                    indent,
                    direction,
                    paragraph,
                    ordinal,
                    out,
                );
            } else {
                current = word;
                current_offset = word_offset;
                current_words.push(word_offset);
            }
        }
    }

    if !current.is_empty() || !first_flushed {
        flush(
            &mut current,
            current_offset,
            &mut current_words,
            &mut first_flushed,
            out,
        );
    }
}

/// Split an overlong word into budget-sized chunks, hyphenation-free.
#[allow(clippy::too_many_arguments)]
fn hard_split_word(
    word: &str,
    word_offset: usize,
    first_budget: usize,
    continuation_budget: usize,
    first_flushed: &mut bool,
    kind: LineKind,
    indent: usize,
    direction: Direction,
    paragraph: usize,
    ordinal: Option<usize>,
    out: &mut Vec<LineRecord>,
) {
    let chars: Vec<char> = word.chars().collect();
    let mut pos = 0usize;
    while pos < chars.len() {
        let budget = if *first_flushed {
            continuation_budget
        } else {
            first_budget
        };
        let end = (pos + budget).min(chars.len());
        out.push(LineRecord {
            text: chars[pos..end].iter().collect(),
            kind: kind.clone(),
            indent,
            direction,
            source_offset: word_offset + pos,
            word_offsets: vec![word_offset + pos],
            paragraph,
            ordinal: if *first_flushed { None } else { ordinal },
        });
        *first_flushed = true;
        pos = end;
    }
}

/// Iterate whitespace-separated words together with the character offset of
/// each word's first character in the full document.
fn words_with_offsets(para: &str, para_offset: usize) -> Vec<(String, usize)> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut start = 0usize;
    for (i, c) in para.chars().enumerate() {
        if c.is_whitespace() {
            if !current.is_empty() {
                words.push((std::mem::take(&mut current), para_offset + start));
            }
        } else {
            if current.is_empty() {
                start = i;
            }
            current.push(c);
        }
    }
    if !current.is_empty() {
        words.push((current, para_offset + start));
    }
    words
}

/// Build logical lines from a token stream.
///
/// Structural tags split paragraphs; list context assigns kinds, indents,
/// and ordinals; image tags reserve a number of line slots supplied by the
/// caller (the slot count depends on paper geometry, which layout does not
/// know about). Character offsets refer to the plain-text projection of the
/// stream, the same space `StyleMap` indexes.
pub fn build_lines_from_tokens(
    tokens: &[Token],
    chars_per_line: usize,
    image_slots: impl Fn(&str) -> usize,
) -> Vec<LineRecord> {
    let chars_per_line = chars_per_line.max(1);
    let mut lines = Vec::new();
    let mut paragraph = 0usize;
    let mut offset = 0usize;
    let mut buffer = String::new();
    let mut buffer_offset = 0usize;
    let mut list_depth = 0usize;
    let mut ordered_counters: Vec<usize> = Vec::new();
    let mut pending_ordinal: Option<usize> = None;

    let mut flush_para = |buffer: &mut String,
                          buffer_offset: usize,
                          paragraph: &mut usize,
                          pending_ordinal: &mut Option<usize>,
                          list_depth: usize,
                          lines: &mut Vec<LineRecord>,
                          force_empty: bool| {
        if buffer.trim().is_empty() && !force_empty {
            buffer.clear();
            return;
        }
        let ordinal = pending_ordinal.take();
        let before = lines.len();
        wrap_paragraph(
            buffer,
            buffer_offset,
            *paragraph,
            chars_per_line,
            ordinal,
            lines,
        );
        // Token-path list items get their indent from nesting depth rather
        // than from literal marker text.
        if list_depth > 0 {
            for line in lines.iter_mut().skip(before) {
                line.indent = line.indent.max(list_depth);
                if line.kind == LineKind::Plain {
                    line.kind = if ordinal.is_some() {
                        LineKind::Numbered
                    } else {
                        LineKind::Bullet
                    };
                }
            }
        }
        buffer.clear();
        *paragraph += 1;
    };

    for token in tokens {
        match token {
            Token::Text(text) => {
                for c in text.chars() {
                    if c == '\n' {
                        flush_para(
                            &mut buffer,
                            buffer_offset,
                            &mut paragraph,
                            &mut pending_ordinal,
                            list_depth,
                            &mut lines,
                            true,
                        );
                        buffer_offset = offset + 1;
                    } else {
                        if buffer.is_empty() {
                            buffer_offset = offset;
                        }
                        buffer.push(c);
                    }
                    offset += 1;
                }
            }
            Token::Tag {
                name,
                closing,
                attributes,
            } => match (name, closing) {
                (TagName::LineBreak, false) => {
                    flush_para(
                        &mut buffer,
                        buffer_offset,
                        &mut paragraph,
                        &mut pending_ordinal,
                        list_depth,
                        &mut lines,
                        true,
                    );
                    buffer_offset = offset;
                }
                (TagName::Paragraph, _) | (TagName::Heading(_), _) => {
                    flush_para(
                        &mut buffer,
                        buffer_offset,
                        &mut paragraph,
                        &mut pending_ordinal,
                        list_depth,
                        &mut lines,
                        false,
                    );
                    buffer_offset = offset;
                }
                (TagName::UnorderedList, false) => {
                    flush_para(
                        &mut buffer,
                        buffer_offset,
                        &mut paragraph,
                        &mut pending_ordinal,
                        list_depth,
                        &mut lines,
                        false,
                    );
                    list_depth += 1;
                }
                (TagName::OrderedList, false) => {
                    flush_para(
                        &mut buffer,
                        buffer_offset,
                        &mut paragraph,
                        &mut pending_ordinal,
                        list_depth,
                        &mut lines,
                        false,
                    );
                    list_depth += 1;
                    ordered_counters.push(0);
                }
                (TagName::UnorderedList, true) => {
                    flush_para(
                        &mut buffer,
                        buffer_offset,
                        &mut paragraph,
                        &mut pending_ordinal,
                        list_depth,
                        &mut lines,
                        false,
                    );
                    list_depth = list_depth.saturating_sub(1);
                }
                (TagName::OrderedList, true) => {
                    flush_para(
                        &mut buffer,
                        buffer_offset,
                        &mut paragraph,
                        &mut pending_ordinal,
                        list_depth,
                        &mut lines,
                        false,
                    );
                    list_depth = list_depth.saturating_sub(1);
                    ordered_counters.pop();
                }
                (TagName::ListItem, false) => {
                    flush_para(
                        &mut buffer,
                        buffer_offset,
                        &mut paragraph,
                        &mut pending_ordinal,
                        list_depth,
                        &mut lines,
                        false,
                    );
                    buffer_offset = offset;
                    if let Some(counter) = ordered_counters.last_mut() {
                        *counter += 1;
                        pending_ordinal = Some(*counter);
                    }
                }
                (TagName::ListItem, true) => {
                    flush_para(
                        &mut buffer,
                        buffer_offset,
                        &mut paragraph,
                        &mut pending_ordinal,
                        list_depth,
                        &mut lines,
                        false,
                    );
                }
                (TagName::Image, false) => {
                    flush_para(
                        &mut buffer,
                        buffer_offset,
                        &mut paragraph,
                        &mut pending_ordinal,
                        list_depth,
                        &mut lines,
                        false,
                    );
                    if let Some(src) = attributes.get("src") {
                        let slots = image_slots(src).max(1);
                        lines.push(LineRecord {
                            text: String::new(),
                            kind: LineKind::Image { src: src.clone() },
                            indent: 0,
                            direction: Direction::Ltr,
                            source_offset: offset,
                            word_offsets: Vec::new(),
                            paragraph,
                            ordinal: None,
                        });
                        for _ in 1..slots {
                            lines.push(LineRecord::empty(offset, paragraph));
                        }
                        paragraph += 1;
                    }
                }
                _ => {}
            },
        }
    }

    flush_para(
        &mut buffer,
        buffer_offset,
        &mut paragraph,
        &mut pending_ordinal,
        list_depth,
        &mut lines,
        false,
    );

    if lines.is_empty() {
        lines.push(LineRecord::empty(0, 0));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tokenize;

    #[test]
    fn test_empty_input_yields_one_empty_line() {
        let lines = build_lines("", 40);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "");
        assert_eq!(lines[0].kind, LineKind::Empty);
    }

    #[test]
    fn test_whitespace_only_yields_empty_line() {
        let lines = build_lines("   ", 40);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].kind, LineKind::Empty);
    }

    #[test]
    fn test_short_text_single_line() {
        let lines = build_lines("hello world", 40);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "hello world");
        assert_eq!(lines[0].kind, LineKind::Plain);
        assert_eq!(lines[0].source_offset, 0);
    }

    #[test]
    fn test_greedy_wrap_respects_budget() {
        let text = "the quick brown fox jumps over the lazy dog again and again";
        let lines = build_lines(text, 20);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(
                line.text.chars().count() <= 20,
                "line '{}' exceeds budget",
                line.text
            );
        }
    }

    #[test]
    fn test_wrap_source_offsets_reverse_map() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let lines = build_lines(text, 16);
        for line in &lines {
            let from_source: String = text
                .chars()
                .skip(line.source_offset)
                .take(line.text.chars().count())
                .collect();
            assert_eq!(from_source, line.text);
        }
    }

    #[test]
    fn test_hard_split_exact_multiple() {
        let word: String = "x".repeat(200);
        let lines = build_lines(&word, 40);
        assert_eq!(lines.len(), 5);
        for line in &lines {
            assert_eq!(line.text.chars().count(), 40);
        }
    }

    #[test]
    fn test_hard_split_with_remainder() {
        let word: String = "x".repeat(180);
        let lines = build_lines(&word, 40);
        assert_eq!(lines.len(), 5);
        for line in lines.iter().take(4) {
            assert_eq!(line.text.chars().count(), 40);
        }
        assert_eq!(lines[4].text.chars().count(), 20);
    }

    #[test]
    fn test_hard_split_offsets() {
        let word: String = "y".repeat(100);
        let lines = build_lines(&word, 40);
        assert_eq!(lines[0].source_offset, 0);
        assert_eq!(lines[1].source_offset, 40);
        assert_eq!(lines[2].source_offset, 80);
    }

    #[test]
    fn test_empty_paragraph_consumes_one_slot() {
        let lines = build_lines("first\n\nsecond", 40);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].kind, LineKind::Empty);
        assert_eq!(lines[0].paragraph, 0);
        assert_eq!(lines[1].paragraph, 1);
        assert_eq!(lines[2].paragraph, 2);
    }

    #[test]
    fn test_second_paragraph_offset_counts_newline() {
        let lines = build_lines("ab\ncd", 40);
        assert_eq!(lines[1].source_offset, 3);
    }

    #[test]
    fn test_bullet_detection() {
        for marker in ["* item", "- item", "+ item"] {
            let lines = build_lines(marker, 40);
            assert_eq!(lines[0].kind, LineKind::Bullet, "marker '{}'", marker);
            assert_eq!(lines[0].indent, 1);
        }
    }

    #[test]
    fn test_numbered_detection() {
        for marker in ["1. item", "12) item"] {
            let lines = build_lines(marker, 40);
            assert_eq!(lines[0].kind, LineKind::Numbered, "marker '{}'", marker);
        }
    }

    #[test]
    fn test_number_without_marker_is_plain() {
        let lines = build_lines("1996 was a year", 40);
        assert_eq!(lines[0].kind, LineKind::Plain);
    }

    #[test]
    fn test_list_continuation_budget_reduced() {
        let text = "* one two three four five six seven eight nine ten eleven";
        let lines = build_lines(text, 20);
        assert!(lines.len() > 1);
        for line in lines.iter().skip(1) {
            assert!(
                line.text.chars().count() <= 18,
                "continuation '{}' not indented",
                line.text
            );
        }
    }

    #[test]
    fn test_rtl_detection_hebrew() {
        let lines = build_lines("שלום עולם", 40);
        assert_eq!(lines[0].direction, Direction::Rtl);
    }

    #[test]
    fn test_rtl_detection_arabic() {
        let lines = build_lines("مرحبا بالعالم", 40);
        assert_eq!(lines[0].direction, Direction::Rtl);
    }

    #[test]
    fn test_ltr_default() {
        let lines = build_lines("hello", 40);
        assert_eq!(lines[0].direction, Direction::Ltr);
    }

    #[test]
    fn test_word_offsets_survive_whitespace_collapse() {
        // Wrapping collapses the double space, so the second word's offset
        // must come from the source text, not the rebuilt line text.
        let lines = build_lines("ab  cd", 40);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "ab cd");
        assert_eq!(lines[0].word_offsets, vec![0, 4]);
    }

    #[test]
    fn test_word_offsets_one_per_word_across_wrap() {
        let text = "alpha beta gamma delta epsilon zeta";
        let lines = build_lines(text, 12);
        for line in &lines {
            assert_eq!(
                line.word_offsets.len(),
                line.text.split_whitespace().count()
            );
            for (&off, word) in line.word_offsets.iter().zip(line.text.split_whitespace()) {
                let from_source: String =
                    text.chars().skip(off).take(word.chars().count()).collect();
                assert_eq!(from_source, word);
            }
        }
    }

    #[test]
    fn test_long_paragraph_wraps_at_forty() {
        let text = "Hello world. This is a test paragraph that should wrap across \
                    multiple lines because it is intentionally long enough to exceed \
                    a single line width budget of say forty characters.";
        let lines = build_lines(text, 40);
        assert!(lines.len() >= 4);
        assert_eq!(lines[0].source_offset, 0);
        for line in &lines {
            assert!(line.text.chars().count() <= 40);
        }
    }

    // ========== Token-stream path ==========

    #[test]
    fn test_tokens_plain_paragraphs() {
        let tokens = tokenize("one<br>two");
        let lines = build_lines_from_tokens(&tokens, 40, |_| 1);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "one");
        assert_eq!(lines[1].text, "two");
        assert_ne!(lines[0].paragraph, lines[1].paragraph);
    }

    #[test]
    fn test_tokens_unordered_list() {
        let tokens = tokenize("<ul><li>alpha</li><li>beta</li></ul>");
        let lines = build_lines_from_tokens(&tokens, 40, |_| 1);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].kind, LineKind::Bullet);
        assert_eq!(lines[0].indent, 1);
        assert_eq!(lines[1].text, "beta");
    }

    #[test]
    fn test_tokens_ordered_list_ordinals() {
        let tokens = tokenize("<ol><li>first</li><li>second</li></ol>");
        let lines = build_lines_from_tokens(&tokens, 40, |_| 1);
        assert_eq!(lines[0].kind, LineKind::Numbered);
        assert_eq!(lines[0].ordinal, Some(1));
        assert_eq!(lines[1].ordinal, Some(2));
    }

    #[test]
    fn test_tokens_image_reserves_slots() {
        let tokens = tokenize(r#"before<img src="pic.png">after"#);
        let lines = build_lines_from_tokens(&tokens, 40, |_| 3);
        assert_eq!(lines.len(), 5);
        assert!(matches!(lines[1].kind, LineKind::Image { ref src } if src == "pic.png"));
        assert_eq!(lines[2].kind, LineKind::Empty);
        assert_eq!(lines[3].kind, LineKind::Empty);
        assert_eq!(lines[4].text, "after");
    }

    #[test]
    fn test_tokens_style_offsets_align_with_plain_projection() {
        // plain projection: "bold and plain"
        let tokens = tokenize("<b>bold</b> and plain");
        let lines = build_lines_from_tokens(&tokens, 40, |_| 1);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "bold and plain");
        assert_eq!(lines[0].source_offset, 0);
    }

    #[test]
    fn test_tokens_style_lookup_after_collapsed_whitespace() {
        // Projection is "ab  cd" with bold starting at offset 4. The line
        // text collapses the run to one space; word_offsets must still point
        // at the bold span.
        let tokens = tokenize("ab  <b>cd</b>");
        let styles = crate::token::StyleMap::from_tokens(&tokens);
        let lines = build_lines_from_tokens(&tokens, 40, |_| 1);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "ab cd");
        assert_eq!(lines[0].word_offsets, vec![0, 4]);
        assert!(!styles.state_at(lines[0].word_offsets[0]).bold);
        assert!(styles.state_at(lines[0].word_offsets[1]).bold);
    }

    #[test]
    fn test_tokens_empty_stream() {
        let lines = build_lines_from_tokens(&[], 40, |_| 1);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].kind, LineKind::Empty);
    }
}
