//! Paginator: groups logical lines into fixed-capacity pages.
//!
//! One shared implementation feeds both the live preview and the export
//! pipeline, so the two can never disagree on page counts. Orphan and widow
//! control may relocate a single line across a page boundary; apart from
//! that, concatenating all pages in index order reconstructs the input line
//! sequence exactly.

use crate::layout::LineRecord;
use serde::{Deserialize, Serialize};

/// One physical page worth of lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub lines: Vec<LineRecord>,
    /// Sequential page index, starting at 0.
    pub index: usize,
}

/// Group lines into pages of `lines_per_page` capacity.
///
/// `first_page_lines` optionally reduces the capacity of page 0 (reserving
/// room for a header). Always emits at least one page, even for empty input.
pub fn paginate(
    lines: &[LineRecord],
    lines_per_page: usize,
    first_page_lines: Option<usize>,
) -> Vec<PageRecord> {
    let lines_per_page = lines_per_page.max(1);
    let first_limit = first_page_lines.unwrap_or(lines_per_page).max(1);

    let mut pages: Vec<PageRecord> = Vec::new();
    let mut buffer: Vec<LineRecord> = Vec::new();

    let limit_for = |page_index: usize| {
        if page_index == 0 {
            first_limit
        } else {
            lines_per_page
        }
    };

    let para_len = |paragraph: usize| lines.iter().filter(|l| l.paragraph == paragraph).count();
    let is_first_of_para =
        |i: usize| i == 0 || lines[i - 1].paragraph != lines[i].paragraph;
    let is_last_of_para =
        |i: usize| i + 1 == lines.len() || lines[i + 1].paragraph != lines[i].paragraph;

    let mut i = 0usize;
    while i < lines.len() {
        let limit = limit_for(pages.len());
        let line = &lines[i];

        // Orphan protection: never leave the opening line of a multi-line
        // paragraph stranded in the last slot of a page.
        if buffer.len() + 1 == limit
            && limit > 1
            && is_first_of_para(i)
            && !is_last_of_para(i)
            && para_len(line.paragraph) > 1
            && !buffer.is_empty()
        {
            let index = pages.len();
            pages.push(PageRecord {
                lines: std::mem::take(&mut buffer),
                index,
            });
            continue;
        }

        buffer.push(line.clone());
        i += 1;

        if buffer.len() >= limit {
            // Widow protection: if the next line would sit alone at the top
            // of the following page as the sole remainder of its paragraph,
            // pull our last line back out to keep it company.
            let mut carried: Vec<LineRecord> = Vec::new();
            if i < lines.len()
                && is_last_of_para(i)
                && !is_first_of_para(i)
                && buffer.len() >= 2
                && buffer.last().map(|l| l.paragraph) == Some(lines[i].paragraph)
            {
                if let Some(pulled) = buffer.pop() {
                    carried.push(pulled);
                }
            }
            let index = pages.len();
            pages.push(PageRecord {
                lines: std::mem::take(&mut buffer),
                index,
            });
            buffer = carried;
        }
    }

    if !buffer.is_empty() || pages.is_empty() {
        let index = pages.len();
        if buffer.is_empty() {
            // Degenerate input: a document always has at least one page
            // with one empty line.
            buffer.push(LineRecord {
                text: String::new(),
                kind: crate::layout::LineKind::Empty,
                indent: 0,
                direction: crate::layout::Direction::Ltr,
                source_offset: 0,
                word_offsets: Vec::new(),
                paragraph: 0,
                ordinal: None,
            });
        }
        pages.push(PageRecord {
            lines: buffer,
            index,
        });
    }

    pages
}

/// Total line capacity check helper used by compositor sanity assertions.
pub fn total_line_count(pages: &[PageRecord]) -> usize {
    pages.iter().map(|p| p.lines.len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{build_lines, Direction, LineKind};

    fn line(text: &str, paragraph: usize) -> LineRecord {
        LineRecord {
            text: text.to_string(),
            kind: LineKind::Plain,
            indent: 0,
            direction: Direction::Ltr,
            source_offset: 0,
            word_offsets: Vec::new(),
            paragraph,
            ordinal: None,
        }
    }

    #[test]
    fn test_empty_input_yields_one_page_one_empty_line() {
        let pages = paginate(&[], 10, None);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].lines.len(), 1);
        assert_eq!(pages[0].lines[0].kind, LineKind::Empty);
        assert_eq!(pages[0].index, 0);
    }

    #[test]
    fn test_empty_string_pipeline_yields_one_page() {
        let lines = build_lines("", 40);
        let pages = paginate(&lines, 10, None);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].lines.len(), 1);
        assert_eq!(pages[0].lines[0].text, "");
        assert_eq!(pages[0].lines[0].kind, LineKind::Empty);
    }

    #[test]
    fn test_single_page_fill() {
        let lines: Vec<_> = (0..3).map(|i| line(&format!("l{}", i), i)).collect();
        let pages = paginate(&lines, 5, None);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].lines.len(), 3);
    }

    #[test]
    fn test_exact_capacity_split() {
        let lines: Vec<_> = (0..10).map(|i| line(&format!("l{}", i), i)).collect();
        let pages = paginate(&lines, 5, None);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].lines.len(), 5);
        assert_eq!(pages[1].lines.len(), 5);
        assert_eq!(pages[1].index, 1);
    }

    #[test]
    fn test_first_page_reduced_capacity() {
        let lines: Vec<_> = (0..8).map(|i| line(&format!("l{}", i), i)).collect();
        let pages = paginate(&lines, 5, Some(3));
        assert_eq!(pages[0].lines.len(), 3);
        assert_eq!(pages[1].lines.len(), 5);
    }

    #[test]
    fn test_completeness_no_loss_no_duplication() {
        let text = "alpha beta gamma\ndelta epsilon\nzeta eta theta iota kappa";
        let lines = build_lines(text, 12);
        let pages = paginate(&lines, 4, None);
        let rejoined: Vec<String> = pages
            .iter()
            .flat_map(|p| p.lines.iter().map(|l| l.text.clone()))
            .collect();
        let original: Vec<String> = lines.iter().map(|l| l.text.clone()).collect();
        // Widow/orphan control may reorder page boundaries but never the
        // line sequence itself.
        assert_eq!(rejoined, original);
    }

    #[test]
    fn test_orphan_protection() {
        // A single-line paragraph fills slots 0..4 of a 5-line page; a
        // 3-line paragraph then begins. Its first line must not sit alone in
        // the last slot.
        let mut lines: Vec<_> = (0..4).map(|i| line(&format!("intro{}", i), i)).collect();
        lines.push(line("para a", 4));
        lines.push(line("para b", 4));
        lines.push(line("para c", 4));
        let pages = paginate(&lines, 5, None);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].lines.len(), 4);
        assert_eq!(pages[1].lines.len(), 3);
        assert_eq!(pages[1].lines[0].text, "para a");
    }

    #[test]
    fn test_widow_protection() {
        // A 3-line paragraph would split 2/1 across the boundary, leaving
        // its last line alone on page 1. The paginator pulls one line back
        // so the split becomes 1/2.
        let mut lines = vec![line("intro0", 0), line("intro1", 1), line("intro2", 2)];
        lines.push(line("para a", 3));
        lines.push(line("para b", 3));
        lines.push(line("para c", 3));
        let pages = paginate(&lines, 5, None);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].lines.len(), 4);
        assert_eq!(pages[1].lines.len(), 2);
        assert_eq!(pages[1].lines[0].text, "para b");
        assert_eq!(pages[1].lines[1].text, "para c");
    }

    #[test]
    fn test_no_widow_pull_for_two_line_pages() {
        // Pulling back must never leave the current page empty.
        let lines = vec![line("a", 0), line("b", 0)];
        let pages = paginate(&lines, 1, None);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].lines.len(), 1);
        assert_eq!(pages[1].lines.len(), 1);
    }

    #[test]
    fn test_sequential_indices() {
        let lines: Vec<_> = (0..12).map(|i| line(&format!("l{}", i), i)).collect();
        let pages = paginate(&lines, 4, None);
        for (i, page) in pages.iter().enumerate() {
            assert_eq!(page.index, i);
        }
    }

    #[test]
    fn test_wrapped_paragraph_on_three_line_pages() {
        let text = "Hello world. This is a test paragraph that should wrap across \
                    multiple lines because it is intentionally long enough to exceed \
                    a single line width budget of say forty characters.";
        let lines = build_lines(text, 40);
        let pages = paginate(&lines, 3, None);
        assert!(pages.len() >= 2);
        assert_eq!(pages[0].lines[0].source_offset, 0);
        // No page may hold exactly one line of this multi-line paragraph
        // while an adjacent split keeping two together was available.
        for page in &pages {
            if page.lines.len() == 1 && pages.len() > 1 {
                let solo = &page.lines[0];
                let para_total = lines
                    .iter()
                    .filter(|l| l.paragraph == solo.paragraph)
                    .count();
                assert!(
                    para_total <= 1 || page.index + 1 < pages.len(),
                    "widow left isolated on final page"
                );
            }
        }
    }

    #[test]
    fn test_total_line_count() {
        let lines: Vec<_> = (0..7).map(|i| line(&format!("l{}", i), i)).collect();
        let pages = paginate(&lines, 3, None);
        assert_eq!(total_line_count(&pages), 7);
    }
}
