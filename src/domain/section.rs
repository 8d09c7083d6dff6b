//! Section-aware editing of note lines
//!
//! A section is the run of lines between a heading and the next heading of
//! equal or lesser depth. These helpers locate or create sections and splice
//! task lines into them, keeping the blank-line-around-heading convention
//! when it is enabled. None of them fail: absence is `None` or the header index.

use super::anchor::{is_anchor_char, Anchor};
use super::settings::Settings;

/// Count of leading `#` after leading whitespace; 0 for non-headings
pub fn heading_depth(line: &str) -> usize {
    line.trim_start().chars().take_while(|c| *c == '#').count()
}

fn is_heading(line: &str) -> bool {
    heading_depth(line) > 0
}

/// Returns the index of `header`, appending it when absent
pub fn locate_or_create_section(lines: &mut Vec<String>, header: &str, settings: &Settings) -> usize {
    let end = lines.len();
    locate_or_create_within(lines, header, 0, end, settings)
}

/// Locates or creates each heading of `path`, each one inside the section of
/// the previous. An empty path means the configured tasks header.
pub fn locate_or_create_heading_path(
    lines: &mut Vec<String>,
    path: &[String],
    settings: &Settings,
) -> usize {
    let default_path = [settings.tasks_header.clone()];
    let path = if path.is_empty() { &default_path[..] } else { path };

    let mut start = 0;
    let mut end = lines.len();
    let mut index = 0;

    for heading in path {
        index = locate_or_create_within(lines, heading, start, end, settings);
        start = index + 1;
        end = section_end(lines, index);
    }

    index
}

fn locate_or_create_within(
    lines: &mut Vec<String>,
    header: &str,
    start: usize,
    end: usize,
    settings: &Settings,
) -> usize {
    let header = header.trim_end();
    let end = end.min(lines.len());
    let start = start.min(end);

    if let Some(offset) = lines[start..end]
        .iter()
        .position(|line| line.trim_end() == header)
    {
        return start + offset;
    }

    if lines.len() == 1 && lines[0].is_empty() {
        lines[0] = header.to_string();
        return 0;
    }

    let mut at = end;
    if settings.blank_line_after_header && at > 0 && !lines[at - 1].is_empty() {
        lines.insert(at, String::new());
        at += 1;
    }
    lines.insert(at, header.to_string());
    at
}

/// Index of the next sibling-or-higher heading after `header_index`, or `lines.len()`
pub fn section_end(lines: &[String], header_index: usize) -> usize {
    let depth = lines.get(header_index).map(|l| heading_depth(l)).unwrap_or(0);

    lines
        .iter()
        .enumerate()
        .skip(header_index + 1)
        .find(|(_, line)| {
            let d = heading_depth(line);
            d > 0 && d <= depth
        })
        .map(|(i, _)| i)
        .unwrap_or(lines.len())
}

/// Last non-blank line of the section opened at `header_index`, or
/// `header_index` when the section is empty
pub fn last_content_line_of(lines: &[String], header_index: usize) -> usize {
    let end = section_end(lines, header_index);

    (header_index + 1..end)
        .rev()
        .find(|i| !lines[*i].trim().is_empty())
        .unwrap_or(header_index)
}

/// Splices `new_lines` in at `at`. Returns the index of the first inserted line.
///
/// With `blank_line_after_header`, a blank line is added before the block when
/// it directly follows a heading, and after it when a heading follows or the
/// block ends the document.
pub fn insert_lines(
    lines: &mut Vec<String>,
    new_lines: &[String],
    at: usize,
    settings: &Settings,
) -> usize {
    let at = at.min(lines.len());
    let mut block = Vec::with_capacity(new_lines.len() + 2);
    let mut first = at;

    if settings.blank_line_after_header && at > 0 && is_heading(&lines[at - 1]) {
        block.push(String::new());
        first += 1;
    }

    block.extend(new_lines.iter().cloned());

    if settings.blank_line_after_header && (at == lines.len() || is_heading(&lines[at])) {
        block.push(String::new());
    }

    lines.splice(at..at, block);
    first
}

/// Removes up to `count` lines starting at `start`
pub fn remove_lines(lines: &mut Vec<String>, start: usize, count: usize) {
    let start = start.min(lines.len());
    let end = start.saturating_add(count).min(lines.len());
    lines.drain(start..end);
}

/// First line containing `^anchor` as a whole token
pub fn index_of_anchor(lines: &[String], anchor: &Anchor) -> Option<usize> {
    let token = anchor.token();
    lines.iter().position(|line| contains_token(line, &token))
}

/// True if `line` contains `^anchor` as a whole token
pub fn line_has_anchor(line: &str, anchor: &Anchor) -> bool {
    contains_token(line, &anchor.token())
}

fn contains_token(line: &str, token: &str) -> bool {
    line.match_indices(token).any(|(i, _)| {
        !line[i + token.len()..]
            .chars()
            .next()
            .is_some_and(is_anchor_char)
    })
}
