//! Task lines embedded in markdown notes
//!
//! A task line is a list item with a checkbox:
//!
//! ```text
//! - [ ] buy milk ; every week on Sunday ^task-k3x9
//! - [>] call the bank >[[2021-01-01]] ^task-abcd
//! - [ ] call the bank [[2020-12-31#^task-abcd|< Origin]]
//! - [ ] buy milk ; every week on Sunday [[2020-12-31#^task-k3x9|<< Origin]]
//! ```
//!
//! Parsing is a fixed sequence of extractions over the immutable line:
//! provenance links, then the anchor, then the recurrence phrase in what is
//! left. The stripped body is computed once and every rendering is built
//! from it, so rewrites never re-derive "the line minus this token".

use std::ops::Range;
use std::sync::LazyLock;

use regex_lite::Regex;
use serde::Serialize;
use thiserror::Error;

use super::anchor::{Anchor, AnchorError, ANCHOR_PREFIX};
use super::document::DocumentId;
use super::recurrence::RecurrenceError;
use super::repeat::RepeatAdapter;
use super::section::{heading_depth, line_has_anchor};
use super::settings::Settings;

/// Checkbox glyphs recognized by both the fast and the precise test
const CHECKBOX_GLYPHS: [char; 5] = [' ', 'x', 'X', '>', '-'];

const RECURRENCE_MARKERS: [char; 2] = [';', '📅'];

/// Indentation accepted before the checkbox by both recognition tiers
const INDENT_CHARS: [char; 2] = [' ', '\t'];

static CHECKBOX_RE: LazyLock<Regex> = LazyLock::new(|| {
    let class: String = CHECKBOX_GLYPHS
        .iter()
        .map(|c| match c {
            '-' => r"\-".to_string(),
            c => c.to_string(),
        })
        .collect();
    Regex::new(&format!(r"^([ \t]*)- \[([{}])\] ", class)).unwrap()
});

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(<<|<|>)?\[\[([^\]]+)\]\]").unwrap());

static ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"\^({}[-a-zA-Z0-9]+)", ANCHOR_PREFIX)).unwrap());

static MARKDOWN_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]\([^)]*\)").unwrap());

#[derive(Debug, Error, PartialEq)]
pub enum TaskError {
    #[error("Line {} is not a task", .0 + 1)]
    NotATask(usize),

    #[error("Task '{text}' is no longer in {document}")]
    StaleLine { document: String, text: String },

    #[error("Cannot skip this task: {0}")]
    CannotSkip(&'static str),

    #[error("Task '{0}' is a copy but has no traceable origin")]
    UnresolvableOrigin(String),

    #[error("The task this copy was moved from is missing in {0}")]
    OriginMissing(String),

    #[error("Task has no anchor")]
    MissingAnchor,

    #[error("Task does not have a valid recurrence")]
    NoRecurrence,

    #[error("{0} is not a dated note")]
    UndatedDocument(String),

    #[error(transparent)]
    Anchor(#[from] AnchorError),

    #[error(transparent)]
    Recurrence(#[from] RecurrenceError),
}

/// Checkbox state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Incomplete,
    Complete,
    Skipped,
    MovedOut,
}

impl TaskState {
    pub fn from_glyph(glyph: char) -> Option<Self> {
        match glyph {
            ' ' => Some(TaskState::Incomplete),
            'x' | 'X' => Some(TaskState::Complete),
            '-' => Some(TaskState::Skipped),
            '>' => Some(TaskState::MovedOut),
            _ => None,
        }
    }

    pub fn glyph(&self) -> char {
        match self {
            TaskState::Incomplete => ' ',
            TaskState::Complete => 'x',
            TaskState::Skipped => '-',
            TaskState::MovedOut => '>',
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Incomplete => "incomplete",
            TaskState::Complete => "complete",
            TaskState::Skipped => "skipped",
            TaskState::MovedOut => "moved_out",
        }
    }
}

/// Cheap prefix test used when scanning whole documents
pub fn is_task_line(line: &str) -> bool {
    let Some(rest) = line.trim_start_matches(INDENT_CHARS).strip_prefix("- [") else {
        return false;
    };
    let mut chars = rest.chars();
    match chars.next() {
        Some(glyph) if CHECKBOX_GLYPHS.contains(&glyph) => chars.as_str().starts_with("] "),
        _ => false,
    }
}

/// Precise anchored test; agrees with [`is_task_line`] on glyphs and indentation
pub fn checkbox_state(line: &str) -> Option<TaskState> {
    CHECKBOX_RE
        .captures(line)
        .and_then(|caps| caps.get(2))
        .and_then(|m| m.as_str().chars().next())
        .and_then(TaskState::from_glyph)
}

/// A wiki link recording where a task moved to or came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvenanceLink {
    pub document: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<Anchor>,
    #[serde(skip)]
    raw: String,
}

impl ProvenanceLink {
    fn moved_to(document: &str) -> Self {
        Self {
            document: document.to_string(),
            anchor: None,
            raw: format!(">[[{}]]", document),
        }
    }

    /// The link as written in the line
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LinkKind {
    MovedTo,
    MovedFrom,
    RepeatsFrom,
}

/// Recurrence annotation of a task
#[derive(Debug, Clone, PartialEq)]
pub enum Recurrence {
    None,
    Invalid {
        phrase: String,
        error: RecurrenceError,
    },
    Valid(RepeatAdapter),
}

/// Byte ranges of wiki links and markdown links in `text`
fn link_spans(text: &str) -> Vec<Range<usize>> {
    LINK_RE
        .find_iter(text)
        .chain(MARKDOWN_LINK_RE.find_iter(text))
        .map(|m| m.start()..m.end())
        .collect()
}

/// Number of lines after `index` indented deeper than it, up to the first blank line
pub fn sub_content_len(lines: &[String], index: usize) -> usize {
    let Some(line) = lines.get(index) else {
        return 0;
    };
    let width = indent_width(line);

    lines[index + 1..]
        .iter()
        .take_while(|l| !l.trim().is_empty() && indent_width(l) > width)
        .count()
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

/// Headings from the tasks header down to the nearest heading enclosing `index`.
/// Empty when the line is not under the tasks header.
fn heading_path_for(lines: &[String], index: usize, tasks_header: &str) -> Vec<String> {
    let header = tasks_header.trim_end();
    let header_depth = heading_depth(header);
    let mut path = Vec::new();
    let mut depth = usize::MAX;

    for line in lines[..index.min(lines.len())].iter().rev() {
        let d = heading_depth(line);
        if d == 0 || d >= depth {
            continue;
        }

        let heading = line.trim_end();
        if heading == header {
            path.push(heading.to_string());
            path.reverse();
            return path;
        }
        if d <= header_depth {
            break;
        }

        path.push(heading.to_string());
        depth = d;
    }

    Vec::new()
}

fn push_part(text: &mut String, part: &str) {
    if !text.ends_with(char::is_whitespace) {
        text.push(' ');
    }
    text.push_str(part);
}

/// A task parsed from one line of a note
#[derive(Debug, Clone)]
pub struct TaskLine {
    document: DocumentId,
    line_index: usize,
    original: String,
    text: String,
    indent: String,
    state: TaskState,
    body: String,
    marker_at: Option<usize>,
    anchor: Option<Anchor>,
    recurrence: Recurrence,
    moved_to: Option<ProvenanceLink>,
    moved_from: Option<ProvenanceLink>,
    repeats_from: Option<ProvenanceLink>,
    sub_content: Vec<String>,
    heading_path: Vec<String>,
}

impl TaskLine {
    /// Parses the task on `lines[line_index]`
    pub fn parse(
        document: DocumentId,
        lines: &[String],
        line_index: usize,
        settings: &Settings,
    ) -> Result<Self, TaskError> {
        let line = lines
            .get(line_index)
            .ok_or(TaskError::NotATask(line_index))?;
        let caps = CHECKBOX_RE
            .captures(line)
            .ok_or(TaskError::NotATask(line_index))?;

        let indent = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let state = caps
            .get(2)
            .and_then(|m| m.as_str().chars().next())
            .and_then(TaskState::from_glyph)
            .ok_or(TaskError::NotATask(line_index))?;
        let content_start = caps.get(0).map(|m| m.end()).unwrap_or(0);
        let content = &line[content_start..];

        // Provenance links
        let mut moved_to = None;
        let mut moved_from = None;
        let mut repeats_from = None;
        let mut stripped = String::with_capacity(content.len());
        let mut last = 0;

        for caps in LINK_RE.captures_iter(content) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let prefix = caps.get(1).map(|m| m.as_str());
            let inner = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

            let (target, alias) = match inner.split_once('|') {
                Some((target, alias)) => (target, Some(alias.trim())),
                None => (inner, None),
            };
            let (document_name, link_anchor) = match target.split_once("#^") {
                Some((doc, anchor)) => (doc, anchor.parse::<Anchor>().ok()),
                None => (target, None),
            };

            let kind = match (prefix, alias) {
                (Some(">"), _) => Some(LinkKind::MovedTo),
                (Some("<<"), _) => Some(LinkKind::RepeatsFrom),
                (None, Some(a)) if a.starts_with("<<") => Some(LinkKind::RepeatsFrom),
                (Some("<"), _) => Some(LinkKind::MovedFrom),
                (None, Some(a)) if a.starts_with('<') => Some(LinkKind::MovedFrom),
                _ => None,
            };

            let slot = match kind {
                Some(LinkKind::MovedTo) if moved_to.is_none() => &mut moved_to,
                Some(LinkKind::MovedFrom) if moved_from.is_none() && link_anchor.is_some() => {
                    &mut moved_from
                }
                Some(LinkKind::RepeatsFrom)
                    if repeats_from.is_none() && link_anchor.is_some() =>
                {
                    &mut repeats_from
                }
                _ => continue,
            };

            *slot = Some(ProvenanceLink {
                document: document_name.trim().to_string(),
                anchor: link_anchor,
                raw: whole.as_str().to_string(),
            });
            stripped.push_str(&content[last..whole.start()]);
            last = whole.end();
        }
        stripped.push_str(&content[last..]);

        // Anchor
        let mut anchor = None;
        if let Some(caps) = ANCHOR_RE.captures(&stripped) {
            if let (Some(whole), Some(token)) = (caps.get(0), caps.get(1)) {
                anchor = token.as_str().parse::<Anchor>().ok();
                let (start, end) = (whole.start(), whole.end());
                stripped.replace_range(start..end, "");
            }
        }
        let anchor = anchor
            .or_else(|| moved_from.as_ref().and_then(|l: &ProvenanceLink| l.anchor.clone()))
            .or_else(|| repeats_from.as_ref().and_then(|l: &ProvenanceLink| l.anchor.clone()));

        let body = stripped.trim_end().to_string();

        // Recurrence, ignoring markers inside links
        let links = link_spans(&body);
        let markers: Vec<(usize, char)> = body
            .char_indices()
            .filter(|(_, c)| RECURRENCE_MARKERS.contains(c))
            .filter(|(at, _)| !links.iter().any(|span| span.contains(at)))
            .collect();
        let (marker_at, recurrence) = match markers.as_slice() {
            [] => (None, Recurrence::None),
            [(at, marker)] => {
                let phrase = body[at + marker.len_utf8()..].trim();
                (Some(*at), Self::parse_recurrence(phrase))
            }
            [(at, marker), ..] => (
                Some(*at),
                Recurrence::Invalid {
                    phrase: body[at + marker.len_utf8()..].trim().to_string(),
                    error: RecurrenceError::MultipleMarkers,
                },
            ),
        };

        // Surroundings
        let sub_len = sub_content_len(lines, line_index);
        let sub_content = lines[line_index + 1..line_index + 1 + sub_len].to_vec();
        let heading_path = heading_path_for(lines, line_index, &settings.tasks_header);

        Ok(Self {
            document,
            line_index,
            original: line.clone(),
            text: line.clone(),
            indent: indent.to_string(),
            state,
            body,
            marker_at,
            anchor,
            recurrence,
            moved_to,
            moved_from,
            repeats_from,
            sub_content,
            heading_path,
        })
    }

    fn parse_recurrence(phrase: &str) -> Recurrence {
        if phrase.is_empty() {
            return Recurrence::Invalid {
                phrase: String::new(),
                error: RecurrenceError::Empty,
            };
        }

        match RepeatAdapter::parse(phrase) {
            Ok(adapter) => match adapter.frequency() {
                Ok(_) => Recurrence::Valid(adapter),
                Err(error) => Recurrence::Invalid {
                    phrase: phrase.to_string(),
                    error,
                },
            },
            Err(error) => Recurrence::Invalid {
                phrase: phrase.to_string(),
                error,
            },
        }
    }

    /// Parses every task line of a document
    pub fn scan(document: &DocumentId, lines: &[String], settings: &Settings) -> Vec<TaskLine> {
        lines
            .iter()
            .enumerate()
            .filter(|(_, line)| is_task_line(line))
            .filter_map(|(i, _)| TaskLine::parse(document.clone(), lines, i, settings).ok())
            .collect()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn document(&self) -> &DocumentId {
        &self.document
    }

    pub fn line_index(&self) -> usize {
        self.line_index
    }

    /// Current rendering of the line
    pub fn text(&self) -> &str {
        &self.text
    }

    /// True when the line was changed since it was parsed or last persisted
    pub fn is_modified(&self) -> bool {
        self.text != self.original
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn anchor(&self) -> Option<&Anchor> {
        self.anchor.as_ref()
    }

    /// Content without checkbox, links and anchor (recurrence phrase included)
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Content before the recurrence marker
    pub fn title(&self) -> &str {
        match self.marker_at {
            Some(at) => self.body[..at].trim_end(),
            None => &self.body,
        }
    }

    pub fn recurrence(&self) -> &Recurrence {
        &self.recurrence
    }

    /// The recurrence when present and valid
    pub fn repeater(&self) -> Option<&RepeatAdapter> {
        match &self.recurrence {
            Recurrence::Valid(adapter) => Some(adapter),
            _ => None,
        }
    }

    pub fn has_valid_recurrence(&self) -> bool {
        self.repeater().is_some()
    }

    pub fn moved_to(&self) -> Option<&ProvenanceLink> {
        self.moved_to.as_ref()
    }

    pub fn moved_from(&self) -> Option<&ProvenanceLink> {
        self.moved_from.as_ref()
    }

    pub fn repeats_from(&self) -> Option<&ProvenanceLink> {
        self.repeats_from.as_ref()
    }

    pub fn sub_content(&self) -> &[String] {
        &self.sub_content
    }

    pub fn heading_path(&self) -> &[String] {
        &self.heading_path
    }

    /// True unless the line is a moved or repeated copy of another task
    pub fn is_original_instance(&self) -> bool {
        self.moved_from.is_none() && self.repeats_from.is_none()
    }

    /// True for recurring tasks that still need an anchor
    pub fn needs_anchor(&self) -> bool {
        self.anchor.is_none() && self.has_valid_recurrence()
    }

    /// Name of the document holding the canonical instance
    pub fn original_file_name(&self) -> Result<String, TaskError> {
        if self.is_original_instance() {
            return Ok(self.document.name().to_string());
        }

        self.moved_from
            .as_ref()
            .or(self.repeats_from.as_ref())
            .map(|link| link.document.clone())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| TaskError::UnresolvableOrigin(self.text.clone()))
    }

    /// Finds this task in the current lines of its document: by position,
    /// then by anchor, then by exact text
    pub fn locate(&self, lines: &[String]) -> Result<usize, TaskError> {
        if lines
            .get(self.line_index)
            .is_some_and(|line| *line == self.original)
        {
            return Ok(self.line_index);
        }

        if let Some(anchor) = &self.anchor {
            if let Some(index) = lines
                .iter()
                .position(|line| is_task_line(line) && line_has_anchor(line, anchor))
            {
                return Ok(index);
            }
        }

        lines
            .iter()
            .position(|line| *line == self.original)
            .ok_or_else(|| TaskError::StaleLine {
                document: self.document.to_string(),
                text: self.original.clone(),
            })
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    fn render(&self) -> String {
        let mut text = format!("{}- [{}] {}", self.indent, self.state.glyph(), self.body);

        for link in [&self.moved_from, &self.repeats_from].into_iter().flatten() {
            push_part(&mut text, &link.raw);
        }
        if let Some(link) = &self.moved_to {
            push_part(&mut text, &link.raw);
        }
        if let Some(anchor) = &self.anchor {
            let carried = [&self.moved_from, &self.repeats_from]
                .into_iter()
                .flatten()
                .any(|link| link.anchor.as_ref() == Some(anchor));
            if !carried {
                push_part(&mut text, &anchor.token());
            }
        }

        text
    }

    fn rerender(&mut self) {
        self.text = self.render();
    }

    pub fn set_state(&mut self, state: TaskState) {
        self.state = state;
        self.rerender();
    }

    pub fn set_anchor(&mut self, anchor: Anchor) {
        self.anchor = Some(anchor);
        self.rerender();
    }

    /// Marks the task as moved out to `document_name`
    pub fn mark_moved_to(&mut self, document_name: &str) {
        self.state = TaskState::MovedOut;
        self.moved_to = Some(ProvenanceLink::moved_to(document_name));
        self.rerender();
    }

    /// Resets the checkbox and drops the moved-to link, keeping the anchor
    pub fn restore(&mut self) {
        self.state = TaskState::Incomplete;
        self.moved_to = None;
        self.rerender();
    }

    /// Replaces the recurrence phrase with the rendering of `adapter`
    pub fn set_recurrence(&mut self, adapter: RepeatAdapter) {
        let phrase = adapter.to_text();

        match self.marker_at {
            Some(at) => {
                let marker_len = self.body[at..]
                    .chars()
                    .next()
                    .map(char::len_utf8)
                    .unwrap_or(1);
                self.body.truncate(at + marker_len);
                self.body.push(' ');
                self.body.push_str(&phrase);
            }
            None => {
                let at = self.body.trim_end().len();
                self.body.truncate(at);
                self.body.push_str(" ;");
                self.marker_at = Some(at + 1);
                self.body.push(' ');
                self.body.push_str(&phrase);
            }
        }

        self.recurrence = Recurrence::Valid(adapter);
        self.rerender();
    }

    /// Edits the recurrence in place. Returns true if any facet changed,
    /// in which case the phrase in the line is re-rendered.
    pub fn edit_repeater<F>(&mut self, edit: F) -> Result<bool, TaskError>
    where
        F: FnOnce(&mut RepeatAdapter) -> Result<(), RecurrenceError>,
    {
        let Recurrence::Valid(adapter) = &mut self.recurrence else {
            return Err(TaskError::NoRecurrence);
        };

        let before = adapter.revision();
        edit(adapter)?;
        if adapter.revision() == before {
            return Ok(false);
        }

        let adapter = adapter.clone();
        self.set_recurrence(adapter);
        Ok(true)
    }

    /// Records that the current text is what the document holds at `index`
    pub fn mark_persisted(&mut self, index: usize) {
        self.original = self.text.clone();
        self.line_index = index;
    }

    // =========================================================================
    // Line rewrites
    // =========================================================================

    fn origin_link(&self, settings: &Settings, arrow: &str) -> Result<String, TaskError> {
        let anchor = self.anchor.as_ref().ok_or(TaskError::MissingAnchor)?;
        let origin = self.original_file_name()?;

        Ok(if settings.alias_links {
            format!("[[{}#^{}|{} Origin]]", origin, anchor, arrow)
        } else {
            format!("{}[[{}#^{}]]", arrow, origin, anchor)
        })
    }

    /// The copy written into a future note: unchecked, recurrence kept,
    /// linking back to the canonical instance
    pub fn line_as_repeated(&self, settings: &Settings) -> Result<String, TaskError> {
        let mut text = format!("{}- [ ] {}", self.indent, self.body);
        push_part(&mut text, &self.origin_link(settings, "<<")?);
        Ok(text)
    }

    /// The copy written into the note a task is moved to
    pub fn line_as_moved_from(&self, settings: &Settings) -> Result<String, TaskError> {
        let mut text = format!("{}- [ ] {}", self.indent, self.body);
        push_part(&mut text, &self.origin_link(settings, "<")?);
        Ok(text)
    }

    /// The line left behind after moving to `document_name`
    pub fn line_as_moved_to(&self, document_name: &str) -> String {
        let mut task = self.clone();
        task.mark_moved_to(document_name);
        task.text
    }

    pub fn line_as_skipped(&self) -> String {
        let mut task = self.clone();
        task.set_state(TaskState::Skipped);
        task.text
    }

    pub fn line_as_restored(&self) -> String {
        let mut task = self.clone();
        task.restore();
        task.text
    }

    pub fn with_anchor(&self, anchor: Anchor) -> String {
        let mut task = self.clone();
        task.set_anchor(anchor);
        task.text
    }
}
