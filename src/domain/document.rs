//! Document identity and line splitting

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a note, as used inside wiki links (`[[2020-12-31]]`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Splits document text into lines. A trailing newline yields a final empty line,
/// so `join_lines(split_lines(text)) == text`.
pub fn split_lines(text: &str) -> Vec<String> {
    text.split('\n').map(str::to_string).collect()
}

/// Inverse of [`split_lines`]
pub fn join_lines(lines: &[String]) -> String {
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_join_preserve_text() {
        for text in ["", "a", "a\n", "# Hello\n\n## Tasks\n\n- [ ] x\n"] {
            assert_eq!(join_lines(&split_lines(text)), text);
        }
    }

    #[test]
    fn empty_text_is_one_empty_line() {
        assert_eq!(split_lines(""), vec![String::new()]);
    }
}
