//! Anchor tokens for tasks
//!
//! Format: `task-{4 base-36 chars}` (e.g., `task-k3x9`), written into the
//! document as `^task-k3x9`.
//!
//! The suffix is derived from the task content, the current timestamp and an
//! attempt counter. Candidates already used in the document are rejected, so
//! anchors are unique per document at the time they are created.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Prefix shared by every generated anchor
pub const ANCHOR_PREFIX: &str = "task-";

/// Number of base-36 characters after the prefix
pub const ANCHOR_SUFFIX_LEN: usize = 4;

const BASE36: &[u8; 36] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Upper bound on collision retries before giving up
const MAX_ATTEMPTS: u32 = 256;

#[derive(Debug, Error, PartialEq)]
pub enum AnchorError {
    #[error("Invalid anchor: expected letters, digits or '-', got '{0}'")]
    Invalid(String),

    #[error("Could not find an unused anchor after {0} attempts")]
    Exhausted(u32),
}

/// Derives a base-36 suffix from content, timestamp and attempt number
fn generate_suffix(content: &str, nanos: i64, attempt: u32) -> String {
    let input = format!("{}{}{}", content, nanos, attempt);
    let hash = blake3::hash(input.as_bytes());
    hash.as_bytes()[..ANCHOR_SUFFIX_LEN]
        .iter()
        .map(|b| BASE36[(*b as usize) % BASE36.len()] as char)
        .collect()
}

/// Returns true for characters allowed inside an anchor token
pub fn is_anchor_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-'
}

/// Stable identity of a task, embedded in the line as `^{anchor}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Anchor(String);

impl Anchor {
    /// Generates a fresh anchor that `taken` does not report as in use
    pub fn generate(content: &str, taken: impl Fn(&Anchor) -> bool) -> Result<Self, AnchorError> {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or(0);

        for attempt in 0..MAX_ATTEMPTS {
            let candidate = Self(format!(
                "{}{}",
                ANCHOR_PREFIX,
                generate_suffix(content, nanos, attempt)
            ));
            if !taken(&candidate) {
                return Ok(candidate);
            }
        }

        Err(AnchorError::Exhausted(MAX_ATTEMPTS))
    }

    /// Returns the token without the leading caret
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the token as written in a document (`^task-abcd`)
    pub fn token(&self) -> String {
        format!("^{}", self.0)
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Anchor {
    type Err = AnchorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_start_matches('^');
        if s.is_empty() || !s.chars().all(is_anchor_char) {
            return Err(AnchorError::Invalid(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for Anchor {
    type Error = AnchorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Anchor> for String {
    fn from(anchor: Anchor) -> Self {
        anchor.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn generated_anchor_format() {
        let anchor = Anchor::generate("- [ ] buy milk", |_| false).unwrap();
        let s = anchor.as_str();

        assert!(s.starts_with("task-"));
        let suffix = &s[5..];
        assert_eq!(suffix.len(), 4);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_eq!(anchor.token(), format!("^{}", s));
    }

    #[test]
    fn generate_skips_taken_candidates() {
        let calls = Cell::new(0);
        let first = Anchor::generate("same content", |_| false).unwrap();

        let anchor = Anchor::generate("same content", |candidate| {
            calls.set(calls.get() + 1);
            calls.get() == 1 || candidate == &first
        })
        .unwrap();

        assert!(calls.get() >= 2);
        assert_ne!(anchor, first);
    }

    #[test]
    fn generate_gives_up_eventually() {
        let result = Anchor::generate("x", |_| true);
        assert_eq!(result, Err(AnchorError::Exhausted(MAX_ATTEMPTS)));
    }

    #[test]
    fn parse_anchor() {
        let anchor: Anchor = "task-abc123".parse().unwrap();
        assert_eq!(anchor.as_str(), "task-abc123");

        let with_caret: Anchor = "^task-abcd".parse().unwrap();
        assert_eq!(with_caret.as_str(), "task-abcd");
    }

    #[test]
    fn parse_invalid_anchor() {
        assert!("".parse::<Anchor>().is_err());
        assert!("task abc".parse::<Anchor>().is_err());
        assert!("task_abc".parse::<Anchor>().is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let anchor: Anchor = "task-k3x9".parse().unwrap();
        let json = serde_json::to_string(&anchor).unwrap();
        assert_eq!(json, "\"task-k3x9\"");

        let parsed: Anchor = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, anchor);
    }
}
