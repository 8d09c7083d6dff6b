//! Task settings shared by the section editor, task lines and the engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("tasks_header must be a markdown heading starting with '#', got '{0}'")]
    HeaderNotHeading(String),
}

/// Settings that shape how tasks are written into notes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Heading under which tasks are inserted
    pub tasks_header: String,

    /// Leave a blank line between headings and list content
    pub blank_line_after_header: bool,

    /// Render provenance links as `[[doc#^a|< Origin]]` instead of `<[[doc#^a]]`
    pub alias_links: bool,

    /// Occurrences of an original recurring task kept materialized ahead
    pub future_repetitions_count: usize,

    /// Leave a moved-out line behind when moving, instead of deleting it
    pub keep_moved_links: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tasks_header: "## Tasks".to_string(),
            blank_line_after_header: true,
            alias_links: true,
            future_repetitions_count: 1,
            keep_moved_links: true,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.tasks_header.trim_start().starts_with('#') {
            return Err(SettingsError::HeaderNotHeading(self.tasks_header.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert_eq!(settings.tasks_header, "## Tasks");
        assert!(settings.blank_line_after_header);
        assert!(settings.alias_links);
        assert_eq!(settings.future_repetitions_count, 1);
        assert!(settings.keep_moved_links);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn header_must_be_heading() {
        let settings = Settings {
            tasks_header: "Tasks".to_string(),
            ..Settings::default()
        };
        assert_eq!(
            settings.validate(),
            Err(SettingsError::HeaderNotHeading("Tasks".to_string()))
        );
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let settings: Settings = toml::from_str("alias_links = false").unwrap();
        assert!(!settings.alias_links);
        assert_eq!(settings.tasks_header, "## Tasks");
    }
}
