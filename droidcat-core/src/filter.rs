//! Log entry filtering
//!
//! An entry passes when its level is at least the minimum level and, if a
//! text filter is set, its tag or message contains the filter text
//! (case-insensitive). The two checks are independent, so their order does
//! not matter.

use crate::{LogLevel, LogcatEntry};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawFilter")]
pub struct LogFilter {
    min_level: LogLevel,
    /// Stored lowercased
    text: Option<String>,
}

/// Deserialized form; text is normalized on conversion
#[derive(Default, Deserialize)]
#[serde(default)]
struct RawFilter {
    min_level: LogLevel,
    text: Option<String>,
}

impl From<RawFilter> for LogFilter {
    fn from(raw: RawFilter) -> Self {
        let mut filter = LogFilter::new().with_min_level(raw.min_level);
        filter.set_text(raw.text.as_deref());
        filter
    }
}

impl LogFilter {
    /// Accept-everything filter
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    pub fn with_text<S: AsRef<str>>(mut self, text: S) -> Self {
        self.set_text(Some(text.as_ref()));
        self
    }

    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn set_min_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    /// Set or clear the text filter; empty text clears it
    pub fn set_text(&mut self, text: Option<&str>) {
        self.text = text
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);
    }

    /// Check if an entry should be retained
    pub fn matches(&self, entry: &LogcatEntry) -> bool {
        self.check_level(entry) && self.check_text(entry)
    }

    fn check_level(&self, entry: &LogcatEntry) -> bool {
        entry.level >= self.min_level
    }

    fn check_text(&self, entry: &LogcatEntry) -> bool {
        match &self.text {
            None => true,
            Some(needle) => {
                entry.tag.to_lowercase().contains(needle.as_str())
                    || entry.message.to_lowercase().contains(needle.as_str())
            }
        }
    }
}
