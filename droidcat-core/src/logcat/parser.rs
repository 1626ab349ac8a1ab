//! Threadtime logcat line parsing
//!
//! Grammar: `MM-DD HH:MM:SS.mmm PID TID LEVEL TAG: MESSAGE`.
//!
//! The wire format carries no year, so the host's current year is used.
//! Entries generated just before New Year and parsed just after it are
//! therefore labelled with the wrong year; nothing on the wire allows a
//! better answer.

use crate::{LogLevel, LogcatEntry};
use chrono::{Datelike, Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

/// Logcat line regex (threadtime format)
pub static LOGCAT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<month>\d{2})-(?P<day>\d{2})\s+(?P<hour>\d{2}):(?P<minute>\d{2}):(?P<second>\d{2})\.(?P<millis>\d{3})\s+(?P<pid>\d+)\s+(?P<tid>\d+)\s+(?P<level>[VDIWEFS])\s+(?P<tag>[^:]*?)\s*:\s?(?P<msg>.*)$",
    )
    .expect("logcat pattern is valid")
});

/// Parse a single logcat line, using the current year
pub fn parse_line(raw: &str) -> Option<LogcatEntry> {
    parse_line_with_year(raw, Local::now().year())
}

/// Parse a single logcat line with an explicit year.
///
/// Returns `None` for anything that does not match the grammar, including
/// impossible dates and ids that overflow `u32`.
pub fn parse_line_with_year(raw: &str, year: i32) -> Option<LogcatEntry> {
    let line = raw.trim_end_matches(['\r', '\n']);
    let caps = LOGCAT_RE.captures(line)?;

    let tag = caps["tag"].trim();
    if tag.is_empty() {
        return None;
    }

    let num = |name: &str| caps[name].parse::<u32>().ok();
    let timestamp = NaiveDate::from_ymd_opt(year, num("month")?, num("day")?)?
        .and_hms_milli_opt(num("hour")?, num("minute")?, num("second")?, num("millis")?)?;

    let level = caps["level"].chars().next().and_then(LogLevel::from_code)?;

    Some(LogcatEntry {
        timestamp,
        pid: num("pid")?,
        tid: num("tid")?,
        level,
        tag: tag.to_string(),
        message: caps["msg"].to_string(),
    })
}

/// Check if a line looks like a logcat entry
pub fn is_logcat_line(line: &str) -> bool {
    parse_line(line).is_some()
}
