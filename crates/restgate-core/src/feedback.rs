//! Leveled diagnostic messages collected while a request is processed.
//!
//! Any stage can record feedback. Messages are grouped by level in the order
//! each level was first used, and kept in arrival order within a level. The
//! overall request status is `error` as soon as one error-level message
//! exists.

use crate::envelope::EnvelopeStatus;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Write as _};

/// Severity of a feedback message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackLevel {
    /// Informational.
    Info,
    /// Something was off but the request continued.
    Warning,
    /// The request failed.
    Error,
}

impl FeedbackLevel {
    /// Returns the lowercase level name used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl Display for FeedbackLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One flattened feedback record as it appears in `meta.feedback`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    /// The expanded message.
    pub message: String,
    /// The level it was recorded at.
    pub level: FeedbackLevel,
}

/// Accumulates feedback for a single request.
///
/// # Example
///
/// ```
/// use restgate_core::{EnvelopeStatus, FeedbackCollector, FeedbackLevel};
///
/// let mut feedback = FeedbackCollector::new();
/// feedback.warning("Unable to establish class");
/// assert_eq!(feedback.status(), EnvelopeStatus::Ok);
///
/// feedback.record_fmt(FeedbackLevel::Error, "limit %s reached", &[&100]);
/// assert_eq!(feedback.status(), EnvelopeStatus::Error);
/// assert_eq!(feedback.flatten()[1].message, "limit 100 reached");
/// ```
#[derive(Debug, Clone, Default)]
pub struct FeedbackCollector {
    messages: IndexMap<FeedbackLevel, Vec<String>>,
}

impl FeedbackCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message at the given level.
    pub fn record(&mut self, level: FeedbackLevel, message: impl Into<String>) {
        self.messages.entry(level).or_default().push(message.into());
    }

    /// Appends a parameterized message, expanding it now.
    ///
    /// See [`expand_format`] for the supported placeholders.
    pub fn record_fmt(&mut self, level: FeedbackLevel, format: &str, args: &[&dyn Display]) {
        self.record(level, expand_format(format, args));
    }

    /// Records an info message.
    pub fn info(&mut self, message: impl Into<String>) {
        self.record(FeedbackLevel::Info, message);
    }

    /// Records a warning.
    pub fn warning(&mut self, message: impl Into<String>) {
        self.record(FeedbackLevel::Warning, message);
    }

    /// Records an error.
    pub fn error(&mut self, message: impl Into<String>) {
        self.record(FeedbackLevel::Error, message);
    }

    /// Returns the raw level → messages mapping.
    #[must_use]
    pub fn snapshot(&self) -> &IndexMap<FeedbackLevel, Vec<String>> {
        &self.messages
    }

    /// Returns the messages recorded at one level.
    #[must_use]
    pub fn messages(&self, level: FeedbackLevel) -> &[String] {
        self.messages.get(&level).map_or(&[], Vec::as_slice)
    }

    /// Flattens into `{message, level}` records, grouped by level.
    #[must_use]
    pub fn flatten(&self) -> Vec<FeedbackEntry> {
        self.messages
            .iter()
            .flat_map(|(level, messages)| {
                messages.iter().map(move |message| FeedbackEntry {
                    message: message.clone(),
                    level: *level,
                })
            })
            .collect()
    }

    /// `error` if any error-level message exists, otherwise `ok`.
    #[must_use]
    pub fn status(&self) -> EnvelopeStatus {
        if self.has_errors() {
            EnvelopeStatus::Error
        } else {
            EnvelopeStatus::Ok
        }
    }

    /// Returns true if at least one error was recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.messages(FeedbackLevel::Error).is_empty()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.values().all(Vec::is_empty)
    }
}

/// Expands a printf-style format string with positional arguments.
///
/// Supported placeholders are `%s` and `%d` (next argument), `%N$s` /
/// `%N$d` (argument `N`, 1-based) and `%%` (literal percent). Unknown
/// sequences are copied through unchanged and missing arguments expand to
/// nothing.
#[must_use]
pub fn expand_format(format: &str, args: &[&dyn Display]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();
    let mut next_arg = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        match chars.peek().copied() {
            Some('%') => {
                chars.next();
                out.push('%');
            }
            Some('s' | 'd') => {
                chars.next();
                if let Some(arg) = args.get(next_arg) {
                    let _ = write!(out, "{arg}");
                }
                next_arg += 1;
            }
            Some(d) if d.is_ascii_digit() => {
                let mut lookahead = chars.clone();
                let mut digits = String::new();
                while let Some(&n) = lookahead.peek() {
                    if !n.is_ascii_digit() {
                        break;
                    }
                    digits.push(n);
                    lookahead.next();
                }
                let positional = lookahead.next() == Some('$')
                    && matches!(lookahead.next(), Some('s' | 'd'));
                match digits.parse::<usize>() {
                    Ok(index) if positional && index > 0 => {
                        chars = lookahead;
                        if let Some(arg) = args.get(index - 1) {
                            let _ = write!(out, "{arg}");
                        }
                    }
                    _ => out.push('%'),
                }
            }
            _ => out.push('%'),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ok_without_errors() {
        let mut feedback = FeedbackCollector::new();
        assert_eq!(feedback.status(), EnvelopeStatus::Ok);
        feedback.info("saved");
        feedback.warning("slow");
        assert_eq!(feedback.status(), EnvelopeStatus::Ok);
    }

    #[test]
    fn test_status_error_with_any_error() {
        let mut feedback = FeedbackCollector::new();
        feedback.info("saved");
        feedback.error("boom");
        assert_eq!(feedback.status(), EnvelopeStatus::Error);
        assert!(feedback.has_errors());
    }

    #[test]
    fn test_flatten_groups_by_first_level_seen() {
        let mut feedback = FeedbackCollector::new();
        feedback.warning("w1");
        feedback.error("e1");
        feedback.warning("w2");
        feedback.info("i1");

        let flat = feedback.flatten();
        let pairs: Vec<_> = flat
            .iter()
            .map(|e| (e.level, e.message.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (FeedbackLevel::Warning, "w1"),
                (FeedbackLevel::Warning, "w2"),
                (FeedbackLevel::Error, "e1"),
                (FeedbackLevel::Info, "i1"),
            ]
        );
    }

    #[test]
    fn test_snapshot_keeps_raw_mapping() {
        let mut feedback = FeedbackCollector::new();
        feedback.error("a");
        feedback.error("b");
        assert_eq!(feedback.snapshot().len(), 1);
        assert_eq!(feedback.messages(FeedbackLevel::Error), ["a", "b"]);
        assert!(feedback.messages(FeedbackLevel::Info).is_empty());
    }

    #[test]
    fn test_entry_serialization() {
        let entry = FeedbackEntry {
            message: "hi".to_string(),
            level: FeedbackLevel::Warning,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json, serde_json::json!({"message": "hi", "level": "warning"}));
    }

    #[test]
    fn test_record_fmt_expands_into_level() {
        let mut feedback = FeedbackCollector::new();
        feedback.record_fmt(FeedbackLevel::Warning, "class %s has no policy", &[&"Bot"]);
        feedback.record_fmt(FeedbackLevel::Error, "%2$s of %1$d", &[&3, &"row"]);

        assert_eq!(feedback.messages(FeedbackLevel::Warning), ["class Bot has no policy"]);
        assert_eq!(feedback.messages(FeedbackLevel::Error), ["row of 3"]);
        assert_eq!(feedback.status(), EnvelopeStatus::Error);
    }

    #[test]
    fn test_expand_sequential() {
        let out = expand_format(
            "You have reached your ratelimit (> %s requests in %s)",
            &[&100, &"1 hour"],
        );
        assert_eq!(out, "You have reached your ratelimit (> 100 requests in 1 hour)");
    }

    #[test]
    fn test_expand_positional_and_literal() {
        assert_eq!(expand_format("%2$s then %1$s", &[&"a", &"b"]), "b then a");
        assert_eq!(expand_format("100%% sure", &[]), "100% sure");
        assert_eq!(expand_format("%x stays", &[]), "%x stays");
        assert_eq!(expand_format("%5 stays", &[]), "%5 stays");
        assert_eq!(expand_format("missing %s", &[]), "missing ");
    }
}
