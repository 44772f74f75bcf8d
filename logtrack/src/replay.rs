//! Replay of plain-text log files through a tracker.
//!
//! Each non-blank line is `LEVEL [thread] message`; the thread is optional
//! and each distinct thread gets its own context. Lines without a known
//! level are replayed as `INFO`.

use logtrack_core::{ContextKey, LogRecord, Outcome, RecordLevel, TrackError, Tracker};
use std::collections::HashMap;
use std::io::BufRead;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayLine<'a> {
    pub level: RecordLevel,
    pub thread: Option<&'a str>,
    pub message: &'a str,
}

pub fn parse_line(line: &str) -> Option<ReplayLine<'_>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (level, rest) = match line.split_once(char::is_whitespace) {
        Some((first, rest)) => match first.parse::<RecordLevel>() {
            Ok(level) => (level, rest.trim_start()),
            Err(_) => (RecordLevel::Info, line),
        },
        None => match line.parse::<RecordLevel>() {
            Ok(level) => (level, ""),
            Err(_) => (RecordLevel::Info, line),
        },
    };

    let (thread, message) = match rest.strip_prefix('[').and_then(|r| r.split_once(']')) {
        Some((thread, message)) if !thread.is_empty() => (Some(thread), message.trim_start()),
        _ => (None, rest),
    };

    Some(ReplayLine {
        level,
        thread,
        message,
    })
}

/// Summary of a replay run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayStats {
    pub records: usize,
    pub rejected: usize,
}

/// Feed every line of `input` to `tracker`. Records with invalid structured
/// values are counted and skipped.
pub fn replay<R: BufRead>(tracker: &Tracker, input: R) -> std::io::Result<ReplayStats> {
    let mut contexts: HashMap<String, ContextKey> = HashMap::new();
    let mut stats = ReplayStats::default();

    for (index, line) in input.lines().enumerate() {
        let line = line?;
        let Some(parsed) = parse_line(&line) else {
            continue;
        };

        let mut record = LogRecord::new(parsed.level, parsed.message);
        if let Some(thread) = parsed.thread {
            let next = ContextKey::from_raw(u64::MAX - contexts.len() as u64);
            let key = *contexts.entry(thread.to_string()).or_insert(next);
            record = record.with_thread_name(thread).in_context(key);
        }

        stats.records += 1;
        match tracker.append(&record) {
            Ok(Outcome::Disabled) => {
                tracing::warn!(target: "logtrack::replay", "tracker is not started");
                break;
            }
            Ok(outcome) => {
                tracing::debug!(target: "logtrack::replay", line = index + 1, ?outcome);
            }
            Err(e @ TrackError::InvalidValue { .. }) => {
                tracing::warn!(target: "logtrack::replay", line = index + 1, "{e}");
                stats.rejected += 1;
            }
            Err(e) => return Err(std::io::Error::other(e)),
        }
    }
    Ok(stats)
}
