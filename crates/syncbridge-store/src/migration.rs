//! Migration of legacy waiting-queue files.
//!
//! Older connectors persisted the queue as line-oriented text, one JSON event
//! per line:
//!
//! ```text
//! {"type":"Product","id":[12,13],"action":"update","user":"admin","comment":"","retry":1700000000000,"fails":2}
//! ```
//!
//! Lines that do not parse into a recognized event are skipped. Events that
//! were already past the failure threshold are not carried over.

use serde::Deserialize;
use syncbridge_core::{CommitAction, CommitEvent};

use crate::record;

/// Outcome of reading a legacy queue file.
#[derive(Debug, Default)]
pub struct LegacyMigration {
    pub events: Vec<CommitEvent>,
    /// Lines that were not recognized events.
    pub skipped: usize,
    /// Recognized events that were already obsolete.
    pub obsolete: usize,
}

#[derive(Debug, Deserialize)]
struct LegacyEvent {
    #[serde(rename = "type")]
    object_type: String,
    id: serde_json::Value,
    action: String,
    #[serde(default)]
    user: String,
    #[serde(default)]
    comment: String,
    #[serde(default)]
    retry: i64,
    #[serde(default)]
    fails: u32,
}

/// True if `bytes` holds a legacy queue rather than a record file.
pub fn is_legacy(bytes: &[u8]) -> bool {
    !bytes.is_empty() && !record::is_record_file(bytes)
}

/// Parse a legacy queue file.
pub fn read_legacy(text: &str) -> LegacyMigration {
    let mut out = LegacyMigration::default();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match parse_line(line) {
            Some(event) if event.is_obsolete() => out.obsolete += 1,
            Some(event) => out.events.push(event),
            None => {
                tracing::debug!("skipping unrecognized legacy queue line");
                out.skipped += 1;
            }
        }
    }

    out
}

fn parse_line(line: &str) -> Option<CommitEvent> {
    let legacy: LegacyEvent = serde_json::from_str(line).ok()?;
    let action: CommitAction = legacy.action.parse().ok()?;
    let ids = legacy_ids(&legacy.id)?;
    if legacy.object_type.is_empty() {
        return None;
    }

    let mut event = CommitEvent::new(
        legacy.object_type,
        ids,
        action,
        legacy.user,
        legacy.comment,
        legacy.retry,
    );
    for _ in 0..legacy.fails {
        event.record_failure(legacy.retry);
    }
    Some(event)
}

fn legacy_ids(raw: &serde_json::Value) -> Option<Vec<String>> {
    fn scalar(v: &serde_json::Value) -> Option<String> {
        match v {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    match raw {
        serde_json::Value::Array(items) if !items.is_empty() => {
            items.iter().map(scalar).collect()
        }
        other => scalar(other).map(|id| vec![id]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncbridge_core::OBSOLETE_THRESHOLD;

    #[test]
    fn test_reads_valid_lines() {
        let text = concat!(
            r#"{"type":"Product","id":12,"action":"update","user":"admin","comment":"c","retry":5000,"fails":2}"#,
            "\n",
            r#"{"type":"Order","id":["A1","A2"],"action":"DELETE"}"#,
            "\n",
        );
        let migrated = read_legacy(text);
        assert_eq!(migrated.skipped, 0);
        assert_eq!(migrated.events.len(), 2);

        let first = &migrated.events[0];
        assert_eq!(first.local_ids, vec!["12"]);
        assert_eq!(first.fail_count, 2);
        assert_eq!(first.retry_at, 5000);
        assert!(first.has_valid_fingerprint());

        let second = &migrated.events[1];
        assert_eq!(second.action, CommitAction::Delete);
        assert_eq!(second.local_ids, vec!["A1", "A2"]);
    }

    #[test]
    fn test_invalid_lines_are_skipped() {
        let text = concat!(
            "not json\n",
            r#"{"type":"Product","id":12,"action":"archive"}"#,
            "\n",
            r#"{"type":"Product","id":{},"action":"update"}"#,
            "\n",
            r#"{"type":"","id":1,"action":"update"}"#,
            "\n",
            "\n",
            r#"{"type":"Product","id":"7","action":"create"}"#,
        );
        let migrated = read_legacy(text);
        assert_eq!(migrated.skipped, 4);
        assert_eq!(migrated.events.len(), 1);
        assert_eq!(migrated.events[0].local_ids, vec!["7"]);
    }

    #[test]
    fn test_obsolete_events_are_dropped() {
        let line = format!(
            r#"{{"type":"Product","id":1,"action":"update","fails":{}}}"#,
            OBSOLETE_THRESHOLD + 1
        );
        let migrated = read_legacy(&line);
        assert!(migrated.events.is_empty());
        assert_eq!(migrated.obsolete, 1);
    }

    #[test]
    fn test_legacy_detection() {
        assert!(is_legacy(b"{\"type\":\"Product\"}"));
        assert!(!is_legacy(b"SBWQ\x01"));
        assert!(!is_legacy(b""));
    }
}
