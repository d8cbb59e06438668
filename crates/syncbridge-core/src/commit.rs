//! Commit events: notifications that a local object changed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::canonical;
use crate::error::ValidationError;
use crate::task::Task;
use crate::types::Fingerprint;
use crate::value::Value;

/// An event is obsolete once its failure count exceeds this value.
pub const OBSOLETE_THRESHOLD: u32 = 5;

/// Name of the task carrying a commit to the server.
pub const COMMIT_TASK: &str = "commit";

/// Kind of change being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitAction {
    Create,
    Update,
    Delete,
}

impl CommitAction {
    /// Wire name of the action.
    pub const fn as_str(self) -> &'static str {
        match self {
            CommitAction::Create => "create",
            CommitAction::Update => "update",
            CommitAction::Delete => "delete",
        }
    }
}

impl FromStr for CommitAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(CommitAction::Create),
            "update" => Ok(CommitAction::Update),
            "delete" => Ok(CommitAction::Delete),
            _ => Err(ValidationError::UnknownAction(s.to_string())),
        }
    }
}

impl fmt::Display for CommitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded change notification, queued until delivered or obsolete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEvent {
    pub object_type: String,
    /// One or many local identifiers, in the order given by the host.
    pub local_ids: Vec<String>,
    pub action: CommitAction,
    pub user: String,
    pub comment: String,
    /// Hash of `(object_type, local_ids, action)`.
    pub fingerprint: Fingerprint,
    /// Earliest delivery time, milliseconds since the Unix epoch.
    pub retry_at: i64,
    pub fail_count: u32,
    pub obsolete: bool,
}

impl CommitEvent {
    /// Create an event that is due immediately.
    pub fn new(
        object_type: impl Into<String>,
        local_ids: Vec<String>,
        action: CommitAction,
        user: impl Into<String>,
        comment: impl Into<String>,
        now_ms: i64,
    ) -> Self {
        let object_type = object_type.into();
        let fingerprint = canonical::fingerprint(&object_type, &local_ids, action);
        Self {
            object_type,
            local_ids,
            action,
            user: user.into(),
            comment: comment.into(),
            fingerprint,
            retry_at: now_ms,
            fail_count: 0,
            obsolete: false,
        }
    }

    /// True if the stored fingerprint matches the event identity.
    pub fn has_valid_fingerprint(&self) -> bool {
        canonical::fingerprint(&self.object_type, &self.local_ids, self.action) == self.fingerprint
    }

    /// True once `now_ms` has reached the retry time.
    pub fn is_due(&self, now_ms: i64) -> bool {
        self.retry_at <= now_ms
    }

    /// True once flagged, or once the failure count is past [`OBSOLETE_THRESHOLD`].
    pub fn is_obsolete(&self) -> bool {
        self.obsolete || self.fail_count > OBSOLETE_THRESHOLD
    }

    /// Record a failed delivery and schedule the next attempt.
    ///
    /// Returns true if the event just became obsolete.
    pub fn record_failure(&mut self, next_retry_at: i64) -> bool {
        self.fail_count = self.fail_count.saturating_add(1);
        self.retry_at = next_retry_at;
        self.obsolete = self.is_obsolete();
        self.obsolete
    }

    /// Identifier payload: a scalar for one id, a list for many.
    pub fn ids_value(&self) -> Value {
        match self.local_ids.as_slice() {
            [single] => Value::from(single.as_str()),
            many => Value::List(many.iter().map(|id| Value::from(id.as_str())).collect()),
        }
    }

    /// The delivery task: `commit` with `{type, id, action, user, comment}`.
    pub fn to_task(&self) -> Task {
        let params = Value::from_pairs([
            ("type", Value::from(self.object_type.as_str())),
            ("id", self.ids_value()),
            ("action", Value::from(self.action.as_str())),
            ("user", Value::from(self.user.as_str())),
            ("comment", Value::from(self.comment.as_str())),
        ]);
        Task::new(
            COMMIT_TASK,
            format!("Commit {} {} {}", self.action, self.object_type, self.local_ids.join(",")),
            params,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(ids: &[&str]) -> CommitEvent {
        CommitEvent::new(
            "Product",
            ids.iter().map(|s| s.to_string()).collect(),
            CommitAction::Update,
            "admin",
            "price change",
            1_000,
        )
    }

    #[test]
    fn test_action_names() {
        assert_eq!("CREATE".parse::<CommitAction>().unwrap(), CommitAction::Create);
        assert_eq!(CommitAction::Delete.to_string(), "delete");
        assert_eq!(
            "archive".parse::<CommitAction>(),
            Err(ValidationError::UnknownAction("archive".into()))
        );
    }

    #[test]
    fn test_fingerprint_ignores_user_and_comment() {
        let a = event(&["12"]);
        let mut b = CommitEvent::new("Product", vec!["12".into()], CommitAction::Update, "bot", "", 5_000);
        assert_eq!(a.fingerprint, b.fingerprint);
        assert!(b.has_valid_fingerprint());

        b.object_type = "Order".into();
        assert!(!b.has_valid_fingerprint());
    }

    #[test]
    fn test_becomes_obsolete_past_threshold() {
        let mut e = event(&["12"]);
        for attempt in 1..=OBSOLETE_THRESHOLD {
            assert!(!e.record_failure(1_000 + i64::from(attempt)));
        }
        assert!(!e.is_obsolete());
        assert!(e.record_failure(2_000));
        assert_eq!(e.fail_count, OBSOLETE_THRESHOLD + 1);
        assert_eq!(e.retry_at, 2_000);
    }

    #[test]
    fn test_failure_count_alone_makes_obsolete() {
        let mut e = event(&["12"]);
        e.fail_count = OBSOLETE_THRESHOLD;
        assert!(!e.is_obsolete());
        e.fail_count = OBSOLETE_THRESHOLD + 1;
        assert!(!e.obsolete);
        assert!(e.is_obsolete());
    }

    #[test]
    fn test_is_due() {
        let e = event(&["12"]);
        assert!(e.is_due(1_000));
        assert!(!e.is_due(999));
    }

    #[test]
    fn test_task_id_shape() {
        let single = event(&["12"]).to_task();
        assert_eq!(single.name, COMMIT_TASK);
        assert_eq!(single.params.get("id"), Some(&Value::from("12")));
        assert_eq!(single.params.get("action"), Some(&Value::from("update")));

        let many = event(&["12", "13"]).to_task();
        assert_eq!(
            many.params.get("id"),
            Some(&Value::List(vec!["12".into(), "13".into()]))
        );
    }
}
