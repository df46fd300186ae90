//! Change notification bus
//!
//! One notification surface fed by two sources: writes made by this
//! process's [`ProgressCache`](crate::ProgressCache), and mutations of the
//! backing store made by another context and reported by the host as a raw
//! key/value pair.
//!
//! Events are wake-up signals only. Subscribers recompute from current
//! store state, so duplicated or reordered events are harmless.

use tokio::sync::broadcast;
use tracing::debug;

use crate::keys::{KeyKind, KeyScheme};

/// Scope of a progress mutation
///
/// Missing course or item information means the scope is unknown and every
/// subscriber must treat the event as relevant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeEvent {
    pub course_id: Option<String>,
    pub item_id: Option<String>,
    pub item_ids: Option<Vec<String>>,
}

impl ChangeEvent {
    /// Event relevant to everyone
    pub fn broad() -> Self {
        Self::default()
    }

    pub fn item(course_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            course_id: Some(course_id.into()),
            item_id: Some(item_id.into()),
            item_ids: None,
        }
    }

    pub fn items(course_id: impl Into<String>, item_ids: Vec<String>) -> Self {
        Self {
            course_id: Some(course_id.into()),
            item_id: None,
            item_ids: Some(item_ids),
        }
    }

    /// An item change without course scope (e.g. a legacy key)
    pub fn unscoped_item(item_id: impl Into<String>) -> Self {
        Self {
            course_id: None,
            item_id: Some(item_id.into()),
            item_ids: None,
        }
    }

    /// An empty `item_ids` list carries no information
    pub fn has_item_info(&self) -> bool {
        self.item_id.is_some() || self.item_ids.as_ref().is_some_and(|ids| !ids.is_empty())
    }

    /// All item ids named by the event
    pub fn touched_items(&self) -> impl Iterator<Item = &str> {
        self.item_id
            .iter()
            .chain(self.item_ids.iter().flatten())
            .map(String::as_str)
    }
}

/// A store mutation observed in another context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalChange {
    /// Raw store key; `None` when the whole store was cleared
    pub key: Option<String>,
    pub new_value: Option<String>,
}

impl ExternalChange {
    pub fn new(key: impl Into<String>, new_value: Option<String>) -> Self {
        Self {
            key: Some(key.into()),
            new_value,
        }
    }

    pub fn cleared() -> Self {
        Self {
            key: None,
            new_value: None,
        }
    }
}

/// What an external change means for this process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalScope {
    /// Everything may have changed
    Everything,
    /// A current-scheme status key changed
    StatusKey { key: String, event: ChangeEvent },
    /// A legacy status key changed; it maps to the item in every course
    LegacyStatusKey { event: ChangeEvent },
    /// Not a status key of ours
    Ignored,
}

impl ExternalScope {
    /// Parses the raw key of an external change with the known key formats
    pub fn classify(keys: &KeyScheme, change: &ExternalChange) -> Self {
        let Some(raw) = change.key.as_deref() else {
            return Self::Everything;
        };

        match keys.parse(raw) {
            Some(parsed) if parsed.kind == KeyKind::Status => match parsed.course_id {
                Some(course_id) => Self::StatusKey {
                    key: raw.to_string(),
                    event: ChangeEvent::item(course_id, parsed.item_id),
                },
                None => Self::LegacyStatusKey {
                    event: ChangeEvent::unscoped_item(parsed.item_id),
                },
            },
            _ => Self::Ignored,
        }
    }
}

/// Publish/subscribe bus for progress changes
///
/// Cloning yields another handle to the same bus.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeBus {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Delivers `event` to every current subscriber without blocking
    ///
    /// Subscribers created later never see it.
    pub fn emit(&self, event: ChangeEvent) {
        if self.sender.send(event).is_err() {
            debug!("Change event dropped, no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_current_subscribers_only() {
        let bus = ChangeBus::new();
        let mut early = bus.subscribe();

        bus.emit(ChangeEvent::item("c", "a"));
        let mut late = bus.subscribe();

        assert_eq!(early.try_recv().unwrap(), ChangeEvent::item("c", "a"));
        assert!(late.try_recv().is_err());
    }

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let bus = ChangeBus::new();
        bus.emit(ChangeEvent::broad());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_touched_items() {
        let event = ChangeEvent {
            course_id: None,
            item_id: Some("a".to_string()),
            item_ids: Some(vec!["b".to_string(), "c".to_string()]),
        };
        assert_eq!(event.touched_items().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert!(ChangeEvent::broad().touched_items().next().is_none());
        assert!(!ChangeEvent::broad().has_item_info());
    }

    #[test]
    fn test_classify_external_changes() {
        let keys = KeyScheme::default();

        assert_eq!(
            ExternalScope::classify(&keys, &ExternalChange::cleared()),
            ExternalScope::Everything
        );

        assert_eq!(
            ExternalScope::classify(
                &keys,
                &ExternalChange::new("dojo:course-a:p1:status", Some("solved".into()))
            ),
            ExternalScope::StatusKey {
                key: "dojo:course-a:p1:status".to_string(),
                event: ChangeEvent::item("course-a", "p1"),
            }
        );

        assert_eq!(
            ExternalScope::classify(&keys, &ExternalChange::new("sol_p1_status", None)),
            ExternalScope::LegacyStatusKey {
                event: ChangeEvent::unscoped_item("p1"),
            }
        );
    }

    #[test]
    fn test_classify_ignores_non_status_keys() {
        let keys = KeyScheme::default();

        for raw in ["dojo:course-a:p1:code", "sol_p1_code", "theme", "other:c:p:status"] {
            assert_eq!(
                ExternalScope::classify(&keys, &ExternalChange::new(raw, None)),
                ExternalScope::Ignored,
                "{raw}"
            );
        }
    }
}
