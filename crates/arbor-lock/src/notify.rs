//! Cross-node lock notification.
//!
//! The coordinator emits a [`LockEvent`] after every acquisition or final
//! release made on behalf of a remote session. Delivery is at-least-once,
//! so receivers apply events through [`RemoteLockView`], which ignores
//! repeats.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{LockError, Result};
use crate::types::{LockContext, Lockable};

/// The lock transition an event reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockEventKind {
    Acquired,
    Released,
}

/// A lock state transition, published after it is applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockEvent {
    pub kind: LockEventKind,
    pub lockable: Lockable,
    pub context: LockContext,
    pub session_id: String,
}

/// Receives lock transitions. Called outside the coordinator's registry
/// lock; implementations must not block.
pub trait LockListener: Send + Sync {
    fn on_lock_event(&self, event: &LockEvent);
}

/// A broadcast receiver for lock events.
pub type LockEventStream = broadcast::Receiver<LockEvent>;

/// Fans lock events out to any number of tokio receivers.
pub struct BroadcastLockListener {
    sender: broadcast::Sender<LockEvent>,
}

impl BroadcastLockListener {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> LockEventStream {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl LockListener for BroadcastLockListener {
    fn on_lock_event(&self, event: &LockEvent) {
        // No receivers is not an error; the event is simply dropped.
        if self.sender.send(event.clone()).is_err() {
            debug!(lockable = %event.lockable, "no lock event receivers");
        }
    }
}

/// Another node's locks, rebuilt from its events.
#[derive(Default)]
pub struct RemoteLockView {
    held: RwLock<BTreeMap<Lockable, LockContext>>,
}

impl RemoteLockView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an event. Returns `true` if the view changed.
    pub fn apply(&self, event: &LockEvent) -> Result<bool> {
        let mut held = self
            .held
            .write()
            .map_err(|e| LockError::Internal(format!("lock poisoned: {e}")))?;
        let changed = match event.kind {
            LockEventKind::Acquired => {
                held.insert(event.lockable.clone(), event.context.clone()).as_ref()
                    != Some(&event.context)
            }
            LockEventKind::Released => {
                let owned = held
                    .get(&event.lockable)
                    .is_some_and(|holder| holder.same_owner(&event.context));
                if owned {
                    held.remove(&event.lockable);
                }
                owned
            }
        };
        Ok(changed)
    }

    pub fn holder(&self, lockable: &Lockable) -> Result<Option<LockContext>> {
        let held = self
            .held
            .read()
            .map_err(|e| LockError::Internal(format!("lock poisoned: {e}")))?;
        Ok(held.get(lockable).cloned())
    }

    pub fn len(&self) -> usize {
        self.held.read().map(|held| held.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LockListener for RemoteLockView {
    fn on_lock_event(&self, event: &LockEvent) {
        if let Err(e) = self.apply(event) {
            debug!(error = %e, "failed to apply lock event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_types::BranchPath;

    fn event(kind: LockEventKind) -> LockEvent {
        LockEvent {
            kind,
            lockable: Lockable::branch("snomed", BranchPath::main()),
            context: LockContext::new("alice", "merge").with_session("s1"),
            session_id: "s1".into(),
        }
    }

    #[test]
    fn remote_view_ignores_duplicates() {
        let view = RemoteLockView::new();
        assert!(view.apply(&event(LockEventKind::Acquired)).unwrap());
        assert!(!view.apply(&event(LockEventKind::Acquired)).unwrap());
        assert_eq!(view.len(), 1);

        assert!(view.apply(&event(LockEventKind::Released)).unwrap());
        assert!(!view.apply(&event(LockEventKind::Released)).unwrap());
        assert!(view.is_empty());
    }

    #[test]
    fn release_by_another_owner_is_ignored() {
        let view = RemoteLockView::new();
        view.apply(&event(LockEventKind::Acquired)).unwrap();

        let mut foreign = event(LockEventKind::Released);
        foreign.context = LockContext::new("bob", "merge");
        assert!(!view.apply(&foreign).unwrap());
        assert_eq!(
            view.holder(&Lockable::branch("snomed", BranchPath::main()))
                .unwrap()
                .map(|c| c.user_id),
            Some("alice".to_string())
        );
    }

    #[tokio::test]
    async fn broadcast_listener_delivers_to_every_subscriber() {
        let listener = BroadcastLockListener::new(16);
        let mut first = listener.subscribe();
        let mut second = listener.subscribe();
        assert_eq!(listener.receiver_count(), 2);

        listener.on_lock_event(&event(LockEventKind::Acquired));
        assert_eq!(first.recv().await.unwrap().kind, LockEventKind::Acquired);
        assert_eq!(second.recv().await.unwrap().kind, LockEventKind::Acquired);
    }

    #[test]
    fn events_serialize_with_wire_names() {
        let json = serde_json::to_value(event(LockEventKind::Released)).unwrap();
        assert_eq!(json["kind"], "RELEASED");
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["lockable"]["branchPath"], "MAIN");
    }
}
