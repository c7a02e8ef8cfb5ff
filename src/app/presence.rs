//! Who is online, keyed by public player id

use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use crate::game::session::{SessionEvent, SessionMailbox};

/// Live session of one account
#[derive(Clone)]
pub struct PresenceHandle {
    pub user_id: Uuid,
    pub display_name: String,
    pub mailbox: SessionMailbox,
    /// Unix ms
    pub connected_at: u64,
}

#[derive(Default)]
pub struct PresenceRegistry {
    sessions: DashMap<String, PresenceHandle>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. An older session of the same account is told to
    /// disconnect and returned.
    pub fn register(&self, public_id: &str, handle: PresenceHandle) -> Option<PresenceHandle> {
        let previous = self.sessions.insert(public_id.to_string(), handle);
        if let Some(old) = &previous {
            info!(user_id = %old.user_id, public_id, "Replacing stale session");
            let _ = old.mailbox.send(SessionEvent::Disconnected);
        }
        previous
    }

    /// Remove the entry if it still belongs to `mailbox`
    pub fn unregister(&self, public_id: &str, mailbox: &SessionMailbox) -> bool {
        self.sessions
            .remove_if(public_id, |_, handle| handle.mailbox.same_channel(mailbox))
            .is_some()
    }

    pub fn get(&self, public_id: &str) -> Option<PresenceHandle> {
        self.sessions.get(public_id).map(|h| h.clone())
    }

    pub fn online(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn handle(user_id: Uuid) -> (PresenceHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (mailbox, inbox) = mpsc::unbounded_channel();
        (
            PresenceHandle {
                user_id,
                display_name: "Player".into(),
                mailbox,
                connected_at: 0,
            },
            inbox,
        )
    }

    #[test]
    fn second_connection_replaces_the_first() {
        let registry = PresenceRegistry::new();
        let user_id = Uuid::new_v4();
        let (first, mut first_inbox) = handle(user_id);
        let (second, _second_inbox) = handle(user_id);
        let first_mailbox = first.mailbox.clone();
        let second_mailbox = second.mailbox.clone();

        assert!(registry.register("ABCD2345", first).is_none());
        assert!(registry.register("ABCD2345", second).is_some());
        assert!(matches!(first_inbox.try_recv(), Ok(SessionEvent::Disconnected)));
        assert_eq!(registry.online(), 1);

        // The replaced session must not evict its successor
        assert!(!registry.unregister("ABCD2345", &first_mailbox));
        assert_eq!(registry.online(), 1);
        assert!(registry.unregister("ABCD2345", &second_mailbox));
        assert_eq!(registry.online(), 0);
    }
}
