//! Host event delivery
//!
//! Network threads submit connect, disconnect and interaction events
//! through cloned senders without blocking; the plugin drains them on its
//! own schedule. Uses a bounded crossbeam channel.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::host::{BlockPos, PlayerHandle, SessionId};

/// Kinds of player interaction the plugin reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractKind {
    /// Cursor resting on the map icon
    Hover,
    /// Use/right-click into the air
    Activate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PluginEvent {
    Connected(PlayerHandle),
    Disconnected(SessionId),
    Interact { session: SessionId, kind: InteractKind },
    TeleportRequest { session: SessionId, destination: BlockPos },
}

impl PluginEvent {
    pub fn session(&self) -> SessionId {
        match self {
            PluginEvent::Connected(handle) => handle.session,
            PluginEvent::Disconnected(session)
            | PluginEvent::Interact { session, .. }
            | PluginEvent::TeleportRequest { session, .. } => *session,
        }
    }
}

/// Bounded multi-producer event queue
pub struct EventQueue {
    sender: Sender<PluginEvent>,
    receiver: Receiver<PluginEvent>,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self { sender, receiver }
    }

    /// Sender handle for one network thread
    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
        }
    }

    /// Returns false if the queue is full
    #[inline]
    pub fn try_submit(&self, event: PluginEvent) -> bool {
        self.sender.try_send(event).is_ok()
    }

    /// Take every pending event
    pub fn drain(&self) -> Vec<PluginEvent> {
        self.receiver.try_iter().collect()
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(4096)
    }
}

/// Cloneable sender handed to network threads
#[derive(Clone)]
pub struct EventSender {
    sender: Sender<PluginEvent>,
}

impl EventSender {
    pub fn try_submit(&self, event: PluginEvent) -> Result<(), PluginEvent> {
        self.sender.try_send(event).map_err(|e| match e {
            TrySendError::Full(event) | TrySendError::Disconnected(event) => event,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn interact(session: SessionId) -> PluginEvent {
        PluginEvent::Interact {
            session,
            kind: InteractKind::Activate,
        }
    }

    #[test]
    fn test_submit_and_drain_in_order() {
        let queue = EventQueue::new(8);
        let session = Uuid::new_v4();

        assert!(queue.try_submit(PluginEvent::Disconnected(session)));
        assert!(queue.try_submit(interact(session)));
        assert_eq!(queue.pending_count(), 2);

        let events = queue.drain();
        assert_eq!(events, vec![PluginEvent::Disconnected(session), interact(session)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_full_queue_rejects() {
        let queue = EventQueue::new(1);
        let sender = queue.sender();

        assert!(sender.try_submit(interact(Uuid::new_v4())).is_ok());
        let rejected = sender.try_submit(PluginEvent::Disconnected(Uuid::new_v4()));
        assert!(matches!(rejected, Err(PluginEvent::Disconnected(_))));
    }

    #[test]
    fn test_senders_from_threads() {
        let queue = EventQueue::new(1000);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let sender = queue.sender();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        sender.try_submit(interact(Uuid::new_v4())).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(queue.drain().len(), 400);
    }

    #[test]
    fn test_event_session() {
        let handle = PlayerHandle::new(Uuid::new_v4(), 1, "Evt");
        assert_eq!(PluginEvent::Connected(handle.clone()).session(), handle.session);
    }
}
