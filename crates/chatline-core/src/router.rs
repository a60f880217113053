//! Fan-out of new events and one-shot history replay.

use crate::event::{ChatEvent, Sequence, SessionId};
use crate::log::MessageLog;
use crate::protocol::ServerEvent;
use crate::registry::{ConnectionRegistry, Delivery, Session};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    #[error("history already replayed to session {0}")]
    AlreadyReplayed(SessionId),
}

/// Delivery counts for one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fanout {
    pub seq: Sequence,
    pub delivered: usize,
    pub overflowed: usize,
}

/// The only writer of the message log.
#[derive(Debug, Default)]
pub struct BroadcastRouter {
    log: MessageLog,
}

impl BroadcastRouter {
    pub fn new(log: MessageLog) -> Self {
        Self { log }
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// Append `event` and hand it to every active session, in registry order.
    ///
    /// Sessions whose queue overflows are cut off and skipped; they are
    /// reaped by their transport.
    pub fn publish(&mut self, event: ChatEvent, registry: &mut ConnectionRegistry) -> Fanout {
        let wire = ServerEvent::live(&event);
        let seq = self.log.append(event);

        let mut fanout = Fanout {
            seq,
            ..Fanout::default()
        };
        for session in registry.active_mut() {
            match session.deliver(wire.clone()) {
                Delivery::Queued => fanout.delivered += 1,
                Delivery::Overflowed => fanout.overflowed += 1,
                Delivery::Closed => {}
            }
        }
        tracing::debug!(
            seq,
            delivered = fanout.delivered,
            overflowed = fanout.overflowed,
            "published event"
        );
        fanout
    }

    /// Send the full history to one session. Allowed once per session lifetime.
    pub fn replay_history(&self, session: &mut Session) -> Result<usize, ReplayError> {
        if session.has_replayed() {
            return Err(ReplayError::AlreadyReplayed(session.id()));
        }
        let snapshot = self.log.snapshot();
        session.mark_replayed();
        session.deliver(ServerEvent::history(&snapshot));
        Ok(snapshot.len())
    }

    /// Send `event` to every active session without touching the log.
    pub fn notify_all(&self, event: &ServerEvent, registry: &mut ConnectionRegistry) {
        for session in registry.active_mut() {
            session.deliver(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Outbox, SessionState};
    use tokio::sync::mpsc;

    fn active(
        registry: &mut ConnectionRegistry,
        n: u64,
        capacity: usize,
    ) -> mpsc::Receiver<ServerEvent> {
        let (outbox, rx) = Outbox::channel(capacity);
        let mut session = Session::new(SessionId::new(n), outbox);
        session.set_state(SessionState::Active);
        registry.register(session);
        rx
    }

    #[test]
    fn publish_reaches_active_only() {
        let mut registry = ConnectionRegistry::new();
        let mut router = BroadcastRouter::default();
        let mut a = active(&mut registry, 1, 4);
        let (outbox, mut pending_rx) = Outbox::channel(4);
        registry.register(Session::new(SessionId::new(2), outbox));

        let fanout = router.publish(ChatEvent::chat("alice", "hi"), &mut registry);
        assert_eq!(fanout.seq, 0);
        assert_eq!(fanout.delivered, 1);
        assert_eq!(
            a.try_recv().unwrap(),
            ServerEvent::Message {
                msg: "alice: hi".into()
            }
        );
        assert!(pending_rx.try_recv().is_err());
    }

    #[test]
    fn slow_consumer_does_not_block_others() {
        let mut registry = ConnectionRegistry::new();
        let mut router = BroadcastRouter::default();
        let _slow = active(&mut registry, 1, 1);
        let mut fast = active(&mut registry, 2, 16);

        router.publish(ChatEvent::chat("x", "1"), &mut registry);
        let second = router.publish(ChatEvent::chat("x", "2"), &mut registry);
        assert_eq!(second.overflowed, 1);
        let third = router.publish(ChatEvent::chat("x", "3"), &mut registry);
        assert_eq!(third.delivered, 1);
        assert_eq!(third.overflowed, 0);

        let mut got = 0;
        while fast.try_recv().is_ok() {
            got += 1;
        }
        assert_eq!(got, 3);
        assert_eq!(registry.lagging(), vec![SessionId::new(1)]);
    }

    #[test]
    fn replay_only_once() {
        let mut router = BroadcastRouter::default();
        let mut registry = ConnectionRegistry::new();
        router.publish(ChatEvent::joined("alice"), &mut registry);

        let (outbox, mut rx) = Outbox::channel(4);
        let mut session = Session::new(SessionId::new(7), outbox);
        assert_eq!(router.replay_history(&mut session), Ok(1));
        assert_eq!(
            router.replay_history(&mut session),
            Err(ReplayError::AlreadyReplayed(SessionId::new(7)))
        );

        match rx.try_recv().unwrap() {
            ServerEvent::MessageHistory { messages } => assert_eq!(messages.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }
}
