// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Change notification.
//!
//! Mutations append [`NamespaceChange`] events to the address-space journal;
//! [`crate::Model`] drains the journal on commit, while it still holds the
//! write lock, and publishes it on a [`ChangeFeed`]. Subscribers receive events over `std::sync::mpsc` channels,
//! so publishing never waits on a slow reader.
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Kind of committed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamespaceChangeType {
    /// Nodes or namespaces were created.
    Added,
    /// Nodes were deleted.
    Removed,
    /// Attributes, references, or namespace order changed.
    Modified,
    /// A namespace was locked.
    Locked,
    /// A namespace was unlocked.
    Unlocked,
}

/// One committed structural change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceChange {
    /// What happened.
    pub change_type: NamespaceChangeType,
    /// Human-readable summary.
    pub message: String,
    /// Address-space generation the change was committed at; 0 until
    /// published by [`crate::Model`].
    #[serde(default)]
    pub generation: u64,
}

impl NamespaceChange {
    /// Builds an event.
    pub fn new(change_type: NamespaceChangeType, message: impl Into<String>) -> Self {
        Self {
            change_type,
            message: message.into(),
            generation: 0,
        }
    }
}

/// Receiving end of a feed subscription.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: Receiver<NamespaceChange>,
}

impl Subscription {
    /// Identifier to pass to [`ChangeFeed::unsubscribe`].
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next pending event, if one is queued.
    pub fn try_next(&self) -> Option<NamespaceChange> {
        match self.rx.try_recv() {
            Ok(ev) => Some(ev),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Waits up to `timeout` for the next event.
    pub fn next_timeout(&self, timeout: Duration) -> Option<NamespaceChange> {
        match self.rx.recv_timeout(timeout) {
            Ok(ev) => Some(ev),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drains every queued event.
    pub fn drain(&self) -> Vec<NamespaceChange> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

#[derive(Debug, Default)]
struct FeedState {
    subscribers: Vec<(u64, Sender<NamespaceChange>)>,
    last: Option<NamespaceChange>,
    next_id: u64,
}

/// Fan-out of committed changes to any number of subscribers.
///
/// New subscribers are primed with the most recent event.
#[derive(Debug, Default)]
pub struct ChangeFeed {
    state: Mutex<FeedState>,
}

impl ChangeFeed {
    /// Empty feed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a subscriber.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.next_id += 1;
        let id = state.next_id;
        if let Some(last) = &state.last {
            // Receiver is alive; a send cannot fail here.
            let _ = tx.send(last.clone());
        }
        state.subscribers.push((id, tx));
        Subscription { id, rx }
    }

    /// Detaches a subscriber; returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let before = state.subscribers.len();
        state.subscribers.retain(|(sid, _)| *sid != id);
        state.subscribers.len() < before
    }

    /// Number of attached subscribers (including not-yet-pruned dead ones).
    pub fn subscriber_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .len()
    }

    /// Most recently published event.
    pub fn last(&self) -> Option<NamespaceChange> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last
            .clone()
    }

    /// Sends `event` to every live subscriber, dropping disconnected ones.
    pub fn publish(&self, event: NamespaceChange) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .subscribers
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
        tracing::debug!(
            change = ?event.change_type,
            subscribers = state.subscribers.len(),
            "published namespace change"
        );
        state.last = Some(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(msg: &str) -> NamespaceChange {
        NamespaceChange::new(NamespaceChangeType::Modified, msg)
    }

    #[test]
    fn late_subscriber_sees_last_event() {
        let feed = ChangeFeed::new();
        feed.publish(ev("one"));
        feed.publish(ev("two"));
        let sub = feed.subscribe();
        assert_eq!(sub.drain(), vec![ev("two")]);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let feed = ChangeFeed::new();
        let keep = feed.subscribe();
        let gone = feed.subscribe();
        drop(gone);
        feed.publish(ev("x"));
        assert_eq!(feed.subscriber_count(), 1);
        assert_eq!(keep.try_next(), Some(ev("x")));
    }

    #[test]
    fn unsubscribe_detaches() {
        let feed = ChangeFeed::new();
        let sub = feed.subscribe();
        assert!(feed.unsubscribe(sub.id()));
        assert!(!feed.unsubscribe(sub.id()));
        feed.publish(ev("x"));
        assert_eq!(sub.try_next(), None);
    }
}
