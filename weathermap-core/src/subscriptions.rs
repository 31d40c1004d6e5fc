//! Long-lived action sources for a map mount
//!
//! Unlike one-shot tasks, a subscription keeps forwarding items until its
//! stream ends or it is cancelled. The runtime uses one for the host's
//! back/forward navigation events. Widget moves do not go through here: the
//! move listener sends straight into the action channel.
//!
//! ```ignore
//! let (nav_tx, nav_rx) = mpsc::unbounded_channel();
//! subs.stream("navigation", UnboundedReceiverStream::new(nav_rx).map(MapAction::UrlDidChange));
//! ```

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::{Stream, StreamExt};

use crate::Action;

/// Identifies a subscription for cancellation.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SubKey(String);

impl SubKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for SubKey {
    fn from(s: &'static str) -> Self {
        Self::new(s)
    }
}

pub struct Subscriptions<A> {
    handles: HashMap<SubKey, JoinHandle<()>>,
    action_tx: mpsc::UnboundedSender<A>,
}

impl<A> std::fmt::Debug for Subscriptions<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriptions")
            .field("active", &self.handles.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<A> Subscriptions<A>
where
    A: Action,
{
    pub fn new(action_tx: mpsc::UnboundedSender<A>) -> Self {
        Self {
            handles: HashMap::new(),
            action_tx,
        }
    }

    /// Forward every item of `stream` as an action.
    ///
    /// An existing subscription under the same key is cancelled first.
    pub fn stream<S>(&mut self, key: impl Into<SubKey>, stream: S) -> &mut Self
    where
        S: Stream<Item = A> + Send + 'static,
    {
        let key = key.into();
        self.cancel(&key);

        let tx = self.action_tx.clone();
        let name = key.name().to_string();
        let handle = tokio::spawn(async move {
            tokio::pin!(stream);
            while let Some(action) = stream.next().await {
                if tx.send(action).is_err() {
                    break;
                }
            }
            tracing::debug!(subscription = %name, "Subscription stream ended");
        });

        self.handles.insert(key, handle);
        self
    }

    pub fn cancel(&mut self, key: &SubKey) {
        if let Some(handle) = self.handles.remove(key) {
            handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }

    pub fn is_active(&self, key: &SubKey) -> bool {
        self.handles
            .get(key)
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl<A> Drop for Subscriptions<A> {
    fn drop(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    #[derive(Clone, Debug, PartialEq)]
    struct Moved(u8);

    impl Action for Moved {
        fn name(&self) -> &'static str {
            "Moved"
        }
    }

    #[tokio::test]
    async fn test_stream_forwards_items_in_order() {
        let (action_tx, mut action_rx) = mpsc::unbounded_channel();
        let mut subs = Subscriptions::new(action_tx);

        subs.stream("zooms", tokio_stream::iter(vec![Moved(4), Moved(5), Moved(6)]));

        for zoom in 4..=6 {
            assert_eq!(action_rx.recv().await, Some(Moved(zoom)));
        }
    }

    #[tokio::test]
    async fn test_cancel_stops_forwarding() {
        let (action_tx, mut action_rx) = mpsc::unbounded_channel();
        let mut subs = Subscriptions::new(action_tx);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        subs.stream("widget-events", UnboundedReceiverStream::new(event_rx));
        event_tx.send(Moved(5)).expect("send");
        assert_eq!(action_rx.recv().await, Some(Moved(5)));
        assert!(subs.is_active(&SubKey::new("widget-events")));

        subs.cancel_all();
        assert!(subs.is_empty());
        tokio::task::yield_now().await;

        let _ = event_tx.send(Moved(6));
        tokio::task::yield_now().await;
        assert!(action_rx.try_recv().is_err());
    }
}
