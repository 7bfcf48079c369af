//! An unbounded broadcast channel with independent subscriber cursors.
//!
//! Every value published to a [`Hub`] is delivered, in publish order, to every
//! [`Subscriber`] that existed at the time of the publish. A subscriber created
//! later does not see earlier values. Publishing never blocks and never fails;
//! the hub applies no back-pressure, so a subscriber that stops reading lets
//! its backlog grow without bound.

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// A multi-producer, multi-consumer broadcast channel.
///
/// Cloning a hub yields another handle to the same subscriber registry.
#[derive(Debug)]
pub struct Hub<A> {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<A>>>>,
}

impl<A> Clone for Hub<A> {
    fn clone(&self) -> Self { Self { subscribers: self.subscribers.clone() } }
}

impl<A: Clone + Send + 'static> Default for Hub<A> {
    fn default() -> Self { Self::new() }
}

impl<A: Clone + Send + 'static> Hub<A> {
    /// Creates a hub with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self { subscribers: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Delivers `value` to every live subscriber.
    ///
    /// Subscribers that were dropped are removed from the registry.
    pub fn publish(&self, value: A) {
        let mut subscribers = self.subscribers.lock();

        subscribers.retain(|subscriber| subscriber.send(value.clone()).is_ok());
    }

    /// Creates a new subscriber that observes every value published from now
    /// on.
    #[must_use]
    pub fn subscribe(&self) -> Subscriber<A> {
        let (sender, receiver) = mpsc::unbounded_channel();

        self.subscribers.lock().push(sender);

        Subscriber { receiver }
    }

    /// Returns the number of registered subscribers, including ones dropped
    /// since the last publish.
    #[must_use]
    pub fn subscriber_count(&self) -> usize { self.subscribers.lock().len() }
}

/// An independent cursor over the values published to a [`Hub`].
///
/// The stream ends only once every handle to the hub is dropped.
#[derive(Debug)]
pub struct Subscriber<A> {
    receiver: mpsc::UnboundedReceiver<A>,
}

impl<A> Subscriber<A> {
    /// Waits for the next published value.
    ///
    /// Returns `None` once every handle to the hub is dropped and the backlog
    /// is exhausted.
    pub async fn recv(&mut self) -> Option<A> { self.receiver.recv().await }

    /// Returns the next published value if one is already waiting.
    pub fn try_recv(&mut self) -> Option<A> { self.receiver.try_recv().ok() }
}

impl<A> Stream for Subscriber<A> {
    type Item = A;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
