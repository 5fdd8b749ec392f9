//! Pull-side stream contract.
//!
//! A pull producer may deliver values only up to the demand its consumer has
//! requested; delivering past demand is a protocol error. Terminal signals
//! ([`Completion`]) need no demand, and after one has been observed no
//! further values may be delivered.

use std::sync::Arc;

use crate::demand::Demand;

/// Terminal signal of a pull stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion<E> {
    Finished,
    Failed(E),
}

/// Producer-side handle held by a pull consumer.
///
/// Both operations are safe from any thread; `cancel` is idempotent and may
/// race with `request`.
pub trait PullSubscription: Send + Sync {
    /// Adds `demand` to the producer's authorization.
    fn request(&self, demand: Demand);
    /// Tears the subscription down.
    fn cancel(&self);
}

/// Shared subscription handle delivered to a subscriber.
pub type SubscriptionHandle = Arc<dyn PullSubscription>;

/// Consumer side of the pull contract.
pub trait PullSubscriber: Send + 'static {
    type Item: Send + 'static;
    type Error: Send + 'static;

    /// Receives the subscription handle before any value is delivered.
    fn receive_subscription(&mut self, subscription: SubscriptionHandle);

    /// Handles one value and returns any additional demand.
    fn receive_value(&mut self, value: Self::Item) -> Demand;

    /// Handles the terminal signal.
    fn receive_completion(&mut self, completion: Completion<Self::Error>);
}

/// A demand-regulated stream of values.
///
/// Subscribing consumes the stream; a stream that needs to be subscribed
/// more than once (retry) is produced by a factory instead.
pub trait PullStream: Send + Sized + 'static {
    type Item: Send + 'static;
    type Error: Send + 'static;

    fn subscribe<S>(self, subscriber: S)
    where
        S: PullSubscriber<Item = Self::Item, Error = Self::Error>;
}

impl<T, E> PullSubscriber for Box<dyn PullSubscriber<Item = T, Error = E>>
where
    T: Send + 'static,
    E: Send + 'static,
{
    type Item = T;
    type Error = E;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        (**self).receive_subscription(subscription);
    }

    fn receive_value(&mut self, value: T) -> Demand {
        (**self).receive_value(value)
    }

    fn receive_completion(&mut self, completion: Completion<E>) {
        (**self).receive_completion(completion);
    }
}

/// Type-erased pull stream.
pub struct BoxPullStream<T, E> {
    subscribe: Box<dyn FnOnce(Box<dyn PullSubscriber<Item = T, Error = E>>) + Send>,
}

impl<T, E> BoxPullStream<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new<P>(stream: P) -> Self
    where
        P: PullStream<Item = T, Error = E>,
    {
        BoxPullStream {
            subscribe: Box::new(move |subscriber| stream.subscribe(subscriber)),
        }
    }
}

impl<T, E> PullStream for BoxPullStream<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    type Item = T;
    type Error = E;

    fn subscribe<S>(self, subscriber: S)
    where
        S: PullSubscriber<Item = T, Error = E>,
    {
        (self.subscribe)(Box::new(subscriber));
    }
}
