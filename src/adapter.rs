//! Entry points composing the bridge pieces, and the reverse adapter.

use std::sync::{Arc, Mutex};

use futures_util::stream::BoxStream;
use futures_util::StreamExt;

use crate::bridge::DemandBridge;
use crate::buffer::Buffered;
use crate::config::BridgeConfig;
use crate::demand::Demand;
use crate::operators::recover::AssertNoOverflow;
use crate::pull::{Completion, PullStream, PullSubscriber, SubscriptionHandle};
use crate::push::{Disposal, PushObserver, PushSource};

impl<T, E> PushSource<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Bridges this push source into a pull stream.
    ///
    /// Overflow under `BufferPolicy::FailOnOverflow` is treated as a
    /// programming error and aborts the process; the stream's failure
    /// channel carries only the upstream error type. If overflow should be
    /// recoverable instead, use
    /// [`into_pull_bridge`](PushSource::into_pull_bridge) and handle
    /// [`BridgeError::BufferOverflow`](crate::error::BridgeError).
    pub fn into_pull(
        self,
        config: BridgeConfig,
    ) -> AssertNoOverflow<Buffered<DemandBridge<T, E>>> {
        AssertNoOverflow::new(self.into_pull_bridge(config))
    }

    /// Bridges this push source into a pull stream with the full
    /// [`BridgeError`] failure channel, overflow included.
    pub fn into_pull_bridge(self, config: BridgeConfig) -> Buffered<DemandBridge<T, E>> {
        Buffered::new(DemandBridge::new(self), config)
    }
}

/// Wraps a pull stream as a push source.
///
/// On subscription the pull stream is subscribed with unbounded demand and
/// every value and the terminal signal are forwarded to the observer as
/// they arrive; the push model accepts unlimited emission, so no buffering
/// is involved. Disposing the returned handle cancels the pull
/// subscription, also when disposal races ahead of the subscription
/// handle's arrival.
pub fn pull_to_push<P>(stream: P) -> PushSource<P::Item, P::Error>
where
    P: PullStream,
{
    PushSource::fallible(move |observer| {
        let state = Arc::new(Mutex::new(ForwardState {
            subscription: None,
            disposed: false,
        }));
        let disposal_state = Arc::clone(&state);
        stream.subscribe(PushForwarder { observer, state });
        Disposal::new(move || {
            let subscription = {
                let mut state = disposal_state.lock().unwrap();
                state.disposed = true;
                state.subscription.take()
            };
            if let Some(subscription) = subscription {
                subscription.cancel();
            }
        })
    })
}

struct ForwardState {
    subscription: Option<SubscriptionHandle>,
    disposed: bool,
}

struct PushForwarder<T, E> {
    observer: PushObserver<T, E>,
    state: Arc<Mutex<ForwardState>>,
}

impl<T, E> PullSubscriber for PushForwarder<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    type Item = T;
    type Error = E;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        let disposed = {
            let mut state = self.state.lock().unwrap();
            if state.disposed {
                true
            } else {
                state.subscription = Some(Arc::clone(&subscription));
                false
            }
        };
        if disposed {
            subscription.cancel();
        } else {
            subscription.request(Demand::unbounded());
        }
    }

    fn receive_value(&mut self, value: T) -> Demand {
        self.observer.on_value(value);
        Demand::none()
    }

    fn receive_completion(&mut self, completion: Completion<E>) {
        match completion {
            Completion::Finished => self.observer.on_completed(),
            Completion::Failed(error) => self.observer.on_error(error),
        }
    }
}

/// Drives a pull stream with unbounded demand and exposes it as an async
/// stream of `Result` items. The terminal error, if any, is the last item.
///
/// Dropping the returned stream cancels the pull subscription on the next
/// delivery attempt.
pub fn into_stream<P>(stream: P) -> BoxStream<'static, Result<P::Item, P::Error>>
where
    P: PullStream,
{
    let (sender, receiver) = futures::channel::mpsc::unbounded();
    stream.subscribe(ChannelSubscriber {
        sender,
        subscription: None,
    });
    receiver.boxed()
}

struct ChannelSubscriber<T, E> {
    sender: futures::channel::mpsc::UnboundedSender<Result<T, E>>,
    subscription: Option<SubscriptionHandle>,
}

impl<T, E> PullSubscriber for ChannelSubscriber<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    type Item = T;
    type Error = E;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        self.subscription = Some(Arc::clone(&subscription));
        subscription.request(Demand::unbounded());
    }

    fn receive_value(&mut self, value: T) -> Demand {
        if self.sender.unbounded_send(Ok(value)).is_err() {
            // Receiver gone: nobody is listening anymore.
            if let Some(subscription) = self.subscription.take() {
                subscription.cancel();
            }
        }
        Demand::none()
    }

    fn receive_completion(&mut self, completion: Completion<E>) {
        if let Completion::Failed(error) = completion {
            let _ = self.sender.unbounded_send(Err(error));
        }
        self.sender.close_channel();
    }
}
