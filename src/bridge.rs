//! Core push-to-pull adapter.
//!
//! [`DemandBridge`] exposes a push source through the pull contract. The
//! push side cannot be throttled, so past the activation edge there is no
//! flow-control negotiation: the first positive demand subscribes the
//! source, and every value it emits is forwarded straight to the downstream
//! subscriber. Pair the bridge with [`Buffered`](crate::buffer::Buffered)
//! (see `into_pull` / `into_pull_bridge`) to actually honor downstream
//! demand.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::demand::Demand;
use crate::error::BridgeError;
use crate::pull::{
    Completion, PullStream, PullSubscriber, PullSubscription, SubscriptionHandle,
};
use crate::push::{Disposal, PushObserver, PushSource};

/// Pull stream over a push source.
pub struct DemandBridge<T, E> {
    source: PushSource<T, E>,
}

impl<T, E> DemandBridge<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new(source: PushSource<T, E>) -> Self {
        DemandBridge { source }
    }
}

impl<T, E> PullStream for DemandBridge<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    type Item = T;
    type Error = BridgeError<E>;

    fn subscribe<S>(self, subscriber: S)
    where
        S: PullSubscriber<Item = T, Error = BridgeError<E>>,
    {
        BridgeSubscription::install(self.source, subscriber);
    }
}

/// Exclusive lifecycle of a bridge subscription.
///
/// `Pending` owns the not-yet-subscribed source; `Activating` covers the
/// window where the source is being subscribed outside the lock; `Active`
/// owns the upstream disposal; `Completed` is terminal.
enum BridgeState<T, E> {
    Pending(PushSource<T, E>),
    Activating,
    Active(Disposal),
    Completed,
}

struct BridgeSubscription<T, E, S> {
    state: Mutex<BridgeState<T, E>>,
    downstream: Mutex<Option<S>>,
    /// Set once the downstream subscriber is installed; activation requests
    /// arriving earlier are parked in `wants_activation`.
    ready: AtomicBool,
    wants_activation: AtomicBool,
}

impl<T, E, S> BridgeSubscription<T, E, S>
where
    T: Send + 'static,
    E: Send + 'static,
    S: PullSubscriber<Item = T, Error = BridgeError<E>>,
{
    fn install(source: PushSource<T, E>, mut subscriber: S) {
        let subscription = Arc::new(BridgeSubscription {
            state: Mutex::new(BridgeState::Pending(source)),
            downstream: Mutex::new(None),
            ready: AtomicBool::new(false),
            wants_activation: AtomicBool::new(false),
        });

        let handle: SubscriptionHandle = Arc::new(BridgeHandle(Arc::clone(&subscription)));
        subscriber.receive_subscription(handle);

        *subscription.downstream.lock().unwrap() = Some(subscriber);
        if matches!(&*subscription.state.lock().unwrap(), BridgeState::Completed) {
            // Cancelled inside receive_subscription: drop the subscriber again.
            subscription.downstream.lock().unwrap().take();
        }
        subscription.ready.store(true, Ordering::Release);
        if subscription.wants_activation.swap(false, Ordering::AcqRel) {
            Self::try_activate(&subscription);
        }
    }

    fn request(this: &Arc<Self>, demand: Demand) {
        if demand.is_none() {
            return;
        }
        if !this.ready.load(Ordering::Acquire) {
            this.wants_activation.store(true, Ordering::Release);
            // `install` may have finished in the meantime; re-check so the
            // parked request cannot be lost.
            if this.ready.load(Ordering::Acquire)
                && this.wants_activation.swap(false, Ordering::AcqRel)
            {
                Self::try_activate(this);
            }
            return;
        }
        Self::try_activate(this);
    }

    /// Moves `Pending` to `Activating`, subscribes the push source outside
    /// the lock, then stores the disposal. Any state other than `Pending`
    /// means the upstream subscription already happened (or never will), so
    /// the call is a no-op.
    fn try_activate(this: &Arc<Self>) {
        let source = {
            let mut state = this.state.lock().unwrap();
            match std::mem::replace(&mut *state, BridgeState::Activating) {
                BridgeState::Pending(source) => source,
                other => {
                    *state = other;
                    return;
                }
            }
        };

        log::debug!("demand bridge activating: subscribing upstream push source");

        let value_target = Arc::clone(this);
        let error_target = Arc::clone(this);
        let completion_target = Arc::clone(this);
        let disposal = source.subscribe(PushObserver::new(
            move |value| Self::deliver_value(&value_target, value),
            move |error| {
                Self::deliver_completion(
                    &error_target,
                    Completion::Failed(BridgeError::UpstreamError(error)),
                )
            },
            move || Self::deliver_completion(&completion_target, Completion::Finished),
        ));

        let mut state = this.state.lock().unwrap();
        if matches!(&*state, BridgeState::Activating) {
            *state = BridgeState::Active(disposal);
        } else {
            // Completed while subscribing: tear the fresh subscription down.
            drop(state);
            disposal.dispose();
        }
    }

    fn deliver_value(this: &Arc<Self>, value: T) {
        if matches!(&*this.state.lock().unwrap(), BridgeState::Completed) {
            return;
        }
        let subscriber = this.downstream.lock().unwrap().take();
        let Some(mut subscriber) = subscriber else {
            return;
        };
        // The push side ignores returned demand; demand enforcement lives in
        // the buffer stage downstream.
        let _ = subscriber.receive_value(value);
        *this.downstream.lock().unwrap() = Some(subscriber);
        if matches!(&*this.state.lock().unwrap(), BridgeState::Completed) {
            // Terminated while delivering; the restored subscriber must go.
            this.downstream.lock().unwrap().take();
        }
    }

    fn deliver_completion(this: &Arc<Self>, completion: Completion<BridgeError<E>>) {
        let previous = {
            let mut state = this.state.lock().unwrap();
            std::mem::replace(&mut *state, BridgeState::Completed)
        };
        match previous {
            BridgeState::Completed => return,
            BridgeState::Active(disposal) => disposal.dispose(),
            BridgeState::Pending(_) | BridgeState::Activating => {}
        }
        log::debug!("demand bridge completed");
        let subscriber = this.downstream.lock().unwrap().take();
        if let Some(mut subscriber) = subscriber {
            subscriber.receive_completion(completion);
        }
    }

    fn cancel(this: &Arc<Self>) {
        let previous = {
            let mut state = this.state.lock().unwrap();
            std::mem::replace(&mut *state, BridgeState::Completed)
        };
        if let BridgeState::Active(disposal) = previous {
            disposal.dispose();
        }
        this.downstream.lock().unwrap().take();
    }
}

struct BridgeHandle<T, E, S>(Arc<BridgeSubscription<T, E, S>>);

impl<T, E, S> PullSubscription for BridgeHandle<T, E, S>
where
    T: Send + 'static,
    E: Send + 'static,
    S: PullSubscriber<Item = T, Error = BridgeError<E>>,
{
    fn request(&self, demand: Demand) {
        BridgeSubscription::request(&self.0, demand);
    }

    fn cancel(&self) {
        BridgeSubscription::cancel(&self.0);
    }
}
