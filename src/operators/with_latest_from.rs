//! Latest-value sampling across two pull streams.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use crate::demand::Demand;
use crate::pull::{
    Completion, PullStream, PullSubscriber, PullSubscription, SubscriptionHandle,
};

/// Combines every primary value with the most recent secondary value.
///
/// The secondary stream is subscribed eagerly with unbounded demand,
/// independent of downstream demand, and every emission overwrites the
/// cache (last-write-wins). The contract is deliberately one-sided:
///
/// - Primary values arriving before the secondary has emitted anything are
///   dropped outright (one unit of replacement demand is returned upstream
///   so demand accounting stays exact).
/// - Completion or failure of the secondary never terminates the combined
///   stream; it only stops future cache updates.
///
/// Primary completion and failure are forwarded downstream, and cancelling
/// downstream cancels both subscriptions.
pub struct WithLatestFrom<P, S2, F> {
    primary: P,
    secondary: S2,
    combine: F,
}

impl<P, S2, F> WithLatestFrom<P, S2, F> {
    pub fn new(primary: P, secondary: S2, combine: F) -> Self {
        WithLatestFrom {
            primary,
            secondary,
            combine,
        }
    }
}

impl<P, S2, F, O> PullStream for WithLatestFrom<P, S2, F>
where
    P: PullStream,
    S2: PullStream,
    S2::Item: Clone,
    F: FnMut(P::Item, S2::Item) -> O + Send + 'static,
    O: Send + 'static,
{
    type Item = O;
    type Error = P::Error;

    fn subscribe<Sub>(self, subscriber: Sub)
    where
        Sub: PullSubscriber<Item = O, Error = P::Error>,
    {
        let cache: Arc<Mutex<Option<S2::Item>>> = Arc::new(Mutex::new(None));
        let secondary_slot = Arc::new(Mutex::new(SecondarySlot {
            handle: None,
            cancelled: false,
        }));

        self.secondary.subscribe(LatestTracker {
            cache: Arc::clone(&cache),
            slot: Arc::clone(&secondary_slot),
            _marker: PhantomData::<fn(S2::Error)>,
        });
        self.primary.subscribe(PrimarySubscriber {
            downstream: subscriber,
            cache,
            secondary: secondary_slot,
            combine: self.combine,
            _marker: PhantomData::<fn(P::Item)>,
        });
    }
}

struct SecondarySlot {
    handle: Option<SubscriptionHandle>,
    cancelled: bool,
}

fn cancel_secondary(slot: &Mutex<SecondarySlot>) {
    let handle = {
        let mut slot = slot.lock().unwrap();
        slot.cancelled = true;
        slot.handle.take()
    };
    if let Some(handle) = handle {
        handle.cancel();
    }
}

/// Secondary-side subscriber: records the latest value, swallows the
/// terminal signal.
struct LatestTracker<U, E2> {
    cache: Arc<Mutex<Option<U>>>,
    slot: Arc<Mutex<SecondarySlot>>,
    _marker: PhantomData<fn(E2)>,
}

impl<U, E2> PullSubscriber for LatestTracker<U, E2>
where
    U: Send + 'static,
    E2: Send + 'static,
{
    type Item = U;
    type Error = E2;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        let cancelled = {
            let mut slot = self.slot.lock().unwrap();
            if slot.cancelled {
                true
            } else {
                slot.handle = Some(Arc::clone(&subscription));
                false
            }
        };
        if cancelled {
            subscription.cancel();
        } else {
            subscription.request(Demand::unbounded());
        }
    }

    fn receive_value(&mut self, value: U) -> Demand {
        *self.cache.lock().unwrap() = Some(value);
        Demand::none()
    }

    fn receive_completion(&mut self, _completion: Completion<E2>) {
        // Losing the secondary only stops future sampling.
    }
}

struct PrimarySubscriber<T, U, Sub, F> {
    downstream: Sub,
    cache: Arc<Mutex<Option<U>>>,
    secondary: Arc<Mutex<SecondarySlot>>,
    combine: F,
    _marker: PhantomData<fn(T)>,
}

impl<T, U, Sub, F> PullSubscriber for PrimarySubscriber<T, U, Sub, F>
where
    T: Send + 'static,
    U: Clone + Send + 'static,
    Sub: PullSubscriber,
    F: FnMut(T, U) -> Sub::Item + Send + 'static,
{
    type Item = T;
    type Error = Sub::Error;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        self.downstream.receive_subscription(Arc::new(CombinedHandle {
            primary: subscription,
            secondary: Arc::clone(&self.secondary),
        }));
    }

    fn receive_value(&mut self, value: T) -> Demand {
        let latest = self.cache.lock().unwrap().clone();
        match latest {
            // Nothing sampled yet: drop the value and replace its demand.
            None => Demand::max(1),
            Some(latest) => self
                .downstream
                .receive_value((self.combine)(value, latest)),
        }
    }

    fn receive_completion(&mut self, completion: Completion<Self::Error>) {
        cancel_secondary(&self.secondary);
        self.downstream.receive_completion(completion);
    }
}

struct CombinedHandle {
    primary: SubscriptionHandle,
    secondary: Arc<Mutex<SecondarySlot>>,
}

impl PullSubscription for CombinedHandle {
    fn request(&self, demand: Demand) {
        self.primary.request(demand);
    }

    fn cancel(&self) {
        self.primary.cancel();
        cancel_secondary(&self.secondary);
    }
}
