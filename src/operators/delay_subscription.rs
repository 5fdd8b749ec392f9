//! Scheduler-deferred subscription.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::demand::Demand;
use crate::pull::{
    Completion, PullStream, PullSubscriber, PullSubscription, SubscriptionHandle,
};
use crate::scheduler::{ScheduledHandle, Scheduler};

/// Defers subscribing `upstream` until `interval` has elapsed on the given
/// scheduler, measured from the downstream subscription.
///
/// Downstream gets a proxy subscription immediately; demand requested
/// before the timer fires is accumulated and flushed once the upstream
/// subscription exists. Cancelling the proxy before the timer fires revokes
/// the scheduled unit — the upstream is never subscribed.
pub struct DelaySubscription<P, Sch> {
    upstream: P,
    interval: Duration,
    tolerance: Option<Duration>,
    scheduler: Sch,
}

impl<P, Sch> DelaySubscription<P, Sch> {
    pub fn new(upstream: P, interval: Duration, tolerance: Option<Duration>, scheduler: Sch) -> Self {
        DelaySubscription {
            upstream,
            interval,
            tolerance,
            scheduler,
        }
    }
}

impl<P, Sch> PullStream for DelaySubscription<P, Sch>
where
    P: PullStream,
    Sch: Scheduler,
{
    type Item = P::Item;
    type Error = P::Error;

    fn subscribe<S>(self, mut subscriber: S)
    where
        S: PullSubscriber<Item = P::Item, Error = P::Error>,
    {
        let shared = Arc::new(Mutex::new(DelayState {
            upstream: Some(self.upstream),
            inner: None,
            pending: Demand::none(),
            cancelled: false,
            downstream: None,
            timer: None,
        }));

        subscriber.receive_subscription(Arc::new(DelayHandle {
            shared: Arc::clone(&shared),
        }));
        {
            let mut state = shared.lock().unwrap();
            if !state.cancelled {
                state.downstream = Some(subscriber);
            }
        }

        let fire = Arc::clone(&shared);
        let timer = self.scheduler.schedule(
            self.interval,
            self.tolerance,
            Box::new(move || {
                let (upstream, downstream) = {
                    let mut state = fire.lock().unwrap();
                    if state.cancelled {
                        return;
                    }
                    (state.upstream.take(), state.downstream.take())
                };
                let (Some(upstream), Some(downstream)) = (upstream, downstream) else {
                    return;
                };
                upstream.subscribe(DelayForward {
                    shared: fire,
                    downstream,
                });
            }),
        );
        {
            let mut state = shared.lock().unwrap();
            if state.cancelled {
                drop(state);
                timer.cancel();
            } else {
                state.timer = Some(timer);
            }
        }
    }
}

struct DelayState<P, S> {
    /// Present only until the timer fires; an early cancel drops it without
    /// ever subscribing.
    upstream: Option<P>,
    inner: Option<SubscriptionHandle>,
    pending: Demand,
    cancelled: bool,
    downstream: Option<S>,
    timer: Option<ScheduledHandle>,
}

/// Post-fire forwarder; owns the downstream subscriber outright, so the hot
/// path is lock-free apart from the cancellation check.
struct DelayForward<P, S> {
    shared: Arc<Mutex<DelayState<P, S>>>,
    downstream: S,
}

impl<P, S> PullSubscriber for DelayForward<P, S>
where
    P: PullStream,
    S: PullSubscriber<Item = P::Item, Error = P::Error>,
{
    type Item = P::Item;
    type Error = P::Error;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        // Downstream already holds the proxy; absorb the real subscription
        // and flush whatever demand accumulated during the wait.
        let pending = {
            let mut state = self.shared.lock().unwrap();
            if state.cancelled {
                drop(state);
                subscription.cancel();
                return;
            }
            state.inner = Some(Arc::clone(&subscription));
            std::mem::replace(&mut state.pending, Demand::none())
        };
        if !pending.is_none() {
            subscription.request(pending);
        }
    }

    fn receive_value(&mut self, value: P::Item) -> Demand {
        if self.shared.lock().unwrap().cancelled {
            return Demand::none();
        }
        self.downstream.receive_value(value)
    }

    fn receive_completion(&mut self, completion: Completion<P::Error>) {
        {
            let mut state = self.shared.lock().unwrap();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            state.inner = None;
        }
        self.downstream.receive_completion(completion);
    }
}

struct DelayHandle<P, S> {
    shared: Arc<Mutex<DelayState<P, S>>>,
}

impl<P, S> PullSubscription for DelayHandle<P, S>
where
    P: PullStream,
    S: PullSubscriber<Item = P::Item, Error = P::Error>,
{
    fn request(&self, demand: Demand) {
        let inner = {
            let mut state = self.shared.lock().unwrap();
            if state.cancelled {
                return;
            }
            match state.inner.clone() {
                Some(inner) => inner,
                None => {
                    state.pending = state.pending.add(demand);
                    return;
                }
            }
        };
        inner.request(demand);
    }

    fn cancel(&self) {
        let (timer, inner) = {
            let mut state = self.shared.lock().unwrap();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            state.upstream.take();
            state.downstream.take();
            (state.timer.take(), state.inner.take())
        };
        if let Some(timer) = timer {
            timer.cancel();
        }
        if let Some(inner) = inner {
            inner.cancel();
        }
    }
}
