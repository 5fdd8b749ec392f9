//! Switch-to-latest flattening.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use crate::demand::Demand;
use crate::operators::map::Map;
use crate::pull::{
    Completion, PullStream, PullSubscriber, PullSubscription, SubscriptionHandle,
};

/// `map` + [`SwitchLatest`]: the canonical way to react only to the most
/// recently selected inner stream.
pub type FlatMapLatest<P, F> = SwitchLatest<Map<P, F>>;

/// Flattens a stream of streams, producing values only from the most recent
/// inner stream.
///
/// Every new outer value cancels the currently active inner subscription
/// before subscribing the new one; events from a cancelled inner that are
/// still in flight are discarded by a generation guard. Inner completion
/// does not complete the flattened stream — only outer completion combined
/// with completion of the final active inner does. An error from the outer
/// stream or the *current* inner stream terminates everything immediately.
pub struct SwitchLatest<Outer> {
    outer: Outer,
}

impl<Outer> SwitchLatest<Outer> {
    pub fn new(outer: Outer) -> Self {
        SwitchLatest { outer }
    }
}

impl<Outer, Inner> PullStream for SwitchLatest<Outer>
where
    Outer: PullStream<Item = Inner>,
    Inner: PullStream<Error = Outer::Error>,
{
    type Item = Inner::Item;
    type Error = Outer::Error;

    fn subscribe<S>(self, subscriber: S)
    where
        S: PullSubscriber<Item = Inner::Item, Error = Outer::Error>,
    {
        let shared = Arc::new(SwitchShared {
            state: Mutex::new(SwitchState {
                downstream: Some(subscriber),
                outer: None,
                inner: None,
                generation: 0,
                pending: Demand::none(),
                inner_active: false,
                outer_done: false,
                terminated: false,
            }),
        });
        self.outer.subscribe(OuterSubscriber {
            shared,
            _marker: PhantomData::<fn(Inner)>,
        });
    }
}

struct SwitchState<S> {
    downstream: Option<S>,
    outer: Option<SubscriptionHandle>,
    inner: Option<SubscriptionHandle>,
    generation: u64,
    pending: Demand,
    inner_active: bool,
    outer_done: bool,
    terminated: bool,
}

struct SwitchShared<S> {
    state: Mutex<SwitchState<S>>,
}

impl<S> SwitchShared<S>
where
    S: PullSubscriber,
{
    fn terminate(&self, completion: Completion<S::Error>) {
        let (outer, inner, downstream) = {
            let mut state = self.state.lock().unwrap();
            if state.terminated {
                return;
            }
            state.terminated = true;
            (
                state.outer.take(),
                state.inner.take(),
                state.downstream.take(),
            )
        };
        if let Some(outer) = outer {
            outer.cancel();
        }
        if let Some(inner) = inner {
            inner.cancel();
        }
        if let Some(mut downstream) = downstream {
            downstream.receive_completion(completion);
        }
    }
}

struct OuterSubscriber<Inner, S> {
    shared: Arc<SwitchShared<S>>,
    _marker: PhantomData<fn(Inner)>,
}

impl<Inner, S> PullSubscriber for OuterSubscriber<Inner, S>
where
    Inner: PullStream,
    S: PullSubscriber<Item = Inner::Item, Error = Inner::Error>,
{
    type Item = Inner;
    type Error = Inner::Error;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        let mut downstream = {
            let mut state = self.shared.state.lock().unwrap();
            if state.terminated {
                drop(state);
                subscription.cancel();
                return;
            }
            state.outer = Some(Arc::clone(&subscription));
            match state.downstream.take() {
                Some(downstream) => downstream,
                None => return,
            }
        };
        downstream.receive_subscription(Arc::new(SwitchHandle {
            shared: Arc::clone(&self.shared),
        }));
        {
            let mut state = self.shared.state.lock().unwrap();
            if !state.terminated {
                state.downstream = Some(downstream);
            }
        }
        // Outer values are stream selections, not payload: consume eagerly.
        subscription.request(Demand::unbounded());
    }

    fn receive_value(&mut self, inner_stream: Inner) -> Demand {
        let (previous, generation) = {
            let mut state = self.shared.state.lock().unwrap();
            if state.terminated {
                return Demand::none();
            }
            state.generation += 1;
            state.inner_active = true;
            (state.inner.take(), state.generation)
        };
        if let Some(previous) = previous {
            previous.cancel();
        }
        inner_stream.subscribe(InnerSubscriber {
            shared: Arc::clone(&self.shared),
            generation,
            _marker: PhantomData::<fn(Inner::Item)>,
        });
        Demand::none()
    }

    fn receive_completion(&mut self, completion: Completion<Self::Error>) {
        match completion {
            Completion::Finished => {
                let finish = {
                    let mut state = self.shared.state.lock().unwrap();
                    if state.terminated {
                        return;
                    }
                    state.outer_done = true;
                    !state.inner_active
                };
                if finish {
                    self.shared.terminate(Completion::Finished);
                }
            }
            Completion::Failed(error) => {
                self.shared.terminate(Completion::Failed(error));
            }
        }
    }
}

struct InnerSubscriber<T, S> {
    shared: Arc<SwitchShared<S>>,
    generation: u64,
    _marker: PhantomData<fn(T)>,
}

impl<T, S> PullSubscriber for InnerSubscriber<T, S>
where
    T: Send + 'static,
    S: PullSubscriber<Item = T>,
{
    type Item = T;
    type Error = S::Error;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        let pending = {
            let mut state = self.shared.state.lock().unwrap();
            if state.terminated || state.generation != self.generation {
                drop(state);
                subscription.cancel();
                return;
            }
            state.inner = Some(Arc::clone(&subscription));
            state.pending
        };
        if !pending.is_none() {
            subscription.request(pending);
        }
    }

    fn receive_value(&mut self, value: T) -> Demand {
        let mut downstream = {
            let mut state = self.shared.state.lock().unwrap();
            if state.terminated || state.generation != self.generation {
                return Demand::none();
            }
            state.pending = state.pending.decrement();
            match state.downstream.take() {
                Some(downstream) => downstream,
                None => return Demand::none(),
            }
        };
        let extra = downstream.receive_value(value);
        {
            let mut state = self.shared.state.lock().unwrap();
            if !state.terminated {
                state.downstream = Some(downstream);
                if !extra.is_none() {
                    state.pending = state.pending.add(extra);
                }
            }
        }
        extra
    }

    fn receive_completion(&mut self, completion: Completion<Self::Error>) {
        match completion {
            Completion::Finished => {
                let finish = {
                    let mut state = self.shared.state.lock().unwrap();
                    if state.terminated || state.generation != self.generation {
                        return;
                    }
                    state.inner_active = false;
                    state.inner = None;
                    state.outer_done
                };
                if finish {
                    self.shared.terminate(Completion::Finished);
                }
            }
            Completion::Failed(error) => {
                let stale = {
                    let state = self.shared.state.lock().unwrap();
                    state.terminated || state.generation != self.generation
                };
                if !stale {
                    self.shared.terminate(Completion::Failed(error));
                }
            }
        }
    }
}

struct SwitchHandle<S> {
    shared: Arc<SwitchShared<S>>,
}

impl<S> PullSubscription for SwitchHandle<S>
where
    S: PullSubscriber,
{
    fn request(&self, demand: Demand) {
        let inner = {
            let mut state = self.shared.state.lock().unwrap();
            if state.terminated {
                return;
            }
            state.pending = state.pending.add(demand);
            state.inner.clone()
        };
        if let Some(inner) = inner {
            inner.request(demand);
        }
    }

    fn cancel(&self) {
        let (outer, inner, downstream) = {
            let mut state = self.shared.state.lock().unwrap();
            if state.terminated {
                return;
            }
            state.terminated = true;
            (
                state.outer.take(),
                state.inner.take(),
                state.downstream.take(),
            )
        };
        if let Some(outer) = outer {
            outer.cancel();
        }
        if let Some(inner) = inner {
            inner.cancel();
        }
        drop(downstream);
    }
}
