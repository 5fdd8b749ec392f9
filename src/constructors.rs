//! Cold pull-stream constructors.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use crate::demand::Demand;
use crate::pull::{Completion, PullStream, PullSubscriber, PullSubscription};

/// A subscription with nothing left to regulate.
struct InertSubscription;

impl PullSubscription for InertSubscription {
    fn request(&self, _demand: Demand) {}
    fn cancel(&self) {}
}

/// Emits a single value, then completes.
pub fn just<T, E>(value: T) -> Iter<std::iter::Once<T>, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    from_iter(std::iter::once(value))
}

/// Completes immediately without emitting.
pub fn empty<T, E>() -> Iter<std::iter::Empty<T>, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    from_iter(std::iter::empty())
}

/// Fails immediately with `error`.
pub fn fail<T, E>(error: E) -> Fail<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    Fail {
        error,
        _marker: PhantomData,
    }
}

/// Builds the stream lazily at subscription time.
///
/// Handy for retry factories and for sources whose construction has side
/// effects that should not happen until someone subscribes.
pub fn defer<P, F>(factory: F) -> Defer<F>
where
    P: PullStream,
    F: FnOnce() -> P + Send + 'static,
{
    Defer { factory }
}

/// Cold, demand-respecting stream over an iterator.
///
/// Values are handed over strictly per demand; the iterator is advanced one
/// element ahead so completion lands together with the last value's
/// delivery round rather than needing an extra request.
pub fn from_iter<C, E>(collection: C) -> Iter<C::IntoIter, E>
where
    C: IntoIterator,
    C::IntoIter: Iterator + Send + 'static,
    C::Item: Send + 'static,
    E: Send + 'static,
{
    Iter {
        iter: collection.into_iter(),
        _marker: PhantomData,
    }
}

pub struct Iter<I, E> {
    iter: I,
    _marker: PhantomData<fn() -> E>,
}

impl<I, E> PullStream for Iter<I, E>
where
    I: Iterator + Send + 'static,
    I::Item: Send + 'static,
    E: Send + 'static,
{
    type Item = I::Item;
    type Error = E;

    fn subscribe<S>(self, mut subscriber: S)
    where
        S: PullSubscriber<Item = I::Item, Error = E>,
    {
        let mut iter = self.iter;
        let first = iter.next();
        if first.is_none() {
            subscriber.receive_subscription(Arc::new(InertSubscription));
            subscriber.receive_completion(Completion::Finished);
            return;
        }

        let shared = Arc::new(IterShared {
            state: Mutex::new(IterState {
                iter,
                peeked: first,
                demand: Demand::none(),
                downstream: None,
                delivering: false,
                done: false,
            }),
        });
        subscriber.receive_subscription(Arc::new(IterHandle {
            shared: Arc::clone(&shared),
        }));
        {
            let mut state = shared.state.lock().unwrap();
            if !state.done {
                state.downstream = Some(subscriber);
            }
        }
        shared.drain();
    }
}

struct IterState<I: Iterator, S> {
    iter: I,
    peeked: Option<I::Item>,
    demand: Demand,
    downstream: Option<S>,
    delivering: bool,
    done: bool,
}

struct IterShared<I: Iterator, S> {
    state: Mutex<IterState<I, S>>,
}

impl<I, S> IterShared<I, S>
where
    I: Iterator + Send + 'static,
    I::Item: Send + 'static,
    S: PullSubscriber<Item = I::Item>,
{
    fn drain(&self) {
        let mut state = self.state.lock().unwrap();
        if state.delivering || state.done {
            return;
        }
        state.delivering = true;
        loop {
            if state.peeked.is_some() && !state.demand.is_none() {
                let Some(mut downstream) = state.downstream.take() else {
                    break;
                };
                let Some(value) = state.peeked.take() else {
                    state.downstream = Some(downstream);
                    break;
                };
                state.peeked = state.iter.next();
                state.demand = state.demand.decrement();
                drop(state);
                let extra = downstream.receive_value(value);
                state = self.state.lock().unwrap();
                if state.done {
                    break;
                }
                state.downstream = Some(downstream);
                if !extra.is_none() {
                    state.demand = state.demand.add(extra);
                }
                continue;
            }
            if state.peeked.is_none() {
                state.done = true;
                state.delivering = false;
                let downstream = state.downstream.take();
                drop(state);
                if let Some(mut downstream) = downstream {
                    downstream.receive_completion(Completion::Finished);
                }
                return;
            }
            break;
        }
        state.delivering = false;
    }

    fn add_demand(&self, demand: Demand) {
        if demand.is_none() {
            return;
        }
        {
            let mut state = self.state.lock().unwrap();
            if state.done {
                return;
            }
            state.demand = state.demand.add(demand);
        }
        self.drain();
    }

    fn cancel(&self) {
        let downstream = {
            let mut state = self.state.lock().unwrap();
            if state.done {
                return;
            }
            state.done = true;
            state.peeked = None;
            state.downstream.take()
        };
        drop(downstream);
    }
}

struct IterHandle<I: Iterator, S> {
    shared: Arc<IterShared<I, S>>,
}

impl<I, S> PullSubscription for IterHandle<I, S>
where
    I: Iterator + Send + 'static,
    I::Item: Send + 'static,
    S: PullSubscriber<Item = I::Item>,
{
    fn request(&self, demand: Demand) {
        self.shared.add_demand(demand);
    }

    fn cancel(&self) {
        self.shared.cancel();
    }
}

pub struct Fail<T, E> {
    error: E,
    _marker: PhantomData<fn() -> T>,
}

impl<T, E> PullStream for Fail<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    type Item = T;
    type Error = E;

    fn subscribe<S>(self, mut subscriber: S)
    where
        S: PullSubscriber<Item = T, Error = E>,
    {
        subscriber.receive_subscription(Arc::new(InertSubscription));
        subscriber.receive_completion(Completion::Failed(self.error));
    }
}

pub struct Defer<F> {
    factory: F,
}

impl<P, F> PullStream for Defer<F>
where
    P: PullStream,
    F: FnOnce() -> P + Send + 'static,
{
    type Item = P::Item;
    type Error = P::Error;

    fn subscribe<S>(self, subscriber: S)
    where
        S: PullSubscriber<Item = P::Item, Error = P::Error>,
    {
        (self.factory)().subscribe(subscriber);
    }
}
