//! Stateless and accumulator transforms.

use std::marker::PhantomData;

use crate::demand::Demand;
use crate::pull::{Completion, PullStream, PullSubscriber, SubscriptionHandle};

/// Maps every value through a function; demand passes through untouched.
pub struct Map<P, F> {
    upstream: P,
    transform: F,
}

impl<P, F> Map<P, F> {
    pub fn new(upstream: P, transform: F) -> Self {
        Map { upstream, transform }
    }
}

impl<P, F, U> PullStream for Map<P, F>
where
    P: PullStream,
    F: FnMut(P::Item) -> U + Send + 'static,
    U: Send + 'static,
{
    type Item = U;
    type Error = P::Error;

    fn subscribe<S>(self, subscriber: S)
    where
        S: PullSubscriber<Item = U, Error = P::Error>,
    {
        self.upstream.subscribe(MapSubscriber {
            downstream: subscriber,
            transform: self.transform,
            _marker: PhantomData::<fn(P::Item)>,
        });
    }
}

struct MapSubscriber<T, S, F> {
    downstream: S,
    transform: F,
    _marker: PhantomData<fn(T)>,
}

impl<T, S, F> PullSubscriber for MapSubscriber<T, S, F>
where
    T: Send + 'static,
    S: PullSubscriber,
    F: FnMut(T) -> S::Item + Send + 'static,
{
    type Item = T;
    type Error = S::Error;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        self.downstream.receive_subscription(subscription);
    }

    fn receive_value(&mut self, value: T) -> Demand {
        self.downstream.receive_value((self.transform)(value))
    }

    fn receive_completion(&mut self, completion: Completion<Self::Error>) {
        self.downstream.receive_completion(completion);
    }
}

/// Maps the failure channel; values pass through untouched.
pub struct MapError<P, F> {
    upstream: P,
    transform: F,
}

impl<P, F> MapError<P, F> {
    pub fn new(upstream: P, transform: F) -> Self {
        MapError { upstream, transform }
    }
}

impl<P, F, G> PullStream for MapError<P, F>
where
    P: PullStream,
    F: FnMut(P::Error) -> G + Send + 'static,
    G: Send + 'static,
{
    type Item = P::Item;
    type Error = G;

    fn subscribe<S>(self, subscriber: S)
    where
        S: PullSubscriber<Item = P::Item, Error = G>,
    {
        self.upstream.subscribe(MapErrorSubscriber {
            downstream: subscriber,
            transform: self.transform,
            _marker: PhantomData::<fn(P::Error)>,
        });
    }
}

struct MapErrorSubscriber<E, S, F> {
    downstream: S,
    transform: F,
    _marker: PhantomData<fn(E)>,
}

impl<E, S, F> PullSubscriber for MapErrorSubscriber<E, S, F>
where
    E: Send + 'static,
    S: PullSubscriber,
    F: FnMut(E) -> S::Error + Send + 'static,
{
    type Item = S::Item;
    type Error = E;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        self.downstream.receive_subscription(subscription);
    }

    fn receive_value(&mut self, value: S::Item) -> Demand {
        self.downstream.receive_value(value)
    }

    fn receive_completion(&mut self, completion: Completion<E>) {
        let completion = match completion {
            Completion::Finished => Completion::Finished,
            Completion::Failed(error) => Completion::Failed((self.transform)(error)),
        };
        self.downstream.receive_completion(completion);
    }
}

/// Running accumulator; emits the accumulated state for every upstream value.
pub struct Scan<P, A, F> {
    upstream: P,
    state: A,
    accumulate: F,
}

impl<P, A, F> Scan<P, A, F> {
    pub fn new(upstream: P, initial: A, accumulate: F) -> Self {
        Scan {
            upstream,
            state: initial,
            accumulate,
        }
    }
}

impl<P, A, F> PullStream for Scan<P, A, F>
where
    P: PullStream,
    A: Clone + Send + 'static,
    F: FnMut(A, P::Item) -> A + Send + 'static,
{
    type Item = A;
    type Error = P::Error;

    fn subscribe<S>(self, subscriber: S)
    where
        S: PullSubscriber<Item = A, Error = P::Error>,
    {
        self.upstream.subscribe(ScanSubscriber {
            downstream: subscriber,
            state: self.state,
            accumulate: self.accumulate,
            _marker: PhantomData::<fn(P::Item)>,
        });
    }
}

struct ScanSubscriber<T, A, S, F> {
    downstream: S,
    state: A,
    accumulate: F,
    _marker: PhantomData<fn(T)>,
}

impl<T, A, S, F> PullSubscriber for ScanSubscriber<T, A, S, F>
where
    T: Send + 'static,
    A: Clone + Send + 'static,
    S: PullSubscriber<Item = A>,
    F: FnMut(A, T) -> A + Send + 'static,
{
    type Item = T;
    type Error = S::Error;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        self.downstream.receive_subscription(subscription);
    }

    fn receive_value(&mut self, value: T) -> Demand {
        let next = (self.accumulate)(self.state.clone(), value);
        self.state = next.clone();
        self.downstream.receive_value(next)
    }

    fn receive_completion(&mut self, completion: Completion<Self::Error>) {
        self.downstream.receive_completion(completion);
    }
}
