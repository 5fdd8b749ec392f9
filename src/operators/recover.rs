//! Failure-channel conversions.
//!
//! These are the deliberate exceptions to the propagate-everything rule:
//! each converts a fallible pull stream into one whose error type is
//! [`Infallible`], by substituting a fallback value or stream for the
//! failure. [`AssertNoOverflow`] is the opposite edge — it turns a bridge
//! overflow into a programming-error assertion.

use std::convert::Infallible;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use crate::demand::Demand;
use crate::error::BridgeError;
use crate::pull::{
    Completion, PullStream, PullSubscriber, PullSubscription, SubscriptionHandle,
};

/// Switches to a recovery stream when the upstream fails.
pub struct OnErrorResumeWith<P, F> {
    upstream: P,
    recover: F,
}

impl<P, F> OnErrorResumeWith<P, F> {
    pub fn new(upstream: P, recover: F) -> Self {
        OnErrorResumeWith { upstream, recover }
    }
}

impl<P, F, R> PullStream for OnErrorResumeWith<P, F>
where
    P: PullStream,
    F: FnOnce(P::Error) -> R + Send + 'static,
    R: PullStream<Item = P::Item, Error = Infallible>,
{
    type Item = P::Item;
    type Error = Infallible;

    fn subscribe<S>(self, mut subscriber: S)
    where
        S: PullSubscriber<Item = P::Item, Error = Infallible>,
    {
        let shared = Arc::new(ResumeShared {
            state: Mutex::new(ResumeState {
                recover: Some(self.recover),
                downstream: None,
                current: None,
                pending: Demand::none(),
                terminated: false,
            }),
        });
        subscriber.receive_subscription(Arc::new(ResumeHandle {
            shared: Arc::clone(&shared),
        }));
        {
            let mut state = shared.state.lock().unwrap();
            if !state.terminated {
                state.downstream = Some(subscriber);
            }
        }
        self.upstream.subscribe(PrimaryPhase {
            shared,
            _marker: PhantomData::<fn(P::Error)>,
        });
    }
}

struct ResumeState<F, S> {
    recover: Option<F>,
    downstream: Option<S>,
    current: Option<SubscriptionHandle>,
    pending: Demand,
    terminated: bool,
}

struct ResumeShared<F, S> {
    state: Mutex<ResumeState<F, S>>,
}

impl<F, S> ResumeShared<F, S>
where
    F: Send + 'static,
    S: PullSubscriber,
{
    fn attach(&self, subscription: SubscriptionHandle) {
        let pending = {
            let mut state = self.state.lock().unwrap();
            if state.terminated {
                drop(state);
                subscription.cancel();
                return;
            }
            state.current = Some(Arc::clone(&subscription));
            state.pending
        };
        if !pending.is_none() {
            subscription.request(pending);
        }
    }

    fn deliver(&self, value: S::Item) -> Demand {
        let mut downstream = {
            let mut state = self.state.lock().unwrap();
            if state.terminated {
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
            let mut state = self.state.lock().unwrap();
            if !state.terminated {
                state.downstream = Some(downstream);
                if !extra.is_none() {
                    state.pending = state.pending.add(extra);
                }
            }
        }
        extra
    }

    fn finish(&self) {
        let downstream = {
            let mut state = self.state.lock().unwrap();
            if state.terminated {
                return;
            }
            state.terminated = true;
            state.current = None;
            state.downstream.take()
        };
        if let Some(mut downstream) = downstream {
            downstream.receive_completion(Completion::Finished);
        }
    }
}

struct PrimaryPhase<E, F, S> {
    shared: Arc<ResumeShared<F, S>>,
    _marker: PhantomData<fn(E)>,
}

impl<E, F, S, R> PullSubscriber for PrimaryPhase<E, F, S>
where
    E: Send + 'static,
    F: FnOnce(E) -> R + Send + 'static,
    R: PullStream<Item = S::Item, Error = Infallible>,
    S: PullSubscriber<Error = Infallible>,
{
    type Item = S::Item;
    type Error = E;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        self.shared.attach(subscription);
    }

    fn receive_value(&mut self, value: S::Item) -> Demand {
        self.shared.deliver(value)
    }

    fn receive_completion(&mut self, completion: Completion<E>) {
        match completion {
            Completion::Finished => self.shared.finish(),
            Completion::Failed(error) => {
                let recover = {
                    let mut state = self.shared.state.lock().unwrap();
                    if state.terminated {
                        return;
                    }
                    state.current = None;
                    state.recover.take()
                };
                let Some(recover) = recover else {
                    return;
                };
                recover(error).subscribe(FallbackPhase {
                    shared: Arc::clone(&self.shared),
                });
            }
        }
    }
}

struct FallbackPhase<F, S> {
    shared: Arc<ResumeShared<F, S>>,
}

impl<F, S> PullSubscriber for FallbackPhase<F, S>
where
    F: Send + 'static,
    S: PullSubscriber<Error = Infallible>,
{
    type Item = S::Item;
    type Error = Infallible;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        self.shared.attach(subscription);
    }

    fn receive_value(&mut self, value: S::Item) -> Demand {
        self.shared.deliver(value)
    }

    fn receive_completion(&mut self, completion: Completion<Infallible>) {
        match completion {
            Completion::Finished => self.shared.finish(),
            Completion::Failed(never) => match never {},
        }
    }
}

struct ResumeHandle<F, S> {
    shared: Arc<ResumeShared<F, S>>,
}

impl<F, S> PullSubscription for ResumeHandle<F, S>
where
    F: Send + 'static,
    S: PullSubscriber,
{
    fn request(&self, demand: Demand) {
        let current = {
            let mut state = self.shared.state.lock().unwrap();
            if state.terminated {
                return;
            }
            state.pending = state.pending.add(demand);
            state.current.clone()
        };
        if let Some(current) = current {
            current.request(demand);
        }
    }

    fn cancel(&self) {
        let (current, downstream) = {
            let mut state = self.shared.state.lock().unwrap();
            if state.terminated {
                return;
            }
            state.terminated = true;
            state.recover = None;
            (state.current.take(), state.downstream.take())
        };
        if let Some(current) = current {
            current.cancel();
        }
        drop(downstream);
    }
}

/// Folds the failure channel into `Result` items.
///
/// An upstream error is delivered as one final `Err` value (respecting
/// demand — it is staged until demand exists) followed by completion.
pub struct AsResult<P> {
    upstream: P,
}

impl<P> AsResult<P> {
    pub fn new(upstream: P) -> Self {
        AsResult { upstream }
    }
}

impl<P> PullStream for AsResult<P>
where
    P: PullStream,
{
    type Item = Result<P::Item, P::Error>;
    type Error = Infallible;

    fn subscribe<S>(self, subscriber: S)
    where
        S: PullSubscriber<Item = Result<P::Item, P::Error>, Error = Infallible>,
    {
        let shared = Arc::new(AsResultShared {
            state: Mutex::new(AsResultState {
                downstream: None,
                upstream: None,
                outstanding: Demand::none(),
                staged_error: None,
                terminated: false,
            }),
        });
        self.upstream.subscribe(AsResultSubscriber {
            shared,
            pending_downstream: Some(subscriber),
        });
    }
}

struct AsResultState<E, S> {
    downstream: Option<S>,
    upstream: Option<SubscriptionHandle>,
    outstanding: Demand,
    staged_error: Option<E>,
    terminated: bool,
}

struct AsResultShared<E, S> {
    state: Mutex<AsResultState<E, S>>,
}

impl<T, E, S> AsResultShared<E, S>
where
    T: Send + 'static,
    E: Send + 'static,
    S: PullSubscriber<Item = Result<T, E>, Error = Infallible>,
{
    /// Emits the staged error as a value plus completion once demand exists.
    fn flush_staged(&self) {
        let (error, downstream) = {
            let mut state = self.state.lock().unwrap();
            if state.terminated || state.staged_error.is_none() || state.outstanding.is_none() {
                return;
            }
            state.terminated = true;
            (state.staged_error.take(), state.downstream.take())
        };
        let (Some(error), Some(mut downstream)) = (error, downstream) else {
            return;
        };
        let _ = downstream.receive_value(Err(error));
        downstream.receive_completion(Completion::Finished);
    }
}

struct AsResultSubscriber<E, S> {
    shared: Arc<AsResultShared<E, S>>,
    pending_downstream: Option<S>,
}

impl<T, E, S> PullSubscriber for AsResultSubscriber<E, S>
where
    T: Send + 'static,
    E: Send + 'static,
    S: PullSubscriber<Item = Result<T, E>, Error = Infallible>,
{
    type Item = T;
    type Error = E;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        let Some(mut downstream) = self.pending_downstream.take() else {
            return;
        };
        self.shared.state.lock().unwrap().upstream = Some(Arc::clone(&subscription));
        downstream.receive_subscription(Arc::new(AsResultHandle {
            shared: Arc::clone(&self.shared),
        }));
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.terminated {
                drop(state);
                subscription.cancel();
                return;
            }
            state.downstream = Some(downstream);
        }
        self.shared.flush_staged();
    }

    fn receive_value(&mut self, value: T) -> Demand {
        let mut downstream = {
            let mut state = self.shared.state.lock().unwrap();
            if state.terminated {
                return Demand::none();
            }
            state.outstanding = state.outstanding.decrement();
            match state.downstream.take() {
                Some(downstream) => downstream,
                None => return Demand::none(),
            }
        };
        let extra = downstream.receive_value(Ok(value));
        {
            let mut state = self.shared.state.lock().unwrap();
            if !state.terminated {
                state.downstream = Some(downstream);
                if !extra.is_none() {
                    state.outstanding = state.outstanding.add(extra);
                }
            }
        }
        extra
    }

    fn receive_completion(&mut self, completion: Completion<E>) {
        match completion {
            Completion::Finished => {
                let downstream = {
                    let mut state = self.shared.state.lock().unwrap();
                    if state.terminated {
                        return;
                    }
                    state.terminated = true;
                    state.downstream.take()
                };
                if let Some(mut downstream) = downstream {
                    downstream.receive_completion(Completion::Finished);
                }
            }
            Completion::Failed(error) => {
                let downstream = {
                    let mut state = self.shared.state.lock().unwrap();
                    if state.terminated {
                        return;
                    }
                    if state.outstanding.is_none() {
                        // No demand to carry the Err value yet; hold it
                        // until the next request.
                        state.staged_error = Some(error);
                        return;
                    }
                    state.terminated = true;
                    state.downstream.take()
                };
                if let Some(mut downstream) = downstream {
                    let _ = downstream.receive_value(Err(error));
                    downstream.receive_completion(Completion::Finished);
                }
            }
        }
    }
}

struct AsResultHandle<E, S> {
    shared: Arc<AsResultShared<E, S>>,
}

impl<T, E, S> PullSubscription for AsResultHandle<E, S>
where
    T: Send + 'static,
    E: Send + 'static,
    S: PullSubscriber<Item = Result<T, E>, Error = Infallible>,
{
    fn request(&self, demand: Demand) {
        let upstream = {
            let mut state = self.shared.state.lock().unwrap();
            if state.terminated {
                return;
            }
            state.outstanding = state.outstanding.add(demand);
            state.upstream.clone()
        };
        if let Some(upstream) = upstream {
            upstream.request(demand);
        }
        self.shared.flush_staged();
    }

    fn cancel(&self) {
        let (upstream, downstream) = {
            let mut state = self.shared.state.lock().unwrap();
            if state.terminated {
                return;
            }
            state.terminated = true;
            state.staged_error = None;
            (state.upstream.take(), state.downstream.take())
        };
        if let Some(upstream) = upstream {
            upstream.cancel();
        }
        drop(downstream);
    }
}

/// Maps a bridged stream's failure channel back to the bare upstream error,
/// treating buffer overflow as an irrecoverable programming error.
///
/// Use this when overflow is impossible by construction; if it does happen
/// the process aborts with an assertion rather than surfacing a recoverable
/// failure.
pub struct AssertNoOverflow<P> {
    upstream: P,
}

impl<P> AssertNoOverflow<P> {
    pub fn new(upstream: P) -> Self {
        AssertNoOverflow { upstream }
    }
}

impl<P, E> PullStream for AssertNoOverflow<P>
where
    P: PullStream<Error = BridgeError<E>>,
    E: Send + 'static,
{
    type Item = P::Item;
    type Error = E;

    fn subscribe<S>(self, subscriber: S)
    where
        S: PullSubscriber<Item = P::Item, Error = E>,
    {
        self.upstream.subscribe(AssertSubscriber {
            downstream: subscriber,
            _marker: PhantomData::<fn(E)>,
        });
    }
}

struct AssertSubscriber<E, S> {
    downstream: S,
    _marker: PhantomData<fn(E)>,
}

impl<E, S> PullSubscriber for AssertSubscriber<E, S>
where
    E: Send + 'static,
    S: PullSubscriber<Error = E>,
{
    type Item = S::Item;
    type Error = BridgeError<E>;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        self.downstream.receive_subscription(subscription);
    }

    fn receive_value(&mut self, value: S::Item) -> Demand {
        self.downstream.receive_value(value)
    }

    fn receive_completion(&mut self, completion: Completion<BridgeError<E>>) {
        let completion = match completion {
            Completion::Finished => Completion::Finished,
            Completion::Failed(BridgeError::UpstreamError(error)) => Completion::Failed(error),
            Completion::Failed(BridgeError::BufferOverflow) => {
                panic!("bridge buffer overflowed")
            }
        };
        self.downstream.receive_completion(completion);
    }
}
