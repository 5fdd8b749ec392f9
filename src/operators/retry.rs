//! Exponential-backoff resubscription.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::demand::Demand;
use crate::pull::{
    Completion, PullStream, PullSubscriber, PullSubscription, SubscriptionHandle,
};
use crate::scheduler::{ScheduledHandle, Scheduler};

/// Pure backoff cursor.
///
/// `delay()` is `initial_delay` for the first attempt, then
/// `initial_delay * (1 + multiplier)^(attempt - 1)`, truncated to whole
/// milliseconds. Once `attempt` exceeds `max_count` it returns `None` — the
/// "no further attempts" sentinel. Cursors are recomputed via [`next`],
/// never mutated.
///
/// # Examples
/// ```
/// use bridge_stream::RetryCursor;
///
/// let cursor = RetryCursor::new(3, 0.5);
/// assert_eq!(cursor.delay().unwrap().as_millis(), 1000);
/// assert_eq!(cursor.next().delay().unwrap().as_millis(), 1500);
/// assert_eq!(cursor.next().next().next().delay(), None);
/// ```
///
/// [`next`]: RetryCursor::next
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryCursor {
    attempt: u32,
    max_count: u32,
    initial_delay: Duration,
    multiplier: f64,
}

impl RetryCursor {
    /// Cursor for the first attempt, with the conventional one-second
    /// initial delay.
    pub fn new(max_count: u32, multiplier: f64) -> Self {
        RetryCursor {
            attempt: 1,
            max_count,
            initial_delay: Duration::from_secs(1),
            multiplier,
        }
    }

    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Backoff before resubscribing after this attempt failed, or `None`
    /// once the attempts are exhausted.
    pub fn delay(&self) -> Option<Duration> {
        if self.attempt > self.max_count {
            return None;
        }
        let initial = self.initial_delay.as_secs_f64();
        let seconds = if self.attempt == 1 {
            initial
        } else {
            initial * (1.0 + self.multiplier).powi(self.attempt as i32 - 1)
        };
        Some(Duration::from_millis((seconds * 1000.0) as u64))
    }

    /// The cursor for the following attempt.
    pub fn next(&self) -> Self {
        RetryCursor {
            attempt: self.attempt + 1,
            ..*self
        }
    }
}

/// Resubscribes a failed stream after a cursor-computed backoff.
///
/// Each attempt subscribes a fresh stream from the factory under a new
/// generation; events from a superseded attempt are discarded, so a
/// cancellation during the backoff wait can never produce a late, orphaned
/// subscription. Outstanding downstream demand carries across attempts.
/// Once the cursor is exhausted the original failure is propagated
/// unchanged; a value or natural completion ends all retry bookkeeping.
pub struct ExponentialRetry<P, F, Sch> {
    first: P,
    factory: F,
    cursor: RetryCursor,
    scheduler: Sch,
}

impl<P, F, Sch> ExponentialRetry<P, F, Sch> {
    pub fn new(first: P, factory: F, max_count: u32, multiplier: f64, scheduler: Sch) -> Self {
        ExponentialRetry {
            first,
            factory,
            cursor: RetryCursor::new(max_count, multiplier),
            scheduler,
        }
    }
}

impl<P, F, Sch> PullStream for ExponentialRetry<P, F, Sch>
where
    P: PullStream,
    F: FnMut() -> P + Send + 'static,
    Sch: Scheduler,
{
    type Item = P::Item;
    type Error = P::Error;

    fn subscribe<S>(self, mut subscriber: S)
    where
        S: PullSubscriber<Item = P::Item, Error = P::Error>,
    {
        let shared = Arc::new(RetryShared {
            state: Mutex::new(RetryState {
                factory: self.factory,
                cursor: self.cursor,
                scheduler: self.scheduler,
                current: None,
                timer: None,
                pending: Demand::none(),
                generation: 1,
                terminated: false,
                downstream: None,
                _marker: std::marker::PhantomData,
            }),
        });
        subscriber.receive_subscription(Arc::new(RetryHandle {
            shared: Arc::clone(&shared),
        }));
        {
            let mut state = shared.state.lock().unwrap();
            if !state.terminated {
                state.downstream = Some(subscriber);
            }
        }
        self.first.subscribe(AttemptSubscriber {
            shared,
            generation: 1,
        });
    }
}

struct RetryState<P, F, Sch, S> {
    factory: F,
    cursor: RetryCursor,
    scheduler: Sch,
    current: Option<SubscriptionHandle>,
    timer: Option<ScheduledHandle>,
    pending: Demand,
    generation: u64,
    terminated: bool,
    downstream: Option<S>,
    _marker: std::marker::PhantomData<fn() -> P>,
}

struct RetryShared<P, F, Sch, S> {
    state: Mutex<RetryState<P, F, Sch, S>>,
}

struct AttemptSubscriber<P, F, Sch, S> {
    shared: Arc<RetryShared<P, F, Sch, S>>,
    generation: u64,
}

impl<P, F, Sch, S> PullSubscriber for AttemptSubscriber<P, F, Sch, S>
where
    P: PullStream,
    F: FnMut() -> P + Send + 'static,
    Sch: Scheduler,
    S: PullSubscriber<Item = P::Item, Error = P::Error>,
{
    type Item = P::Item;
    type Error = P::Error;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        let pending = {
            let mut state = self.shared.state.lock().unwrap();
            if state.terminated || state.generation != self.generation {
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

    fn receive_value(&mut self, value: P::Item) -> Demand {
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

    fn receive_completion(&mut self, completion: Completion<P::Error>) {
        match completion {
            Completion::Finished => {
                let downstream = {
                    let mut state = self.shared.state.lock().unwrap();
                    if state.terminated || state.generation != self.generation {
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
            Completion::Failed(error) => {
                let mut state = self.shared.state.lock().unwrap();
                if state.terminated || state.generation != self.generation {
                    return;
                }
                state.current = None;
                match state.cursor.delay() {
                    None => {
                        // Attempts exhausted: the original failure surfaces
                        // unchanged.
                        state.terminated = true;
                        let downstream = state.downstream.take();
                        drop(state);
                        if let Some(mut downstream) = downstream {
                            downstream.receive_completion(Completion::Failed(error));
                        }
                    }
                    Some(wait) => {
                        state.cursor = state.cursor.next();
                        state.generation += 1;
                        let generation = state.generation;
                        log::warn!(
                            "upstream failed; scheduling retry attempt {} in {:?}",
                            state.cursor.attempt(),
                            wait
                        );
                        let scheduler = state.scheduler.clone();
                        drop(state);

                        let fire = Arc::clone(&self.shared);
                        let timer = scheduler.schedule(
                            wait,
                            None,
                            Box::new(move || {
                                let next = {
                                    let mut state = fire.state.lock().unwrap();
                                    if state.terminated || state.generation != generation {
                                        return;
                                    }
                                    (state.factory)()
                                };
                                next.subscribe(AttemptSubscriber {
                                    shared: Arc::clone(&fire),
                                    generation,
                                });
                            }),
                        );

                        let mut state = self.shared.state.lock().unwrap();
                        if state.terminated {
                            drop(state);
                            timer.cancel();
                        } else {
                            state.timer = Some(timer);
                        }
                    }
                }
            }
        }
    }
}

struct RetryHandle<P, F, Sch, S> {
    shared: Arc<RetryShared<P, F, Sch, S>>,
}

impl<P, F, Sch, S> PullSubscription for RetryHandle<P, F, Sch, S>
where
    P: PullStream,
    F: FnMut() -> P + Send + 'static,
    Sch: Scheduler,
    S: PullSubscriber<Item = P::Item, Error = P::Error>,
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
        let (current, timer, downstream) = {
            let mut state = self.shared.state.lock().unwrap();
            if state.terminated {
                return;
            }
            state.terminated = true;
            (
                state.current.take(),
                state.timer.take(),
                state.downstream.take(),
            )
        };
        if let Some(current) = current {
            current.cancel();
        }
        if let Some(timer) = timer {
            timer.cancel();
        }
        drop(downstream);
    }
}
