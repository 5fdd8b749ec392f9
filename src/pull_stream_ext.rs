//! Combinator surface for pull streams.

use std::convert::Infallible;
use std::time::Duration;

use futures_util::stream::BoxStream;

use crate::adapter::{into_stream, pull_to_push};
use crate::error::BridgeError;
use crate::operators::delay_subscription::DelaySubscription;
use crate::operators::map::{Map, MapError, Scan};
use crate::operators::recover::{AsResult, AssertNoOverflow, OnErrorResumeWith};
use crate::operators::retry::ExponentialRetry;
use crate::operators::switch_latest::{FlatMapLatest, SwitchLatest};
use crate::operators::with_latest_from::WithLatestFrom;
use crate::pull::{BoxPullStream, PullStream};
use crate::push::PushSource;
use crate::scheduler::Scheduler;

fn pair<A, B>(primary: A, latest: B) -> (A, B) {
    (primary, latest)
}

fn shift<T>(acc: (T, T), value: T) -> (T, T) {
    (acc.1, value)
}

/// Extension trait providing the operator combinators on any [`PullStream`].
pub trait PullStreamExt: PullStream {
    /// Maps every value through `transform`.
    fn map<U, F>(self, transform: F) -> Map<Self, F>
    where
        F: FnMut(Self::Item) -> U + Send + 'static,
        U: Send + 'static,
    {
        Map::new(self, transform)
    }

    /// Maps the failure channel through `transform`.
    fn map_err<G, F>(self, transform: F) -> MapError<Self, F>
    where
        F: FnMut(Self::Error) -> G + Send + 'static,
        G: Send + 'static,
    {
        MapError::new(self, transform)
    }

    /// Emits the running accumulation of `accumulate` over the stream.
    fn scan<A, F>(self, initial: A, accumulate: F) -> Scan<Self, A, F>
    where
        A: Clone + Send + 'static,
        F: FnMut(A, Self::Item) -> A + Send + 'static,
    {
        Scan::new(self, initial, accumulate)
    }

    /// Emits `(previous, current)` pairs, seeded with `initial` as the first
    /// "previous".
    fn with_previous(
        self,
        initial: Self::Item,
    ) -> Scan<
        Self,
        (Self::Item, Self::Item),
        fn((Self::Item, Self::Item), Self::Item) -> (Self::Item, Self::Item),
    >
    where
        Self::Item: Clone,
    {
        let accumulate = shift::<Self::Item>
            as fn((Self::Item, Self::Item), Self::Item) -> (Self::Item, Self::Item);
        Scan::new(self, (initial.clone(), initial), accumulate)
    }

    /// Combines every value of `self` with the latest value of `secondary`
    /// as a `(primary, latest)` pair. See [`WithLatestFrom`] for the exact
    /// sampling contract.
    fn with_latest_from<S2>(
        self,
        secondary: S2,
    ) -> WithLatestFrom<Self, S2, fn(Self::Item, S2::Item) -> (Self::Item, S2::Item)>
    where
        S2: PullStream,
        S2::Item: Clone,
    {
        let combine =
            pair::<Self::Item, S2::Item> as fn(Self::Item, S2::Item) -> (Self::Item, S2::Item);
        WithLatestFrom::new(self, secondary, combine)
    }

    /// [`with_latest_from`](PullStreamExt::with_latest_from) with an
    /// explicit combining function.
    fn with_latest_from_with<S2, F, O>(
        self,
        secondary: S2,
        combine: F,
    ) -> WithLatestFrom<Self, S2, F>
    where
        S2: PullStream,
        S2::Item: Clone,
        F: FnMut(Self::Item, S2::Item) -> O + Send + 'static,
        O: Send + 'static,
    {
        WithLatestFrom::new(self, secondary, combine)
    }

    /// Flattens a stream of streams, producing values only from the most
    /// recently emitted inner stream.
    fn switch_latest(self) -> SwitchLatest<Self>
    where
        Self::Item: PullStream<Error = Self::Error>,
    {
        SwitchLatest::new(self)
    }

    /// `map` + `switch_latest`: projects every value to an inner stream and
    /// keeps only the most recent one subscribed.
    fn flat_map_latest<R, F>(self, transform: F) -> FlatMapLatest<Self, F>
    where
        F: FnMut(Self::Item) -> R + Send + 'static,
        R: PullStream<Error = Self::Error>,
    {
        SwitchLatest::new(Map::new(self, transform))
    }

    /// Defers subscribing upstream until `interval` has elapsed on
    /// `scheduler`.
    fn delay_subscription<Sch>(self, interval: Duration, scheduler: Sch) -> DelaySubscription<Self, Sch>
    where
        Sch: Scheduler,
    {
        DelaySubscription::new(self, interval, None, scheduler)
    }

    /// [`delay_subscription`](PullStreamExt::delay_subscription) with an
    /// explicit scheduler tolerance.
    fn delay_subscription_with_tolerance<Sch>(
        self,
        interval: Duration,
        tolerance: Duration,
        scheduler: Sch,
    ) -> DelaySubscription<Self, Sch>
    where
        Sch: Scheduler,
    {
        DelaySubscription::new(self, interval, Some(tolerance), scheduler)
    }

    /// Resubscribes on failure with exponential backoff: `self` is the
    /// first attempt, `factory` produces each subsequent one. The delay
    /// starts at one second and grows by `multiplier` per attempt; after
    /// `max_count` retries the original error is propagated unchanged.
    fn exponential_retry<Sch, F>(
        self,
        max_count: u32,
        multiplier: f64,
        scheduler: Sch,
        factory: F,
    ) -> ExponentialRetry<Self, F, Sch>
    where
        Sch: Scheduler,
        F: FnMut() -> Self + Send + 'static,
    {
        ExponentialRetry::new(self, factory, max_count, multiplier, scheduler)
    }

    /// Switches to the stream produced by `recover` when `self` fails,
    /// yielding an infallible stream.
    fn on_error_resume_with<R, F>(self, recover: F) -> OnErrorResumeWith<Self, F>
    where
        F: FnOnce(Self::Error) -> R + Send + 'static,
        R: PullStream<Item = Self::Item, Error = Infallible>,
    {
        OnErrorResumeWith::new(self, recover)
    }

    /// Replaces a failure with a single fallback value, yielding an
    /// infallible stream.
    fn on_error_just_return(
        self,
        value: Self::Item,
    ) -> impl PullStream<Item = Self::Item, Error = Infallible> {
        OnErrorResumeWith::new(self, move |_| crate::constructors::just(value))
    }

    /// Continues with `fallback` when `self` fails, yielding an infallible
    /// stream.
    fn on_error_fallback_to<R>(
        self,
        fallback: R,
    ) -> impl PullStream<Item = Self::Item, Error = Infallible>
    where
        R: PullStream<Item = Self::Item, Error = Infallible>,
    {
        OnErrorResumeWith::new(self, move |_| fallback)
    }

    /// Folds the failure channel into `Result` items; the stream itself
    /// becomes infallible.
    fn as_result(self) -> AsResult<Self> {
        AsResult::new(self)
    }

    /// Unwraps a bridged stream's failure channel, turning buffer overflow
    /// into a process-aborting assertion.
    fn assert_no_overflow<E>(self) -> AssertNoOverflow<Self>
    where
        Self: PullStream<Error = BridgeError<E>>,
        E: Send + 'static,
    {
        AssertNoOverflow::new(self)
    }

    /// Wraps this pull stream as a push source issuing unbounded demand.
    fn into_push(self) -> PushSource<Self::Item, Self::Error> {
        pull_to_push(self)
    }

    /// Drives this stream with unbounded demand as an async `Result`
    /// stream.
    fn into_stream(self) -> BoxStream<'static, Result<Self::Item, Self::Error>> {
        into_stream(self)
    }

    /// Type-erases the stream.
    fn boxed(self) -> BoxPullStream<Self::Item, Self::Error> {
        BoxPullStream::new(self)
    }
}

impl<P: PullStream> PullStreamExt for P {}
