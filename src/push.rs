//! Push-side stream contract.
//!
//! A push source emits values whenever it likes; there is no demand signal
//! and no way for a consumer to slow it down. Subscribing hands the source a
//! [`PushObserver`] and yields a [`Disposal`] that detaches the observer.
//!
//! Sources must serialize their observer callbacks: concurrent `on_value` /
//! `on_error` / `on_completed` invocations are a contract violation, and
//! after a terminal callback no further callbacks may be made. Disposal, on
//! the other hand, is safe from any thread at any time.

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_stream::stream;
use futures_core::Stream;
use futures_util::StreamExt;
use tokio::spawn;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Idempotent cancellation token for a push subscription.
#[derive(Clone)]
pub struct Disposal {
    inner: Arc<DisposalInner>,
}

struct DisposalInner {
    disposed: AtomicBool,
    on_dispose: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Disposal {
    /// A disposal that runs `on_dispose` the first time it is disposed.
    pub fn new<F>(on_dispose: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Disposal {
            inner: Arc::new(DisposalInner {
                disposed: AtomicBool::new(false),
                on_dispose: Mutex::new(Some(Box::new(on_dispose))),
            }),
        }
    }

    /// A disposal with no teardown action.
    pub fn noop() -> Self {
        Disposal {
            inner: Arc::new(DisposalInner {
                disposed: AtomicBool::new(false),
                on_dispose: Mutex::new(None),
            }),
        }
    }

    /// Runs the teardown action. Subsequent calls are no-ops.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let action = self.inner.on_dispose.lock().unwrap().take();
        if let Some(action) = action {
            action();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

/// Callback bundle handed to a push source on subscription.
pub struct PushObserver<T, E> {
    on_value: Arc<dyn Fn(T) + Send + Sync>,
    on_error: Arc<dyn Fn(E) + Send + Sync>,
    on_completed: Arc<dyn Fn() + Send + Sync>,
}

impl<T, E> Clone for PushObserver<T, E> {
    fn clone(&self) -> Self {
        PushObserver {
            on_value: Arc::clone(&self.on_value),
            on_error: Arc::clone(&self.on_error),
            on_completed: Arc::clone(&self.on_completed),
        }
    }
}

impl<T, E> PushObserver<T, E> {
    pub fn new<V, Er, C>(on_value: V, on_error: Er, on_completed: C) -> Self
    where
        V: Fn(T) + Send + Sync + 'static,
        Er: Fn(E) + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        PushObserver {
            on_value: Arc::new(on_value),
            on_error: Arc::new(on_error),
            on_completed: Arc::new(on_completed),
        }
    }

    pub fn on_value(&self, value: T) {
        (self.on_value)(value);
    }

    pub fn on_error(&self, error: E) {
        (self.on_error)(error);
    }

    pub fn on_completed(&self) {
        (self.on_completed)();
    }
}

type SubscribeFn<T, E> = Box<dyn FnOnce(PushObserver<T, E>) -> Disposal + Send>;

/// Closed dispatch over the two kinds of push source.
enum Subscribe<T, E> {
    /// Source with a failure channel.
    Fallible(SubscribeFn<T, E>),
    /// Source that can never fail; no error callback is wired.
    Infallible(SubscribeFn<T, Infallible>),
}

/// A push-based stream of values.
///
/// Constructed either from a subscribe closure ([`PushSource::fallible`],
/// [`PushSource::infallible`]) or from one of the interop constructors that
/// spawn a producer task over an async stream or channel.
pub struct PushSource<T, E> {
    subscribe: Subscribe<T, E>,
}

impl<T, E> PushSource<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// A source that may signal an error.
    pub fn fallible<F>(subscribe: F) -> Self
    where
        F: FnOnce(PushObserver<T, E>) -> Disposal + Send + 'static,
    {
        PushSource {
            subscribe: Subscribe::Fallible(Box::new(subscribe)),
        }
    }

    /// A source without a failure channel. The error type stays free, so an
    /// infallible source can feed any fallible pipeline.
    pub fn infallible<F>(subscribe: F) -> Self
    where
        F: FnOnce(PushObserver<T, Infallible>) -> Disposal + Send + 'static,
    {
        PushSource {
            subscribe: Subscribe::Infallible(Box::new(subscribe)),
        }
    }

    /// Attaches `observer` and starts emission.
    pub fn subscribe(self, observer: PushObserver<T, E>) -> Disposal {
        match self.subscribe {
            Subscribe::Fallible(subscribe) => subscribe(observer),
            Subscribe::Infallible(subscribe) => {
                let PushObserver {
                    on_value,
                    on_completed,
                    ..
                } = observer;
                subscribe(PushObserver {
                    on_value,
                    on_error: Arc::new(|never: Infallible| match never {}),
                    on_completed,
                })
            }
        }
    }

    /// Emits every item of `stream` from a spawned task, at the stream's own
    /// pace, then completes.
    pub fn from_stream<St>(stream: St) -> Self
    where
        St: Stream<Item = T> + Send + 'static,
    {
        Self::infallible(move |observer| {
            let stopped = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&stopped);
            let task = spawn(async move {
                let mut stream = Box::pin(stream);
                while let Some(value) = stream.next().await {
                    if flag.load(Ordering::Acquire) {
                        return;
                    }
                    observer.on_value(value);
                }
                if !flag.load(Ordering::Acquire) {
                    observer.on_completed();
                }
            });
            Disposal::new(move || {
                stopped.store(true, Ordering::Release);
                task.abort();
            })
        })
    }

    /// Like [`from_stream`](PushSource::from_stream), but an `Err` item
    /// fails the source and stops the producer task.
    pub fn from_try_stream<St>(stream: St) -> Self
    where
        St: Stream<Item = Result<T, E>> + Send + 'static,
    {
        Self::fallible(move |observer| {
            let stopped = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&stopped);
            let task = spawn(async move {
                let mut stream = Box::pin(stream);
                while let Some(item) = stream.next().await {
                    if flag.load(Ordering::Acquire) {
                        return;
                    }
                    match item {
                        Ok(value) => observer.on_value(value),
                        Err(error) => {
                            observer.on_error(error);
                            return;
                        }
                    }
                }
                if !flag.load(Ordering::Acquire) {
                    observer.on_completed();
                }
            });
            Disposal::new(move || {
                stopped.store(true, Ordering::Release);
                task.abort();
            })
        })
    }

    /// Emits every value sent on `receiver`, completing when all senders are
    /// dropped.
    pub fn from_channel(receiver: tokio::sync::mpsc::UnboundedReceiver<T>) -> Self {
        Self::from_stream(UnboundedReceiverStream::new(receiver))
    }
}

impl<E> PushSource<u64, E>
where
    E: Send + 'static,
{
    /// A hot counter emitting `0, 1, 2, …` every `period`. Never completes;
    /// dispose to stop it.
    pub fn ticks(period: Duration) -> Self {
        Self::from_stream(stream! {
            let mut tick = 0u64;
            loop {
                tokio::time::sleep(period).await;
                yield tick;
                tick += 1;
            }
        })
    }
}

enum SubjectTerminal<E> {
    Completed,
    Failed(E),
}

struct SubjectInner<T, E> {
    observers: Vec<(u64, PushObserver<T, E>)>,
    next_id: u64,
    terminal: Option<SubjectTerminal<E>>,
}

/// Hot, clonable push-side producer handle.
///
/// Every clone feeds the same set of subscribers; a terminal signal
/// (`complete` / `fail`) is replayed to late subscribers.
pub struct PushSubject<T, E> {
    inner: Arc<Mutex<SubjectInner<T, E>>>,
}

impl<T, E> Clone for PushSubject<T, E> {
    fn clone(&self) -> Self {
        PushSubject {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> Default for PushSubject<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> PushSubject<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new() -> Self {
        PushSubject {
            inner: Arc::new(Mutex::new(SubjectInner {
                observers: Vec::new(),
                next_id: 0,
                terminal: None,
            })),
        }
    }

    /// A push source view of this subject. Each subscription gets its own
    /// idempotent disposal that only detaches that subscriber.
    pub fn source(&self) -> PushSource<T, E>
    where
        E: Clone,
    {
        let inner = Arc::clone(&self.inner);
        PushSource::fallible(move |observer| {
            let mut guard = inner.lock().unwrap();
            if guard.terminal.is_none() {
                let id = guard.next_id;
                guard.next_id += 1;
                guard.observers.push((id, observer.clone()));
                drop(guard);
                let registry = Arc::clone(&inner);
                return Disposal::new(move || {
                    registry
                        .lock()
                        .unwrap()
                        .observers
                        .retain(|(observer_id, _)| *observer_id != id);
                });
            }
            // Sealed subject: replay the terminal signal to the late
            // subscriber.
            let failure = match &guard.terminal {
                Some(SubjectTerminal::Failed(error)) => Some(error.clone()),
                _ => None,
            };
            drop(guard);
            match failure {
                Some(error) => observer.on_error(error),
                None => observer.on_completed(),
            }
            Disposal::noop()
        })
    }

    /// Broadcasts `value` to every current subscriber. Ignored after a
    /// terminal signal.
    pub fn send(&self, value: T)
    where
        T: Clone,
    {
        let observers: Vec<PushObserver<T, E>> = {
            let guard = self.inner.lock().unwrap();
            if guard.terminal.is_some() {
                return;
            }
            guard.observers.iter().map(|(_, observer)| observer.clone()).collect()
        };
        for observer in observers {
            observer.on_value(value.clone());
        }
    }

    /// Fails every current subscriber and seals the subject.
    pub fn fail(&self, error: E)
    where
        E: Clone,
    {
        let observers = {
            let mut guard = self.inner.lock().unwrap();
            if guard.terminal.is_some() {
                return;
            }
            guard.terminal = Some(SubjectTerminal::Failed(error.clone()));
            std::mem::take(&mut guard.observers)
        };
        for (_, observer) in observers {
            observer.on_error(error.clone());
        }
    }

    /// Completes every current subscriber and seals the subject.
    pub fn complete(&self) {
        let observers = {
            let mut guard = self.inner.lock().unwrap();
            if guard.terminal.is_some() {
                return;
            }
            guard.terminal = Some(SubjectTerminal::Completed);
            std::mem::take(&mut guard.observers)
        };
        for (_, observer) in observers {
            observer.on_completed();
        }
    }
}
