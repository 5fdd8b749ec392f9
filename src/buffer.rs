//! Bounded FIFO stage between the demand bridge and a pull consumer.
//!
//! The stage requests unbounded demand upstream as soon as it is wired (the
//! bridge's push source cannot be throttled anyway) and absorbs the
//! resulting flood. Values covered by outstanding downstream demand are
//! merely queued for ordered delivery; only *undemanded* values count
//! against the configured capacity, and the overflow policy applies to
//! those alone. Terminal signals are staged behind buffered values so that
//! everything accepted before the terminal is still delivered, in order.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::config::{BridgeConfig, BufferPolicy};
use crate::demand::Demand;
use crate::error::BridgeError;
use crate::pull::{
    Completion, PullStream, PullSubscriber, PullSubscription, SubscriptionHandle,
};

/// Demand-honoring buffer over a bridged stream.
pub struct Buffered<P> {
    upstream: P,
    config: BridgeConfig,
}

impl<P> Buffered<P> {
    pub fn new(upstream: P, config: BridgeConfig) -> Self {
        Buffered { upstream, config }
    }
}

impl<P, T, E> PullStream for Buffered<P>
where
    P: PullStream<Item = T, Error = BridgeError<E>>,
    T: Send + 'static,
    E: Send + 'static,
{
    type Item = T;
    type Error = BridgeError<E>;

    fn subscribe<S>(self, subscriber: S)
    where
        S: PullSubscriber<Item = T, Error = BridgeError<E>>,
    {
        let shared = Arc::new(BufferShared {
            inner: Mutex::new(BufferInner {
                queue: VecDeque::new(),
                undemanded: 0,
                credit: Demand::none(),
                capacity: self.config.buffer_size(),
                policy: self.config.policy(),
                upstream: None,
                downstream: None,
                staged_terminal: None,
                terminated: false,
                delivering: false,
            }),
        });
        self.upstream.subscribe(BufferSubscriber {
            shared,
            pending_downstream: Some(subscriber),
        });
    }
}

struct BufferInner<T, E, S> {
    queue: VecDeque<T>,
    /// Queued values not covered by downstream demand; bounded by `capacity`.
    undemanded: usize,
    /// Downstream authorization not yet matched to an arrived value.
    credit: Demand,
    capacity: usize,
    policy: BufferPolicy,
    upstream: Option<SubscriptionHandle>,
    downstream: Option<S>,
    staged_terminal: Option<Completion<BridgeError<E>>>,
    terminated: bool,
    delivering: bool,
}

struct BufferShared<T, E, S> {
    inner: Mutex<BufferInner<T, E, S>>,
}

impl<T, E, S> BufferShared<T, E, S>
where
    T: Send + 'static,
    E: Send + 'static,
    S: PullSubscriber<Item = T, Error = BridgeError<E>>,
{
    fn on_value(&self, value: T) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.terminated || inner.staged_terminal.is_some() {
                return;
            }
            if !inner.credit.is_none() {
                inner.credit = inner.credit.decrement();
                inner.queue.push_back(value);
            } else if inner.undemanded < inner.capacity {
                inner.queue.push_back(value);
                inner.undemanded += 1;
            } else {
                match inner.policy {
                    BufferPolicy::DropNewest => {}
                    BufferPolicy::DropOldest => {
                        // The front of the queue may still be covered by
                        // demand; evict the oldest *undemanded* value.
                        let first_undemanded = inner.queue.len() - inner.undemanded;
                        inner.queue.remove(first_undemanded);
                        inner.queue.push_back(value);
                    }
                    BufferPolicy::FailOnOverflow => {
                        log::warn!(
                            "bridge buffer overflow: capacity {} exceeded",
                            inner.capacity
                        );
                        inner.staged_terminal =
                            Some(Completion::Failed(BridgeError::BufferOverflow));
                        let upstream = inner.upstream.take();
                        drop(inner);
                        if let Some(upstream) = upstream {
                            upstream.cancel();
                        }
                    }
                }
            }
        }
        self.drain();
    }

    fn on_terminal(&self, completion: Completion<BridgeError<E>>) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.terminated || inner.staged_terminal.is_some() {
                return;
            }
            inner.staged_terminal = Some(completion);
        }
        self.drain();
    }

    /// Accumulates downstream authorization: queued undemanded values are
    /// covered first, the remainder becomes credit for future arrivals.
    fn add_demand(&self, demand: Demand) {
        if demand.is_none() {
            return;
        }
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.terminated {
                return;
            }
            cover(&mut inner, demand);
        }
        self.drain();
    }

    /// Delivers covered values in FIFO order, then any staged terminal once
    /// the queue is empty. Only one drain loop runs at a time; the lock is
    /// released around every downstream call so reentrant requests cannot
    /// deadlock.
    fn drain(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.delivering || inner.terminated {
            return;
        }
        inner.delivering = true;
        loop {
            let deliverable = inner.queue.len() - inner.undemanded;
            if deliverable > 0 {
                let Some(mut downstream) = inner.downstream.take() else {
                    break;
                };
                let Some(value) = inner.queue.pop_front() else {
                    inner.downstream = Some(downstream);
                    break;
                };
                drop(inner);
                let extra = downstream.receive_value(value);
                inner = self.inner.lock().unwrap();
                if inner.terminated {
                    break;
                }
                inner.downstream = Some(downstream);
                if !extra.is_none() {
                    cover(&mut inner, extra);
                }
                continue;
            }
            if inner.queue.is_empty() {
                if let Some(completion) = inner.staged_terminal.take() {
                    inner.terminated = true;
                    inner.delivering = false;
                    let upstream = inner.upstream.take();
                    let downstream = inner.downstream.take();
                    drop(inner);
                    if let Some(upstream) = upstream {
                        upstream.cancel();
                    }
                    if let Some(mut downstream) = downstream {
                        downstream.receive_completion(completion);
                    }
                    return;
                }
            }
            break;
        }
        inner.delivering = false;
    }

    fn cancel(&self) {
        let (upstream, downstream) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.terminated {
                return;
            }
            inner.terminated = true;
            inner.queue.clear();
            inner.undemanded = 0;
            inner.staged_terminal = None;
            (inner.upstream.take(), inner.downstream.take())
        };
        if let Some(upstream) = upstream {
            upstream.cancel();
        }
        drop(downstream);
    }
}

fn cover<T, E, S>(inner: &mut BufferInner<T, E, S>, demand: Demand) {
    match demand {
        Demand::Unbounded => {
            inner.undemanded = 0;
            inner.credit = Demand::Unbounded;
        }
        Demand::Max(n) => {
            let covered = n.min(inner.undemanded);
            inner.undemanded -= covered;
            inner.credit = inner.credit.add(Demand::Max(n - covered));
        }
    }
}

struct BufferSubscriber<T, E, S> {
    shared: Arc<BufferShared<T, E, S>>,
    pending_downstream: Option<S>,
}

impl<T, E, S> PullSubscriber for BufferSubscriber<T, E, S>
where
    T: Send + 'static,
    E: Send + 'static,
    S: PullSubscriber<Item = T, Error = BridgeError<E>>,
{
    type Item = T;
    type Error = BridgeError<E>;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        let Some(mut downstream) = self.pending_downstream.take() else {
            return;
        };
        self.shared.inner.lock().unwrap().upstream = Some(Arc::clone(&subscription));
        downstream.receive_subscription(Arc::new(BufferHandle {
            shared: Arc::clone(&self.shared),
        }));
        {
            let mut inner = self.shared.inner.lock().unwrap();
            if inner.terminated {
                // Cancelled from inside receive_subscription.
                drop(inner);
                subscription.cancel();
                return;
            }
            inner.downstream = Some(downstream);
        }
        // First positive demand: activates the bridge. Values may start
        // flooding in synchronously from here on.
        subscription.request(Demand::unbounded());
        self.shared.drain();
    }

    fn receive_value(&mut self, value: T) -> Demand {
        self.shared.on_value(value);
        Demand::none()
    }

    fn receive_completion(&mut self, completion: Completion<BridgeError<E>>) {
        self.shared.on_terminal(completion);
    }
}

struct BufferHandle<T, E, S> {
    shared: Arc<BufferShared<T, E, S>>,
}

impl<T, E, S> PullSubscription for BufferHandle<T, E, S>
where
    T: Send + 'static,
    E: Send + 'static,
    S: PullSubscriber<Item = T, Error = BridgeError<E>>,
{
    fn request(&self, demand: Demand) {
        self.shared.add_demand(demand);
    }

    fn cancel(&self) {
        self.shared.cancel();
    }
}
