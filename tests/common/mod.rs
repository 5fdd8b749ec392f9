//! Shared test subscriber with manual demand control.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use bridge_stream::{Completion, Demand, PullSubscriber, SubscriptionHandle};

#[derive(Debug, Clone, PartialEq)]
pub enum Event<T, E> {
    Value(T),
    Finished,
    Failed(E),
}

/// Records every delivery; requests `initial` demand on subscription and
/// exposes the subscription handle for follow-up requests/cancellation.
pub struct TestSink<T, E> {
    events: Arc<Mutex<Vec<Event<T, E>>>>,
    handle: Arc<Mutex<Option<SubscriptionHandle>>>,
    initial: Demand,
}

impl<T, E> TestSink<T, E> {
    #[allow(clippy::type_complexity)]
    pub fn new(
        initial: Demand,
    ) -> (
        Self,
        Arc<Mutex<Vec<Event<T, E>>>>,
        Arc<Mutex<Option<SubscriptionHandle>>>,
    ) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let handle = Arc::new(Mutex::new(None));
        (
            TestSink {
                events: Arc::clone(&events),
                handle: Arc::clone(&handle),
                initial,
            },
            events,
            handle,
        )
    }
}

impl<T, E> PullSubscriber for TestSink<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    type Item = T;
    type Error = E;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        *self.handle.lock().unwrap() = Some(Arc::clone(&subscription));
        if !self.initial.is_none() {
            subscription.request(self.initial);
        }
    }

    fn receive_value(&mut self, value: T) -> Demand {
        self.events.lock().unwrap().push(Event::Value(value));
        Demand::none()
    }

    fn receive_completion(&mut self, completion: Completion<E>) {
        let event = match completion {
            Completion::Finished => Event::Finished,
            Completion::Failed(error) => Event::Failed(error),
        };
        self.events.lock().unwrap().push(event);
    }
}

/// Requests more demand on a previously captured handle.
pub fn request(handle: &Arc<Mutex<Option<SubscriptionHandle>>>, demand: Demand) {
    let handle = handle.lock().unwrap().clone();
    if let Some(handle) = handle {
        handle.request(demand);
    }
}

/// Cancels a previously captured handle.
pub fn cancel(handle: &Arc<Mutex<Option<SubscriptionHandle>>>) {
    let handle = handle.lock().unwrap().clone();
    if let Some(handle) = handle {
        handle.cancel();
    }
}
