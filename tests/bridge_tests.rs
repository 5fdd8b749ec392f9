mod common;

use bridge_stream::{BridgeError, Demand, DemandBridge, PullStream, PushSubject};
use common::{cancel, request, Event, TestSink};

#[test]
fn upstream_is_not_subscribed_until_first_positive_demand() {
    let subject = PushSubject::<u32, String>::new();
    let bridge = DemandBridge::new(subject.source());
    let (sink, events, handle) = TestSink::new(Demand::none());
    bridge.subscribe(sink);

    // No demand yet: the subject has no observers, this value is lost.
    subject.send(9);
    assert!(events.lock().unwrap().is_empty());

    request(&handle, Demand::max(1));
    subject.send(10);
    assert_eq!(*events.lock().unwrap(), vec![Event::Value(10)]);
}

#[test]
fn zero_demand_request_does_not_activate() {
    let subject = PushSubject::<u32, String>::new();
    let bridge = DemandBridge::new(subject.source());
    let (sink, events, handle) = TestSink::new(Demand::none());
    bridge.subscribe(sink);

    request(&handle, Demand::none());
    subject.send(1);
    assert!(events.lock().unwrap().is_empty());

    request(&handle, Demand::max(1));
    subject.send(2);
    assert_eq!(*events.lock().unwrap(), vec![Event::Value(2)]);
}

#[test]
fn repeated_requests_subscribe_upstream_at_most_once() {
    let subject = PushSubject::<u32, String>::new();
    let bridge = DemandBridge::new(subject.source());
    let (sink, events, handle) = TestSink::new(Demand::max(1));
    bridge.subscribe(sink);

    request(&handle, Demand::max(5));
    request(&handle, Demand::unbounded());

    // A duplicated upstream subscription would deliver this twice.
    subject.send(7);
    assert_eq!(*events.lock().unwrap(), vec![Event::Value(7)]);
}

#[test]
fn push_pace_is_forwarded_regardless_of_demand() {
    // The raw bridge translates activation, not flow: once the push source
    // is live it cannot be throttled, so values pass straight through.
    let subject = PushSubject::<u32, String>::new();
    let bridge = DemandBridge::new(subject.source());
    let (sink, events, handle) = TestSink::new(Demand::none());
    bridge.subscribe(sink);

    request(&handle, Demand::max(1));
    subject.send(1);
    subject.send(2);
    subject.send(3);
    assert_eq!(
        *events.lock().unwrap(),
        vec![Event::Value(1), Event::Value(2), Event::Value(3)]
    );
}

#[test]
fn completion_is_forwarded_and_terminal() {
    let subject = PushSubject::<u32, String>::new();
    let bridge = DemandBridge::new(subject.source());
    let (sink, events, handle) = TestSink::new(Demand::max(1));
    bridge.subscribe(sink);
    request(&handle, Demand::max(1));

    subject.send(1);
    subject.complete();
    subject.send(2);

    assert_eq!(
        *events.lock().unwrap(),
        vec![Event::Value(1), Event::Finished]
    );
}

#[test]
fn upstream_error_is_wrapped() {
    let subject = PushSubject::<u32, String>::new();
    let bridge = DemandBridge::new(subject.source());
    let (sink, events, handle) = TestSink::new(Demand::max(1));
    bridge.subscribe(sink);
    request(&handle, Demand::max(1));

    subject.fail("boom".to_string());

    assert_eq!(
        *events.lock().unwrap(),
        vec![Event::Failed(BridgeError::UpstreamError("boom".to_string()))]
    );
}

#[test]
fn cancel_before_activation_never_subscribes() {
    let subject = PushSubject::<u32, String>::new();
    let bridge = DemandBridge::new(subject.source());
    let (sink, events, handle) = TestSink::new(Demand::none());
    bridge.subscribe(sink);

    cancel(&handle);
    request(&handle, Demand::unbounded());
    subject.send(6);

    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn cancel_is_idempotent() {
    let subject = PushSubject::<u32, String>::new();
    let bridge = DemandBridge::new(subject.source());
    let (sink, events, handle) = TestSink::new(Demand::max(1));
    bridge.subscribe(sink);
    request(&handle, Demand::max(1));

    cancel(&handle);
    cancel(&handle);
    subject.send(1);
    subject.complete();

    assert!(events.lock().unwrap().is_empty());
}
