mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bridge_stream::{
    from_iter, pull_to_push, BridgeConfig, BufferPolicy, Demand, PullStream, PullStreamExt,
    PushObserver, PushSubject,
};
use common::{request, Event, TestSink};
use futures_util::StreamExt;

fn config() -> BridgeConfig {
    BridgeConfig::new(64, BufferPolicy::FailOnOverflow)
}

#[test]
fn push_to_pull_to_push_round_trip_preserves_values_and_completion() {
    let subject = PushSubject::<u32, String>::new();
    let round_tripped = pull_to_push(subject.source().into_pull(config()));

    let events = Arc::new(Mutex::new(Vec::new()));
    let value_log = Arc::clone(&events);
    let error_log = Arc::clone(&events);
    let completed_log = Arc::clone(&events);
    let _disposal = round_tripped.subscribe(PushObserver::new(
        move |value| value_log.lock().unwrap().push(Event::Value(value)),
        move |error: String| error_log.lock().unwrap().push(Event::Failed(error)),
        move || completed_log.lock().unwrap().push(Event::Finished),
    ));

    for value in 0..5 {
        subject.send(value);
    }
    subject.complete();

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            Event::Value(0),
            Event::Value(1),
            Event::Value(2),
            Event::Value(3),
            Event::Value(4),
            Event::Finished,
        ]
    );
}

#[test]
fn round_trip_preserves_the_error_signal() {
    let subject = PushSubject::<u32, String>::new();
    let round_tripped = pull_to_push(subject.source().into_pull(config()));

    let events = Arc::new(Mutex::new(Vec::new()));
    let value_log = Arc::clone(&events);
    let error_log = Arc::clone(&events);
    let completed_log = Arc::clone(&events);
    let _disposal = round_tripped.subscribe(PushObserver::new(
        move |value| value_log.lock().unwrap().push(Event::Value(value)),
        move |error: String| error_log.lock().unwrap().push(Event::Failed(error)),
        move || completed_log.lock().unwrap().push(Event::Finished),
    ));

    subject.send(1);
    subject.fail("wire down".to_string());

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            Event::Value(1),
            Event::Failed("wire down".to_string()),
        ]
    );
}

#[test]
fn disposing_the_push_side_cancels_the_pull_subscription() {
    let subject = PushSubject::<u32, String>::new();
    let round_tripped = pull_to_push(subject.source().into_pull(config()));

    let received = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&received);
    let disposal = round_tripped.subscribe(PushObserver::new(
        move |_value: u32| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        |_error: String| {},
        || {},
    ));

    subject.send(1);
    disposal.dispose();
    disposal.dispose();
    subject.send(2);
    subject.send(3);

    assert_eq!(received.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn into_stream_drives_with_unbounded_demand() {
    let subject = PushSubject::<u32, String>::new();
    let stream = subject.source().into_pull(config()).into_stream();

    for value in [3, 1, 4] {
        subject.send(value);
    }
    subject.complete();

    let collected: Vec<_> = stream.collect().await;
    assert_eq!(collected, vec![Ok(3), Ok(1), Ok(4)]);
}

#[tokio::test]
async fn into_stream_surfaces_the_terminal_error_last() {
    let subject = PushSubject::<u32, String>::new();
    let stream = subject.source().into_pull(config()).into_stream();

    subject.send(1);
    subject.fail("offline".to_string());

    let collected: Vec<_> = stream.collect().await;
    assert_eq!(collected, vec![Ok(1), Err("offline".to_string())]);
}

#[test]
fn assert_no_overflow_unwraps_upstream_errors() {
    let subject = PushSubject::<u32, String>::new();
    let stream = subject.source().into_pull(config());
    let (sink, events, _handle) = TestSink::new(Demand::unbounded());
    stream.subscribe(sink);

    subject.send(1);
    subject.fail("plain".to_string());

    assert_eq!(
        *events.lock().unwrap(),
        vec![Event::Value(1), Event::Failed("plain".to_string())]
    );
}

#[test]
#[should_panic(expected = "bridge buffer overflowed")]
fn assert_no_overflow_aborts_on_overflow() {
    let subject = PushSubject::<u32, String>::new();
    let stream = subject
        .source()
        .into_pull(BridgeConfig::new(1, BufferPolicy::FailOnOverflow));
    let (sink, _events, handle) = TestSink::new(Demand::none());
    stream.subscribe(sink);

    subject.send(1);
    subject.send(2);
    request(&handle, Demand::unbounded());
}

#[test]
fn into_push_is_the_method_form_of_pull_to_push() {
    let pushed = from_iter::<_, String>(vec![10, 20]).into_push();

    let events = Arc::new(Mutex::new(Vec::new()));
    let value_log = Arc::clone(&events);
    let completed_log = Arc::clone(&events);
    let _disposal = pushed.subscribe(PushObserver::new(
        move |value| value_log.lock().unwrap().push(Event::Value(value)),
        |_error: String| {},
        move || completed_log.lock().unwrap().push(Event::Finished),
    ));

    assert_eq!(
        *events.lock().unwrap(),
        vec![Event::Value(10), Event::Value(20), Event::Finished]
    );
}
