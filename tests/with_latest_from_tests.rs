mod common;

use bridge_stream::{
    BridgeConfig, BufferPolicy, Demand, PullStream, PullStreamExt, PushSubject,
};
use common::{cancel, request, Event, TestSink};

fn config() -> BridgeConfig {
    BridgeConfig::new(64, BufferPolicy::FailOnOverflow)
}

#[test]
fn samples_the_latest_secondary_value_for_every_primary_emission() {
    let primary = PushSubject::<u32, String>::new();
    let secondary = PushSubject::<u32, String>::new();
    let combined = primary
        .source()
        .into_pull(config())
        .with_latest_from(secondary.source().into_pull(config()));

    let (sink, events, _handle) = TestSink::new(Demand::unbounded());
    combined.subscribe(sink);

    secondary.send(1);
    primary.send(0);
    primary.send(2);
    primary.send(3);
    secondary.send(4);
    primary.complete();

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            Event::Value((0, 1)),
            Event::Value((2, 1)),
            Event::Value((3, 1)),
            Event::Finished,
        ]
    );
}

#[test]
fn primary_values_before_the_first_secondary_value_are_dropped() {
    let primary = PushSubject::<u32, String>::new();
    let secondary = PushSubject::<u32, String>::new();
    let combined = primary
        .source()
        .into_pull(config())
        .with_latest_from(secondary.source().into_pull(config()));

    let (sink, events, _handle) = TestSink::new(Demand::unbounded());
    combined.subscribe(sink);

    primary.send(10);
    primary.send(11);
    secondary.send(1);
    primary.send(12);

    assert_eq!(*events.lock().unwrap(), vec![Event::Value((12, 1))]);
}

#[test]
fn secondary_completion_only_stops_future_updates() {
    let primary = PushSubject::<u32, String>::new();
    let secondary = PushSubject::<u32, String>::new();
    let combined = primary
        .source()
        .into_pull(config())
        .with_latest_from(secondary.source().into_pull(config()));

    let (sink, events, _handle) = TestSink::new(Demand::unbounded());
    combined.subscribe(sink);

    secondary.send(1);
    secondary.complete();
    primary.send(5);
    primary.send(6);

    // The cached value keeps sampling; the combined stream is not terminal.
    assert_eq!(
        *events.lock().unwrap(),
        vec![Event::Value((5, 1)), Event::Value((6, 1))]
    );
}

#[test]
fn secondary_failure_is_swallowed() {
    let primary = PushSubject::<u32, String>::new();
    let secondary = PushSubject::<u32, String>::new();
    let combined = primary
        .source()
        .into_pull(config())
        .with_latest_from(secondary.source().into_pull(config()));

    let (sink, events, _handle) = TestSink::new(Demand::unbounded());
    combined.subscribe(sink);

    secondary.send(2);
    secondary.fail("secondary down".to_string());
    primary.send(8);
    primary.complete();

    assert_eq!(
        *events.lock().unwrap(),
        vec![Event::Value((8, 2)), Event::Finished]
    );
}

#[test]
fn primary_failure_is_forwarded() {
    let primary = PushSubject::<u32, String>::new();
    let secondary = PushSubject::<u32, String>::new();
    let combined = primary
        .source()
        .into_pull(config())
        .with_latest_from(secondary.source().into_pull(config()));

    let (sink, events, _handle) = TestSink::new(Demand::unbounded());
    combined.subscribe(sink);

    secondary.send(1);
    primary.fail("primary down".to_string());

    assert_eq!(
        *events.lock().unwrap(),
        vec![Event::Failed("primary down".to_string())]
    );
}

#[test]
fn selector_variant_applies_the_combine_function() {
    let primary = PushSubject::<u32, String>::new();
    let secondary = PushSubject::<u32, String>::new();
    let combined = primary
        .source()
        .into_pull(config())
        .with_latest_from_with(secondary.source().into_pull(config()), |a, b| a + b);

    let (sink, events, _handle) = TestSink::new(Demand::unbounded());
    combined.subscribe(sink);

    secondary.send(100);
    primary.send(1);
    primary.send(2);

    assert_eq!(
        *events.lock().unwrap(),
        vec![Event::Value(101), Event::Value(102)]
    );
}

#[test]
fn cancelling_downstream_cancels_both_subscriptions() {
    let primary = PushSubject::<u32, String>::new();
    let secondary = PushSubject::<u32, String>::new();
    let combined = primary
        .source()
        .into_pull(config())
        .with_latest_from(secondary.source().into_pull(config()));

    let (sink, events, handle) = TestSink::new(Demand::unbounded());
    combined.subscribe(sink);

    secondary.send(1);
    primary.send(0);
    cancel(&handle);
    cancel(&handle);

    secondary.send(2);
    primary.send(9);

    assert_eq!(*events.lock().unwrap(), vec![Event::Value((0, 1))]);
}

#[test]
fn dropped_primary_values_get_replacement_demand() {
    // With a demand of two and no secondary value yet, both primary values
    // are dropped but the replacement demand keeps the pipeline moving.
    let primary = PushSubject::<u32, String>::new();
    let secondary = PushSubject::<u32, String>::new();
    let combined = primary
        .source()
        .into_pull(config())
        .with_latest_from(secondary.source().into_pull(config()));

    let (sink, events, handle) = TestSink::new(Demand::max(2));
    combined.subscribe(sink);

    primary.send(10);
    primary.send(11);
    secondary.send(1);
    primary.send(12);
    primary.send(13);

    assert_eq!(
        *events.lock().unwrap(),
        vec![Event::Value((12, 1)), Event::Value((13, 1))]
    );
    request(&handle, Demand::max(1));
    primary.send(14);
    assert_eq!(events.lock().unwrap().len(), 3);
}
