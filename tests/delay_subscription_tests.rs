mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bridge_stream::{defer, from_iter, Demand, PullStream, PullStreamExt, TokioScheduler};
use common::{cancel, request, Event, TestSink};

#[tokio::test(start_paused = true)]
async fn upstream_is_subscribed_only_after_the_interval() {
    let subscribed = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&subscribed);
    let delayed = defer(move || {
        flag.store(true, Ordering::SeqCst);
        from_iter::<_, String>(vec![1, 2, 3])
    })
    .delay_subscription(Duration::from_millis(100), TokioScheduler);

    let (sink, events, _handle) = TestSink::new(Demand::unbounded());
    delayed.subscribe(sink);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!subscribed.load(Ordering::SeqCst));
    assert!(events.lock().unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(subscribed.load(Ordering::SeqCst));
    assert_eq!(
        *events.lock().unwrap(),
        vec![
            Event::Value(1),
            Event::Value(2),
            Event::Value(3),
            Event::Finished,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn demand_requested_during_the_wait_is_flushed_on_subscribe() {
    let delayed = from_iter::<_, String>(vec![7, 8, 9])
        .delay_subscription(Duration::from_millis(100), TokioScheduler);

    let (sink, events, handle) = TestSink::new(Demand::none());
    delayed.subscribe(sink);

    request(&handle, Demand::max(1));
    request(&handle, Demand::max(1));
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(
        *events.lock().unwrap(),
        vec![Event::Value(7), Event::Value(8)]
    );

    request(&handle, Demand::unbounded());
    assert_eq!(
        *events.lock().unwrap(),
        vec![
            Event::Value(7),
            Event::Value(8),
            Event::Value(9),
            Event::Finished,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn cancelling_before_the_interval_never_subscribes_upstream() {
    let subscribed = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&subscribed);
    let delayed = defer(move || {
        flag.store(true, Ordering::SeqCst);
        from_iter::<_, String>(vec![1])
    })
    .delay_subscription(Duration::from_millis(100), TokioScheduler);

    let (sink, events, handle) = TestSink::new(Demand::unbounded());
    delayed.subscribe(sink);

    tokio::time::sleep(Duration::from_millis(30)).await;
    cancel(&handle);
    cancel(&handle);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(!subscribed.load(Ordering::SeqCst));
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn tolerance_variant_behaves_like_the_plain_one() {
    let delayed = from_iter::<_, String>(vec![5]).delay_subscription_with_tolerance(
        Duration::from_millis(80),
        Duration::from_millis(20),
        TokioScheduler,
    );

    let (sink, events, _handle) = TestSink::new(Demand::unbounded());
    delayed.subscribe(sink);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(
        *events.lock().unwrap(),
        vec![Event::Value(5), Event::Finished]
    );
}
