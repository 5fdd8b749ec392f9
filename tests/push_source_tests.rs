mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bridge_stream::{
    BridgeConfig, BufferPolicy, Disposal, PullStreamExt, PushObserver, PushSource, PushSubject,
};
use common::Event;
use futures_util::StreamExt;

fn config() -> BridgeConfig {
    BridgeConfig::new(16, BufferPolicy::FailOnOverflow)
}

#[test]
fn disposal_runs_its_teardown_exactly_once() {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    let disposal = Disposal::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(!disposal.is_disposed());
    disposal.dispose();
    disposal.dispose();
    disposal.clone().dispose();

    assert!(disposal.is_disposed());
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn subject_broadcasts_to_every_subscriber() {
    let subject = PushSubject::<u32, String>::new();

    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));
    let first_log = Arc::clone(&first);
    let second_log = Arc::clone(&second);

    let _a = subject.source().subscribe(PushObserver::new(
        move |value| first_log.lock().unwrap().push(value),
        |_error: String| {},
        || {},
    ));
    let _b = subject.source().subscribe(PushObserver::new(
        move |value| second_log.lock().unwrap().push(value),
        |_error: String| {},
        || {},
    ));

    subject.send(1);
    subject.send(2);

    assert_eq!(*first.lock().unwrap(), vec![1, 2]);
    assert_eq!(*second.lock().unwrap(), vec![1, 2]);
}

#[test]
fn disposing_one_subscriber_leaves_the_others_attached() {
    let subject = PushSubject::<u32, String>::new();

    let kept = Arc::new(Mutex::new(Vec::new()));
    let dropped = Arc::new(Mutex::new(Vec::new()));
    let kept_log = Arc::clone(&kept);
    let dropped_log = Arc::clone(&dropped);

    let _keep = subject.source().subscribe(PushObserver::new(
        move |value| kept_log.lock().unwrap().push(value),
        |_error: String| {},
        || {},
    ));
    let drop_me = subject.source().subscribe(PushObserver::new(
        move |value| dropped_log.lock().unwrap().push(value),
        |_error: String| {},
        || {},
    ));

    subject.send(1);
    drop_me.dispose();
    drop_me.dispose();
    subject.send(2);

    assert_eq!(*kept.lock().unwrap(), vec![1, 2]);
    assert_eq!(*dropped.lock().unwrap(), vec![1]);
}

#[test]
fn late_subscribers_see_the_terminal_signal() {
    let subject = PushSubject::<u32, String>::new();
    subject.complete();

    let completed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&completed);
    let _disposal = subject.source().subscribe(PushObserver::new(
        |_value: u32| {},
        |_error: String| {},
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        },
    ));

    assert_eq!(completed.load(Ordering::SeqCst), 1);
}

#[test]
fn sends_after_a_terminal_signal_are_ignored() {
    let subject = PushSubject::<u32, String>::new();

    let events = Arc::new(Mutex::new(Vec::new()));
    let value_log = Arc::clone(&events);
    let error_log = Arc::clone(&events);
    let _disposal = subject.source().subscribe(PushObserver::new(
        move |value| value_log.lock().unwrap().push(Event::Value(value)),
        move |error: String| error_log.lock().unwrap().push(Event::Failed(error)),
        || {},
    ));

    subject.fail("first".to_string());
    subject.send(1);
    subject.fail("second".to_string());

    assert_eq!(
        *events.lock().unwrap(),
        vec![Event::Failed("first".to_string())]
    );
}

#[tokio::test]
async fn from_stream_emits_every_item_then_completes() {
    let source = PushSource::<u32, String>::from_stream(futures_util::stream::iter(vec![1, 2, 3]));
    let collected: Vec<_> = source.into_pull(config()).into_stream().collect().await;
    assert_eq!(collected, vec![Ok(1), Ok(2), Ok(3)]);
}

#[tokio::test]
async fn from_try_stream_fails_on_the_first_error_item() {
    let source = PushSource::from_try_stream(futures_util::stream::iter(vec![
        Ok(1),
        Err("bad item".to_string()),
        Ok(2),
    ]));
    let collected: Vec<_> = source.into_pull(config()).into_stream().collect().await;
    assert_eq!(collected, vec![Ok(1), Err("bad item".to_string())]);
}

#[tokio::test]
async fn from_channel_completes_when_all_senders_drop() {
    let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
    let source = PushSource::<u32, String>::from_channel(receiver);

    tokio_test::assert_ok!(sender.send(4));
    tokio_test::assert_ok!(sender.send(5));
    drop(sender);

    let collected: Vec<_> = source.into_pull(config()).into_stream().collect().await;
    assert_eq!(collected, vec![Ok(4), Ok(5)]);
}

#[tokio::test(start_paused = true)]
async fn ticks_counts_up_on_the_virtual_clock() {
    let source = PushSource::<u64, String>::ticks(Duration::from_millis(100));
    let collected: Vec<_> = source
        .into_pull(BridgeConfig::new(16, BufferPolicy::DropOldest))
        .into_stream()
        .take(3)
        .collect()
        .await;
    assert_eq!(collected, vec![Ok(0), Ok(1), Ok(2)]);
}
