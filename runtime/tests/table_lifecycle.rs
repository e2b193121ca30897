//! Integration tests for the event-sourced table lifecycle
//!
//! Drives `EventSourceTable` against the in-memory topic: catch-up, highwater,
//! live tailing, timeouts, stop, and the fatal-error path.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use eventsource_core::{ConsumerError, TableConfig, TableError};
use eventsource_runtime::{EventSourceTable, HighwaterStatus, TableState};
use eventsource_testing::{
    FailingListener, MockConsumer, MockTopic, PanickingListener, RecordingListener,
};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

// ============================================================================
// Test Fixtures
// ============================================================================

const POLL: Duration = Duration::from_millis(50);

type Errors = Arc<Mutex<Vec<TableError>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn config(timeout: Duration) -> TableConfig {
    TableConfig::new("alarm-registrations")
        .with_highwater_timeout(timeout)
        .with_poll_timeout(POLL)
}

/// A table over `topic` whose exception handler records into the returned vec.
fn table_with_errors(
    topic: &MockTopic,
    config: TableConfig,
) -> (EventSourceTable<MockConsumer>, Errors) {
    init_tracing();
    let errors: Errors = Arc::new(Mutex::new(Vec::new()));
    let table = EventSourceTable::new(config, MockConsumer::new(topic))
        .unwrap()
        .with_exception_handler({
            let errors = Arc::clone(&errors);
            move |error| errors.lock().unwrap().push(error.clone())
        });
    (table, errors)
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn empty_topic_reaches_highwater_immediately() {
    let topic = MockTopic::new(3);
    let (mut table, errors) = table_with_errors(&topic, config(Duration::from_secs(5)));
    let (listener, recording) = RecordingListener::new();
    table.add_listener(listener).unwrap();

    let started = Instant::now();
    table.start().unwrap();
    table.await_highwater().unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(table.highwater_reached());
    assert_eq!(table.state(), TableState::Live);
    assert_eq!(recording.highwater_count(), 1);
    assert!(recording.highwater_cache().unwrap().is_empty());
    assert!(recording.catch_up_messages().is_empty());

    table.stop();
    table.join().unwrap();
    assert_eq!(table.state(), TableState::Stopped);
    assert!(topic.is_closed());
    assert!(errors.lock().unwrap().is_empty());
}

#[test]
fn compaction_keeps_last_value_and_drops_tombstones() {
    let topic = MockTopic::new(1);
    topic.append(0, "A", "1");
    topic.append(0, "B", "2");
    topic.append(0, "A", "3");
    topic.append(0, "C", "4");
    topic.tombstone(0, "C");

    let (mut table, _errors) = table_with_errors(&topic, config(Duration::from_secs(5)));
    let (listener, recording) = RecordingListener::new();
    table.add_listener(listener).unwrap();
    table.track_cache().unwrap();
    table.start().unwrap();

    let cache = table.await_highwater_cache().unwrap();
    let mut entries: Vec<(String, String)> = cache
        .iter()
        .map(|(key, message)| (key.clone(), message.value().unwrap().clone()))
        .collect();
    entries.sort();
    assert_eq!(
        entries,
        vec![
            ("A".to_string(), "3".to_string()),
            ("B".to_string(), "2".to_string()),
        ]
    );

    let raw: Vec<i64> = recording
        .catch_up_messages()
        .iter()
        .map(eventsource_core::Message::offset)
        .collect();
    assert_eq!(raw, vec![0, 1, 2, 3, 4]);
    assert_eq!(recording.highwater_cache().unwrap().len(), 2);
}

#[test]
fn unreachable_broker_times_out() {
    let topic = MockTopic::new(1);
    topic.make_unreachable();
    let timeout = Duration::from_secs(1);
    let (mut table, errors) = table_with_errors(&topic, config(timeout));
    let (listener, recording) = RecordingListener::new();
    table.add_listener(listener).unwrap();

    let started = Instant::now();
    table.start().unwrap();
    let result = table.await_highwater();
    let elapsed = started.elapsed();

    assert_eq!(
        result,
        Err(TableError::HighwaterTimeout {
            topic: "alarm-registrations".to_string(),
            timeout,
        })
    );
    assert!(elapsed >= timeout, "timed out early: {elapsed:?}");
    assert!(elapsed < timeout + Duration::from_secs(1), "timed out late: {elapsed:?}");

    table.join().unwrap();
    assert!(!table.highwater_reached());
    assert_eq!(table.state(), TableState::TimedOut);
    assert_eq!(table.highwater_signal().status(), HighwaterStatus::TimedOut);
    assert_eq!(recording.highwater_count(), 0);
    assert!(topic.is_closed());

    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_timeout());
}

#[test]
fn stop_during_live_phase_closes_consumer_within_poll_timeout() {
    let topic = MockTopic::new(2);
    topic.append(0, "A", "1");
    let (mut table, errors) = table_with_errors(&topic, config(Duration::from_secs(5)));
    let (listener, recording) = RecordingListener::new();
    table.add_listener(listener).unwrap();
    table.start().unwrap();
    table.await_highwater().unwrap();

    topic.append(1, "B", "2");
    assert!(recording.wait_for_live_messages(1, Duration::from_secs(5)));
    assert_eq!(recording.live_messages()[0].key(), "B");

    let stopped = Instant::now();
    table.stop();
    assert!(topic.wait_closed(POLL * 10));
    assert!(stopped.elapsed() < POLL * 10);

    table.join().unwrap();
    assert_eq!(table.state(), TableState::Stopped);
    assert!(errors.lock().unwrap().is_empty());
}

// ============================================================================
// Catch-up Properties
// ============================================================================

#[test]
fn catch_up_delivers_exactly_the_records_below_highwater() {
    let topic = MockTopic::new(3);
    for i in 0..5 {
        topic.append(0, &format!("p0-{i}"), "v");
    }
    for i in 0..7 {
        topic.append(2, &format!("p2-{i}"), "v");
    }
    topic.truncate_before(2, 3);

    let (mut table, _errors) = table_with_errors(&topic, config(Duration::from_secs(5)));
    let (listener, recording) = RecordingListener::new();
    table.add_listener(listener).unwrap();
    table.start().unwrap();
    table.await_highwater().unwrap();

    let catch_up = recording.catch_up_messages();
    assert_eq!(catch_up.len(), 5 + 4);
    assert!(catch_up.iter().all(|m| m.partition() != 2 || m.offset() >= 3));

    // Per-partition order is preserved.
    let p0: Vec<i64> = catch_up
        .iter()
        .filter(|m| m.partition() == 0)
        .map(eventsource_core::Message::offset)
        .collect();
    assert_eq!(p0, vec![0, 1, 2, 3, 4]);

    topic.append(1, "late", "v");
    assert!(recording.wait_for_live_messages(1, Duration::from_secs(5)));
    assert_eq!(recording.catch_up_messages().len(), 9);
    assert!(recording.batches().iter().all(|b| !b.messages.is_empty()));
}

#[test]
fn on_highwater_fires_once_even_after_rebalance() {
    let topic = MockTopic::new(1);
    topic.append(0, "A", "1");
    let (mut table, errors) = table_with_errors(&topic, config(Duration::from_secs(5)));
    let (listener, recording) = RecordingListener::new();
    table.add_listener(listener).unwrap();
    table.start().unwrap();
    table.await_highwater().unwrap();

    topic.trigger_rebalance();
    topic.append(0, "B", "2");
    assert!(recording.wait_for_live_messages(1, Duration::from_secs(5)));

    assert_eq!(recording.highwater_count(), 1);
    assert_eq!(recording.batches_before_highwater(), Some(1));
    assert_eq!(topic.seek_count(), 1);
    assert!(errors.lock().unwrap().is_empty());
}

#[test]
fn disabled_cache_delivers_empty_snapshot() {
    let topic = MockTopic::new(1);
    topic.append(0, "A", "1");
    let (mut table, _errors) = table_with_errors(
        &topic,
        config(Duration::from_secs(5)).with_compacted_cache(false),
    );
    table.track_cache().unwrap();
    table.start().unwrap();

    assert!(table.await_highwater_cache().unwrap().is_empty());
}

#[test]
fn every_waiter_is_released() {
    let topic = MockTopic::new(1);
    topic.append(0, "A", "1");
    let (mut table, _errors) = table_with_errors(&topic, config(Duration::from_secs(5)));

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let signal = table.highwater_signal();
            thread::spawn(move || signal.wait())
        })
        .collect();
    table.start().unwrap();

    for waiter in waiters {
        assert_eq!(waiter.join().unwrap(), Ok(()));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn async_wait_for_highwater() {
    let topic = MockTopic::new(2);
    topic.append(1, "A", "1");
    let (mut table, _errors) = table_with_errors(&topic, config(Duration::from_secs(5)));
    table.start().unwrap();

    tokio::time::timeout(Duration::from_secs(5), table.wait_for_highwater())
        .await
        .expect("highwater wait timed out")
        .unwrap();
    assert!(table.highwater_reached());
}

// ============================================================================
// Registry Rules
// ============================================================================

#[test]
fn registry_is_closed_after_start() {
    let topic = MockTopic::new(1);
    let (mut table, _errors) = table_with_errors(&topic, config(Duration::from_secs(5)));
    table.start().unwrap();

    let (listener, _recording) = RecordingListener::new();
    assert_eq!(table.add_listener(listener), Err(TableError::AlreadyStarted));
    assert_eq!(table.start(), Err(TableError::AlreadyStarted));
    assert!(matches!(table.track_cache(), Err(TableError::AlreadyStarted)));
}

#[test]
fn removed_listener_is_not_notified() {
    let topic = MockTopic::new(1);
    topic.append(0, "A", "1");
    let (mut table, _errors) = table_with_errors(&topic, config(Duration::from_secs(5)));
    let (kept, kept_recording) = RecordingListener::new();
    let (removed, removed_recording) = RecordingListener::new();
    table.add_listener(kept).unwrap();
    let id = table.add_listener(removed).unwrap();

    assert_eq!(table.remove_listener(id), Ok(true));
    assert_eq!(table.remove_listener(id), Ok(false));
    table.start().unwrap();
    table.await_highwater().unwrap();

    assert_eq!(kept_recording.highwater_count(), 1);
    assert_eq!(removed_recording.highwater_count(), 0);
    assert!(removed_recording.batches().is_empty());
    assert_eq!(table.remove_listener(id), Err(TableError::AlreadyStarted));
}

// ============================================================================
// Stop and Failure
// ============================================================================

#[test]
fn stop_before_highwater_terminates_waiters() {
    let topic = MockTopic::new(1);
    topic.make_unreachable();
    let (mut table, errors) = table_with_errors(&topic, config(Duration::from_secs(30)));
    let (listener, recording) = RecordingListener::new();
    table.add_listener(listener).unwrap();
    table.start().unwrap();

    let signal = table.highwater_signal();
    let waiter = thread::spawn(move || signal.wait());
    thread::sleep(POLL);
    table.stop();

    assert_eq!(waiter.join().unwrap(), Err(TableError::Terminated));
    table.join().unwrap();
    assert_eq!(table.state(), TableState::Stopped);
    assert_eq!(recording.highwater_count(), 0);
    assert!(topic.is_closed());
    assert!(errors.lock().unwrap().is_empty());
}

#[test]
fn listener_error_is_fatal() {
    let topic = MockTopic::new(1);
    topic.append(0, "A", "1");
    let (mut table, errors) = table_with_errors(&topic, config(Duration::from_secs(5)));
    let (listener, recording) = RecordingListener::new();
    table.add_listener(FailingListener::at_batch()).unwrap();
    table.add_listener(listener).unwrap();
    table.start().unwrap();

    assert_eq!(table.await_highwater(), Err(TableError::Terminated));
    table.join().unwrap();

    assert_eq!(table.state(), TableState::Failed);
    assert!(!table.highwater_reached());
    assert!(recording.batches().is_empty());
    assert!(topic.is_closed());
    let errors = errors.lock().unwrap();
    assert!(matches!(errors.as_slice(), [TableError::Listener(_)]));
}

#[test]
fn on_highwater_error_leaves_highwater_unreached() {
    let topic = MockTopic::new(1);
    let (mut table, errors) = table_with_errors(&topic, config(Duration::from_secs(5)));
    table.add_listener(FailingListener::at_highwater()).unwrap();
    table.start().unwrap();

    assert_eq!(table.await_highwater(), Err(TableError::Terminated));
    table.join().unwrap();
    assert!(!table.highwater_reached());
    assert_eq!(errors.lock().unwrap().len(), 1);
}

#[test]
fn listener_panic_is_reported_not_propagated() {
    let topic = MockTopic::new(1);
    topic.append(0, "A", "1");
    let (mut table, errors) = table_with_errors(&topic, config(Duration::from_secs(5)));
    table.add_listener(PanickingListener).unwrap();
    table.start().unwrap();

    assert_eq!(table.await_highwater(), Err(TableError::Terminated));
    table.join().unwrap();

    assert_eq!(table.state(), TableState::Failed);
    assert!(topic.is_closed());
    assert_eq!(
        *errors.lock().unwrap(),
        vec![TableError::WorkerPanicked("listener exploded".to_string())]
    );
}

#[test]
fn consumer_error_is_fatal() {
    let topic = MockTopic::new(1);
    topic.fail_next_poll(ConsumerError::TransportError("broker gone".to_string()));
    let (mut table, errors) = table_with_errors(&topic, config(Duration::from_secs(5)));
    table.start().unwrap();

    assert_eq!(table.await_highwater(), Err(TableError::Terminated));
    table.join().unwrap();
    assert_eq!(
        *errors.lock().unwrap(),
        vec![TableError::Consumer(ConsumerError::TransportError(
            "broker gone".to_string()
        ))]
    );
}

#[test]
fn dropping_a_started_table_stops_the_worker() {
    let topic = MockTopic::new(1);
    let (mut table, _errors) = table_with_errors(&topic, config(Duration::from_secs(5)));
    table.start().unwrap();
    table.await_highwater().unwrap();

    drop(table);
    assert!(topic.wait_closed(POLL * 10));
}
