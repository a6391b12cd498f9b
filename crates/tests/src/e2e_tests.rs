//! End-to-end scenarios: MockFeed -> StreamConsumer -> BatchWorker -> providers

use std::time::Duration;

use contracts::{Event, FeedFrame};
use dispatcher::event_queue;
use stream::{
    CommitIndexStore, CommitTracker, ExitReason, MockFeed, StreamConsumer, StreamEnd, StreamError,
    COMMIT_INDEX_FILE,
};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::support::{
    consumer_config, flatten, frames, run_pipeline, BatchSettings, RecordingProvider,
};

fn settle() -> tokio::time::Sleep {
    sleep(Duration::from_secs(30))
}

/// Five events with `events_count = 3` arrive as [1,2,3] then [4,5]
#[tokio::test(start_paused = true)]
async fn test_scenario_a_count_then_idle_flush() {
    let dir = tempfile::tempdir().unwrap();
    let feed = MockFeed::new().stream(frames("Deployment", 1..=5), StreamEnd::Pending);
    let (provider, batches) = RecordingProvider::new("stdout");

    let run = run_pipeline(
        feed,
        consumer_config(&[], 0),
        BatchSettings {
            events_count: 3,
            idle_timeout: Duration::from_secs(1),
        },
        vec![provider],
        dir.path(),
        settle(),
    )
    .await;

    assert_eq!(run.exit.unwrap().reason, ExitReason::Cancelled);
    assert_eq!(*batches.lock().unwrap(), vec![vec![1, 2, 3], vec![4, 5]]);
    assert_eq!(run.worker.count_flushes, 1);
    assert_eq!(run.worker.idle_flushes, 1);
    assert_eq!(run.worker.shutdown_flushes, 0);
}

/// A failing provider sees every batch and does not hold back the other one
#[tokio::test(start_paused = true)]
async fn test_scenario_b_failing_provider_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let feed = MockFeed::new().stream(frames("Job", 1..=4), StreamEnd::Pending);
    let (p1, p1_batches) = RecordingProvider::failing("p1");
    let (p2, p2_batches) = RecordingProvider::new("p2");

    let run = run_pipeline(
        feed,
        consumer_config(&[], 0),
        BatchSettings {
            events_count: 2,
            idle_timeout: Duration::from_secs(1),
        },
        vec![p1, p2],
        dir.path(),
        settle(),
    )
    .await;

    let exit = run.exit.unwrap();
    assert_eq!(exit.events_delivered, 4);
    assert_eq!(*p1_batches.lock().unwrap(), vec![vec![1, 2], vec![3, 4]]);
    assert_eq!(*p2_batches.lock().unwrap(), vec![vec![1, 2], vec![3, 4]]);
    assert_eq!(run.worker.partial_batches, 2);
}

/// Only the selected topic reaches providers, even when the server sends more
#[tokio::test(start_paused = true)]
async fn test_scenario_c_topic_filter() {
    let dir = tempfile::tempdir().unwrap();
    let mixed: Vec<FeedFrame> = (1..=6)
        .map(|i| {
            let topic = if i % 2 == 1 { "Deployment" } else { "Job" };
            FeedFrame::new(i, vec![Event::new(i, topic, "Update")])
        })
        .collect();
    let feed = MockFeed::new()
        .stream(mixed, StreamEnd::Pending)
        .without_server_filter();
    let (provider, batches) = RecordingProvider::new("stdout");

    let run = run_pipeline(
        feed,
        consumer_config(&["Deployment"], 0),
        BatchSettings::default(),
        vec![provider],
        dir.path(),
        settle(),
    )
    .await;

    let exit = run.exit.unwrap();
    assert_eq!(flatten(&batches), vec![1, 3, 5]);
    // Filtered frames still move the commit index
    assert_eq!(exit.commit_index, Some(6));
}

/// Persisted 100, delivered up to 107, crash; the restart redelivers (100, 107]
#[tokio::test(start_paused = true)]
async fn test_scenario_d_resume_after_crash() {
    let dir = tempfile::tempdir().unwrap();
    let store = CommitIndexStore::new(dir.path());
    store.save(100).await.unwrap();

    // First run: nothing is saved before the process dies
    let feed = MockFeed::new().stream(frames("Deployment", 95..=107), StreamEnd::Pending);
    let (handler, rx) = event_queue(64);
    let tracker = CommitTracker::new(store.clone(), Duration::from_secs(3600));
    let mut consumer = StreamConsumer::new(feed.clone(), handler, tracker, consumer_config(&[], 0));
    let crashed = tokio::time::timeout(
        Duration::from_secs(5),
        consumer.run(CancellationToken::new()),
    )
    .await;
    assert!(crashed.is_err());
    drop(consumer);

    let mut first_run = Vec::new();
    while let Ok(event) = rx.try_recv() {
        first_run.push(event.index);
    }
    assert_eq!(first_run, (100..=107).collect::<Vec<_>>());
    assert_eq!(feed.requests()[0].start_index, 100);

    let persisted = store.load().await.unwrap().unwrap();
    assert!((100..=107).contains(&persisted));

    // Second run resumes from the persisted index
    let feed = MockFeed::new().stream(frames("Deployment", 95..=110), StreamEnd::Pending);
    let (provider, batches) = RecordingProvider::new("stdout");
    let run = run_pipeline(
        feed.clone(),
        consumer_config(&[], 0),
        BatchSettings::default(),
        vec![provider],
        dir.path(),
        settle(),
    )
    .await;

    assert_eq!(feed.requests()[0].start_index, persisted);
    let delivered = flatten(&batches);
    for index in 101..=107 {
        assert!(delivered.contains(&index), "index {index} not redelivered");
    }
    assert_eq!(delivered.last(), Some(&110));
    assert_eq!(run.exit.unwrap().commit_index, Some(110));

    let saved = std::fs::read_to_string(dir.path().join(COMMIT_INDEX_FILE)).unwrap();
    assert_eq!(saved.trim(), "110");
}

/// A dropped stream resumes after the last frame without loss or duplicates
#[tokio::test(start_paused = true)]
async fn test_reconnect_resumes_without_gaps() {
    let dir = tempfile::tempdir().unwrap();
    let feed = MockFeed::new()
        .stream(frames("Node", 1..=3), StreamEnd::Error("connection reset".into()))
        .refuse("connection refused")
        .stream(frames("Node", 1..=6), StreamEnd::Pending);
    let (provider, batches) = RecordingProvider::new("stdout");

    let run = run_pipeline(
        feed.clone(),
        consumer_config(&[], 3),
        BatchSettings::default(),
        vec![provider],
        dir.path(),
        settle(),
    )
    .await;

    let exit = run.exit.unwrap();
    assert_eq!(exit.generations, 2);
    assert_eq!(flatten(&batches), vec![1, 2, 3, 4, 5, 6]);

    let starts: Vec<u64> = feed.requests().iter().map(|r| r.start_index).collect();
    assert_eq!(starts, vec![0, 4, 4]);
}

/// An unreachable feed exhausts the budget; nothing is flushed
#[tokio::test(start_paused = true)]
async fn test_reconnect_budget_exhausted() {
    let dir = tempfile::tempdir().unwrap();
    let feed = MockFeed::new();
    let (provider, batches) = RecordingProvider::new("stdout");

    let run = run_pipeline(
        feed.clone(),
        consumer_config(&[], 2),
        BatchSettings::default(),
        vec![provider],
        dir.path(),
        std::future::pending::<()>(),
    )
    .await;

    match run.exit {
        Err(StreamError::ReconnectBudgetExhausted { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("unexpected exit: {other:?}"),
    }
    assert_eq!(feed.requests().len(), 3);
    assert!(batches.lock().unwrap().is_empty());
    assert_eq!(run.worker.flushes(), 0);
}

/// Heartbeats keep the stream alive without producing events
#[tokio::test(start_paused = true)]
async fn test_heartbeats_produce_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut script = frames("Deployment", 1..=2);
    script.insert(1, FeedFrame::new(0, Vec::new()));
    script.push(FeedFrame::new(0, Vec::new()));
    let feed = MockFeed::new().stream(script, StreamEnd::Pending);
    let (provider, batches) = RecordingProvider::new("stdout");

    let run = run_pipeline(
        feed,
        consumer_config(&[], 0),
        BatchSettings::default(),
        vec![provider],
        dir.path(),
        settle(),
    )
    .await;

    assert_eq!(flatten(&batches), vec![1, 2]);
    assert_eq!(run.exit.unwrap().commit_index, Some(2));
}
