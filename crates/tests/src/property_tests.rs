//! Randomized delivery properties

use std::time::Duration;

use contracts::{Event, FeedFrame};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stream::{CommitIndexStore, MockFeed, StreamEnd};
use tokio::time::sleep;

use crate::support::{consumer_config, flatten, run_pipeline, BatchSettings, RecordingProvider};

const TOPICS: &[&str] = &["Deployment", "Job", "Node", "Allocation"];

/// Random feed: gaps in the index, several events per frame, mixed topics
fn random_feed(rng: &mut StdRng) -> (Vec<FeedFrame>, Vec<(u64, &'static str)>) {
    let mut frames = Vec::new();
    let mut events = Vec::new();
    let mut index = 0u64;

    for _ in 0..rng.random_range(0..60) {
        if rng.random_bool(0.1) {
            frames.push(FeedFrame::new(0, Vec::new()));
            continue;
        }
        index += rng.random_range(1..4);
        let frame_events: Vec<Event> = (0..rng.random_range(1..4))
            .map(|_| {
                let topic = TOPICS[rng.random_range(0..TOPICS.len())];
                events.push((index, topic));
                Event::new(index, topic, "Update")
            })
            .collect();
        frames.push(FeedFrame::new(index, frame_events));
    }
    (frames, events)
}

/// Concatenated batches equal the delivered sequence, and no batch exceeds
/// the limit, for random feeds, filters and batch sizes
#[tokio::test(start_paused = true)]
async fn test_batches_preserve_order_and_bounds() {
    let mut rng = StdRng::seed_from_u64(0x6e65_735f);

    for round in 0..25 {
        let dir = tempfile::tempdir().unwrap();
        let (frames, events) = random_feed(&mut rng);
        let selected: Vec<&str> = if rng.random_bool(0.5) {
            Vec::new()
        } else {
            vec![TOPICS[rng.random_range(0..TOPICS.len())]]
        };
        let events_count = rng.random_range(1..8);

        let expected: Vec<u64> = events
            .iter()
            .filter(|(_, topic)| selected.is_empty() || selected.contains(topic))
            .map(|(index, _)| *index)
            .collect();

        let feed = MockFeed::new()
            .stream(frames, StreamEnd::Pending)
            .without_server_filter();
        let (provider, batches) = RecordingProvider::new("stdout");
        let run = run_pipeline(
            feed,
            consumer_config(&selected, 0),
            BatchSettings {
                events_count,
                idle_timeout: Duration::from_millis(rng.random_range(100..2000)),
            },
            vec![provider],
            dir.path(),
            sleep(Duration::from_secs(10)),
        )
        .await;

        let exit = run.exit.unwrap();
        assert_eq!(exit.events_delivered as usize, expected.len(), "round {round}");
        assert_eq!(flatten(&batches), expected, "round {round}");
        for batch in batches.lock().unwrap().iter() {
            assert!(!batch.is_empty(), "round {round}: empty batch flushed");
            assert!(batch.len() <= events_count, "round {round}: batch over limit");
        }
    }
}

/// After any sequence of saves followed by a torn write, the stored index is
/// the last completed save
#[tokio::test]
async fn test_commit_index_survives_torn_write() {
    let mut rng = StdRng::seed_from_u64(42);
    let dir = tempfile::tempdir().unwrap();
    let store = CommitIndexStore::new(dir.path());

    let mut previous: Option<u64> = None;
    for _ in 0..20 {
        let index = previous.unwrap_or(0) + rng.random_range(1..1000);
        store.save(index).await.unwrap();

        // A crash mid-save leaves only a partial temp file behind
        let torn = dir.path().join(format!("{}.tmp", stream::COMMIT_INDEX_FILE));
        std::fs::write(&torn, b"9").unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, Some(index));
        assert!(previous < loaded);
        previous = loaded;
    }
}
