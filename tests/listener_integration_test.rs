use anyhow::{anyhow, Result};
use async_trait::async_trait;
use drainpipe::metrics::{
    InMemoryMetrics, Metrics, QUEUE_ACK_OK, QUEUE_ACK_TRIED, QUEUE_ERROR, QUEUE_MESSAGE_RECEIVED,
};
use drainpipe::queue::{
    Listener, ListenerError, ListenerSettings, MockListener, QueueListener, QueueMessage,
    QueueSource,
};
use drainpipe::worker::{LogHandler, Worker};
use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::Span;

/// Queue service replaying scripted batches, then failing with
/// "no more messages".
#[derive(Default)]
struct ScriptedQueue {
    batches: Mutex<VecDeque<Vec<QueueMessage>>>,
    deleted: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedQueue {
    fn new(batches: Vec<Vec<QueueMessage>>) -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(batches.into()),
            ..Default::default()
        })
    }

    fn deleted(&self) -> Vec<String> {
        self.deleted
            .lock()
            .unwrap()
            .iter()
            .map(|(receipt, _)| receipt.clone())
            .collect()
    }
}

#[async_trait]
impl QueueSource for ScriptedQueue {
    async fn receive_batch(&self, _max_messages: i32, _wait: Duration) -> Result<Vec<QueueMessage>> {
        self.batches
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("no more messages"))
    }

    async fn delete_by_receipt(&self, receipt_handle: &str) -> Result<()> {
        self.deleted
            .lock()
            .unwrap()
            .push((receipt_handle.to_string(), Instant::now()));
        Ok(())
    }
}

fn settings() -> ListenerSettings {
    ListenerSettings {
        max_messages: 10,
        wait_time: Duration::from_secs(20),
        empty_backoff: Duration::from_millis(100),
    }
}

#[tokio::test]
async fn test_message_then_error() -> Result<()> {
    let source = ScriptedQueue::new(vec![vec![QueueMessage::new("m0", "hello", "r0")]]);
    let listener = QueueListener::new(
        source,
        "test-url",
        settings(),
        Span::none(),
        Metrics::null(),
    );
    let mut streams = listener.listen()?;

    let msg = streams.messages.recv().await.expect("message stream closed");
    assert_eq!(msg.id(), "m0");
    assert_eq!(msg.body(), "hello");
    assert_eq!(msg.receipt_token(), "r0");

    let err = streams.errors.recv().await.expect("error stream closed");
    assert!(err.to_string().contains("no more messages"));

    Ok(())
}

#[tokio::test]
async fn test_ack_triggers_single_delete() -> Result<()> {
    let source = ScriptedQueue::new(vec![vec![QueueMessage::new("m0", "hello", "r0")]]);
    let sink = Arc::new(InMemoryMetrics::new());
    let listener = QueueListener::new(
        source.clone(),
        "test-url",
        settings(),
        Span::none(),
        Metrics::new(sink.clone()),
    );
    let mut streams = listener.listen()?;

    let msg = streams.messages.recv().await.expect("message stream closed");
    let acked_at = Instant::now();
    msg.ack().await?;

    // `msg` has been consumed; it cannot be acknowledged a second time.
    let deadline = acked_at + Duration::from_millis(500);
    while source.deleted().is_empty() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    assert_eq!(source.deleted(), vec!["r0".to_string()]);
    let (_, deleted_at) = source.deleted.lock().unwrap()[0].clone();
    assert!(deleted_at - acked_at < Duration::from_millis(50));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(source.deleted().len(), 1);
    assert_eq!(sink.counter(QUEUE_ACK_TRIED), 1);
    assert_eq!(sink.counter(QUEUE_ACK_OK), 1);

    Ok(())
}

#[tokio::test]
async fn test_batch_emitted_in_order() -> Result<()> {
    let batch: Vec<QueueMessage> = (0..10)
        .map(|i| QueueMessage::new(format!("m{}", i), format!("body {}", i), format!("r{}", i)))
        .collect();
    let source = ScriptedQueue::new(vec![batch.clone()]);
    let sink = Arc::new(InMemoryMetrics::new());
    let listener = QueueListener::new(
        source,
        "test-url",
        settings(),
        Span::none(),
        Metrics::new(sink.clone()),
    );
    let mut streams = listener.listen()?;

    for expected in &batch {
        let msg = streams.messages.recv().await.expect("message stream closed");
        assert_eq!(msg.id(), expected.message_id);
        assert_eq!(msg.body(), expected.body);
        assert_eq!(msg.receipt_token(), expected.receipt_handle);
    }

    streams.errors.recv().await.expect("error stream closed");
    assert_eq!(sink.counter(QUEUE_MESSAGE_RECEIVED), 10);
    assert!(sink.counter(QUEUE_ERROR) >= 1);

    Ok(())
}

#[tokio::test]
async fn test_health_follows_successful_polls() -> Result<()> {
    let source = ScriptedQueue::new(vec![vec![], vec![QueueMessage::new("m0", "hello", "r0")]]);
    let listener = QueueListener::new(
        source,
        "test-url",
        settings(),
        Span::none(),
        Metrics::null(),
    );
    assert!(listener.health_check().is_none());

    let mut streams = listener.listen()?;
    streams.messages.recv().await.expect("message stream closed");

    let first = listener.health_check().expect("health recorded");
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = listener.health_check().expect("health recorded");
    assert!(second >= first);

    Ok(())
}

#[tokio::test]
async fn test_empty_batch_delays_next_poll() -> Result<()> {
    let source = ScriptedQueue::new(vec![
        vec![QueueMessage::new("m0", "a", "r0")],
        vec![QueueMessage::new("m1", "b", "r1")],
        vec![],
        vec![QueueMessage::new("m2", "c", "r2")],
    ]);
    let listener = QueueListener::new(
        source,
        "test-url",
        settings(),
        Span::none(),
        Metrics::null(),
    );
    let mut streams = listener.listen()?;

    let start = Instant::now();
    streams.messages.recv().await.expect("message stream closed");
    streams.messages.recv().await.expect("message stream closed");
    let back_to_back = start.elapsed();

    streams.messages.recv().await.expect("message stream closed");
    let after_empty = start.elapsed();

    assert!(back_to_back < Duration::from_millis(100));
    assert!(after_empty >= Duration::from_millis(100));

    Ok(())
}

#[tokio::test]
async fn test_mock_listener_is_a_drop_in() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(
        file,
        r#"[{{"message_id": "m0", "body": "hello", "receipt_handle": "r0"}}]"#
    )?;

    let mock = Arc::new(
        MockListener::new(file.path(), Span::none())?.with_interval(Duration::from_millis(5)),
    );
    let listener: Arc<dyn Listener> = mock.clone();

    let stats = Worker::new(LogHandler).run(listener.listen()?).await;
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.errors, 1);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(mock.acknowledged()[0].receipt_token, "r0");
    assert!(listener.health_check().is_some());
    assert!(matches!(listener.listen(), Err(ListenerError::AlreadyListening)));

    Ok(())
}

#[tokio::test]
async fn test_shutdown_ends_worker() -> Result<()> {
    let source = ScriptedQueue::new(vec![vec![]; 100]);
    let listener = QueueListener::new(
        source,
        "test-url",
        settings(),
        Span::none(),
        Metrics::null(),
    );
    let streams = listener.listen()?;

    let worker = tokio::spawn(async move { Worker::new(LogHandler).run(streams).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    listener.shutdown();

    let stats = tokio::time::timeout(Duration::from_secs(1), worker).await??;
    assert_eq!(stats.processed, 0);

    Ok(())
}
