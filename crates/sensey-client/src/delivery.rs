//! Background delivery of queued readings to the collector.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use sensey_types::{Reading, codec};

use crate::backoff::Backoff;
use crate::error::{ClientError, Result};
use crate::queue::DurableQueue;

/// How readings reach the collector. Abstracted so delivery logic can be
/// tested without a network.
#[async_trait]
pub trait ReadingTransport: Send + Sync {
    async fn deliver(&self, reading: &Reading) -> Result<()>;
}

/// HTTP transport posting readings to `{base_url}/data/{client_id}`.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ReadingTransport for HttpTransport {
    async fn deliver(&self, reading: &Reading) -> Result<()> {
        let url = format!("{}/data/{}", self.base_url, reading.client_id);
        let response = self.client.post(&url).json(&codec::encode(reading)).send().await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ClientError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

enum StepOutcome {
    /// Oldest entry delivered and acknowledged.
    Delivered,
    /// Delivery failed, entry stays queued.
    Failed,
    /// Queue empty.
    Idle,
}

/// Drains the queue oldest-first, one reading at a time.
///
/// Any failed delivery leaves the entry at the front with its attempt count
/// bumped and backs off; entries leave the queue only through
/// acknowledgement or capacity eviction. The queue lock is never held
/// across a network await.
pub struct DeliveryWorker {
    queue: Arc<Mutex<DurableQueue>>,
    transport: Arc<dyn ReadingTransport>,
    backoff: Backoff,
    wakeup: Arc<Notify>,
}

impl DeliveryWorker {
    pub fn new(
        queue: Arc<Mutex<DurableQueue>>,
        transport: Arc<dyn ReadingTransport>,
        backoff: Backoff,
        wakeup: Arc<Notify>,
    ) -> Self {
        Self {
            queue,
            transport,
            backoff,
            wakeup,
        }
    }

    /// Run forever, sleeping when the queue is empty or a delivery failed.
    pub async fn run(mut self) {
        info!("Delivery worker started");
        loop {
            match self.step().await {
                StepOutcome::Delivered => {}
                StepOutcome::Failed => sleep(self.backoff.delay()).await,
                StepOutcome::Idle => self.wakeup.notified().await,
            }
        }
    }

    async fn step(&mut self) -> StepOutcome {
        let entry = {
            let queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            queue.front()
        };
        let Some(entry) = entry else {
            return StepOutcome::Idle;
        };

        match self.transport.deliver(&entry.reading).await {
            Ok(()) => {
                self.backoff.record_success();
                let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
                if let Err(e) = queue.acknowledge(&[entry.id]) {
                    warn!("Failed to journal acknowledgement: {}", e);
                }
                debug!("Delivered reading, {} pending", queue.len());
                StepOutcome::Delivered
            }
            Err(e) => {
                self.backoff.record_failure();
                let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
                queue.record_failure(entry.id);
                warn!(
                    "Delivery failed (attempt {}): {}, retrying in {:?}",
                    entry.attempt_count + 1,
                    e,
                    self.backoff.delay()
                );
                StepOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyTransport {
        failures_remaining: AtomicU32,
        delivered: Mutex<Vec<Reading>>,
    }

    impl FlakyTransport {
        fn new(failures: u32) -> Self {
            Self {
                failures_remaining: AtomicU32::new(failures),
                delivered: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ReadingTransport for FlakyTransport {
        async fn deliver(&self, reading: &Reading) -> Result<()> {
            let remaining = self.failures_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
                return Err(ClientError::Rejected { status: 503 });
            }
            self.delivered.lock().unwrap().push(reading.clone());
            Ok(())
        }
    }

    struct RejectingTransport;

    #[async_trait]
    impl ReadingTransport for RejectingTransport {
        async fn deliver(&self, _reading: &Reading) -> Result<()> {
            Err(ClientError::Rejected { status: 400 })
        }
    }

    fn worker_with(
        dir: &tempfile::TempDir,
        transport: Arc<dyn ReadingTransport>,
        readings: &[Reading],
    ) -> (DeliveryWorker, Arc<Mutex<DurableQueue>>) {
        let mut queue = DurableQueue::open(dir.path().join("queue.journal"), 100).unwrap();
        for reading in readings {
            queue.push(reading.clone()).unwrap();
        }
        let queue = Arc::new(Mutex::new(queue));
        let backoff = Backoff::new(BackoffConfig {
            initial_delay: Duration::from_millis(1),
            jitter: false,
            ..Default::default()
        });
        let worker = DeliveryWorker::new(
            Arc::clone(&queue),
            transport,
            backoff,
            Arc::new(Notify::new()),
        );
        (worker, queue)
    }

    fn reading(n: u32) -> Reading {
        Reading::now("c1").with_field("temperature", 20.0 + n as f64)
    }

    struct FlakyStoreTransport {
        failures_remaining: AtomicU32,
        store: sensey_store::FileSeriesStore,
    }

    #[async_trait]
    impl ReadingTransport for FlakyStoreTransport {
        async fn deliver(&self, reading: &Reading) -> Result<()> {
            let remaining = self.failures_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
                return Err(ClientError::Rejected { status: 503 });
            }
            self.store
                .store(reading)
                .map_err(|e| ClientError::Sensor(e.to_string()))
        }
    }

    // End-to-end: readings enqueued, two delivery failures, then recovery.
    // Both must land in collector storage in enqueue order and the queue
    // must drain.
    #[tokio::test]
    async fn test_end_to_end_delivery_into_storage() {
        use sensey_types::TimeWindow;
        use time::macros::datetime;

        let queue_dir = tempfile::tempdir().unwrap();
        let store_dir = tempfile::tempdir().unwrap();
        let store = sensey_store::FileSeriesStore::open(&sensey_store::FileConfig {
            data_dir: store_dir.path().to_path_buf(),
        })
        .unwrap();

        let base = datetime!(2025-06-01 12:00:00 UTC);
        let readings = vec![
            Reading::new("c1", base).with_field("temperature", 20.0),
            Reading::new("c1", base + time::Duration::seconds(60)).with_field("temperature", 21.0),
        ];

        let transport = Arc::new(FlakyStoreTransport {
            failures_remaining: AtomicU32::new(2),
            store: store.clone(),
        });
        let (mut worker, queue) =
            worker_with(&queue_dir, Arc::clone(&transport) as _, &readings);

        for _ in 0..4 {
            worker.step().await;
        }

        let stored = store.range_query("c1", TimeWindow::All).unwrap();
        assert_eq!(stored, readings);
        assert!(queue.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_outage_then_recovery_delivers_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FlakyTransport::new(2));
        let readings = vec![reading(0), reading(1)];
        let (mut worker, queue) = worker_with(&dir, Arc::clone(&transport) as _, &readings);

        // Two transient failures, then everything goes through.
        for _ in 0..4 {
            worker.step().await;
        }

        let delivered = transport.delivered.lock().unwrap();
        assert_eq!(*delivered, readings);
        assert!(queue.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_keeps_entry_and_counts_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FlakyTransport::new(3));
        let (mut worker, queue) = worker_with(&dir, Arc::clone(&transport) as _, &[reading(0)]);

        worker.step().await;
        worker.step().await;

        let queue = queue.lock().unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.front().unwrap().attempt_count, 2);
        assert_eq!(worker.backoff.consecutive_failures(), 2);
    }

    // A 4xx rejection is retried like any other failure; nothing but an
    // acknowledgement or capacity eviction removes an entry.
    #[tokio::test]
    async fn test_rejected_response_keeps_entry_queued() {
        let dir = tempfile::tempdir().unwrap();
        let (mut worker, queue) =
            worker_with(&dir, Arc::new(RejectingTransport), &[reading(0)]);

        worker.step().await;

        let queue = queue.lock().unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.front().unwrap().attempt_count, 1);
        assert_eq!(worker.backoff.consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn test_idle_on_empty_queue() {
        let dir = tempfile::tempdir().unwrap();
        let (mut worker, _queue) = worker_with(&dir, Arc::new(RejectingTransport), &[]);
        assert!(matches!(worker.step().await, StepOutcome::Idle));
    }
}
