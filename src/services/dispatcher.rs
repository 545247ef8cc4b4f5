//! Asynchronous webhook dispatch: a bounded queue drained by a fixed
//! pool of delivery workers. Producers never wait for delivery; a full
//! queue either drops the job or applies a short bounded wait depending
//! on `QueueFullPolicy`. Delivery is best-effort, at most one attempt
//! per (job, URL); failures are logged and counted, never retried.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config::{QueueFullPolicy, WebhookConfig};
use crate::events::HookEvent;
use crate::models::EventType;
use crate::services::health::FailureMeter;
use crate::services::hook_registry::HookRegistry;

#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub game_id: String,
    pub event_type: EventType,
    pub body: Value,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("endpoint returned status {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Transport seam so the worker pool is testable without sockets.
#[async_trait]
pub trait Deliverer: Send + Sync {
    async fn deliver(&self, url: &str, body: &Value) -> Result<(), DeliveryError>;
}

pub struct HttpDeliverer {
    client: reqwest::Client,
}

impl HttpDeliverer {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build webhook HTTP client");
        Self { client }
    }
}

#[async_trait]
impl Deliverer for HttpDeliverer {
    async fn deliver(&self, url: &str, body: &Value) -> Result<(), DeliveryError> {
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<DispatchJob>,
    dropped: Arc<AtomicU64>,
    policy: QueueFullPolicy,
    block_wait: Duration,
    failures: FailureMeter,
}

/// Handles for the spawned workers. Workers drain whatever is still
/// queued once every `Dispatcher` clone is gone, then exit.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

impl Dispatcher {
    pub fn start(
        config: &WebhookConfig,
        registry: HookRegistry,
        deliverer: Arc<dyn Deliverer>,
        failures: FailureMeter,
    ) -> (Dispatcher, WorkerPool) {
        let (tx, rx) = mpsc::channel(config.queue_size);
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..config.workers)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    rx.clone(),
                    registry.clone(),
                    deliverer.clone(),
                    failures.clone(),
                ))
            })
            .collect();

        let dispatcher = Dispatcher {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            policy: config.queue_full_policy,
            block_wait: Duration::from_millis(config.queue_block_ms),
            failures,
        };

        (dispatcher, WorkerPool { handles })
    }

    /// Enqueues one delivery job. Never blocks longer than the
    /// configured bounded wait; a job that does not fit is dropped and
    /// counted.
    pub async fn dispatch(&self, event: HookEvent) {
        let job = DispatchJob {
            game_id: event.game_id().to_string(),
            event_type: event.event_type(),
            body: event.to_body(),
            enqueued_at: Utc::now(),
        };
        let event_type = job.event_type;
        let game_id = job.game_id.clone();

        let accepted = match self.policy {
            QueueFullPolicy::Drop => self.tx.try_send(job).is_ok(),
            QueueFullPolicy::Block => self.tx.send_timeout(job, self.block_wait).await.is_ok(),
        };

        if !accepted {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            self.failures.record();
            tracing::warn!(
                game_id = %game_id,
                event_type = ?event_type,
                "dispatch queue full, job dropped"
            );
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn queue_depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

async fn worker_loop(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<DispatchJob>>>,
    registry: HookRegistry,
    deliverer: Arc<dyn Deliverer>,
    failures: FailureMeter,
) {
    loop {
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else { break };

        let urls = registry.resolve(&job.game_id, job.event_type).await;
        for url in urls {
            match deliverer.deliver(&url, &job.body).await {
                Ok(()) => {
                    tracing::debug!(
                        worker = id,
                        url = %url,
                        event_type = ?job.event_type,
                        "webhook delivered"
                    );
                }
                Err(e) => {
                    failures.record();
                    tracing::warn!(
                        worker = id,
                        url = %url,
                        event_type = ?job.event_type,
                        error = %e,
                        "webhook delivery failed"
                    );
                }
            }
        }
    }
    tracing::debug!(worker = id, "dispatch worker stopped");
}
