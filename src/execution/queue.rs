/// Execution job queue with a fixed-size worker pool
///
/// Jobs are dispatched in FIFO order to a [`JobProcessor`]; a semaphore caps how many run
/// at once. There is no retry: a failed job is logged and its execution record carries
/// the error.

use crate::config::QueueConfig;
use crate::execution::storage::ExecutionStorage;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot, Semaphore},
    task::JoinHandle,
};

/// Payload of one queued workflow run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionJob {
    pub execution_id: String,
    pub workflow_id: String,
    pub user_id: String,
}

/// The single downstream call a worker makes for each job
#[async_trait]
pub trait JobProcessor: Send + Sync + 'static {
    async fn process(&self, job: ExecutionJob) -> Result<()>;
}

/// Producer side of the queue; cheap to clone into request handlers
#[derive(Debug, Clone)]
pub struct ExecutionQueue {
    sender: mpsc::Sender<ExecutionJob>,
}

/// Owner of the dispatcher task
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    dispatcher: JoinHandle<()>,
}

impl ExecutionQueue {
    /// Spawn the dispatcher and return the producer handle plus its owner
    pub fn start(processor: Arc<dyn JobProcessor>, config: &QueueConfig) -> (Self, WorkerHandle) {
        let concurrency = config.concurrency.max(1);
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tracing::info!("👷 Starting execution workers (concurrency: {})", concurrency);
        let dispatcher = tokio::spawn(dispatch(receiver, shutdown_rx, processor, concurrency));

        (
            Self { sender },
            WorkerHandle {
                shutdown: Some(shutdown_tx),
                dispatcher,
            },
        )
    }

    /// Queue a job, waiting for room when the buffer is full
    pub async fn enqueue(&self, job: ExecutionJob) -> Result<()> {
        tracing::debug!("📥 Enqueueing execution {}", job.execution_id);
        self.sender
            .send(job)
            .await
            .map_err(|e| anyhow::anyhow!("Execution queue is closed, dropped job {}", e.0.execution_id))
    }
}

impl WorkerHandle {
    /// Stop taking new jobs and wait for running ones to finish
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = self.dispatcher.await {
            tracing::error!("❌ Execution dispatcher panicked: {}", e);
        }
        tracing::info!("✅ Execution workers stopped");
    }
}

async fn dispatch(
    mut receiver: mpsc::Receiver<ExecutionJob>,
    mut shutdown: oneshot::Receiver<()>,
    processor: Arc<dyn JobProcessor>,
    concurrency: usize,
) {
    let permits = Arc::new(Semaphore::new(concurrency));
    // A dropped WorkerHandle detaches the workers instead of stopping them
    let mut listening = true;

    loop {
        let job = tokio::select! {
            signal = &mut shutdown, if listening => {
                if signal.is_ok() {
                    break;
                }
                listening = false;
                continue;
            }
            job = receiver.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let permit = match Arc::clone(&permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let processor = Arc::clone(&processor);
        tokio::spawn(async move {
            let _permit = permit;
            let execution_id = job.execution_id.clone();
            if let Err(e) = processor.process(job).await {
                tracing::error!("❌ Execution job {} failed: {:#}", execution_id, e);
            }
        });
    }

    // Drain: every permit back means every spawned job finished
    let _ = permits.acquire_many(concurrency as u32).await;
}

/// Re-enqueue executions left PENDING (or interrupted mid-run) by a previous process
pub async fn enqueue_pending(storage: &ExecutionStorage, queue: &ExecutionQueue) -> Result<usize> {
    let interrupted = storage.requeue_interrupted().await?;
    if interrupted > 0 {
        tracing::warn!("⚠️ Re-queued {} interrupted executions", interrupted);
    }

    let pending = storage.list_pending().await?;
    let count = pending.len();
    for execution in pending {
        queue
            .enqueue(ExecutionJob {
                execution_id: execution.id,
                workflow_id: execution.workflow_id,
                user_id: execution.user_id,
            })
            .await?;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingProcessor {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        processed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl JobProcessor for RecordingProcessor {
        async fn process(&self, job: ExecutionJob) -> Result<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.processed.lock().await.push(job.execution_id.clone());
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if job.execution_id == "boom" {
                anyhow::bail!("processor failure");
            }
            Ok(())
        }
    }

    fn job(id: &str) -> ExecutionJob {
        ExecutionJob {
            execution_id: id.to_string(),
            workflow_id: "wf".to_string(),
            user_id: "user".to_string(),
        }
    }

    #[tokio::test]
    async fn runs_every_job_within_the_concurrency_limit() {
        let processor = Arc::new(RecordingProcessor::default());
        let (queue, workers) = ExecutionQueue::start(
            processor.clone(),
            &QueueConfig { concurrency: 2, capacity: 16 },
        );

        for i in 0..8 {
            queue.enqueue(job(&format!("exec-{i}"))).await.unwrap();
        }
        // Give the dispatcher time to pull everything before shutting down
        tokio::time::sleep(Duration::from_millis(200)).await;
        workers.shutdown().await;

        assert_eq!(processor.processed.lock().await.len(), 8);
        assert!(processor.max_in_flight.load(Ordering::SeqCst) <= 2);
        assert!(processor.max_in_flight.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn failing_jobs_do_not_stop_the_workers() {
        let processor = Arc::new(RecordingProcessor::default());
        let (queue, workers) = ExecutionQueue::start(processor.clone(), &QueueConfig::default());

        queue.enqueue(job("boom")).await.unwrap();
        queue.enqueue(job("fine")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        workers.shutdown().await;

        let processed = processor.processed.lock().await;
        assert!(processed.contains(&"boom".to_string()));
        assert!(processed.contains(&"fine".to_string()));
    }

    #[tokio::test]
    async fn enqueue_fails_after_shutdown() {
        let processor = Arc::new(RecordingProcessor::default());
        let (queue, workers) = ExecutionQueue::start(processor, &QueueConfig::default());
        workers.shutdown().await;

        assert!(queue.enqueue(job("late")).await.is_err());
    }
}
