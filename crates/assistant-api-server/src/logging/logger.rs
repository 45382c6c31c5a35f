use flume::{Receiver, Sender};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use super::types::ActivityLog;

/// Configuration for activity logger
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Queue capacity before backpressure
    pub queue_capacity: usize,
    /// Batch size for flushing
    pub batch_size: usize,
    /// Flush interval in milliseconds
    pub batch_timeout_ms: u64,
    /// Optional JSONL file sink; tracing events are emitted either way
    pub file_path: Option<PathBuf>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            batch_size: 100,
            batch_timeout_ms: 1_000,
            file_path: None,
        }
    }
}

/// Non-blocking activity logger with queue and batch flushing.
///
/// A single worker drains the queue so file appends stay in submission order.
pub struct ActivityLogger {
    sender: Sender<ActivityLog>,
    config: LoggerConfig,
}

impl ActivityLogger {
    /// Create new logger and spawn the flush worker
    pub fn new(config: LoggerConfig) -> Arc<Self> {
        let (sender, receiver) = flume::bounded(config.queue_capacity);

        let worker_config = config.clone();
        tokio::spawn(async move {
            Self::worker_loop(receiver, worker_config).await;
        });

        info!(
            "Activity logger initialized (queue capacity: {})",
            config.queue_capacity
        );

        Arc::new(Self { sender, config })
    }

    /// Log activity (non-blocking)
    pub fn log(&self, log: ActivityLog) {
        if let Err(e) = self.sender.try_send(log) {
            warn!("Activity log queue full, dropping log: {}", e);
        }
    }

    /// Log activity with async send (waits if queue is full)
    pub async fn log_async(&self, log: ActivityLog) {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            if let Err(e) = sender.send_async(log).await {
                error!("Failed to queue activity log: {}", e);
            }
        });
    }

    /// Worker loop that batches and flushes logs
    async fn worker_loop(receiver: Receiver<ActivityLog>, config: LoggerConfig) {
        info!("Activity log worker started");

        loop {
            let mut batch = Vec::with_capacity(config.batch_size);
            let deadline =
                tokio::time::Instant::now() + Duration::from_millis(config.batch_timeout_ms);

            while batch.len() < config.batch_size {
                match tokio::time::timeout_at(deadline, receiver.recv_async()).await {
                    Ok(Ok(log)) => batch.push(log),
                    Ok(Err(_)) => {
                        // Channel closed, flush and exit
                        if !batch.is_empty() {
                            Self::flush_batch(&config.file_path, &batch).await;
                        }
                        info!("Activity log worker stopped");
                        return;
                    }
                    Err(_) => break, // Timeout, flush what we have
                }
            }

            if !batch.is_empty() {
                Self::flush_batch(&config.file_path, &batch).await;
            } else {
                sleep(Duration::from_millis(100)).await;
            }
        }
    }

    /// Flush a batch to the tracing sink and the optional JSONL file
    async fn flush_batch(file_path: &Option<PathBuf>, batch: &[ActivityLog]) {
        let mut buf = String::new();

        for log in batch {
            info!(
                target: "activity",
                session_id = %log.session_id,
                activity = log.activity_type.as_str(),
                status = log.activity_status.as_str(),
                "activity recorded"
            );

            match serde_json::to_string(log) {
                Ok(line) => {
                    buf.push_str(&line);
                    buf.push('\n');
                }
                Err(e) => {
                    error!("Failed to serialize activity log: {}", e);
                }
            }
        }

        if let Some(path) = file_path {
            if buf.is_empty() {
                return;
            }
            let result = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await;
            match result {
                Ok(mut file) => {
                    if let Err(e) = file.write_all(buf.as_bytes()).await {
                        error!("Failed to write activity log file: {}", e);
                    }
                }
                Err(e) => {
                    error!("Failed to open activity log file: {}", e);
                }
            }
        }
    }

    /// Get current queue length
    pub fn queue_len(&self) -> usize {
        self.sender.len()
    }

    /// Check if queue is near capacity
    pub fn is_queue_full(&self) -> bool {
        self.sender.is_full()
    }

    /// Get queue capacity
    pub fn queue_capacity(&self) -> usize {
        self.config.queue_capacity
    }
}
