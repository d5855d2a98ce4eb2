// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Single-task owner of the current batch set.
//!
//! Producers submit entries through a cloneable [`BatcherHandle`] backed by an
//! unbounded channel, so ingestion never blocks on network I/O. The service
//! task is the only mutator of the current [`BatchSet`]; a flush atomically
//! swaps it for a fresh one and hands the filled set back to the caller.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, error};

use crate::batch::{BatchSet, Entry};
use crate::labels::LabelSet;

#[derive(Debug)]
pub enum BatcherCommand {
    SubmitBatch(Vec<Entry>),
    Flush(oneshot::Sender<BatchSet>),
    Shutdown,
}

#[derive(Clone)]
pub struct BatcherHandle {
    tx: mpsc::UnboundedSender<BatcherCommand>,
}

impl BatcherHandle {
    pub fn submit(&self, entry: Entry) -> Result<(), mpsc::error::SendError<BatcherCommand>> {
        self.tx.send(BatcherCommand::SubmitBatch(vec![entry]))
    }

    pub fn submit_batch(
        &self,
        entries: Vec<Entry>,
    ) -> Result<(), mpsc::error::SendError<BatcherCommand>> {
        self.tx.send(BatcherCommand::SubmitBatch(entries))
    }

    /// Swaps the current batch set for an empty one and returns the filled
    /// set. Entries submitted after the swap land in the fresh set.
    pub async fn flush(&self) -> Result<BatchSet, String> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(BatcherCommand::Flush(response_tx))
            .map_err(|e| format!("Failed to send flush command: {}", e))?;

        response_rx
            .await
            .map_err(|e| format!("Failed to receive flush response: {}", e))
    }

    pub fn shutdown(&self) -> Result<(), mpsc::error::SendError<BatcherCommand>> {
        self.tx.send(BatcherCommand::Shutdown)
    }
}

pub struct BatcherService {
    current: BatchSet,
    external_labels: LabelSet,
    batch_size: usize,
    size_signal: Arc<Notify>,
    rx: mpsc::UnboundedReceiver<BatcherCommand>,
}

impl BatcherService {
    /// Returns the service, the producer handle, and the notifier pinged when
    /// an append pushes the current set past `batch_size` bytes.
    pub fn new(external_labels: LabelSet, batch_size: usize) -> (Self, BatcherHandle, Arc<Notify>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let size_signal = Arc::new(Notify::new());

        let service = Self {
            current: BatchSet::new(),
            external_labels,
            batch_size,
            size_signal: Arc::clone(&size_signal),
            rx,
        };

        let handle = BatcherHandle { tx };

        (service, handle, size_signal)
    }

    pub async fn run(mut self) {
        debug!("Batcher service started");

        while let Some(command) = self.rx.recv().await {
            match command {
                BatcherCommand::SubmitBatch(entries) => {
                    let mut crossed = false;
                    for entry in entries {
                        let entry = Entry {
                            labels: entry.labels.merge(&self.external_labels),
                            timestamp_ns: entry.timestamp_ns,
                            line: entry.line,
                        };

                        let was_below = self.current.total_bytes() < self.batch_size;
                        self.current.append(entry);
                        if was_below && self.current.total_bytes() >= self.batch_size {
                            crossed = true;
                        }
                    }
                    if crossed {
                        self.size_signal.notify_one();
                    }
                }

                BatcherCommand::Flush(response_tx) => {
                    let filled = std::mem::replace(&mut self.current, BatchSet::new());
                    if response_tx.send(filled).is_err() {
                        error!("Failed to send flush response - receiver dropped");
                    }
                }

                BatcherCommand::Shutdown => {
                    debug!("Batcher service shutting down");
                    break;
                }
            }
        }

        debug!("Batcher service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::EMPTY_LABELS;
    use std::collections::HashSet;
    use tokio::time::{sleep, timeout, Duration};

    fn entry(job: &str, ts: i64, line: &str) -> Entry {
        Entry::new(LabelSet::from_pairs([("job", job)]), ts, line.to_string())
    }

    #[tokio::test]
    async fn test_basic_submit_and_flush() {
        let (service, handle, _signal) = BatcherService::new(EMPTY_LABELS, 1024 * 1024);
        let service_task = tokio::spawn(service.run());

        handle
            .submit_batch(vec![entry("a", 1, "one"), entry("b", 2, "two")])
            .expect("Failed to submit entries");

        let set = handle.flush().await.expect("Failed to flush");
        assert_eq!(set.stream_count(), 2);
        assert_eq!(set.entry_count(), 2);

        // The swap left a fresh empty set behind
        let set = handle.flush().await.expect("Failed to flush");
        assert!(set.is_empty());

        handle.shutdown().expect("Failed to shutdown");
        service_task.await.expect("Service task failed");
    }

    #[tokio::test]
    async fn test_external_labels_merged_on_ingestion() {
        let external = LabelSet::from_pairs([("env", "prod"), ("job", "default")]);
        let (service, handle, _signal) = BatcherService::new(external, 1024 * 1024);
        tokio::spawn(service.run());

        handle.submit(entry("varlog", 1, "line")).expect("submit failed");

        let set = handle.flush().await.expect("Failed to flush");
        let stream = set.streams().next().expect("stream missing");
        assert_eq!(stream.labels().get("env"), Some("prod"));
        // Entry labels win over external labels
        assert_eq!(stream.labels().get("job"), Some("varlog"));
    }

    #[tokio::test]
    async fn test_size_threshold_signals_immediately() {
        let (service, handle, signal) = BatcherService::new(EMPTY_LABELS, 100);
        tokio::spawn(service.run());

        handle
            .submit(entry("a", 1, &"x".repeat(60)))
            .expect("submit failed");

        // 60 bytes accumulated, still below the 100-byte threshold
        assert!(timeout(Duration::from_millis(50), signal.notified())
            .await
            .is_err());

        handle
            .submit(entry("a", 2, &"y".repeat(60)))
            .expect("submit failed");

        // 120 bytes crosses the threshold: signal fires without a timer tick
        timeout(Duration::from_millis(500), signal.notified())
            .await
            .expect("size signal did not fire");
    }

    #[tokio::test]
    async fn test_threshold_signal_fires_once_per_crossing() {
        let (service, handle, signal) = BatcherService::new(EMPTY_LABELS, 100);
        tokio::spawn(service.run());

        // Two more appends beyond the crossing must not queue extra permits
        for i in 0..4 {
            handle
                .submit(entry("a", i, &"x".repeat(60)))
                .expect("submit failed");
        }

        timeout(Duration::from_millis(500), signal.notified())
            .await
            .expect("size signal did not fire");
        assert!(timeout(Duration::from_millis(50), signal.notified())
            .await
            .is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_lose_nothing() {
        const PRODUCERS: usize = 10;
        const PER_PRODUCER: usize = 100;

        let (service, handle, _signal) = BatcherService::new(EMPTY_LABELS, usize::MAX);
        tokio::spawn(service.run());

        let mut producers = Vec::new();
        for p in 0..PRODUCERS {
            let handle = handle.clone();
            producers.push(tokio::spawn(async move {
                for i in 0..PER_PRODUCER {
                    handle
                        .submit(entry("stress", i as i64, &format!("p{p}-{i}")))
                        .expect("submit failed");
                    if i % 10 == 0 {
                        sleep(Duration::from_micros(50)).await;
                    }
                }
            }));
        }

        // Flush concurrently with the producers
        let mut seen: HashSet<String> = HashSet::new();
        for _ in 0..20 {
            sleep(Duration::from_millis(2)).await;
            let set = handle.flush().await.expect("Failed to flush");
            for stream in set.streams() {
                for (_, line) in stream.entries() {
                    assert!(seen.insert(line.clone()), "duplicate entry {line}");
                }
            }
        }

        for producer in producers {
            producer.await.expect("producer task failed");
        }

        let set = handle.flush().await.expect("Failed to flush");
        for stream in set.streams() {
            for (_, line) in stream.entries() {
                assert!(seen.insert(line.clone()), "duplicate entry {line}");
            }
        }

        assert_eq!(seen.len(), PRODUCERS * PER_PRODUCER);
    }
}
