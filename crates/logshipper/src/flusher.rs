// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The delivery loop: one coordinating task owning the flush timer, the
//! size-threshold signal, and the retry schedule.
//!
//! Exactly one delivery is in flight at a time, so batches reach the endpoint
//! in the order they were flushed. An empty swap is a silent no-op; nothing is
//! sent over the network for a quiet window.

use std::sync::Arc;

use tokio::sync::Notify;
use tokio::time::{interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::batch::{unix_timestamp_ns, BatchSet};
use crate::batcher_service::BatcherHandle;
use crate::config::Config;
use crate::errors::{CreationError, DeliveryError};
use crate::events::{compute_lags, emit, FlushEvent, FlushEventSender};
use crate::push_api::{PushApi, PushRequest};
use crate::retry::RetryPolicy;

pub struct FlusherConfig {
    pub handle: BatcherHandle,
    pub size_signal: Arc<Notify>,
    pub config: Arc<Config>,
    /// Optional sink for per-batch outcome events.
    pub events: Option<FlushEventSender>,
}

pub struct Flusher {
    handle: BatcherHandle,
    size_signal: Arc<Notify>,
    push_api: PushApi,
    retry_policy: RetryPolicy,
    config: Arc<Config>,
    events: Option<FlushEventSender>,
}

impl Flusher {
    pub fn new(config: FlusherConfig) -> Result<Self, CreationError> {
        let push_api = PushApi::new(
            config.config.endpoint.clone(),
            config.config.tenant_id.clone(),
            config.config.https_proxy.clone(),
            config.config.timeout,
            config.config.compression_level,
        )?;

        Ok(Self {
            handle: config.handle,
            size_signal: config.size_signal,
            push_api,
            retry_policy: RetryPolicy::new(&config.config.backoff),
            config: config.config,
            events: config.events,
        })
    }

    /// Runs until cancelled. On cancellation, anything still accumulated gets
    /// one best-effort push before the task exits.
    pub async fn run(mut self, cancel_token: CancellationToken) {
        debug!("Flusher started");

        let mut flush_interval = interval(self.config.batch_wait);
        flush_interval.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                _ = flush_interval.tick() => {}
                _ = self.size_signal.notified() => {}
                _ = cancel_token.cancelled() => break,
            }

            let set = match self.handle.flush().await {
                Ok(set) => set,
                Err(e) => {
                    error!("Batcher unavailable, stopping flusher: {e}");
                    return;
                }
            };

            if !set.is_empty() {
                self.dispatch(set, &cancel_token).await;
            }

            // The wait window is measured from the last flush, however it was
            // triggered.
            flush_interval.reset();
        }

        self.final_flush().await;
        debug!("Flusher stopped");
    }

    async fn dispatch(&mut self, set: BatchSet, cancel_token: &CancellationToken) {
        let streams = set.stream_count();
        let entries = set.entry_count();
        let bytes = set.total_bytes();

        match self.deliver(&set, cancel_token).await {
            Ok(attempts) => {
                debug!("Delivered {entries} entries across {streams} streams ({bytes} bytes)");
                let lags = compute_lags(&set, &self.config.stream_lag_labels, unix_timestamp_ns());
                emit(
                    &self.events,
                    FlushEvent::Delivered {
                        streams,
                        entries,
                        bytes,
                        attempts,
                        lags,
                    },
                );
            }
            Err(err) => {
                error!("Dropping batch of {entries} entries across {streams} streams: {err}");
                for stream in set.streams() {
                    error!(
                        "Dropped stream {} ({} entries)",
                        stream.labels(),
                        stream.entry_count()
                    );
                }
                emit(
                    &self.events,
                    FlushEvent::Dropped {
                        streams,
                        entries,
                        error: err,
                    },
                );
            }
        }
    }

    /// Attempts delivery until success, a non-retryable failure, or an
    /// exhausted retry budget. Returns the number of HTTP attempts made.
    /// Cancellation during a backoff wait abandons the batch so shutdown is
    /// never held up by a long delay.
    async fn deliver(
        &self,
        set: &BatchSet,
        cancel_token: &CancellationToken,
    ) -> Result<u32, DeliveryError> {
        let request = PushRequest::from_batch_set(set);
        let body = self
            .push_api
            .encode(&request)
            .map_err(DeliveryError::Rejected)?;

        let mut retry = self.retry_policy.state();
        loop {
            match self.push_api.push(body.clone()).await {
                Ok(()) => return Ok(retry.attempts() + 1),
                Err(err) if err.is_retryable() => match retry.next_delay() {
                    Some(delay) => {
                        warn!(
                            "Push attempt {} failed, retrying in {:?}: {err}",
                            retry.attempts(),
                            delay
                        );
                        tokio::select! {
                            _ = sleep(delay) => {}
                            _ = cancel_token.cancelled() => {
                                return Err(DeliveryError::Abandoned(err));
                            }
                        }
                    }
                    None => {
                        return Err(DeliveryError::RetryBudgetExhausted {
                            attempts: retry.attempts(),
                            last: err,
                        })
                    }
                },
                Err(err) => return Err(DeliveryError::Rejected(err)),
            }
        }
    }

    /// Single-attempt push of whatever is still accumulated. Shutdown is
    /// best-effort; there is no backoff loop here.
    async fn final_flush(&mut self) {
        let set = match self.handle.flush().await {
            Ok(set) => set,
            Err(_) => return,
        };
        if set.is_empty() {
            return;
        }

        let streams = set.stream_count();
        let entries = set.entry_count();
        let bytes = set.total_bytes();
        debug!("Final flush of {entries} entries across {streams} streams");

        let request = PushRequest::from_batch_set(&set);
        let body = match self.push_api.encode(&request) {
            Ok(body) => body,
            Err(err) => {
                error!("Dropping final batch: {err}");
                emit(
                    &self.events,
                    FlushEvent::Dropped {
                        streams,
                        entries,
                        error: DeliveryError::Rejected(err),
                    },
                );
                return;
            }
        };

        match self.push_api.push(body).await {
            Ok(()) => {
                let lags = compute_lags(&set, &self.config.stream_lag_labels, unix_timestamp_ns());
                emit(
                    &self.events,
                    FlushEvent::Delivered {
                        streams,
                        entries,
                        bytes,
                        attempts: 1,
                        lags,
                    },
                );
            }
            Err(err) => {
                warn!("Final flush failed, dropping {entries} entries: {err}");
                emit(
                    &self.events,
                    FlushEvent::Dropped {
                        streams,
                        entries,
                        error: DeliveryError::Abandoned(err),
                    },
                );
            }
        }
    }
}
