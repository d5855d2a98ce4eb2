// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-batch outcome events for an external metrics consumer.
//!
//! The engine only emits; nothing here feeds back into control flow. Events
//! are sent on an unbounded channel so the delivery loop never blocks on a
//! slow consumer, and a missing or dropped receiver is ignored.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::batch::BatchSet;
use crate::errors::DeliveryError;

pub type FlushEventSender = mpsc::UnboundedSender<FlushEvent>;

#[derive(Debug)]
pub enum FlushEvent {
    Delivered {
        streams: usize,
        entries: usize,
        bytes: usize,
        /// Total HTTP attempts, 1 when the first push succeeded.
        attempts: u32,
        lags: Vec<StreamLag>,
    },
    Dropped {
        streams: usize,
        entries: usize,
        error: DeliveryError,
    },
}

/// Age of the oldest entry in a delivered stream, keyed by the values of the
/// configured lag label names that the stream carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamLag {
    pub labels: Vec<(String, String)>,
    pub lag: Duration,
}

pub(crate) fn emit(tx: &Option<FlushEventSender>, event: FlushEvent) {
    if let Some(tx) = tx {
        let _ = tx.send(event);
    }
}

pub(crate) fn compute_lags(set: &BatchSet, lag_labels: &[String], now_ns: i64) -> Vec<StreamLag> {
    set.streams()
        .filter_map(|stream| {
            let oldest = stream.oldest_timestamp_ns()?;
            let lag = Duration::from_nanos(now_ns.saturating_sub(oldest).max(0) as u64);
            let labels = lag_labels
                .iter()
                .filter_map(|name| {
                    stream
                        .labels()
                        .get(name)
                        .map(|value| (name.clone(), value.to_string()))
                })
                .collect();
            Some(StreamLag { labels, lag })
        })
        .collect()
}
