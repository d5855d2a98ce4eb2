// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory batch accumulation.
//!
//! A [`BatchSet`] groups entries into one [`StreamBatch`] per label set and
//! tracks total byte size so the flusher can trigger early when the size
//! threshold is crossed. Batches are memory-resident only; anything not yet
//! delivered is lost on crash.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use fnv::FnvBuildHasher;
use hashbrown::HashMap;

use crate::labels::LabelSet;

/// Nanoseconds since the Unix epoch, the timestamp granularity of entries.
pub fn unix_timestamp_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// A single log line with its stream identity. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub labels: LabelSet,
    pub timestamp_ns: i64,
    pub line: String,
}

impl Entry {
    pub fn new(labels: LabelSet, timestamp_ns: i64, line: String) -> Self {
        Self {
            labels,
            timestamp_ns,
            line,
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.line.len()
    }
}

/// Accumulated entries sharing one label set, in arrival order.
#[derive(Debug)]
pub struct StreamBatch {
    labels: LabelSet,
    entries: Vec<(i64, String)>,
    size_bytes: usize,
}

impl StreamBatch {
    fn new(labels: LabelSet) -> Self {
        Self {
            labels,
            entries: Vec::new(),
            size_bytes: 0,
        }
    }

    fn append(&mut self, timestamp_ns: i64, line: String) {
        self.size_bytes += line.len();
        self.entries.push((timestamp_ns, line));
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn entries(&self) -> &[(i64, String)] {
        &self.entries
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Timestamp of the oldest entry, used to report per-stream lag.
    pub fn oldest_timestamp_ns(&self) -> Option<i64> {
        self.entries.iter().map(|(ts, _)| *ts).min()
    }
}

/// All batches currently being filled, keyed by stream identity. Exactly one
/// set is "current" at any instant; the batcher service owns it until it is
/// swapped out for delivery.
#[derive(Debug)]
pub struct BatchSet {
    streams: HashMap<u64, StreamBatch, FnvBuildHasher>,
    total_bytes: usize,
    created_at: Instant,
}

impl Default for BatchSet {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchSet {
    pub fn new() -> Self {
        Self {
            streams: HashMap::default(),
            total_bytes: 0,
            created_at: Instant::now(),
        }
    }

    /// Appends an entry to the stream batch matching its labels, creating the
    /// batch on first sight of the label set.
    pub fn append(&mut self, entry: Entry) {
        let Entry {
            labels,
            timestamp_ns,
            line,
        } = entry;

        let key = labels.id();
        let stream = self
            .streams
            .entry(key)
            .or_insert_with(|| StreamBatch::new(labels));

        self.total_bytes += line.len();
        stream.append(timestamp_ns, line);
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn entry_count(&self) -> usize {
        self.streams.values().map(StreamBatch::entry_count).sum()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn streams(&self) -> impl Iterator<Item = &StreamBatch> {
        self.streams.values()
    }
}
