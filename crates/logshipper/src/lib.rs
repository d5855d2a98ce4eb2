// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching-and-delivery engine for shipping log entries to a remote
//! log-aggregation endpoint.
//!
//! Producers submit `(labels, timestamp, line)` entries through a
//! [`batcher_service::BatcherHandle`]; the [`flusher::Flusher`] closes batches
//! on a time window or a byte threshold and delivers them over HTTP with
//! bounded, backoff-governed retries. Delivery is at-least-once under normal
//! retry; batches are memory-resident and lost on crash.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod batch;
pub mod batcher_service;
pub mod config;
pub mod errors;
pub mod events;
pub mod flusher;
pub mod labels;
pub mod push_api;
pub mod retry;
