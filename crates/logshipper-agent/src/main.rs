// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, sync::Arc, time::Duration};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use logshipper::{
    batch::{unix_timestamp_ns, Entry},
    batcher_service::BatcherService,
    config::{Config, TenantId},
    flusher::{Flusher, FlusherConfig},
    labels::LabelSet,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const DEFAULT_SOURCE_LABELS: &str = "job:logshipper-agent";

#[tokio::main]
pub async fn main() {
    let log_level = env::var("SHIP_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let endpoint = match env::var("SHIP_ENDPOINT") {
        Ok(endpoint) => endpoint,
        Err(_) => {
            error!("SHIP_ENDPOINT environment variable is not set. Shutting down agent.");
            return;
        }
    };

    let mut config = match Config::new(&endpoint) {
        Ok(config) => config,
        Err(e) => {
            error!("Error creating config on agent startup: {e}");
            return;
        }
    };

    if let Ok(tenant_id) = env::var("SHIP_TENANT_ID") {
        config.tenant_id = TenantId::new(&tenant_id);
    }
    if let Ok(raw) = env::var("SHIP_EXTERNAL_LABELS") {
        config.external_labels = LabelSet::from_env_string(&raw);
    }
    if let Some(batch_wait_ms) = env::var("SHIP_BATCH_WAIT_MS")
        .ok()
        .and_then(|val| val.parse::<u64>().ok())
    {
        config.batch_wait = Duration::from_millis(batch_wait_ms);
    }
    if let Some(batch_size) = env::var("SHIP_BATCH_SIZE_BYTES")
        .ok()
        .and_then(|val| val.parse::<usize>().ok())
    {
        config.batch_size = batch_size;
    }
    if let Some(max_retries) = env::var("SHIP_MAX_RETRIES")
        .ok()
        .and_then(|val| val.parse::<u32>().ok())
    {
        config.backoff.max_retries = max_retries;
    }
    config.https_proxy = env::var("SHIP_PROXY_HTTPS")
        .or_else(|_| env::var("HTTPS_PROXY"))
        .ok();

    // Labels attached to every line read from stdin. Entries with an empty
    // label set are not valid streams, so a default job label always applies.
    let source_labels = {
        let raw = env::var("SHIP_SOURCE_LABELS").unwrap_or_default();
        let labels = LabelSet::from_env_string(&raw);
        if labels.is_empty() {
            LabelSet::from_env_string(DEFAULT_SOURCE_LABELS)
        } else {
            labels
        }
    };

    info!("Starting log shipper agent, endpoint {}", config.endpoint);

    let (service, handle, size_signal) =
        BatcherService::new(config.external_labels.clone(), config.batch_size);
    tokio::spawn(service.run());

    let flusher = match Flusher::new(FlusherConfig {
        handle: handle.clone(),
        size_signal,
        config: Arc::new(config),
        events: None,
    }) {
        Ok(flusher) => flusher,
        Err(e) => {
            error!("Error creating flusher on agent startup: {e}");
            return;
        }
    };

    let cancel_token = CancellationToken::new();
    let flusher_task = tokio::spawn(flusher.run(cancel_token.clone()));

    let reader_handle = handle.clone();
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let entry = Entry::new(source_labels.clone(), unix_timestamp_ns(), line);
                    if reader_handle.submit(entry).is_err() {
                        error!("Batcher unavailable, stopping stdin reader");
                        break;
                    }
                }
                Ok(None) => {
                    debug!("stdin closed");
                    break;
                }
                Err(e) => {
                    error!("Error reading stdin: {e}");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received shutdown signal"),
        _ = reader => info!("Log source exhausted"),
    }

    // Let in-flight work finish and force one best-effort flush of anything
    // still accumulated, bounded by the grace period.
    cancel_token.cancel();
    if tokio::time::timeout(SHUTDOWN_GRACE, flusher_task).await.is_err() {
        error!("Flusher did not stop within the shutdown grace period");
    }
    let _ = handle.shutdown();
}
