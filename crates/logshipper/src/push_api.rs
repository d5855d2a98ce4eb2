// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP push client for the log-aggregation endpoint.
//!
//! Serializes a [`BatchSet`](crate::batch::BatchSet) into the JSON push body,
//! compresses it, and issues one POST per call. Classification of the response
//! lives here; retry decisions belong to the flusher.

use std::time::Duration;

use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use tracing::debug;
use zstd::zstd_safe::CompressionLevel;

use crate::batch::BatchSet;
use crate::config::TenantId;
use crate::errors::{CreationError, ShipError};
use crate::labels::LabelSet;

/// Header carrying the tenant ID in multi-tenant mode.
pub const TENANT_ID_HEADER: &str = "X-Scope-OrgID";

/// Wire model of one push request body.
#[derive(Debug, Serialize)]
pub struct PushRequest {
    streams: Vec<PushStream>,
}

#[derive(Debug, Serialize)]
struct PushStream {
    stream: LabelSet,
    // [timestamp_ns as string, line] pairs in append order
    values: Vec<(String, String)>,
}

impl PushRequest {
    pub fn from_batch_set(set: &BatchSet) -> Self {
        let mut streams: Vec<PushStream> = set
            .streams()
            .map(|batch| PushStream {
                stream: batch.labels().clone(),
                values: batch
                    .entries()
                    .iter()
                    .map(|(ts, line)| (ts.to_string(), line.clone()))
                    .collect(),
            })
            .collect();

        // Map iteration order is arbitrary; keep the body stable across runs.
        streams.sort_by(|a, b| a.stream.to_string().cmp(&b.stream.to_string()));

        Self { streams }
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }
}

#[derive(Clone)]
pub struct PushApi {
    client: reqwest::Client,
    endpoint: Url,
    tenant_id: Option<TenantId>,
    timeout: Duration,
    compression_level: CompressionLevel,
}

impl PushApi {
    pub fn new(
        endpoint: Url,
        tenant_id: Option<TenantId>,
        https_proxy: Option<String>,
        timeout: Duration,
        compression_level: CompressionLevel,
    ) -> Result<Self, CreationError> {
        let mut builder = reqwest::Client::builder().use_rustls_tls().timeout(timeout);
        if let Some(proxy) = https_proxy {
            builder = builder
                .proxy(reqwest::Proxy::https(&proxy).map_err(|e| {
                    CreationError::InvalidProxy(format!("{proxy}: {e}"))
                })?);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            endpoint,
            tenant_id,
            timeout,
            compression_level,
        })
    }

    /// Serializes and compresses a push request into the request body shipped
    /// on every attempt for the same batch.
    pub fn encode(&self, request: &PushRequest) -> Result<Vec<u8>, ShipError> {
        let json = serde_json::to_vec(request).map_err(|e| ShipError::Payload(e.to_string()))?;
        zstd::encode_all(json.as_slice(), self.compression_level)
            .map_err(|e| ShipError::Payload(e.to_string()))
    }

    /// Issues one POST, bounded by the request timeout. Never retries.
    pub async fn push(&self, body: Vec<u8>) -> Result<(), ShipError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "zstd")
            .timeout(self.timeout)
            .body(body);

        if let Some(tenant_id) = &self.tenant_id {
            request = request.header(TENANT_ID_HEADER, tenant_id.as_str());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ShipError::Timeout
            } else {
                ShipError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            debug!("Pushed batch, status {status}");
            return Ok(());
        }

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(ShipError::Overload { status });
        }

        let body = response.text().await.unwrap_or_default();
        Err(ShipError::Rejected { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Entry;

    #[test]
    fn test_push_request_shape() {
        let mut set = BatchSet::new();
        let labels = LabelSet::from_pairs([("job", "varlog")]);
        set.append(Entry::new(labels.clone(), 1_700_000_000_000_000_001, "first".to_string()));
        set.append(Entry::new(labels, 1_700_000_000_000_000_002, "second".to_string()));

        let request = PushRequest::from_batch_set(&set);
        assert_eq!(request.stream_count(), 1);

        let json = serde_json::to_value(&request).expect("serialize failed");
        assert_eq!(
            json,
            serde_json::json!({
                "streams": [{
                    "stream": {"job": "varlog"},
                    "values": [
                        ["1700000000000000001", "first"],
                        ["1700000000000000002", "second"],
                    ],
                }]
            })
        );
    }

    #[test]
    fn test_push_request_orders_streams() {
        let mut set = BatchSet::new();
        set.append(Entry::new(
            LabelSet::from_pairs([("job", "b")]),
            1,
            "x".to_string(),
        ));
        set.append(Entry::new(
            LabelSet::from_pairs([("job", "a")]),
            2,
            "y".to_string(),
        ));

        let request = PushRequest::from_batch_set(&set);
        let json = serde_json::to_value(&request).expect("serialize failed");
        let jobs: Vec<&str> = json["streams"]
            .as_array()
            .expect("streams array")
            .iter()
            .map(|s| s["stream"]["job"].as_str().expect("job label"))
            .collect();
        assert_eq!(jobs, vec!["a", "b"]);
    }
}
