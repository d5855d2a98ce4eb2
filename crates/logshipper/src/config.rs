// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use reqwest::Url;
use zstd::zstd_safe::CompressionLevel;

use crate::errors::CreationError;
use crate::labels::LabelSet;

// NOTE the agent packaging also carries defaults for these values, please
// update to match if you make changes here.
pub const BATCH_WAIT: Duration = Duration::from_secs(1);
pub const BATCH_SIZE: usize = 1024 * 1024;
pub const MIN_BACKOFF: Duration = Duration::from_millis(500);
pub const MAX_BACKOFF: Duration = Duration::from_secs(5 * 60);
pub const MAX_RETRIES: u32 = 10;
pub const TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_COMPRESSION_LEVEL: CompressionLevel = 6;

/// Bounds and budget for retrying a failed delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Floor for the delay between attempts.
    pub min_backoff: Duration,
    /// Ceiling for the delay between attempts.
    pub max_backoff: Duration,
    /// Retries permitted per batch before it is dropped.
    pub max_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_backoff: MIN_BACKOFF,
            max_backoff: MAX_BACKOFF,
            max_retries: MAX_RETRIES,
        }
    }
}

/// The tenant to route batches to. Absent means single-tenant mode and no
/// tenant header on push requests.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Into)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Configuration for the batching-and-delivery engine. Immutable once built.
#[derive(Debug, Clone)]
pub struct Config {
    /// Push endpoint, validated at startup.
    pub endpoint: Url,
    /// Max entry latency before a non-empty batch is sent.
    pub batch_wait: Duration,
    /// Byte threshold triggering an early flush.
    pub batch_size: usize,
    pub backoff: BackoffConfig,
    /// Labels folded into every entry at ingestion. Entry labels win.
    pub external_labels: LabelSet,
    /// Per-attempt network deadline, independent of the backoff timer.
    pub timeout: Duration,
    pub tenant_id: Option<TenantId>,
    pub https_proxy: Option<String>,
    pub compression_level: CompressionLevel,
    /// Label names reported alongside per-stream lag, observability only.
    pub stream_lag_labels: Vec<String>,
}

impl Config {
    /// Builds a configuration with every option at its default. This is the
    /// single defaulting step; callers override individual fields afterwards
    /// regardless of where their values came from.
    pub fn new(endpoint: &str) -> Result<Self, CreationError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| CreationError::InvalidEndpoint(format!("{endpoint}: {e}")))?;

        Ok(Self {
            endpoint,
            batch_wait: BATCH_WAIT,
            batch_size: BATCH_SIZE,
            backoff: BackoffConfig::default(),
            external_labels: LabelSet::new(),
            timeout: TIMEOUT,
            tenant_id: None,
            https_proxy: None,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            stream_lag_labels: vec!["filename".to_string()],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new("http://localhost:3100/api/v1/push").expect("valid endpoint");
        assert_eq!(config.batch_wait, Duration::from_secs(1));
        assert_eq!(config.batch_size, 1024 * 1024);
        assert_eq!(config.backoff.min_backoff, Duration::from_millis(500));
        assert_eq!(config.backoff.max_backoff, Duration::from_secs(300));
        assert_eq!(config.backoff.max_retries, 10);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(config.tenant_id.is_none());
        assert!(config.external_labels.is_empty());
        assert_eq!(config.stream_lag_labels, vec!["filename".to_string()]);
    }

    #[test]
    fn test_invalid_endpoint_fails_at_startup() {
        let err = Config::new("not a url").expect_err("should fail");
        assert!(matches!(err, CreationError::InvalidEndpoint(_)));
    }

    #[test]
    fn test_tenant_id_rejects_empty() {
        assert!(TenantId::new("").is_none());
        assert!(TenantId::new("   ").is_none());
        assert_eq!(
            TenantId::new(" tenant-a ").map(|t| t.as_str().to_string()),
            Some("tenant-a".to_string())
        );
    }
}
