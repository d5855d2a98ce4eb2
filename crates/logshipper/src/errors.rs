// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// Errors raised while building the shipper at startup. These fail fast and
/// are never produced per batch.
#[derive(Debug, thiserror::Error)]
pub enum CreationError {
    #[error("invalid endpoint URL: {0}")]
    InvalidEndpoint(String),

    #[error("invalid proxy configuration: {0}")]
    InvalidProxy(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Classification of a single push attempt.
#[derive(Debug, thiserror::Error)]
pub enum ShipError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("remote overloaded ({status})")]
    Overload { status: StatusCode },

    #[error("remote rejected batch ({status}): {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("failed to prepare payload: {0}")]
    Payload(String),
}

impl ShipError {
    /// Transient failures are retried with backoff. A rejection or a payload
    /// that cannot be built will fail the same way on every attempt, so the
    /// batch is dropped without consuming retry budget.
    pub fn is_retryable(&self) -> bool {
        match self {
            ShipError::Network(_) | ShipError::Timeout | ShipError::Overload { .. } => true,
            ShipError::Rejected { .. } | ShipError::Payload(_) => false,
        }
    }
}

/// Terminal outcome of a batch that could not be delivered.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("batch rejected: {0}")]
    Rejected(#[source] ShipError),

    #[error("retry budget exhausted after {attempts} retries: {last}")]
    RetryBudgetExhausted {
        attempts: u32,
        #[source]
        last: ShipError,
    },

    #[error("abandoned during shutdown: {0}")]
    Abandoned(#[source] ShipError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ship_error_classification() {
        assert!(ShipError::Network("connection refused".into()).is_retryable());
        assert!(ShipError::Timeout.is_retryable());
        assert!(ShipError::Overload {
            status: StatusCode::TOO_MANY_REQUESTS
        }
        .is_retryable());
        assert!(!ShipError::Rejected {
            status: StatusCode::BAD_REQUEST,
            body: "stream has no labels".into()
        }
        .is_retryable());
        assert!(!ShipError::Payload("serialization failed".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let error = CreationError::InvalidEndpoint("not a url".to_string());
        assert_eq!(error.to_string(), "invalid endpoint URL: not a url");

        let error = DeliveryError::RetryBudgetExhausted {
            attempts: 10,
            last: ShipError::Timeout,
        };
        assert_eq!(
            error.to_string(),
            "retry budget exhausted after 10 retries: request timed out"
        );
    }
}
