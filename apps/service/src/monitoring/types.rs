use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Failure category of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Unknown,
    Http,
    Regex,
    Timeout,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Unknown => write!(f, "unknown"),
            ErrorKind::Http => write!(f, "http"),
            ErrorKind::Regex => write!(f, "regex"),
            ErrorKind::Timeout => write!(f, "timeout"),
        }
    }
}

/// Structured description of why a probe was unhealthy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeError {
    pub kind: ErrorKind,
    pub details: Vec<String>,
}

impl ProbeError {
    /// Non-2xx response; the status code on the enclosing status is the detail
    pub fn http() -> Self {
        Self { kind: ErrorKind::Http, details: Vec::new() }
    }

    /// Request exceeded the probe timeout
    pub fn timeout(detail: String) -> Self {
        Self { kind: ErrorKind::Timeout, details: vec![detail] }
    }

    /// Transport failure other than a timeout (DNS, connection refused, ...)
    pub fn unknown(detail: String) -> Self {
        Self { kind: ErrorKind::Unknown, details: vec![detail] }
    }

    /// One detail per pattern that did not match the response body,
    /// in the order the patterns were configured
    pub fn regex(details: Vec<String>) -> Self {
        Self { kind: ErrorKind::Regex, details }
    }
}

/// Outcome of a single probe against one target
///
/// `status_code` and `response_time_ms` are zero when no HTTP response
/// was obtained. `timestamp` is captured when the probe is initiated,
/// before the request goes out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub timestamp: DateTime<Utc>,
    pub healthy: bool,
    pub response_time_ms: f64,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProbeError>,
}

impl HealthStatus {
    pub fn healthy(timestamp: DateTime<Utc>, status_code: u16, response_time_ms: f64) -> Self {
        Self { timestamp, healthy: true, response_time_ms, status_code, error: None }
    }

    pub fn unhealthy(
        timestamp: DateTime<Utc>,
        status_code: u16,
        response_time_ms: f64,
        error: ProbeError,
    ) -> Self {
        Self { timestamp, healthy: false, response_time_ms, status_code, error: Some(error) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_healthy_carries_no_error() {
        let status = HealthStatus::healthy(Utc::now(), 200, 12.5);
        assert!(status.healthy);
        assert!(status.error.is_none());
        assert_eq!(status.status_code, 200);
    }

    #[test]
    fn test_unhealthy_always_carries_error() {
        let status =
            HealthStatus::unhealthy(Utc::now(), 0, 0.0, ProbeError::timeout("timed out".into()));
        assert!(!status.healthy);
        let error = status.error.expect("unhealthy status must carry an error");
        assert_eq!(error.kind, ErrorKind::Timeout);
        assert_eq!(error.details.len(), 1);
    }

    #[test]
    fn test_error_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ErrorKind::Http).unwrap(), "\"http\"");
        assert_eq!(serde_json::to_string(&ErrorKind::Timeout).unwrap(), "\"timeout\"");
        assert_eq!(ErrorKind::Regex.to_string(), "regex");
    }
}
