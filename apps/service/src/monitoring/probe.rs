use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use regex::Regex;

use super::types::{HealthStatus, ProbeError};

/// Executes individual health probes over HTTP
///
/// One `Prober` is shared by every check loop. Idle connections are never
/// kept around, so each probe dials a fresh connection and its timing is
/// not skewed by reuse.
pub struct Prober {
    client: reqwest::Client,
}

impl Prober {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()?;

        Ok(Self { client })
    }

    /// Probe `url` once and classify the outcome
    ///
    /// Every failure mode is encoded in the returned status; this never
    /// errors. A non-2xx response wins over pattern validation, and
    /// patterns are only tested against a 2xx body.
    pub async fn probe(&self, url: &str, patterns: &[Regex]) -> HealthStatus {
        let timestamp = Utc::now();
        let started = Instant::now();

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(err) => {
                return HealthStatus::unhealthy(timestamp, 0, 0.0, classify_transport(&err));
            }
        };

        let status_code = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                return HealthStatus::unhealthy(timestamp, 0, 0.0, classify_transport(&err));
            }
        };
        let response_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        if !(200..300).contains(&status_code) {
            return HealthStatus::unhealthy(
                timestamp,
                status_code,
                response_time_ms,
                ProbeError::http(),
            );
        }

        let misses: Vec<String> = patterns
            .iter()
            .filter(|pattern| !pattern.is_match(&body))
            .map(|pattern| format!("pattern '{}' not found in response body", pattern.as_str()))
            .collect();

        if misses.is_empty() {
            HealthStatus::healthy(timestamp, status_code, response_time_ms)
        } else {
            HealthStatus::unhealthy(
                timestamp,
                status_code,
                response_time_ms,
                ProbeError::regex(misses),
            )
        }
    }
}

fn classify_transport(err: &reqwest::Error) -> ProbeError {
    if err.is_timeout() {
        ProbeError::timeout(err.to_string())
    } else {
        ProbeError::unknown(err.to_string())
    }
}
