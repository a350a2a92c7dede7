use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitoring::types::HealthStatus;

/// One status event exactly as it travels on the bus
///
/// The `error` object is present only for unhealthy statuses; a missing
/// key deserializes to `None`. A message missing `url` or any of the
/// required status fields, or carrying them with the wrong type, fails
/// to decode as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub url: String,
    pub status: HealthStatus,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("can't parse status message: {0}")]
    Parse(#[from] serde_json::Error),
}

pub fn encode(url: &str, status: &HealthStatus) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&WireMessage { url: url.to_string(), status: status.clone() })
}

pub fn decode(payload: &[u8]) -> Result<(String, HealthStatus), DecodeError> {
    let message: WireMessage = serde_json::from_slice(payload)?;
    Ok((message.url, message.status))
}
