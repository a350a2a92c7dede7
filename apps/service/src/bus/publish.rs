use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use super::wire;
use crate::config::BusConfig;
use crate::monitoring::types::HealthStatus;
use crate::monitoring::StatusHandler;

/// How long a send may sit in the outgoing queue before the message is
/// declared lost
const SEND_TIMEOUT_MS: i32 = 5000;
const LINGER_MS: i32 = 1000;

#[derive(Debug, Error)]
enum PublishError {
    #[error("send timed out: {0}")]
    Timeout(zmq::Error),
    #[error("send failed: {0}")]
    Send(zmq::Error),
}

/// Publishes status events on the bus, best effort
///
/// The socket lives on a dedicated worker thread; `publish` only encodes
/// and enqueues. A failed or timed-out send is logged together with the
/// lost payload and never reaches the caller. There is no retry.
pub struct StatusPublisher {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl StatusPublisher {
    pub fn connect(config: &BusConfig) -> Result<Self> {
        let context = zmq::Context::new();
        let socket = context.socket(zmq::PUB)?;
        socket.set_sndtimeo(SEND_TIMEOUT_MS)?;
        socket.set_linger(LINGER_MS)?;
        if let Some(curve) = &config.curve {
            super::apply_curve(&socket, curve)?;
        }
        socket.connect(&config.endpoint)?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let topic = config.topic.clone();
        std::thread::spawn(move || {
            while let Some(payload) = rx.blocking_recv() {
                match send_frames(&socket, &topic, &payload) {
                    Ok(()) => tracing::debug!("published status message"),
                    Err(PublishError::Timeout(err)) => tracing::error!(
                        error = %err,
                        "timed out publishing status, message lost: {}",
                        String::from_utf8_lossy(&payload)
                    ),
                    Err(PublishError::Send(err)) => tracing::error!(
                        error = %err,
                        "failed publishing status, message lost: {}",
                        String::from_utf8_lossy(&payload)
                    ),
                }
            }
        });

        Ok(Self { tx })
    }

    /// Serialize one status event and hand it to the bus
    pub fn publish(&self, url: &str, status: &HealthStatus) {
        let payload = match wire::encode(url, status) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(url, error = %err, "can't encode status message, nothing published");
                return;
            }
        };

        if self.tx.send(payload).is_err() {
            tracing::warn!(url, "publisher worker is gone, message lost");
        }
    }
}

#[async_trait]
impl StatusHandler for StatusPublisher {
    async fn handle(&self, url: &str, status: HealthStatus) -> Result<()> {
        self.publish(url, &status);
        Ok(())
    }
}

fn send_frames(socket: &zmq::Socket, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
    socket.send(topic.as_bytes(), zmq::SNDMORE).map_err(classify_send)?;
    socket.send(payload, 0).map_err(classify_send)
}

fn classify_send(err: zmq::Error) -> PublishError {
    match err {
        zmq::Error::EAGAIN => PublishError::Timeout(err),
        _ => PublishError::Send(err),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::monitoring::types::ProbeError;

    fn bus_config(endpoint: String) -> BusConfig {
        BusConfig { endpoint, topic: "vigil.health.status".to_string(), curve: None }
    }

    #[tokio::test]
    async fn test_published_frames_carry_topic_and_wire_message() {
        let context = zmq::Context::new();
        let collector = context.socket(zmq::SUB).unwrap();
        collector.set_subscribe(b"vigil.health.status").unwrap();
        collector.set_rcvtimeo(200).unwrap();
        collector.set_linger(0).unwrap();
        collector.bind("tcp://127.0.0.1:*").unwrap();
        let endpoint = collector.get_last_endpoint().unwrap().unwrap();

        let publisher = StatusPublisher::connect(&bus_config(endpoint)).unwrap();
        let status = HealthStatus::unhealthy(Utc::now(), 503, 8.25, ProbeError::http());

        // The subscription settles asynchronously; keep publishing until
        // one event lands
        let mut frames = None;
        for _ in 0..50 {
            publisher.publish("https://example.com", &status);
            match collector.recv_multipart(0) {
                Ok(received) => {
                    frames = Some(received);
                    break;
                }
                Err(zmq::Error::EAGAIN) => continue,
                Err(err) => panic!("recv failed: {err}"),
            }
        }

        let frames = frames.expect("no message arrived");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], b"vigil.health.status");
        let (url, decoded) = wire::decode(&frames[1]).unwrap();
        assert_eq!(url, "https://example.com");
        assert_eq!(decoded, status);
    }

    #[tokio::test]
    async fn test_publish_failure_never_reaches_the_caller() {
        // Nothing listens here; sends queue up and are eventually dropped
        let publisher = StatusPublisher::connect(&bus_config("tcp://127.0.0.1:9".into())).unwrap();
        let status = HealthStatus::healthy(Utc::now(), 200, 1.0);

        publisher.publish("https://example.com", &status);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
