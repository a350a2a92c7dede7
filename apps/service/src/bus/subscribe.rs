use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use tokio::sync::mpsc;

use super::wire;
use crate::config::BusConfig;
use crate::monitoring::types::HealthStatus;

/// How often the worker wakes up to observe a stop request
const RECV_POLL_MS: i32 = 250;

/// Consumes status events from the bus
///
/// The socket lives on a dedicated worker thread that decodes incoming
/// messages and forwards the pairs through a channel. A message that does
/// not decode is logged and dropped; the stream keeps going and ends only
/// after `stop`.
pub struct StatusSubscriber {
    rx: mpsc::UnboundedReceiver<(String, HealthStatus)>,
    stop: Arc<AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl StatusSubscriber {
    pub fn connect(config: &BusConfig) -> Result<Self> {
        let context = zmq::Context::new();
        let socket = context.socket(zmq::SUB)?;
        socket.set_rcvtimeo(RECV_POLL_MS)?;
        socket.set_linger(0)?;
        if let Some(curve) = &config.curve {
            super::apply_curve(&socket, curve)?;
        }
        socket.set_subscribe(config.topic.as_bytes())?;
        socket.connect(&config.endpoint)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let worker = std::thread::spawn(move || receive_loop(&socket, &tx, &stop_flag));

        Ok(Self { rx, stop, worker: Some(worker) })
    }

    /// Next successfully parsed status event; suspends until one arrives.
    /// Returns `None` only once the subscriber has been stopped.
    pub async fn next(&mut self) -> Option<(String, HealthStatus)> {
        self.rx.recv().await
    }

    /// End the stream; the worker exits at its next wake-up
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn receive_loop(
    socket: &zmq::Socket,
    tx: &mpsc::UnboundedSender<(String, HealthStatus)>,
    stop: &AtomicBool,
) {
    while !stop.load(Ordering::SeqCst) {
        let frames = match socket.recv_multipart(0) {
            Ok(frames) => frames,
            Err(zmq::Error::EAGAIN | zmq::Error::EINTR) => continue,
            Err(err) => {
                tracing::error!(error = %err, "receive failed, subscriber is stopping");
                break;
            }
        };

        // Events travel as [topic, payload]
        let Some(payload) = frames.last() else {
            tracing::error!("dropping status message without a payload frame");
            continue;
        };

        match wire::decode(payload) {
            Ok((url, status)) => {
                if tx.send((url, status)).is_err() {
                    break;
                }
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    "dropping malformed status message: {}",
                    String::from_utf8_lossy(payload)
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::monitoring::types::ProbeError;

    const TOPIC: &str = "vigil.health.status";

    fn send(publisher: &zmq::Socket, payload: &[u8]) {
        publisher.send(TOPIC.as_bytes(), zmq::SNDMORE).unwrap();
        publisher.send(payload, 0).unwrap();
    }

    #[tokio::test]
    async fn test_malformed_message_is_dropped_and_stream_continues() {
        let context = zmq::Context::new();
        let publisher = context.socket(zmq::PUB).unwrap();
        publisher.set_linger(0).unwrap();
        publisher.bind("tcp://127.0.0.1:*").unwrap();
        let endpoint = publisher.get_last_endpoint().unwrap().unwrap();

        let config =
            BusConfig { endpoint, topic: TOPIC.to_string(), curve: None };
        let mut subscriber = StatusSubscriber::connect(&config).unwrap();

        // The subscription settles asynchronously; send warmup events
        // until one comes through
        let warmup =
            wire::encode("http://warmup", &HealthStatus::healthy(Utc::now(), 200, 1.0)).unwrap();
        loop {
            send(&publisher, &warmup);
            match tokio::time::timeout(Duration::from_millis(200), subscriber.next()).await {
                Ok(Some((url, _))) => {
                    assert_eq!(url, "http://warmup");
                    break;
                }
                _ => continue,
            }
        }

        let status =
            HealthStatus::unhealthy(Utc::now(), 503, 5.0, ProbeError::http());
        send(&publisher, b"this is not a status message");
        send(&publisher, &wire::encode("http://real", &status).unwrap());

        // Late warmup duplicates may still be queued; the first event past
        // them must be the well-formed one, with the malformed one gone
        loop {
            let (url, received) =
                tokio::time::timeout(Duration::from_secs(5), subscriber.next())
                    .await
                    .expect("subscriber went silent")
                    .expect("stream ended unexpectedly");
            if url == "http://warmup" {
                continue;
            }
            assert_eq!(url, "http://real");
            assert_eq!(received, status);
            break;
        }

        subscriber.stop();
        assert_eq!(subscriber.next().await, None);
    }
}
