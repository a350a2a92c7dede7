use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::probe::Prober;
use super::types::HealthStatus;
use super::validation::{self, ValidationError};

/// Static description of one monitored endpoint
#[derive(Debug, Clone)]
pub struct CheckDefinition {
    pub url: String,
    pub period: Duration,
    pub patterns: Vec<Regex>,
}

/// Sink for completed probes
///
/// Invoked once per probe with the probed url and its outcome. An error
/// returned here ends the loop for that check only; a handler that must
/// keep its check alive has to contain its own failures.
#[async_trait]
pub trait StatusHandler: Send + Sync {
    async fn handle(&self, url: &str, status: HealthStatus) -> Result<()>;
}

/// Runs one independent periodic probe loop per configured check
pub struct HealthScheduler {
    checks: Vec<CheckDefinition>,
    prober: Arc<Prober>,
    handler: Arc<dyn StatusHandler>,
    stop_tx: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for HealthScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthScheduler")
            .field("checks", &self.checks)
            .field("stop_tx", &self.stop_tx)
            .field("tasks", &self.tasks)
            .finish_non_exhaustive()
    }
}

impl HealthScheduler {
    /// Validates the checks up front; no loop starts before `start`
    pub fn new(
        checks: Vec<CheckDefinition>,
        prober: Arc<Prober>,
        handler: Arc<dyn StatusHandler>,
    ) -> Result<Self, ValidationError> {
        validation::validate_checks(&checks)?;
        Ok(Self { checks, prober, handler, stop_tx: None, tasks: Vec::new() })
    }

    /// Spawn one probe loop per check; ignored when already running
    pub fn start(&mut self) {
        if self.stop_tx.is_some() {
            return;
        }

        let (stop_tx, _) = watch::channel(false);
        for check in &self.checks {
            self.tasks.push(tokio::spawn(probe_loop(
                check.clone(),
                self.prober.clone(),
                self.handler.clone(),
                stop_tx.subscribe(),
            )));
        }
        self.stop_tx = Some(stop_tx);
    }

    /// Signal every loop to end after its current iteration; ignored when
    /// already stopped. A stopped scheduler can be started again.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
            self.tasks.clear();
        }
    }
}

/// A full period elapses before the first probe. The stop signal is read at
/// natural wake-ups only: before each wait and again before each probe.
async fn probe_loop(
    check: CheckDefinition,
    prober: Arc<Prober>,
    handler: Arc<dyn StatusHandler>,
    stop_rx: watch::Receiver<bool>,
) {
    while !*stop_rx.borrow() {
        tokio::time::sleep(check.period).await;
        if *stop_rx.borrow() {
            break;
        }

        let status = prober.probe(&check.url, &check.patterns).await;
        if let Err(err) = handler.handle(&check.url, status).await {
            tracing::error!(
                url = %check.url,
                error = %err,
                "status handler failed, ending checks for this target"
            );
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use tokio::sync::Mutex;

    use super::*;

    struct CollectingHandler {
        seen: Mutex<Vec<(String, HealthStatus)>>,
    }

    impl CollectingHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self { seen: Mutex::new(Vec::new()) })
        }

        async fn urls(&self) -> Vec<String> {
            self.seen.lock().await.iter().map(|(url, _)| url.clone()).collect()
        }
    }

    #[async_trait]
    impl StatusHandler for CollectingHandler {
        async fn handle(&self, url: &str, status: HealthStatus) -> Result<()> {
            self.seen.lock().await.push((url.to_string(), status));
            Ok(())
        }
    }

    struct FailingHandler {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl StatusHandler for FailingHandler {
        async fn handle(&self, _url: &str, _status: HealthStatus) -> Result<()> {
            *self.calls.lock().await += 1;
            Err(anyhow!("sink unavailable"))
        }
    }

    fn prober() -> Arc<Prober> {
        Arc::new(Prober::new(Duration::from_secs(5)).unwrap())
    }

    fn check(url: &str, period: Duration) -> CheckDefinition {
        CheckDefinition { url: url.to_string(), period, patterns: Vec::new() }
    }

    #[tokio::test]
    async fn test_construction_rejects_invalid_checks() {
        let handler = CollectingHandler::new();

        assert!(HealthScheduler::new(Vec::new(), prober(), handler.clone()).is_err());

        let err = HealthScheduler::new(
            vec![check("no-scheme", Duration::ZERO)],
            prober(),
            handler,
        )
        .unwrap_err();
        assert_eq!(err.issues.len(), 2);
    }

    #[tokio::test]
    async fn test_all_checks_probed_within_longest_period() {
        let mut server = mockito::Server::new_async().await;
        let mut mocks = Vec::new();
        for path in ["/sched-a", "/sched-b", "/sched-c"] {
            mocks.push(server.mock("GET", path).with_status(200).create_async().await);
        }

        let checks = vec![
            check(&format!("{}/sched-a", server.url()), Duration::from_millis(50)),
            check(&format!("{}/sched-b", server.url()), Duration::from_millis(100)),
            check(&format!("{}/sched-c", server.url()), Duration::from_millis(150)),
        ];
        let handler = CollectingHandler::new();
        let mut scheduler = HealthScheduler::new(checks, prober(), handler.clone()).unwrap();

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(400)).await;
        scheduler.stop();

        let urls = handler.urls().await;
        assert!(urls.iter().any(|url| url.ends_with("/sched-a")));
        assert!(urls.iter().any(|url| url.ends_with("/sched-b")));
        assert!(urls.iter().any(|url| url.ends_with("/sched-c")));
    }

    #[tokio::test]
    async fn test_immediate_stop_fires_no_probe() {
        let handler = CollectingHandler::new();
        let mut scheduler = HealthScheduler::new(
            vec![check("http://127.0.0.1:9/unreachable", Duration::from_millis(500))],
            prober(),
            handler.clone(),
        )
        .unwrap();

        scheduler.start();
        scheduler.stop();
        tokio::time::sleep(Duration::from_millis(700)).await;

        assert!(handler.urls().await.is_empty());
    }

    #[tokio::test]
    async fn test_stopped_scheduler_can_restart() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/sched-restart").with_status(200).create_async().await;

        let handler = CollectingHandler::new();
        let mut scheduler = HealthScheduler::new(
            vec![check(&format!("{}/sched-restart", server.url()), Duration::from_millis(50))],
            prober(),
            handler.clone(),
        )
        .unwrap();

        scheduler.start();
        // Starting twice is a no-op
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(150)).await;
        scheduler.stop();
        // Let any in-flight iteration finish before counting
        tokio::time::sleep(Duration::from_millis(100)).await;
        let after_first_run = handler.urls().await.len();
        assert!(after_first_run >= 1);

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(150)).await;
        scheduler.stop();

        assert!(handler.urls().await.len() > after_first_run);
    }

    #[tokio::test]
    async fn test_handler_error_ends_the_check_loop() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/sched-fail").with_status(200).create_async().await;

        let handler = Arc::new(FailingHandler { calls: Mutex::new(0) });
        let mut scheduler = HealthScheduler::new(
            vec![check(&format!("{}/sched-fail", server.url()), Duration::from_millis(50))],
            prober(),
            handler.clone(),
        )
        .unwrap();

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(300)).await;
        scheduler.stop();

        assert_eq!(*handler.calls.lock().await, 1);
    }
}
