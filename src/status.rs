// Periodic backend connectivity check

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend_api::BackendClient;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Checking,
    Online,
    Offline,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Checking => f.write_str("checking"),
            Self::Online => f.write_str("online"),
            Self::Offline => f.write_str("offline (factual accuracy limited)"),
        }
    }
}

/// Polls `GET /status/` on a fixed interval for as long as it is alive.
///
/// The first check runs immediately. Stopping (or dropping) the monitor
/// cancels the schedule.
pub struct StatusMonitor {
    state: watch::Receiver<ConnectionState>,
    cancellation_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl StatusMonitor {
    pub fn start(client: BackendClient, interval: Duration) -> Self {
        let (tx, rx) = watch::channel(ConnectionState::Checking);
        let cancellation_token = CancellationToken::new();
        let token = cancellation_token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let checked = tokio::select! {
                            _ = token.cancelled() => break,
                            checked = client.status() => checked,
                        };

                        tx.send_if_modified(|current| {
                            if *current == checked {
                                return false;
                            }
                            info!(from = %current, to = %checked, "backend connectivity changed");
                            *current = checked;
                            true
                        });
                    }
                }
            }

            debug!("status monitor stopped");
        });

        Self {
            state: rx,
            cancellation_token,
            handle: Some(handle),
        }
    }

    pub fn current(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Cancels the schedule and waits for the polling task to exit.
    pub async fn stop(mut self) {
        self.cancellation_token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for StatusMonitor {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn wait_for(
        rx: &mut watch::Receiver<ConnectionState>,
        wanted: ConnectionState,
    ) -> ConnectionState {
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|state| *state == wanted))
            .await
            .expect("state never reached")
            .map(|state| *state)
            .unwrap()
    }

    #[tokio::test]
    async fn starts_checking_then_reports_online() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "online": true })))
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri(), Duration::from_secs(1)).unwrap();
        let monitor = StatusMonitor::start(client, Duration::from_millis(50));
        let mut rx = monitor.subscribe();

        assert_eq!(wait_for(&mut rx, ConnectionState::Online).await, ConnectionState::Online);
        assert_eq!(monitor.current(), ConnectionState::Online);
        monitor.stop().await;
    }

    #[tokio::test]
    async fn reports_offline_when_backend_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status/"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri(), Duration::from_secs(1)).unwrap();
        let monitor = StatusMonitor::start(client, Duration::from_millis(50));
        let mut rx = monitor.subscribe();

        assert_eq!(wait_for(&mut rx, ConnectionState::Offline).await, ConnectionState::Offline);
        monitor.stop().await;
    }

    #[tokio::test]
    async fn polls_on_interval_until_stopped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri(), Duration::from_secs(1)).unwrap();
        let monitor = StatusMonitor::start(client, Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(150)).await;
        monitor.stop().await;

        let polled = server.received_requests().await.unwrap().len();
        assert!(polled >= 2, "expected repeated polls, saw {polled}");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(server.received_requests().await.unwrap().len(), polled);
    }
}
