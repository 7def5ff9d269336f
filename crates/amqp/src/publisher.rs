//! Publishing with reconnect-and-retry.
//!
//! A [`Publisher`] owns one [`Session`] and turns "publish this value" into
//! serialize, send, and on a closed connection reconnect with backoff and
//! send again. One publish call gets one retry budget; when the fresh
//! connection dies again before the resend, the remaining budget of the same
//! call is used.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::config::RetryConfig;
use crate::error::{error_chain, TransferError};
use crate::session::{CloseReport, Session};
use crate::state::SessionState;

/// Named destination with its own session and retry policy.
pub struct Publisher<S: Session> {
    name: String,
    session: S,
    retry: RetryConfig,
    state: SessionState,
}

impl<S: Session> Publisher<S> {
    /// Wraps a session without connecting it. The first publish connects.
    pub fn new(name: impl Into<String>, session: S, retry: RetryConfig) -> Self {
        Self {
            name: name.into(),
            session,
            retry,
            state: SessionState::Disconnected,
        }
    }

    /// Wraps a session and connects it once, without retrying.
    pub async fn connect(
        name: impl Into<String>,
        mut session: S,
        retry: RetryConfig,
    ) -> Result<Self, TransferError> {
        session.connect().await?;
        let mut publisher = Self::new(name, session, retry);
        publisher.set_state(SessionState::Connected);
        Ok(publisher)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Serializes `message` as JSON and hands it to the broker.
    ///
    /// Serialization failures return immediately. A closed connection
    /// triggers up to `max_attempts` reconnects, each after a growing delay;
    /// the message is sent once per successful reconnect. Other transmit
    /// failures are returned as is.
    pub async fn publish<T>(&mut self, message: &T) -> Result<(), TransferError>
    where
        T: Serialize + ?Sized + Sync,
    {
        let payload = serde_json::to_vec(message)?;
        let mut backoff = self.retry.backoff();

        loop {
            match self.session.send(&payload).await {
                Ok(()) => {
                    if !self.state.is_connected() {
                        self.set_state(SessionState::Connected);
                    }
                    debug!(destination = %self.name, bytes = payload.len(), "Message published");
                    return Ok(());
                }
                Err(err) if err.is_connection_closed() => {
                    warn!(
                        destination = %self.name,
                        error = %err,
                        remaining_attempts = backoff.remaining(),
                        "Connection lost while publishing"
                    );
                    self.set_state(SessionState::Disconnected);
                    self.reconnect(&mut backoff).await?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Releases the session. Never fails.
    pub async fn close(&mut self) -> CloseReport {
        let report = self.session.close().await;
        self.set_state(SessionState::Disconnected);
        report
    }

    async fn reconnect(&mut self, backoff: &mut Backoff) -> Result<(), TransferError> {
        loop {
            let delay = match backoff.next_sleep() {
                Ok(delay) => delay,
                Err(exhausted) => {
                    error!(
                        destination = %self.name,
                        attempts = backoff.max_attempts(),
                        "Unable to reconnect, dropping message"
                    );
                    self.set_state(SessionState::Failed(exhausted.to_string()));
                    return Err(exhausted.into());
                }
            };

            let attempt = backoff.attempt();
            self.set_state(SessionState::Connecting { attempt });
            info!(
                destination = %self.name,
                attempt,
                max_attempts = backoff.max_attempts(),
                delay_secs = delay.as_secs_f64(),
                "Reconnecting"
            );
            tokio::time::sleep(delay).await;

            match self.session.connect().await {
                Ok(()) => {
                    info!(destination = %self.name, attempt, "Reconnected");
                    self.set_state(SessionState::Connected);
                    return Ok(());
                }
                Err(err) => {
                    warn!(
                        destination = %self.name,
                        attempt,
                        error = %error_chain(&err),
                        "Reconnect attempt failed"
                    );
                }
            }
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(destination = %self.name, from = %self.state, to = %state, "Session state changed");
            self.state = state;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde::ser::Error as _;
    use serde::Serializer;
    use tokio::time::Instant;
    use tracing_test::traced_test;

    use super::*;
    use crate::backoff::BackoffError;

    /// In-memory session driven by scripted connect and send outcomes.
    #[derive(Default)]
    struct MockSession {
        connected: bool,
        /// Outcomes for successive `connect` calls; empty means success.
        connect_script: VecDeque<bool>,
        /// Sends that fail as if the channel had been closed underneath.
        drop_next_sends: u32,
        transmit_error: bool,
        sent: Vec<Vec<u8>>,
        connect_calls: u32,
        close_calls: u32,
    }

    impl MockSession {
        fn connected() -> Self {
            Self {
                connected: true,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Session for MockSession {
        fn queue(&self) -> &str {
            "temp"
        }

        async fn connect(&mut self) -> Result<(), TransferError> {
            self.connect_calls += 1;
            if self.connect_script.pop_front().unwrap_or(true) {
                self.connected = true;
                Ok(())
            } else {
                self.connected = false;
                Err(TransferError::Connection("connection refused".into()))
            }
        }

        async fn send(&mut self, payload: &[u8]) -> Result<(), TransferError> {
            if self.transmit_error {
                return Err(TransferError::Transmit("frame rejected".into()));
            }
            if !self.connected {
                return Err(TransferError::ConnectionClosed("not connected".into()));
            }
            if self.drop_next_sends > 0 {
                self.drop_next_sends -= 1;
                self.connected = false;
                return Err(TransferError::ConnectionClosed("channel closed".into()));
            }
            self.sent.push(payload.to_vec());
            Ok(())
        }

        async fn close(&mut self) -> CloseReport {
            self.close_calls += 1;
            self.connected = false;
            CloseReport::default()
        }
    }

    #[derive(Serialize)]
    struct Sample {
        value: f64,
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("cannot encode"))
        }
    }

    fn publisher(session: MockSession) -> Publisher<MockSession> {
        Publisher::new("local", session, RetryConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_connected_publish_sends_once() {
        let mut publisher = publisher(MockSession::connected());
        let start = Instant::now();

        publisher.publish(&Sample { value: 21.5 }).await.unwrap();

        assert_eq!(publisher.session().sent, vec![br#"{"value":21.5}"#.to_vec()]);
        assert_eq!(publisher.session().connect_calls, 0);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(publisher.state().is_connected());
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_closed_channel_reconnects_and_resends_once() {
        let session = MockSession {
            connect_script: VecDeque::from([false, false, true]),
            ..Default::default()
        };
        let mut publisher = publisher(session);
        let start = Instant::now();

        publisher.publish(&Sample { value: 1.0 }).await.unwrap();

        assert_eq!(publisher.session().sent.len(), 1);
        assert_eq!(publisher.session().connect_calls, 3);
        // 1s + 2s + 4s of backoff before the third attempt succeeded.
        assert!(start.elapsed() >= Duration::from_secs(7));
        assert!(publisher.state().is_connected());
        assert!(logs_contain("Reconnect attempt failed"));
        assert!(logs_contain("Reconnected"));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_exhausted_budget_drops_message() {
        let session = MockSession {
            connect_script: VecDeque::from([false; 5]),
            ..Default::default()
        };
        let mut publisher = publisher(session);
        let start = Instant::now();

        let err = publisher.publish(&Sample { value: 1.0 }).await.unwrap_err();

        assert!(matches!(
            err,
            TransferError::RetriesExhausted(BackoffError::MaxAttemptLimitError(5))
        ));
        assert!(publisher.session().sent.is_empty());
        assert_eq!(publisher.session().connect_calls, 5);
        assert!(start.elapsed() >= Duration::from_secs(1 + 2 + 4 + 8 + 16));
        assert_eq!(publisher.state().as_str(), "Failed");
        assert!(logs_contain("Unable to reconnect"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_destination_usable_after_exhaustion() {
        let session = MockSession {
            connect_script: VecDeque::from([false; 5]),
            ..Default::default()
        };
        let mut publisher = publisher(session);
        assert!(publisher.publish(&Sample { value: 1.0 }).await.is_err());

        // Broker is back; the next publish reconnects with a fresh budget.
        publisher.publish(&Sample { value: 2.0 }).await.unwrap();
        assert_eq!(publisher.session().sent, vec![br#"{"value":2.0}"#.to_vec()]);
        assert_eq!(publisher.session().connect_calls, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_loss_shares_one_budget() {
        let session = MockSession {
            connected: true,
            drop_next_sends: 3,
            connect_script: VecDeque::from([true, false, true, true]),
            ..Default::default()
        };
        let mut publisher = publisher(session);
        let start = Instant::now();

        publisher.publish(&Sample { value: 3.0 }).await.unwrap();

        // Three losses, four connect attempts (one failed), one delivery.
        assert_eq!(publisher.session().sent.len(), 1);
        assert_eq!(publisher.session().connect_calls, 4);
        assert!(start.elapsed() >= Duration::from_secs(1 + 2 + 4 + 8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_loss_exhausts_shared_budget() {
        let session = MockSession {
            connected: true,
            drop_next_sends: 10,
            ..Default::default()
        };
        let mut publisher = publisher(session);

        let err = publisher.publish(&Sample { value: 3.0 }).await.unwrap_err();

        assert!(matches!(err, TransferError::RetriesExhausted(_)));
        assert_eq!(publisher.session().connect_calls, 5);
        assert!(publisher.session().sent.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_serialization_error_skips_retry() {
        let mut publisher = publisher(MockSession::default());
        let start = Instant::now();

        let err = publisher.publish(&Unserializable).await.unwrap_err();

        assert!(matches!(err, TransferError::Serialization(_)));
        assert_eq!(publisher.session().connect_calls, 0);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transmit_error_returned_without_retry() {
        let session = MockSession {
            connected: true,
            transmit_error: true,
            ..Default::default()
        };
        let mut publisher = publisher(session);

        let err = publisher.publish(&Sample { value: 1.0 }).await.unwrap_err();

        assert!(matches!(err, TransferError::Transmit(_)));
        assert_eq!(publisher.session().connect_calls, 0);
    }

    #[tokio::test]
    async fn test_connect_constructor() {
        let publisher = Publisher::connect("remote", MockSession::default(), RetryConfig::default())
            .await
            .unwrap();
        assert_eq!(publisher.name(), "remote");
        assert!(publisher.state().is_connected());

        let session = MockSession {
            connect_script: VecDeque::from([false]),
            ..Default::default()
        };
        let result = Publisher::connect("remote", session, RetryConfig::default()).await;
        assert!(matches!(result, Err(TransferError::Connection(_))));
    }

    #[tokio::test]
    async fn test_close_releases_session() {
        let mut publisher = publisher(MockSession::connected());
        assert!(publisher.close().await.is_clean());
        assert!(publisher.close().await.is_clean());
        assert_eq!(publisher.session().close_calls, 2);
        assert_eq!(publisher.state(), &SessionState::Disconnected);
    }
}
