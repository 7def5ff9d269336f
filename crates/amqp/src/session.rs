//! Transport session: one connection and one channel to one broker.

use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{
    BasicProperties, Channel, ChannelState, Connection, ConnectionProperties, ConnectionState,
    ErrorKind,
};
use tracing::{debug, info, warn};

use crate::config::Endpoint;
use crate::error::TransferError;
use crate::tls::TlsSettings;

const CONTENT_TYPE_JSON: &str = "application/json";
const REPLY_SUCCESS: u16 = 200;

/// Outcome of [`Session::close`]. Release failures are recorded, never raised.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CloseReport {
    pub channel_error: Option<String>,
    pub connection_error: Option<String>,
}

impl CloseReport {
    pub fn is_clean(&self) -> bool {
        self.channel_error.is_none() && self.connection_error.is_none()
    }
}

/// A connection to a single broker, able to publish to one queue.
///
/// A session starts disconnected. `connect` brings it up (and may be called
/// again to replace a dead connection), `send` hands one payload to the
/// broker, `close` tears everything down and is safe to repeat.
#[async_trait]
pub trait Session: Send {
    /// Destination queue this session publishes to.
    fn queue(&self) -> &str;

    async fn connect(&mut self) -> Result<(), TransferError>;

    /// Publishes `payload` without waiting for broker confirmation.
    ///
    /// Fails with [`TransferError::ConnectionClosed`] when there is no live
    /// channel.
    async fn send(&mut self, payload: &[u8]) -> Result<(), TransferError>;

    async fn close(&mut self) -> CloseReport;
}

/// [`Session`] backed by a lapin connection.
pub struct AmqpSession {
    endpoint: Endpoint,
    tls: Option<TlsSettings>,
    connection: Option<Connection>,
    channel: Option<Channel>,
}

impl AmqpSession {
    pub fn new(endpoint: Endpoint, tls: Option<TlsSettings>) -> Self {
        Self {
            endpoint,
            tls,
            connection: None,
            channel: None,
        }
    }

    async fn dial(&self) -> Result<Connection, lapin::Error> {
        let properties = ConnectionProperties::default()
            .with_connection_name(format!("tempcast-{}", self.endpoint.name()).into());

        match &self.tls {
            Some(tls) => {
                Connection::connect_with_config(
                    self.endpoint.uri(),
                    properties,
                    tls.to_owned_config(),
                )
                .await
            }
            None => Connection::connect(self.endpoint.uri(), properties).await,
        }
    }

    async fn open_channel(&self, connection: &Connection) -> Result<Channel, TransferError> {
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| TransferError::Channel(Box::new(e)))?;

        channel
            .queue_declare(
                self.endpoint.queue(),
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| TransferError::Declare {
                queue: self.endpoint.queue().to_string(),
                source: Box::new(e),
            })?;

        Ok(channel)
    }
}

#[async_trait]
impl Session for AmqpSession {
    fn queue(&self) -> &str {
        self.endpoint.queue()
    }

    async fn connect(&mut self) -> Result<(), TransferError> {
        let released = self.close().await;
        if !released.is_clean() {
            debug!(
                destination = %self.endpoint.name(),
                ?released,
                "Previous connection released with errors"
            );
        }

        let connection = self
            .dial()
            .await
            .map_err(|e| TransferError::Connection(Box::new(e)))?;

        let channel = match self.open_channel(&connection).await {
            Ok(channel) => channel,
            Err(err) => {
                if let Err(close_err) = connection.close(REPLY_SUCCESS, "setup failed").await {
                    debug!(error = %close_err, "Failed to close half-open connection");
                }
                return Err(err);
            }
        };

        info!(
            destination = %self.endpoint.name(),
            uri = %self.endpoint.redacted_uri(),
            queue = %self.endpoint.queue(),
            "Connected to broker"
        );

        self.connection = Some(connection);
        self.channel = Some(channel);
        Ok(())
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), TransferError> {
        let channel = match &self.channel {
            Some(channel) if channel.status().connected() => channel,
            Some(_) => {
                return Err(TransferError::ConnectionClosed(
                    "channel is no longer open".to_string(),
                ))
            }
            None => return Err(TransferError::ConnectionClosed("not connected".to_string())),
        };

        channel
            .basic_publish(
                "",
                self.endpoint.queue(),
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_content_type(CONTENT_TYPE_JSON.into()),
            )
            .await
            .map(|_confirm| ())
            .map_err(classify_send_error)
    }

    async fn close(&mut self) -> CloseReport {
        let mut report = CloseReport::default();

        if let Some(channel) = self.channel.take() {
            if let Err(e) = channel.close(REPLY_SUCCESS, "closing").await {
                report.channel_error = Some(e.to_string());
            }
        }
        if let Some(connection) = self.connection.take() {
            if let Err(e) = connection.close(REPLY_SUCCESS, "closing").await {
                report.connection_error = Some(e.to_string());
            }
        }

        if !report.is_clean() {
            warn!(
                destination = %self.endpoint.name(),
                channel_error = ?report.channel_error,
                connection_error = ?report.connection_error,
                "Session closed with errors"
            );
        }
        report
    }
}

/// Splits publish failures into "connection is gone" and everything else.
fn classify_send_error(err: lapin::Error) -> TransferError {
    let closed = match err.kind() {
        ErrorKind::InvalidChannelState(state, _) => matches!(
            state,
            ChannelState::Closing | ChannelState::Closed | ChannelState::Error
        ),
        ErrorKind::InvalidConnectionState(state) => matches!(
            state,
            ConnectionState::Closing | ConnectionState::Closed | ConnectionState::Error
        ),
        ErrorKind::IOError(io) => matches!(
            io.kind(),
            std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::NotConnected
                | std::io::ErrorKind::UnexpectedEof
        ),
        _ => false,
    };

    if closed {
        TransferError::ConnectionClosed(err.to_string())
    } else {
        TransferError::Transmit(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    fn session() -> AmqpSession {
        AmqpSession::new(Endpoint::new("local", "amqp://127.0.0.1:1/%2f", "temp"), None)
    }

    #[test]
    fn test_close_report_clean() {
        assert!(CloseReport::default().is_clean());
        let report = CloseReport {
            channel_error: Some("already closed".into()),
            ..Default::default()
        };
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_new_session_publishes_to_endpoint_queue() {
        let session = session();
        assert_eq!(session.queue(), "temp");
    }

    #[tokio::test]
    async fn test_send_without_connection_is_connection_closed() {
        let mut session = session();
        let err = session.send(b"{}").await.unwrap_err();
        assert!(err.is_connection_closed());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_on_fresh_session() {
        let mut session = session();
        assert!(session.close().await.is_clean());
        assert!(session.close().await.is_clean());
    }

    fn lapin_error(kind: ErrorKind) -> lapin::Error {
        lapin::Error::from(kind)
    }

    #[test]
    fn test_classify_closed_states() {
        let err = classify_send_error(lapin_error(ErrorKind::InvalidChannelState(
            ChannelState::Closed,
            "basic.publish",
        )));
        assert!(err.is_connection_closed());

        let err = classify_send_error(lapin_error(ErrorKind::InvalidConnectionState(
            ConnectionState::Error,
        )));
        assert!(err.is_connection_closed());

        let err = classify_send_error(lapin::Error::from(io::Error::from(
            io::ErrorKind::BrokenPipe,
        )));
        assert!(err.is_connection_closed());
    }

    #[test]
    fn test_classify_other_errors_as_transmit() {
        let err = classify_send_error(lapin::Error::from(io::Error::from(
            io::ErrorKind::InvalidData,
        )));
        assert!(matches!(err, TransferError::Transmit(_)));

        let err = classify_send_error(lapin_error(ErrorKind::InvalidChannelState(
            ChannelState::Initial,
            "basic.publish",
        )));
        assert!(matches!(err, TransferError::Transmit(_)));

        let err = classify_send_error(lapin_error(ErrorKind::MissingHeartbeatError));
        assert!(matches!(err, TransferError::Transmit(_)));
    }
}
