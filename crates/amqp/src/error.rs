use std::io;

use thiserror::Error;

use crate::backoff::BackoffError;

/// Boxed source error from the underlying AMQP client.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while establishing a session or publishing through it.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Dialing the broker failed (DNS, TCP, TLS handshake, authentication).
    #[error("Connection error: {0}")]
    Connection(#[source] BoxError),

    /// The connection came up but opening a channel on it failed.
    #[error("Channel error: {0}")]
    Channel(#[source] BoxError),

    /// The broker rejected the durable queue declaration.
    #[error("Failed to declare queue '{queue}': {source}")]
    Declare {
        queue: String,
        #[source]
        source: BoxError,
    },

    /// No live channel, or the broker reported the channel/connection closed.
    ///
    /// This is the only error that triggers reconnect-and-retry.
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Any other failure while handing a message to the broker.
    #[error("Transmit error: {0}")]
    Transmit(#[source] BoxError),

    /// The message could not be encoded as JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reconnect budget spent without getting the message through.
    #[error("Unable to reconnect: {0}")]
    RetriesExhausted(#[from] BackoffError),

    /// TLS material is missing or malformed.
    #[error("Client setup error: {0}")]
    ClientSetup(String),

    /// Certificate or key file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration validation failed.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] validator::ValidationErrors),
}

impl TransferError {
    /// True for the one error kind that the publisher recovers from by
    /// reconnecting.
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, TransferError::ConnectionClosed(_))
    }
}

/// Renders an error together with its `source()` chain.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}
