//! Session channel: one duplex JSON stream to the backend.
//!
//! DESIGN
//! ======
//! `SessionChannel<E>` owns at most one open connection and decodes inbound
//! text into `E` through [`InboundEvent`]. The socket itself sits behind
//! the [`Connector`] / [`Connection`] seam so the state machine can be driven
//! by a scripted connection in tests and by `tokio-tungstenite` otherwise.
//!
//! STATES
//! ======
//! `Disconnected -> Connecting -> Open -> Closing -> Disconnected`.
//! `connect()` on an open channel is a no-op. `send()` on a channel that is
//! not open connects and retries after the policy delay, up to
//! `RetryPolicy::retries` times, then gives up with `NotReady`.
//!
//! CLOSURE
//! =======
//! Closure is reported in-band as [`Inbound::Closed`] with a [`CloseKind`].
//! When this side closes (user cancel), the code it sent is reported by the
//! next `recv()` so the consumer sees the same outcome either way.

pub mod ws;

#[cfg(test)]
#[path = "helpers_test.rs"]
pub mod test_helpers;

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use frames::{CloseKind, InboundEvent, NORMAL_CLOSE_CODE};
use serde::Serialize;
use tracing::{debug, info, warn};

pub use ws::WsConnector;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// Bounded resend policy for `send()` on a channel that is not open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { retries: 1, delay: Duration::from_millis(500) }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("channel not open after {attempts} send attempts")]
    NotReady { attempts: u32 },
    #[error("channel is not connected")]
    NotConnected,
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(error))
    }
}

/// Transport-level message, before JSON decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireMessage {
    Text(String),
    Close { code: Option<u16>, reason: String },
}

/// What `recv()` yields: a decoded event or the end of the stream.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound<E> {
    Event(E),
    Closed(CloseKind),
}

// =============================================================================
// SEAM
// =============================================================================

#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelError`] if the handshake fails.
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, ChannelError>;
}

#[async_trait::async_trait]
pub trait Connection: Send {
    /// # Errors
    ///
    /// Returns a [`ChannelError`] if the frame cannot be written.
    async fn send_text(&mut self, text: &str) -> Result<(), ChannelError>;

    /// Next text or close message. `None` once the stream has ended.
    async fn recv(&mut self) -> Option<Result<WireMessage, ChannelError>>;

    /// # Errors
    ///
    /// Returns a [`ChannelError`] if the close frame cannot be written.
    async fn close(&mut self, code: u16, reason: &str) -> Result<(), ChannelError>;
}

// =============================================================================
// CHANNEL
// =============================================================================

pub struct SessionChannel<E> {
    url: String,
    connector: Arc<dyn Connector>,
    connection: Option<Box<dyn Connection>>,
    state: ChannelState,
    retry: RetryPolicy,
    pending_close: Option<CloseKind>,
    _events: PhantomData<fn() -> E>,
}

impl<E: InboundEvent> SessionChannel<E> {
    #[must_use]
    pub fn new(url: impl Into<String>, connector: Arc<dyn Connector>, retry: RetryPolicy) -> Self {
        Self {
            url: url.into(),
            connector,
            connection: None,
            state: ChannelState::Disconnected,
            retry,
            pending_close: None,
            _events: PhantomData,
        }
    }

    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.state
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == ChannelState::Open
    }

    /// Open the connection unless one is already open.
    ///
    /// # Errors
    ///
    /// Returns the connector's error; the channel stays disconnected.
    pub async fn connect(&mut self) -> Result<(), ChannelError> {
        if self.is_open() {
            return Ok(());
        }
        self.state = ChannelState::Connecting;
        match self.connector.connect(&self.url).await {
            Ok(connection) => {
                info!(url = %self.url, "channel: connected");
                self.connection = Some(connection);
                self.state = ChannelState::Open;
                self.pending_close = None;
                Ok(())
            }
            Err(e) => {
                self.state = ChannelState::Disconnected;
                Err(e)
            }
        }
    }

    /// Encode and send one message, connecting first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::NotReady`] when the channel is still not open
    /// after the retry budget, or the transport error of a failed write.
    pub async fn send<T: Serialize>(&mut self, message: &T) -> Result<(), ChannelError> {
        let text = serde_json::to_string(message)?;
        let mut attempt: u32 = 0;
        loop {
            if let (ChannelState::Open, Some(connection)) = (self.state, self.connection.as_mut()) {
                let result = connection.send_text(&text).await;
                if result.is_err() {
                    self.drop_connection();
                }
                return result;
            }
            if attempt >= self.retry.retries {
                warn!(url = %self.url, attempts = attempt + 1, "channel: giving up on send");
                return Err(ChannelError::NotReady { attempts: attempt + 1 });
            }
            attempt += 1;
            if let Err(e) = self.connect().await {
                warn!(url = %self.url, error = %e, "channel: connect before send failed");
            }
            debug!(attempt, delay = ?self.retry.delay, "channel: retrying send");
            tokio::time::sleep(self.retry.delay).await;
        }
    }

    /// Wait for the next decoded event or the closure of the stream.
    /// Messages with an unknown or malformed payload are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::NotConnected`] when there is nothing to read,
    /// or the transport error that broke the stream.
    pub async fn recv(&mut self) -> Result<Inbound<E>, ChannelError> {
        if let Some(kind) = self.pending_close.take() {
            return Ok(Inbound::Closed(kind));
        }
        loop {
            let Some(connection) = self.connection.as_mut() else {
                return Err(ChannelError::NotConnected);
            };
            match connection.recv().await {
                Some(Ok(WireMessage::Text(text))) => match E::decode(&text) {
                    Ok(event) => return Ok(Inbound::Event(event)),
                    Err(e) => warn!(error = %e, "channel: ignoring inbound message"),
                },
                Some(Ok(WireMessage::Close { code, reason })) => {
                    info!(?code, %reason, "channel: closed by peer");
                    self.drop_connection();
                    return Ok(Inbound::Closed(CloseKind::from_code(code)));
                }
                Some(Err(e)) => {
                    warn!(error = %e, "channel: transport failure");
                    self.drop_connection();
                    return Err(e);
                }
                None => {
                    info!("channel: stream ended without close frame");
                    self.drop_connection();
                    return Ok(Inbound::Closed(CloseKind::Abnormal { code: None }));
                }
            }
        }
    }

    /// Close with an explicit code. The next `recv()` reports that code as
    /// the closure, so a local cancel is indistinguishable from the consumer's
    /// side from the peer closing with the same code.
    pub async fn close(&mut self, code: u16, reason: &str) {
        let Some(mut connection) = self.connection.take() else {
            debug!(code, "channel: close on a disconnected channel");
            return;
        };
        self.state = ChannelState::Closing;
        if let Err(e) = connection.close(code, reason).await {
            warn!(code, error = %e, "channel: close frame not delivered");
        }
        self.state = ChannelState::Disconnected;
        self.pending_close = Some(CloseKind::from_code(Some(code)));
    }

    /// Close normally without reporting a closure event.
    pub async fn disconnect(&mut self) {
        self.close(NORMAL_CLOSE_CODE, "").await;
        self.pending_close = None;
    }

    fn drop_connection(&mut self) {
        self.connection = None;
        self.state = ChannelState::Disconnected;
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
