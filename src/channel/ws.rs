//! `tokio-tungstenite` implementation of the channel seam.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{ChannelError, Connection, Connector, WireMessage};

/// Opens plain or TLS websocket connections.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, ChannelError> {
        let (stream, _) = connect_async(url).await?;
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait::async_trait]
impl Connection for WsConnection {
    async fn send_text(&mut self, text: &str) -> Result<(), ChannelError> {
        self.stream.send(Message::Text(text.to_owned().into())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<WireMessage, ChannelError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(e.into())),
            };
            match message {
                Message::Text(text) => return Some(Ok(WireMessage::Text(text.as_str().to_owned()))),
                Message::Close(frame) => {
                    let (code, reason) = match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.as_str().to_owned()),
                        None => (None, String::new()),
                    };
                    return Some(Ok(WireMessage::Close { code, reason }));
                }
                // Pings are answered by tungstenite; binary frames are not part of the protocol.
                Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), ChannelError> {
        let frame = CloseFrame { code: CloseCode::from(code), reason: reason.to_owned().into() };
        self.stream.close(Some(frame)).await?;
        Ok(())
    }
}
