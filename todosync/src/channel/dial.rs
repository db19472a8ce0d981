//! Opening the physical push connection.
//!
//! The [`Dialer`] seam turns an endpoint URL into a stream of inbound frames.
//! [`WsDialer`] does this over WebSocket; tests substitute scripted dialers to
//! drive the reconnect logic without a network.

use std::future::Future;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::ChannelError;

/// One inbound data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// Inbound frames of one live connection. The stream ends when the
/// connection closes; an `Err` item reports an abnormal close.
pub type FrameStream = BoxStream<'static, Result<Frame, ChannelError>>;

/// Opens receive-only push connections.
pub trait Dialer: Send + Sync + 'static {
    /// Connect to `url` and return its inbound frame stream.
    fn dial(&self, url: &Url) -> impl Future<Output = Result<FrameStream, ChannelError>> + Send;
}

/// WebSocket dialer backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsDialer;

impl Dialer for WsDialer {
    async fn dial(&self, url: &Url) -> Result<FrameStream, ChannelError> {
        let (ws_stream, _response) = connect_async(url.as_str())
            .await
            .map_err(map_ws_connect_error)?;

        let frames = ws_stream.filter_map(|msg| {
            let frame = match msg {
                Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
                Ok(Message::Binary(data)) => Some(Ok(Frame::Binary(data.to_vec()))),
                Ok(Message::Close(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {
                    None
                }
                Err(e) => Some(Err(ChannelError::Transport(e.to_string()))),
            };
            futures_util::future::ready(frame)
        });
        Ok(frames.boxed())
    }
}

/// Map a `tokio_tungstenite` connection error to a [`ChannelError`].
fn map_ws_connect_error(err: tokio_tungstenite::tungstenite::Error) -> ChannelError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::ConnectionRefused
                || io_err.kind() == std::io::ErrorKind::AddrNotAvailable
            {
                ChannelError::Unreachable(io_err.to_string())
            } else {
                ChannelError::Transport(io_err.to_string())
            }
        }
        WsError::Http(response) => ChannelError::Rejected(response.status().as_u16()),
        other => ChannelError::Transport(other.to_string()),
    }
}
