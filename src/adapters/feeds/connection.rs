//! Combined Stream Connection - Websocket Session Lifecycle
//!
//! Opens a single multiplexed session carrying every subscription topic
//! (`<base>/stream?streams=a/b/c`) and exposes it as a [`FrameSource`].
//!
//! The socket is split into read and write halves behind separate locks:
//! the reader serializes `receive` calls, and `close` only touches the
//! writer, so it never waits behind a blocked receive. A cancellation
//! latch makes any pending or later receive return
//! [`ReceiveError::Closed`] once close has been requested.
//!
//! No reconnection happens here. A failed dial or a dead session is
//! reported to the caller, which decides whether to rebuild the pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::StreamConfig;
use crate::domain::topic::{build_topics, subscription_url, SubscriptionTopic};
use crate::ports::frame_source::{CloseError, ConnectError, FrameSource, RawFrame, ReceiveError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code reported when the peer's close frame carries none.
const NO_STATUS_CODE: u16 = 1005;

/// Default bound on the close handshake.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// A single-use websocket session over the combined stream endpoint.
pub struct StreamConnection {
    url: String,
    topics: Vec<SubscriptionTopic>,
    reader: Mutex<Option<SplitStream<WsStream>>>,
    writer: Mutex<Option<SplitSink<WsStream, Message>>>,
    closed: CancellationToken,
    connected: AtomicBool,
    close_timeout: Duration,
}

impl StreamConnection {
    /// Build the topic set for `symbols` and the subscription URL under
    /// `base_url`. Nothing is dialled until [`connect`](Self::connect).
    pub fn new<S: AsRef<str>>(base_url: &str, symbols: &[S]) -> Self {
        let topics = build_topics(symbols);
        let url = subscription_url(base_url, &topics);

        Self {
            url,
            topics,
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            closed: CancellationToken::new(),
            connected: AtomicBool::new(false),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(&config.base_ws_url, &config.symbols)
            .with_close_timeout(Duration::from_millis(config.close_timeout_ms))
    }

    #[must_use]
    pub const fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn topics(&self) -> &[SubscriptionTopic] {
        &self.topics
    }

    /// Whether the session is open and has not failed or been closed.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Dial the combined stream, giving up if shutdown is signalled first.
    ///
    /// Connecting an already connected session is a no-op. Connecting
    /// after [`close`](FrameSource::close) fails with
    /// [`ConnectError::Closed`].
    #[instrument(skip(self, shutdown_rx), fields(topics = self.topics.len()))]
    pub async fn connect(
        &self,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<(), ConnectError> {
        if self.closed.is_cancelled() {
            return Err(ConnectError::Closed);
        }
        if self.is_connected() {
            debug!("Connection already open");
            return Ok(());
        }

        info!(url = %self.url, "Connecting to combined stream");

        let (ws_stream, response) = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received before connect completed");
                return Err(ConnectError::Cancelled);
            }
            () = self.closed.cancelled() => return Err(ConnectError::Closed),
            result = connect_async(self.url.as_str()) => result.map_err(|e| ConnectError::Dial {
                url: self.url.clone(),
                source: Box::new(e),
            })?,
        };

        let (write, read) = ws_stream.split();
        *self.reader.lock().await = Some(read);

        // close() cancels first, then clears the flag under this same lock.
        {
            let mut writer = self.writer.lock().await;
            if self.closed.is_cancelled() {
                return Err(ConnectError::Closed);
            }
            *writer = Some(write);
            self.connected.store(true, Ordering::Release);
        }

        info!(status = response.status().as_u16(), "Combined stream connected");
        Ok(())
    }

    fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }
}

#[async_trait]
impl FrameSource for StreamConnection {
    async fn receive(&self) -> Result<RawFrame, ReceiveError> {
        if self.closed.is_cancelled() {
            return Err(ReceiveError::Closed);
        }

        let mut guard = tokio::select! {
            biased;
            () = self.closed.cancelled() => return Err(ReceiveError::Closed),
            guard = self.reader.lock() => guard,
        };
        let reader = guard.as_mut().ok_or(ReceiveError::NotConnected)?;

        loop {
            let next = tokio::select! {
                biased;
                () = self.closed.cancelled() => return Err(ReceiveError::Closed),
                next = reader.next() => next,
            };

            match next {
                Some(Ok(Message::Text(text))) => return Ok(RawFrame::from(text)),
                Some(Ok(Message::Binary(bytes))) => return Ok(RawFrame::from(bytes)),
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                    trace!("Control frame skipped");
                }
                Some(Ok(Message::Close(frame))) => {
                    self.mark_disconnected();
                    let (code, reason) = frame.map_or_else(
                        || (NO_STATUS_CODE, String::new()),
                        |f| (u16::from(f.code), f.reason.into_owned()),
                    );
                    warn!(code, reason = %reason, "Peer closed the stream");
                    return Err(ReceiveError::PeerClosed { code, reason });
                }
                Some(Err(e)) => {
                    self.mark_disconnected();
                    if self.closed.is_cancelled() {
                        return Err(ReceiveError::Closed);
                    }
                    return Err(ReceiveError::Transport(Box::new(e)));
                }
                None => {
                    self.mark_disconnected();
                    return Err(ReceiveError::StreamEnded);
                }
            }
        }
    }

    async fn close(&self) -> Result<(), CloseError> {
        self.closed.cancel();

        let taken = {
            let mut writer = self.writer.lock().await;
            self.mark_disconnected();
            writer.take()
        };
        let Some(mut writer) = taken else {
            debug!("Close requested with no open session");
            return Ok(());
        };

        debug!("Sending close frame");
        match tokio::time::timeout(self.close_timeout, writer.close()).await {
            Ok(Ok(())) => {
                info!("Combined stream closed");
                Ok(())
            }
            Ok(Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed)) => {
                Ok(())
            }
            Ok(Err(e)) => Err(CloseError::Transport(Box::new(e))),
            Err(_) => Err(CloseError::Timeout(self.close_timeout)),
        }
    }
}

impl std::fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConnection")
            .field("url", &self.url)
            .field("topics", &self.topics.len())
            .field("connected", &self.is_connected())
            .field("closed", &self.closed.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_all_topics() {
        let conn = StreamConnection::new("wss://fstream.binance.com/", &["BTCUSDT"]);
        assert_eq!(
            conn.url(),
            "wss://fstream.binance.com/stream?streams=btcusdt@kline_1m/btcusdt@aggTrade/btcusdt@bookTicker/btcusdt@depth20@100ms"
        );
        assert_eq!(conn.topics().len(), 4);
    }

    #[tokio::test]
    async fn test_close_without_connect_is_noop() {
        let conn = StreamConnection::new("ws://127.0.0.1:1", &["btcusdt"]);
        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn test_receive_before_connect() {
        let conn = StreamConnection::new("ws://127.0.0.1:1", &["btcusdt"]);
        assert!(matches!(conn.receive().await, Err(ReceiveError::NotConnected)));
    }

    #[tokio::test]
    async fn test_closed_session_is_single_use() {
        let conn = StreamConnection::new("ws://127.0.0.1:1", &["btcusdt"]);
        conn.close().await.unwrap();

        let (_tx, mut rx) = broadcast::channel(1);
        assert!(matches!(conn.connect(&mut rx).await, Err(ConnectError::Closed)));
        assert!(matches!(conn.receive().await, Err(ReceiveError::Closed)));
    }

    #[tokio::test]
    async fn test_connect_cancelled_by_shutdown() {
        // 192.0.2.0/24 is reserved for documentation and never answers.
        let conn = StreamConnection::new("ws://192.0.2.1:9", &["btcusdt"]);
        let (tx, mut rx) = broadcast::channel(1);
        tx.send(()).unwrap();

        assert!(matches!(conn.connect(&mut rx).await, Err(ConnectError::Cancelled)));
    }
}
