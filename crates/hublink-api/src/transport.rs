//! WebSocket transport: one full-duplex authenticated connection.
//!
//! Connection is single-attempt by design -- if the socket drops, the
//! session observes closure and the caller decides whether to log in and
//! connect again. No reconnection or backoff lives here.
//!
//! The seam between transport and engine is a pair of channels: the writer
//! task drains `outbound` into the socket sink, the reader task pumps text
//! frames into `inbound`. Either side failing cancels both, which drops the
//! inbound sender -- the engine sees end-of-stream and treats it as
//! connection loss. [`Transport::from_channels`] builds the same shape over
//! in-memory channels for tests and alternative transports.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::Error;

const OUTBOUND_CHANNEL_CAPACITY: usize = 64;
const INBOUND_CHANNEL_CAPACITY: usize = 256;

type WsSink = futures_util::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// An established full-duplex connection to the hub's messaging service.
///
/// Hand this to `Session::connect` in `hublink-core`; the session takes
/// over both channel halves and runs the single dispatch loop.
pub struct Transport {
    outbound: mpsc::Sender<String>,
    inbound: mpsc::Receiver<String>,
    cancel: CancellationToken,
}

impl Transport {
    /// Open the WebSocket connection. Single attempt; any failure is
    /// returned immediately as [`Error::WebSocketConnect`].
    pub async fn connect(socket_url: &Url) -> Result<Self, Error> {
        info!(url = %redacted(socket_url), "connecting to messaging service");

        let uri: tungstenite::http::Uri = socket_url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| {
                Error::WebSocketConnect(e.to_string())
            })?;
        let request = ClientRequestBuilder::new(uri);

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        info!("messaging service connected");

        let (sink, source) = ws_stream.split();
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        tokio::spawn(write_loop(sink, outbound_rx, cancel.clone()));
        tokio::spawn(read_loop(source, inbound_tx, cancel.clone()));

        Ok(Self {
            outbound: outbound_tx,
            inbound: inbound_rx,
            cancel,
        })
    }

    /// Build a transport over caller-supplied channels.
    ///
    /// The "hub" side holds the matching receiver/sender pair; dropping the
    /// inbound sender closes the transport exactly as a socket drop would.
    pub fn from_channels(outbound: mpsc::Sender<String>, inbound: mpsc::Receiver<String>) -> Self {
        Self {
            outbound,
            inbound,
            cancel: CancellationToken::new(),
        }
    }

    /// Whether the outbound side is already gone (connect-time check).
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// Decompose into the pieces the session engine owns.
    pub fn into_parts(self) -> (mpsc::Sender<String>, mpsc::Receiver<String>, CancellationToken) {
        (self.outbound, self.inbound, self.cancel)
    }
}

/// Drain the outbound channel into the socket sink.
async fn write_loop(mut sink: WsSink, mut rx: mpsc::Receiver<String>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = rx.recv() => {
                let Some(text) = frame else { break };
                trace!(len = text.len(), "sending frame");
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!(error = %e, "socket write failed");
                    break;
                }
            }
        }
    }

    cancel.cancel();
    let _ = sink.close().await;
    debug!("writer task exiting");
}

/// Pump inbound text frames into the engine until the socket ends.
async fn read_loop(mut source: WsSource, tx: mpsc::Sender<String>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = source.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if tx.send(text.to_string()).await.is_err() {
                            // Engine dropped its receiver; session is gone.
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite answers pongs automatically
                        trace!("socket ping");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        match frame {
                            Some(cf) => info!(code = %cf.code, reason = %cf.reason, "close frame received"),
                            None => info!("close frame received (no payload)"),
                        }
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "socket read failed");
                        break;
                    }
                    None => {
                        info!("socket stream ended");
                        break;
                    }
                    _ => {
                        // Binary, Pong, raw frames -- ignore
                    }
                }
            }
        }
    }

    cancel.cancel();
    debug!("reader task exiting");
}

/// Socket URL with the token query parameter masked for logging.
fn redacted(url: &Url) -> String {
    let mut safe = url.clone();
    if url.query_pairs().any(|(k, _)| k == "token") {
        safe.set_query(Some("token=***"));
    }
    safe.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn from_channels_round_trip() {
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let (in_tx, in_rx) = mpsc::channel(8);
        let mut transport = Transport::from_channels(out_tx, in_rx);

        assert!(!transport.is_closed());

        transport.outbound.send("hello".into()).await.unwrap();
        assert_eq!(out_rx.recv().await.as_deref(), Some("hello"));

        in_tx.send("world".to_string()).await.unwrap();
        assert_eq!(transport.inbound.recv().await.as_deref(), Some("world"));
    }

    #[tokio::test]
    async fn is_closed_after_peer_drops() {
        let (out_tx, out_rx) = mpsc::channel::<String>(8);
        let (_in_tx, in_rx) = mpsc::channel(8);
        let transport = Transport::from_channels(out_tx, in_rx);

        drop(out_rx);
        assert!(transport.is_closed());
    }

    #[test]
    fn redacted_masks_token() {
        let url: Url = "wss://hub.test/socket/websocket?token=secret&vsn=2.0.0"
            .parse()
            .unwrap();
        let safe = redacted(&url);
        assert!(!safe.contains("secret"), "got: {safe}");
    }
}
