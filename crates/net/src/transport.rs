//! Transport abstraction
//!
//! The connection engine only needs to receive and send whole text frames.
//! [`WsTransport`] carries one frame per WebSocket text message, which is what
//! the public server speaks. [`LineTransport`] carries them as newline-delimited
//! lines over any byte stream, and [`ChannelTransport`] is an in-process pair
//! used for embedding and tests.

use std::future::Future;
use std::io;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};

/// Read half of a transport connection
pub trait TransportReader: Send + 'static {
    /// Receive the next frame
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(&mut self) -> impl Future<Output = Result<Option<String>>> + Send;
}

/// Write half of a transport connection
pub trait TransportWriter: Send + 'static {
    /// Send one frame to the remote peer
    fn send(&mut self, frame: &str) -> impl Future<Output = Result<()>> + Send;
}

/// A bidirectional transport that splits into independent halves
pub trait Transport: Send + 'static {
    type Reader: TransportReader;
    type Writer: TransportWriter;

    fn split(self) -> (Self::Reader, Self::Writer);
}

/// Newline-delimited reader over any buffered byte stream
pub struct LineReader<R> {
    inner: R,
}

impl<R> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: AsyncBufRead + Unpin + Send + 'static> TransportReader for LineReader<R> {
    async fn recv(&mut self) -> Result<Option<String>> {
        read_frame(&mut self.inner).await
    }
}

/// Newline-delimited writer over any byte stream
pub struct LineWriter<W> {
    inner: W,
}

impl<W> LineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: AsyncWrite + Unpin + Send + 'static> TransportWriter for LineWriter<W> {
    async fn send(&mut self, frame: &str) -> Result<()> {
        write_frame(&mut self.inner, frame).await
    }
}

/// Newline-delimited transport over any byte stream
pub struct LineTransport<S> {
    stream: S,
}

/// Line transport over a TCP stream
pub type TcpTransport = LineTransport<TcpStream>;

impl<S> LineTransport<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

impl LineTransport<TcpStream> {
    /// Resolve `addr` and open a TCP connection
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| Error::Connect(format!("{}: {}", addr, e)))?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

impl<S: AsyncRead + AsyncWrite + Send + 'static> Transport for LineTransport<S> {
    type Reader = LineReader<BufReader<ReadHalf<S>>>;
    type Writer = LineWriter<WriteHalf<S>>;

    fn split(self) -> (Self::Reader, Self::Writer) {
        let (reader, writer) = tokio::io::split(self.stream);
        (
            LineReader::new(BufReader::new(reader)),
            LineWriter::new(writer),
        )
    }
}

/// WebSocket transport; every text message is one frame
pub struct WsTransport<S> {
    stream: WebSocketStream<S>,
}

impl<S> WsTransport<S> {
    /// Wrap a stream that already completed the WebSocket handshake
    pub fn new(stream: WebSocketStream<S>) -> Self {
        Self { stream }
    }
}

impl WsTransport<MaybeTlsStream<TcpStream>> {
    /// Open a TCP connection to `url` and perform the client handshake
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, response) = tokio_tungstenite::connect_async_with_config(url, None, true)
            .await
            .map_err(|e| Error::Connect(format!("{}: {}", url, e)))?;
        debug!(status = %response.status(), "WebSocket handshake complete");
        Ok(Self::new(stream))
    }
}

impl<S> Transport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Reader = WsReader<S>;
    type Writer = WsWriter<S>;

    fn split(self) -> (Self::Reader, Self::Writer) {
        let (sink, stream) = self.stream.split();
        (WsReader { stream }, WsWriter { sink })
    }
}

pub struct WsReader<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

impl<S> TransportReader for WsReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn recv(&mut self) -> Result<Option<String>> {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => return Ok(Some(text)),
                Ok(Message::Binary(data)) => {
                    return String::from_utf8(data)
                        .map(Some)
                        .map_err(|e| Error::Protocol(format!("Invalid UTF-8: {}", e)));
                }
                Ok(Message::Close(frame)) => {
                    debug!(frame = ?frame, "Server sent close frame");
                    return Ok(None);
                }
                // Control frames are answered by tungstenite itself
                Ok(_) => continue,
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return Ok(None),
                Err(e) => return Err(ws_error(e)),
            }
        }
        Ok(None)
    }
}

pub struct WsWriter<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

impl<S> TransportWriter for WsWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, frame: &str) -> Result<()> {
        self.sink
            .send(Message::Text(frame.to_string()))
            .await
            .map_err(ws_error)
    }
}

fn ws_error(e: WsError) -> Error {
    match e {
        WsError::Io(e) => Error::Io(e),
        WsError::ConnectionClosed | WsError::AlreadyClosed => Error::ConnectionLost,
        WsError::Utf8 => Error::Protocol("Invalid UTF-8 in text message".into()),
        other => Error::Io(io::Error::other(other)),
    }
}

/// In-process transport endpoint; frames keep their boundaries
pub struct ChannelTransport {
    rx: mpsc::Receiver<String>,
    tx: mpsc::Sender<String>,
}

impl ChannelTransport {
    /// Create two connected endpoints
    pub fn pair(buffer: usize) -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::channel(buffer);
        let (b_tx, b_rx) = mpsc::channel(buffer);
        (
            Self { rx: a_rx, tx: b_tx },
            Self { rx: b_rx, tx: a_tx },
        )
    }
}

impl Transport for ChannelTransport {
    type Reader = ChannelReader;
    type Writer = ChannelWriter;

    fn split(self) -> (Self::Reader, Self::Writer) {
        (ChannelReader { rx: self.rx }, ChannelWriter { tx: self.tx })
    }
}

pub struct ChannelReader {
    rx: mpsc::Receiver<String>,
}

impl TransportReader for ChannelReader {
    async fn recv(&mut self) -> Result<Option<String>> {
        Ok(self.rx.recv().await)
    }
}

pub struct ChannelWriter {
    tx: mpsc::Sender<String>,
}

impl TransportWriter for ChannelWriter {
    async fn send(&mut self, frame: &str) -> Result<()> {
        self.tx
            .send(frame.to_string())
            .await
            .map_err(|_| Error::ConnectionLost)
    }
}
