//! Duplex byte stream to the gateway, plain TCP or TLS.
//!
//! `GatewayStream` hides which of the two is in use so the framing layer
//! only ever sees `AsyncRead + AsyncWrite`.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{JsqlError, Result};
use crate::rpc::tls;

/// A connection which is either plain TCP or secured with TLS.
pub enum GatewayStream {
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl GatewayStream {
    pub fn is_tls(&self) -> bool {
        matches!(self, GatewayStream::Tls(_))
    }

    /// Close the write half (FIN, or TLS close_notify first).
    pub async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            GatewayStream::Tcp(stream) => stream.shutdown().await,
            GatewayStream::Tls(stream) => stream.shutdown().await,
        }
    }
}

impl std::fmt::Debug for GatewayStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let peer = match self {
            GatewayStream::Tcp(stream) => stream.peer_addr(),
            GatewayStream::Tls(stream) => stream.get_ref().0.peer_addr(),
        };
        f.debug_struct("GatewayStream")
            .field("tls", &self.is_tls())
            .field("peer", &peer.ok())
            .finish()
    }
}

/// Connect to the gateway described by `config`.
///
/// # Errors
///
/// - `JsqlError::Connect` if the TCP connection is refused, unreachable, or
///   not established within `connect_timeout`, or if the TLS handshake fails
/// - `JsqlError::Tls` if the TLS configuration cannot be built
pub async fn open(config: &ClientConfig) -> Result<GatewayStream> {
    let addr = config.address();

    let tcp = timeout(config.connect_timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| {
            JsqlError::Connect(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("Timed out connecting to {}", addr),
            ))
        })?
        .map_err(JsqlError::Connect)?;

    // Requests are small and latency-bound.
    if let Err(e) = tcp.set_nodelay(true) {
        debug!("Failed to set TCP_NODELAY: {}", e);
    }

    if !config.use_tls {
        info!(%addr, "connected");
        return Ok(GatewayStream::Tcp(tcp));
    }

    let connector = TlsConnector::from(Arc::new(tls::build_client_config(config)?));
    let domain = tls::server_name(&config.host)?;

    let stream = timeout(config.connect_timeout, connector.connect(domain, tcp))
        .await
        .map_err(|_| {
            JsqlError::Connect(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("TLS handshake with {} timed out", addr),
            ))
        })?
        .map_err(JsqlError::Connect)?;

    info!(%addr, "connected (TLS)");
    Ok(GatewayStream::Tls(Box::new(stream)))
}

impl AsyncRead for GatewayStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            GatewayStream::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            GatewayStream::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for GatewayStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            GatewayStream::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            GatewayStream::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            GatewayStream::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            GatewayStream::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            GatewayStream::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            GatewayStream::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}
