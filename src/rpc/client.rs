//! jSQL client: one connection, one request in flight at a time.
//!
//! `JsqlClient` keeps a persistent connection to the gateway and runs
//! read-only SELECT statements over it. The stream and the exchange on it
//! live behind a mutex, so concurrent callers sharing one client are
//! serialized rather than interleaved; there is no multiplexing.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, FramingMode};
use crate::error::{JsqlError, Result};
use crate::models::{Driver, Rowset};
use crate::protocol::{build_request, validate_response};
use crate::rpc::framing::{
    read_frame, write_frame, ContentLengthCodec, EndMarkerCodec, FrameCodec, ReadPolicy,
};
use crate::rpc::stream::{self, GatewayStream};

/// Client for a jSQL gateway.
///
/// # Connection Lifecycle
///
/// - `connect()` - open the stream (plain or TLS)
/// - `run_select()` - send one SELECT and wait for its rows
/// - `close()` - release the stream; idempotent, never fails
///
/// Dropping the client also closes the socket.
///
/// # Example
///
/// ```ignore
/// use jsql_client::{ClientConfig, Driver, JsqlClient};
///
/// let client = JsqlClient::connect(
///     ClientConfig::new("127.0.0.1", 1234, Driver::Sqlite3, "./1.db"),
/// )
/// .await?;
///
/// let rows = client.run_select("select 1 as 'Answer'", &[]).await?;
/// assert_eq!(rows[0]["Answer"], 1);
/// ```
#[derive(Debug)]
pub struct JsqlClient {
    config: ClientConfig,
    codec: Box<dyn FrameCodec>,
    policy: ReadPolicy,
    /// `None` once closed.
    stream: Mutex<Option<GatewayStream>>,
    /// Next request id; starts at 1, never reused.
    request_id: AtomicU64,
}

impl JsqlClient {
    /// Connect to the gateway described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `JsqlError::Connect` if the connection or TLS handshake fails,
    /// `JsqlError::Tls` if the TLS configuration is invalid.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let stream = stream::open(&config).await?;

        let codec: Box<dyn FrameCodec> = match config.framing {
            FramingMode::EndMarker => Box::new(EndMarkerCodec),
            FramingMode::ContentLength => Box::new(ContentLengthCodec::new(config.max_frame_size)),
        };

        Ok(Self {
            policy: ReadPolicy::from(&config),
            codec,
            config,
            stream: Mutex::new(Some(stream)),
            request_id: AtomicU64::new(1),
        })
    }

    /// Connect with default settings apart from the gateway address and
    /// data source.
    pub async fn open(
        host: impl Into<String>,
        port: u16,
        driver: Driver,
        connection_string: impl Into<String>,
    ) -> Result<Self> {
        Self::connect(ClientConfig::new(host, port, driver, connection_string)).await
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run a SELECT and return its rows.
    ///
    /// # Errors
    ///
    /// - `JsqlError::Transport` - the stream failed, was closed by the peer
    ///   before any response byte, or the client was closed
    /// - `JsqlError::Decode` - the response (possibly a fragment left by a
    ///   timeout) is not a valid response envelope
    ///
    /// A transport failure or an incomplete response leaves the stream out
    /// of step with the gateway, so the connection is dropped and later
    /// calls fail with `JsqlError::Transport` (`NotConnected`).
    /// - `JsqlError::IdMismatch` - the response answers another request
    /// - `JsqlError::Server` - the gateway reported an error
    pub async fn run_select(
        &self,
        statement: &str,
        params: &[serde_json::Value],
    ) -> Result<Rowset> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or_else(|| {
            JsqlError::Transport(io::Error::new(
                io::ErrorKind::NotConnected,
                "Client is closed",
            ))
        })?;

        let id = self.next_id();
        let request = build_request(
            id,
            &self.config.password,
            self.config.driver,
            &self.config.connection_string,
            statement,
            params,
        );
        let body = serde_json::to_vec(&request).map_err(JsqlError::Encode)?;

        debug!(
            id,
            driver = %self.config.driver,
            statement_len = statement.len(),
            params = params.len(),
            "sending select"
        );

        let exchange = async {
            write_frame(stream, self.codec.as_ref(), &body).await?;
            read_frame(stream, self.codec.as_ref(), &self.policy).await
        };
        let frame = match exchange.await {
            Ok(frame) => frame,
            Err(e) => {
                warn!(id, error = %e, "dropping connection after transport error");
                guard.take();
                return Err(JsqlError::Transport(e));
            }
        };

        let result = validate_response(frame.payload(self.codec.as_ref()), id);
        if !frame.is_complete() {
            warn!(id, status = ?frame.status, "dropping connection after incomplete response");
            guard.take();
        }
        result
    }

    /// Like [`run_select`](Self::run_select) without statement parameters.
    pub async fn select(&self, statement: &str) -> Result<Rowset> {
        self.run_select(statement, &[]).await
    }

    /// Close the connection. Safe to call more than once; errors while
    /// shutting the stream down are logged and dropped.
    pub async fn close(&self) {
        let Some(mut stream) = self.stream.lock().await.take() else {
            return;
        };

        if let Err(e) = stream.shutdown().await {
            debug!("Ignoring error while closing connection: {}", e);
        }
        info!(addr = %self.config.address(), "connection closed");
    }

    pub async fn is_closed(&self) -> bool {
        self.stream.lock().await.is_none()
    }

    /// Capture the id for a request and advance the counter in one step.
    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }
}
