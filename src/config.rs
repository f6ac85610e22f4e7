//! Client configuration.
//!
//! There is no config file; embedding applications build a `ClientConfig`
//! directly or deserialize one from their own settings.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{JsqlError, Result};
use crate::models::Driver;

/// Default gateway port.
pub const DEFAULT_PORT: u16 = 5123;

/// Default idle timeout in seconds. The absolute timeout is twice this.
pub const DEFAULT_TIMEOUT_SECS: u64 = 2;

/// Default read chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Maximum frame size (100MB) to prevent OOM from a buggy or trickling server.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// How responses are delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramingMode {
    /// Response ends when the buffer ends with `}` followed by a line feed.
    #[default]
    EndMarker,
    /// LSP-style `Content-Length` header framing.
    ContentLength,
}

/// Settings for one [`JsqlClient`](crate::JsqlClient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub driver: Driver,
    /// Driver-specific connection string (the gateway's data source name).
    pub connection_string: String,
    /// Gateway password, sent in-band with every request.
    pub password: String,
    pub use_tls: bool,
    /// Accept any server certificate. Only for self-signed test gateways.
    pub skip_verify: bool,
    /// PEM-encoded root certificates trusted in addition to the webpki roots.
    #[serde(skip)]
    pub root_cert_pem: Option<Vec<u8>>,
    /// Idle timeout; the absolute timeout is twice this.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
    pub chunk_size: usize,
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,
    pub max_frame_size: usize,
    pub framing: FramingMode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            driver: Driver::default(),
            connection_string: String::new(),
            password: String::new(),
            use_tls: false,
            skip_verify: false,
            root_cert_pem: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(10),
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_interval: Duration::from_millis(100),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            framing: FramingMode::default(),
        }
    }
}

impl ClientConfig {
    /// Config for `driver`/`connection_string` on a gateway at `host:port`.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        driver: Driver,
        connection_string: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            driver,
            connection_string: connection_string.into(),
            ..Self::default()
        }
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Enable or disable TLS.
    pub fn tls(mut self, enable: bool) -> Self {
        self.use_tls = enable;
        self
    }

    pub fn skip_verify(mut self, skip: bool) -> Self {
        self.skip_verify = skip;
        self
    }

    /// Trust the root certificates in a PEM file.
    pub fn with_root_certificate(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let pem = std::fs::read(path.as_ref()).map_err(|e| {
            JsqlError::Tls(format!(
                "Failed to read root certificate {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        self.root_cert_pem = Some(pem);
        Ok(self)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the read chunk size. Zero means the default chunk size.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn framing(mut self, framing: FramingMode) -> Self {
        self.framing = framing;
        self
    }

    /// `host:port` as passed to the socket layer.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(d.as_millis()).map_err(serde::ser::Error::custom)?;
        s.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
