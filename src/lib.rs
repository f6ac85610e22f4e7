//! jSQL client library
//!
//! Runs read-only SQL statements on a remote jSQL gateway over JSON-RPC:
//!
//! - `rpc` - connection, response framing and the `JsqlClient`
//! - `protocol` - request/response envelopes and response validation
//! - `models` - drivers and result rows
//! - `config` - client settings
//! - `error` - the `JsqlError` taxonomy
//!
//! ```ignore
//! use jsql_client::{ClientConfig, Driver, JsqlClient};
//!
//! let config = ClientConfig::new("127.0.0.1", 1234, Driver::Sqlite3, "./1.db")
//!     .password("secret")
//!     .tls(true);
//! let client = JsqlClient::connect(config).await?;
//! let rows = client.run_select("select * from foo where bar = ?", &["hello".into()]).await?;
//! client.close().await;
//! ```

pub mod config;
pub mod error;
pub mod models;
pub mod protocol;
pub mod rpc;

pub use config::{ClientConfig, FramingMode};
pub use error::{ErrorKind, JsqlError, Result};
pub use models::{Driver, Row, Rowset};
pub use rpc::JsqlClient;
