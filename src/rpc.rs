//! Transport for the jSQL gateway: JSON-RPC over TCP, optionally TLS.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐        TCP (+ TLS)         ┌─────────────────────┐
//! │   JsqlClient    │  ◄───────────────────────► │    jSQL gateway     │
//! │                 │   JSON-RPC + `}\n` frames  │  (mssql/mysql/pg/   │
//! └─────────────────┘                            │   sqlite3 drivers)  │
//!                                                └─────────────────────┘
//! ```
//!
//! - `stream` opens the duplex byte stream
//! - `framing` decides where a response ends and enforces the read timeouts
//! - `client` ties them together with request ids and response validation
//!
//! # Usage
//!
//! ```ignore
//! use jsql_client::rpc::JsqlClient;
//! use jsql_client::Driver;
//!
//! let client = JsqlClient::open("127.0.0.1", 1234, Driver::Sqlite3, "./1.db").await?;
//! let rows = client.select("select * from test").await?;
//! ```

mod client;
mod framing;
mod stream;
mod tls;

pub use client::JsqlClient;
pub use framing::{
    has_end_marker, read_frame, write_frame, ContentLengthCodec, EndMarkerCodec, Frame,
    FrameCodec, FrameStatus, ReadPolicy,
};
pub use stream::{open, GatewayStream};
pub use tls::build_client_config;
