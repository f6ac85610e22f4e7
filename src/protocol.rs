//! JSON-RPC envelopes spoken by the jSQL gateway.
//!
//! The gateway exposes a single method, `JSQL.Select`, taking one argument
//! object. Responses carry either a rowset or an error string, correlated to
//! the request by `id`.
//!
//! ```text
//! -> {"id":1,"method":"JSQL.Select","params":[{"auth":"","driver":"sqlite3",
//!     "datasource_name":"./1.db","statement":"select 1 as Answer","params":[]}]}
//! <- {"id":1,"result":[{"Answer":1}],"error":null}
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{JsqlError, Result};
use crate::models::{Driver, Rowset};

/// The only method the gateway serves.
pub const SELECT_METHOD: &str = "JSQL.Select";

/// Argument object of a `JSQL.Select` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectArgs {
    /// Gateway password (not the database user's password).
    pub auth: String,
    pub driver: Driver,
    /// Driver-specific connection string, opaque to the client.
    pub datasource_name: String,
    pub statement: String,
    /// Positional statement parameters.
    #[serde(default)]
    pub params: Vec<serde_json::Value>,
}

/// Request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: u64,
    pub method: String,
    /// Always exactly one element.
    pub params: Vec<SelectArgs>,
}

/// Response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    #[serde(default)]
    pub result: Option<Rowset>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Wrap a SELECT into a request envelope carrying `id`.
pub fn build_request(
    id: u64,
    auth: &str,
    driver: Driver,
    connection_string: &str,
    statement: &str,
    params: &[serde_json::Value],
) -> RpcRequest {
    RpcRequest {
        id,
        method: SELECT_METHOD.to_string(),
        params: vec![SelectArgs {
            auth: auth.to_string(),
            driver,
            datasource_name: connection_string.to_string(),
            statement: statement.to_string(),
            params: params.to_vec(),
        }],
    }
}

/// Decode a framed response and check it against the request in flight.
///
/// The id is checked before the error field, so a stale error response is
/// reported as a mismatch. A response with neither result nor error is an
/// empty rowset; the gateway encodes an empty SELECT that way.
pub fn validate_response(raw: &[u8], expected_id: u64) -> Result<Rowset> {
    let response: RpcResponse = serde_json::from_slice(raw).map_err(JsqlError::Decode)?;

    if response.id != expected_id {
        return Err(JsqlError::IdMismatch {
            expected: expected_id,
            actual: response.id,
        });
    }

    if let Some(message) = response.error {
        return Err(JsqlError::Server(message));
    }

    let rows = response.result.unwrap_or_default();
    debug!(id = expected_id, rows = rows.len(), "response validated");
    Ok(rows)
}
