//! Data models for jSQL query results.
//!
//! Rows are decoded straight from the gateway's JSON; the client performs no
//! schema validation beyond that.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One result row: column name to value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// The rows returned by a single SELECT.
pub type Rowset = Vec<Row>;

/// Database driver the gateway should use to run a statement.
///
/// Serialized with the driver names the gateway registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    Mssql,
    Mysql,
    Pg,
    #[default]
    Sqlite3,
}

impl Driver {
    /// Wire name of the driver.
    pub fn as_str(&self) -> &'static str {
        match self {
            Driver::Mssql => "mssql",
            Driver::Mysql => "mysql",
            Driver::Pg => "pg",
            Driver::Sqlite3 => "sqlite3",
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a driver name is not one the gateway knows.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown driver '{0}' (expected mssql, mysql, pg or sqlite3)")]
pub struct UnknownDriver(pub String);

impl FromStr for Driver {
    type Err = UnknownDriver;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mssql" => Ok(Driver::Mssql),
            "mysql" => Ok(Driver::Mysql),
            "pg" | "postgres" => Ok(Driver::Pg),
            "sqlite3" | "sqlite" => Ok(Driver::Sqlite3),
            _ => Err(UnknownDriver(s.to_string())),
        }
    }
}
