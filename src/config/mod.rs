/// Configuration structures for the router
///
/// The construction input is one JSON document with two top-level maps:
/// `instances` (instance name to backend definition) and `cluster`
/// (cluster name to an ordered lookup-rule list). Backend-specific
/// configuration stays an opaque `serde_json::Value` here and is decoded
/// by the matching backend constructor, so one malformed instance entry
/// can never fail the whole document.
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::ConfigError;

pub const DB_TYPE_MONGO: &str = "mongo";
pub const DB_TYPE_MYSQL: &str = "mysql";
pub const DB_TYPE_POSTGRES: &str = "postgres";

/// Expected-kind tag for errors where either relational dbtype would fit
pub const DB_TYPE_SQL_KINDS: &str = "mysql|postgres";

const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Top-level routing configuration document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouteConfig {
    /// Instance name to backend definition
    #[serde(default)]
    pub instances: HashMap<String, InstanceConfig>,
    /// Cluster name to ordered lookup-rule list
    #[serde(default)]
    pub cluster: HashMap<String, Vec<LookupConfig>>,
}

/// One configured backend instance
///
/// Fields default to empty/null so that an incomplete entry survives
/// document parsing and is rejected individually during construction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstanceConfig {
    #[serde(default)]
    pub dbtype: String,
    #[serde(default)]
    pub dbname: String,
    /// Backend-specific payload, decoded by the matching backend constructor
    #[serde(default)]
    pub dbcfg: serde_json::Value,
}

/// One lookup rule as it appears on the wire
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LookupConfig {
    #[serde(default)]
    pub instance: String,
    /// Match kind: "full" or "regex"
    #[serde(default, rename = "match")]
    pub match_kind: String,
    #[serde(default)]
    pub express: String,
}

/// Backend dial parameters shared by all backend kinds
#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    /// host:port endpoints; relational backends require exactly one
    pub addrs: Vec<String>,
    /// Dial timeout in milliseconds, default 60000
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub passwd: String,
}

impl DbConfig {
    /// Decode a backend payload for the named database
    pub fn from_value(dbname: &str, value: &serde_json::Value) -> Result<DbConfig, ConfigError> {
        serde_json::from_value(value.clone()).map_err(|e| ConfigError::InvalidValue {
            field: "dbcfg",
            dbname: dbname.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout.unwrap_or(DEFAULT_TIMEOUT_MS))
    }
}

impl RouteConfig {
    /// Parse the JSON configuration document
    pub fn from_json(jscfg: &str) -> Result<RouteConfig, ConfigError> {
        serde_json::from_str(jscfg).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Validate a configured name (instance, cluster, dbtype, dbname, match kind).
///
/// Accepts `[A-Za-z][A-Za-z0-9_]*`: first character alphabetic, the rest
/// alphanumeric or underscore.
pub fn check_varname(varname: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidIdentifier {
        name: varname.to_string(),
        reason: reason.to_string(),
    };

    let mut chars = varname.chars();
    let first = chars.next().ok_or_else(|| invalid("is empty"))?;
    if !first.is_ascii_alphabetic() {
        return Err(invalid("first char is not alpha"));
    }
    for c in chars {
        if !(c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid("contains char outside [A-Za-z0-9_]"));
        }
    }
    Ok(())
}
