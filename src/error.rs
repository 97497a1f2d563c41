/// Unified error handling for the dbroute router
///
/// Call-time failures are surfaced to the caller verbatim; backend client
/// errors convert via `#[from]` so a callback's error passes through the
/// exec pipeline unchanged. Construction-time problems are represented by
/// `ConfigError` and, under the fail-soft policy, are logged and the
/// offending entry skipped rather than aborting router construction.
use thiserror::Error;

/// Main error type for router operations
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// No lookup rule matched the (cluster, table) pair
    #[error("cluster instance not found: cluster:{cluster} table:{table}")]
    RouteNotFound { cluster: String, table: String },

    /// A rule matched but the named instance is not registered
    #[error("db instance not found: instance:{instance} cluster:{cluster} table:{table}")]
    InstanceNotFound {
        instance: String,
        cluster: String,
        table: String,
    },

    /// The resolved instance's backend variant does not fit the exec shape used
    #[error("db instance type mismatch: cluster:{cluster} table:{table} want:{expected} got:{actual}")]
    BackendTypeMismatch {
        cluster: String,
        table: String,
        expected: &'static str,
        actual: String,
    },

    /// Document-store session or query error
    #[error("mongo error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    /// Relational connection or query error
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),

    /// The relational exec shape was invoked with no table names
    #[error("tables is empty")]
    EmptyTables,
}

/// Configuration-specific errors
///
/// Under the fail-soft construction policy these are logged as the skip
/// reason for a single instance or rule; they only reach a caller through
/// the constructors of individual backend instances.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid identifier {name:?}: {reason}")]
    InvalidIdentifier { name: String, reason: String },

    #[error("missing field {field} for db:{dbname}")]
    MissingField {
        field: &'static str,
        dbname: String,
    },

    #[error("invalid value for {field} db:{dbname}: {reason}")]
    InvalidValue {
        field: &'static str,
        dbname: String,
        reason: String,
    },

    #[error("dial failed db:{dbname}: {reason}")]
    Dial { dbname: String, reason: String },
}

impl Error {
    /// Create a route-not-found error
    pub fn route_not_found(cluster: &str, table: &str) -> Self {
        Error::RouteNotFound {
            cluster: cluster.to_string(),
            table: table.to_string(),
        }
    }

    /// Create an instance-not-found error
    pub fn instance_not_found(instance: &str, cluster: &str, table: &str) -> Self {
        Error::InstanceNotFound {
            instance: instance.to_string(),
            cluster: cluster.to_string(),
            table: table.to_string(),
        }
    }

    /// Create a backend-type-mismatch error
    pub fn type_mismatch(cluster: &str, table: &str, expected: &'static str, actual: &str) -> Self {
        Error::BackendTypeMismatch {
            cluster: cluster.to_string(),
            table: table.to_string(),
            expected,
            actual: actual.to_string(),
        }
    }
}
