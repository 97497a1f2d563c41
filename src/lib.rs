//! dbroute - Config-driven query router for heterogeneous database backends
//!
//! Application code issues queries against logical (cluster, table) names;
//! the router resolves, at call time, which physical backend instance
//! serves that name and hands the caller a ready-to-use handle through a
//! callback:
//!
//! 1. Route Resolution Engine: per-cluster lookup rules with explicit
//!    Full-before-Regex priority and list-order tie-break
//! 2. Instance Registry: type-tag-dispatched backend construction
//!    (MongoDB, MySQL, PostgreSQL)
//! 3. Session/Connection Manager: lazy once-only session establishment per
//!    (instance, consistency mode) for the document store, eager pooled
//!    connections for relational backends
//! 4. Stats Aggregator: per (cluster, table) call counts and durations
//!
//! The crate is consumed as an embedded library: construct a [`Router`]
//! once from its JSON configuration document and pass it explicitly to
//! every consumer. The routing table is fixed for the router's lifetime.

pub mod config;
pub mod error;
pub mod instance;
pub mod route;
pub mod router;
pub mod stats;

// Re-export commonly used types
pub use config::RouteConfig;
pub use error::{ConfigError, Error};
pub use instance::sql::format_tables;
pub use instance::{Db, Instance, InstanceRegistry, MongoInstance, ReadMode, SqlInstance, SqlKind};
pub use route::{LookupRule, MatchKind};
pub use router::Router;
pub use stats::QueryStat;

/// Result type used throughout the router
pub type Result<T> = std::result::Result<T, Error>;
