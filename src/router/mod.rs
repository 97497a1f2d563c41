/// Router facade
///
/// Composes the cluster rule table, the instance registry and the stats
/// aggregator behind exec-style operations. Every exec resolves the
/// serving instance at call time, hands the caller's callback a ready
/// handle, records the call, and returns the callback's result unchanged:
/// no wrapping, no retry; retry policy belongs to the caller.
use std::fmt;
use std::future::Future;
use std::time::Instant;

use mongodb::bson::Document;
use mongodb::Collection;

use crate::config::{RouteConfig, DB_TYPE_MONGO, DB_TYPE_SQL_KINDS};
use crate::error::Error;
use crate::instance::{Db, Instance, InstanceRegistry, ReadMode, SqlInstance};
use crate::route::ClusterTable;
use crate::stats::{QueryStat, StatAggregator};
use crate::Result;

pub struct Router {
    registry: InstanceRegistry,
    clusters: ClusterTable,
    stats: StatAggregator,
}

impl Router {
    /// Build a router from the JSON configuration document.
    ///
    /// Construction is fail-soft throughout: invalid entries are logged
    /// and skipped, and an unparseable document yields an empty but usable
    /// router. Relational instances dial eagerly here.
    pub async fn from_json(jscfg: &str) -> Router {
        let cfg = match RouteConfig::from_json(jscfg) {
            Ok(cfg) => cfg,
            Err(e) => {
                log::error!("router config unmarshal err:{e}, starting with empty routing table");
                RouteConfig::default()
            }
        };
        Self::from_config(cfg).await
    }

    /// Build a router from an already-parsed configuration
    pub async fn from_config(cfg: RouteConfig) -> Router {
        let registry = InstanceRegistry::build(&cfg.instances).await;
        let clusters = ClusterTable::build(&cfg.cluster, &registry);
        if registry.is_empty() && clusters.is_empty() {
            log::warn!("router built with no usable instances or rules");
        }
        Router {
            registry,
            clusters,
            stats: StatAggregator::new(),
        }
    }

    /// Document-store exec with Eventual consistency
    pub async fn mongo_exec_eventual<T, F, Fut>(&self, cluster: &str, table: &str, query: F) -> Result<T>
    where
        F: FnOnce(Collection<Document>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.mongo_exec(ReadMode::Eventual, cluster, table, query).await
    }

    /// Document-store exec with Monotonic consistency
    pub async fn mongo_exec_monotonic<T, F, Fut>(&self, cluster: &str, table: &str, query: F) -> Result<T>
    where
        F: FnOnce(Collection<Document>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.mongo_exec(ReadMode::Monotonic, cluster, table, query).await
    }

    /// Document-store exec with Strong consistency
    pub async fn mongo_exec_strong<T, F, Fut>(&self, cluster: &str, table: &str, query: F) -> Result<T>
    where
        F: FnOnce(Collection<Document>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.mongo_exec(ReadMode::Strong, cluster, table, query).await
    }

    async fn mongo_exec<T, F, Fut>(
        &self,
        mode: ReadMode,
        cluster: &str,
        table: &str,
        query: F,
    ) -> Result<T>
    where
        F: FnOnce(Collection<Document>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();

        let (_, instance) = self.resolve_instance(cluster, table)?;
        let db = instance.as_mongo().ok_or_else(|| {
            Error::type_mismatch(cluster, table, DB_TYPE_MONGO, instance.db_type())
        })?;
        let resolved = started.elapsed();

        let client = db.session(mode).await?;
        let session_ready = started.elapsed();

        // The collection is an owned per-call duplicate of the cached
        // session; dropping it on any exit path releases it.
        let collection = db.collection(client, table);
        let result = query(collection).await;

        let elapsed = started.elapsed();
        self.stats.inc_query(cluster, table, elapsed);
        log::trace!(
            "[MONGO] mode:{:?} cls:{} table:{} resolve:{:?} session:{:?} query:{:?}",
            mode,
            cluster,
            table,
            resolved,
            session_ready - resolved,
            elapsed - session_ready
        );
        result
    }

    /// Relational exec. Resolution keys off the first table; every
    /// supplied name is passed through to the callback, and the [`Db`]
    /// handle splices them into `{}` placeholders so multi-table
    /// statements can be written once against logical names. The router
    /// does not verify that the remaining tables resolve to the same
    /// instance.
    pub async fn sql_exec<T, F, Fut>(&self, cluster: &str, query: F, tables: &[&str]) -> Result<T>
    where
        F: FnOnce(Db, Vec<String>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();

        let table = *tables.first().ok_or(Error::EmptyTables)?;
        let (_, instance) = self.resolve_instance(cluster, table)?;
        let db: &SqlInstance = instance.as_sql().ok_or_else(|| {
            Error::type_mismatch(cluster, table, DB_TYPE_SQL_KINDS, instance.db_type())
        })?;
        let resolved = started.elapsed();

        let handle = Db::new(db.pool().clone());
        let names = tables.iter().map(|t| t.to_string()).collect();
        let result = query(handle, names).await;

        let elapsed = started.elapsed();
        self.stats.inc_query(cluster, table, elapsed);
        log::trace!(
            "[SQL] cls:{} table:{} resolve:{:?} query:{:?}",
            cluster,
            table,
            resolved,
            elapsed - resolved
        );
        result
    }

    fn resolve_instance(&self, cluster: &str, table: &str) -> Result<(&str, &Instance)> {
        let name = self
            .clusters
            .resolve(cluster, table)
            .ok_or_else(|| Error::route_not_found(cluster, table))?;
        let instance = self
            .registry
            .get(name)
            .ok_or_else(|| Error::instance_not_found(name, cluster, table))?;
        Ok((name, instance))
    }

    /// Matched lookup rule as a JSON object, or the literal `"{}"` when
    /// nothing matches
    pub fn router_info(&self, cluster: &str, table: &str) -> String {
        match self.clusters.lookup(cluster, table) {
            Some(rule) => serde_json::to_string(rule).unwrap_or_else(|_| "{}".to_string()),
            None => "{}".to_string(),
        }
    }

    /// Point-in-time query statistics snapshot
    pub fn stat_info(&self) -> Vec<QueryStat> {
        self.stats.snapshot()
    }
}

/// Diagnostic dump of the full cluster/rule table
impl fmt::Display for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.clusters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Only mongo instances appear in fixtures: they validate without
    // touching the network, while sql instances dial eagerly.
    const FIXTURE: &str = r#"{
        "instances": {
            "account_mongo": {
                "dbtype": "mongo",
                "dbname": "account",
                "dbcfg": {"addrs": ["127.0.0.1:1"], "timeout": 200}
            },
            "log_mongo": {
                "dbtype": "mongo",
                "dbname": "logs",
                "dbcfg": {"addrs": ["127.0.0.1:2"], "timeout": 200}
            }
        },
        "cluster": {
            "ACCOUNT": [
                {"instance": "account_mongo", "match": "full", "express": "users"},
                {"instance": "log_mongo", "match": "regex", "express": "user.*"},
                {"instance": "log_mongo", "match": "regex", "express": "log_[0-9]+"}
            ]
        }
    }"#;

    async fn fixture_router() -> Router {
        let _ = env_logger::builder().is_test(true).try_init();
        Router::from_json(FIXTURE).await
    }

    #[tokio::test]
    async fn test_router_info_full_beats_regex() {
        let router = fixture_router().await;
        // "users" matches both the full rule and the "user.*" regex; the
        // full rule must win.
        let info = router.router_info("ACCOUNT", "users");
        assert!(info.contains("\"instance\":\"account_mongo\""));
        assert!(info.contains("\"match\":\"full\""));
    }

    #[tokio::test]
    async fn test_router_info_regex_match() {
        let router = fixture_router().await;
        let info = router.router_info("ACCOUNT", "log_42");
        assert!(info.contains("\"instance\":\"log_mongo\""));
        assert!(info.contains("\"express\":\"log_[0-9]+\""));
    }

    #[tokio::test]
    async fn test_router_info_no_match() {
        let router = fixture_router().await;
        assert_eq!(router.router_info("ACCOUNT", "orders"), "{}");
        assert_eq!(router.router_info("UNKNOWN", "users"), "{}");
    }

    #[tokio::test]
    async fn test_mongo_exec_route_not_found() {
        let router = fixture_router().await;
        let err = router
            .mongo_exec_eventual("ACCOUNT", "orders", |_c| async { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RouteNotFound { .. }));

        let err = router
            .mongo_exec_strong("UNKNOWN", "users", |_c| async { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RouteNotFound { .. }));
    }

    #[tokio::test]
    async fn test_sql_exec_type_mismatch() {
        let router = fixture_router().await;
        // "users" resolves to a mongo instance; the relational exec shape
        // must refuse it without running the callback.
        let err = router
            .sql_exec(
                "ACCOUNT",
                |_db, _tables| async { Ok(()) },
                &["users"],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BackendTypeMismatch { .. }));
        // The error names both relational kinds in configuration
        // vocabulary, not an internal shorthand.
        assert!(err.to_string().contains("want:mysql|postgres got:mongo"));
    }

    #[tokio::test]
    async fn test_sql_exec_empty_tables() {
        let router = fixture_router().await;
        let err = router
            .sql_exec("ACCOUNT", |_db, _tables| async { Ok(()) }, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyTables));
        // Nothing was resolved or recorded.
        assert!(router.stat_info().is_empty());
    }

    #[tokio::test]
    async fn test_garbage_config_builds_empty_router() {
        let router = Router::from_json("{{{ not json").await;
        assert_eq!(router.router_info("ACCOUNT", "users"), "{}");
        assert!(router.stat_info().is_empty());
        let err = router
            .mongo_exec_eventual("ACCOUNT", "users", |_c| async { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RouteNotFound { .. }));
    }

    #[tokio::test]
    async fn test_rule_for_unknown_instance_dropped() {
        let doc = r#"{
            "instances": {
                "real": {"dbtype": "mongo", "dbname": "a", "dbcfg": {"addrs": ["127.0.0.1:27017"]}},
                "oracle_ins": {"dbtype": "oracle", "dbname": "a", "dbcfg": {"addrs": ["127.0.0.1:1521"]}}
            },
            "cluster": {
                "C": [
                    {"instance": "ghost", "match": "full", "express": "users"},
                    {"instance": "oracle_ins", "match": "full", "express": "orders"},
                    {"instance": "real", "match": "regex", "express": ".*"}
                ]
            }
        }"#;
        let router = Router::from_json(doc).await;
        // The unsupported-dbtype instance is absent, so both rules that
        // depend on missing instances are dropped; the regex rule absorbs
        // their tables instead.
        assert!(router.router_info("C", "users").contains("\"instance\":\"real\""));
        assert!(router.router_info("C", "orders").contains("\"instance\":\"real\""));
    }

    #[tokio::test]
    async fn test_session_dial_failure_surfaces_as_error() {
        let router = fixture_router().await;
        // Nothing listens on the fixture ports, so the lazy dial fails
        // within the 200ms budget and is returned verbatim, never raised
        // as a panic.
        let result = router
            .mongo_exec_eventual("ACCOUNT", "log_1", |_c| async { Ok(()) })
            .await;
        assert!(matches!(result, Err(Error::Mongo(_))));
    }

    #[tokio::test]
    async fn test_display_dumps_rule_table() {
        let router = fixture_router().await;
        let dump = router.to_string();
        assert!(dump.contains("cluster:ACCOUNT"));
        assert!(dump.contains("ins:account_mongo exp:users match:full"));
        assert!(dump.contains("ins:log_mongo exp:log_[0-9]+ match:regex"));
    }
}
