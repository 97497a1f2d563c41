/// Route resolution engine
///
/// Maps a (cluster, table) pair to an instance name through per-cluster
/// lookup rules. Resolution is two-pass: every Full rule is checked first
/// and an exact table-name match wins outright, then Regex rules are
/// scanned in registration order with the pattern anchored to the whole
/// table name. Resolution never blocks, never mutates, and reports a miss
/// as `None` rather than an error.
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::config::{check_varname, LookupConfig};
use crate::error::ConfigError;
use crate::instance::InstanceRegistry;

/// How a lookup rule matches table names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Full,
    Regex,
}

impl MatchKind {
    fn parse(s: &str) -> Option<MatchKind> {
        match s {
            "full" => Some(MatchKind::Full),
            "regex" => Some(MatchKind::Regex),
            _ => None,
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchKind::Full => write!(f, "full"),
            MatchKind::Regex => write!(f, "regex"),
        }
    }
}

/// One validated lookup rule, immutable once built
#[derive(Debug, Clone, Serialize)]
pub struct LookupRule {
    pub instance: String,
    #[serde(rename = "match")]
    pub kind: MatchKind,
    pub express: String,
    /// Compiled once at construction; `None` for Full rules
    #[serde(skip)]
    pattern: Option<Regex>,
}

impl LookupRule {
    /// Validate and build a rule from its wire form
    fn from_config(cfg: &LookupConfig) -> Result<LookupRule, ConfigError> {
        if cfg.express.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "express",
                dbname: cfg.instance.clone(),
                reason: "is empty".to_string(),
            });
        }
        check_varname(&cfg.match_kind)?;
        check_varname(&cfg.instance)?;

        let kind = MatchKind::parse(&cfg.match_kind).ok_or_else(|| ConfigError::InvalidValue {
            field: "match",
            dbname: cfg.instance.clone(),
            reason: format!("unknown match kind {:?}", cfg.match_kind),
        })?;

        // Anchor the expression so the whole table name must be hit.
        let pattern = match kind {
            MatchKind::Full => None,
            MatchKind::Regex => Some(
                Regex::new(&format!("^(?:{})$", cfg.express)).map_err(|e| {
                    ConfigError::InvalidValue {
                        field: "express",
                        dbname: cfg.instance.clone(),
                        reason: e.to_string(),
                    }
                })?,
            ),
        };

        Ok(LookupRule {
            instance: cfg.instance.clone(),
            kind,
            express: cfg.express.clone(),
            pattern,
        })
    }

    /// Whether this rule covers the given table name
    pub fn matches(&self, table: &str) -> bool {
        match self.kind {
            MatchKind::Full => self.express == table,
            MatchKind::Regex => self
                .pattern
                .as_ref()
                .is_some_and(|re| re.is_match(table)),
        }
    }
}

impl fmt::Display for LookupRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ins:{} exp:{} match:{}",
            self.instance, self.express, self.kind
        )
    }
}

/// Ordered lookup rules of one cluster
#[derive(Debug, Default)]
pub struct Cluster {
    rules: Vec<LookupRule>,
}

impl Cluster {
    fn push(&mut self, rule: LookupRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[LookupRule] {
        &self.rules
    }

    /// Find the winning rule for a table name: Full rules beat any Regex
    /// rule, Regex ties break by registration order.
    pub fn lookup(&self, table: &str) -> Option<&LookupRule> {
        if let Some(rule) = self
            .rules
            .iter()
            .find(|r| r.kind == MatchKind::Full && r.matches(table))
        {
            return Some(rule);
        }
        self.rules
            .iter()
            .find(|r| r.kind == MatchKind::Regex && r.matches(table))
    }
}

/// Immutable cluster-name to rule-list table
#[derive(Debug, Default)]
pub struct ClusterTable {
    clusters: HashMap<String, Cluster>,
}

impl ClusterTable {
    /// Build the table, fail-soft: invalid cluster names, invalid rules and
    /// rules naming unregistered instances are logged and skipped.
    pub fn build(
        cfg: &HashMap<String, Vec<LookupConfig>>,
        registry: &InstanceRegistry,
    ) -> ClusterTable {
        let mut table = ClusterTable::default();

        for (name, rules) in cfg {
            if let Err(e) = check_varname(name) {
                log::error!("cluster name config err:{e}");
                continue;
            }
            if rules.is_empty() {
                log::warn!("empty rule list in cluster:{name}");
                continue;
            }

            let mut cluster = Cluster::default();
            for rule_cfg in rules {
                let rule = match LookupRule::from_config(rule_cfg) {
                    Ok(rule) => rule,
                    Err(e) => {
                        log::error!("lookup rule in cluster:{name} err:{e}");
                        continue;
                    }
                };
                if registry.get(&rule.instance).is_none() {
                    log::error!(
                        "in cluster:{name} instance:{} not found",
                        rule.instance
                    );
                    continue;
                }
                cluster.push(rule);
            }
            // A cluster whose every rule was dropped is not registered,
            // so an all-bad document still reads as an empty table.
            if cluster.rules().is_empty() {
                log::warn!("no usable rule survived in cluster:{name}");
                continue;
            }
            table.clusters.insert(name.clone(), cluster);
        }

        table
    }

    /// Winning rule for diagnostics, or `None` if nothing matched
    pub fn lookup(&self, cluster: &str, table: &str) -> Option<&LookupRule> {
        self.clusters.get(cluster)?.lookup(table)
    }

    /// Instance name serving the table, or `None` if nothing matched
    pub fn resolve(&self, cluster: &str, table: &str) -> Option<&str> {
        self.lookup(cluster, table).map(|r| r.instance.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

impl fmt::Display for ClusterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, cluster) in &self.clusters {
            for rule in cluster.rules() {
                writeln!(f, "cluster:{name} {rule}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(instance: &str, kind: &str, express: &str) -> LookupConfig {
        LookupConfig {
            instance: instance.to_string(),
            match_kind: kind.to_string(),
            express: express.to_string(),
        }
    }

    fn cluster_of(rules: Vec<LookupConfig>) -> Cluster {
        let mut cluster = Cluster::default();
        for cfg in &rules {
            cluster.push(LookupRule::from_config(cfg).unwrap());
        }
        cluster
    }

    #[test]
    fn test_full_beats_regex() {
        // The regex rule also covers "users", but the full rule wins even
        // though it is registered later.
        let cluster = cluster_of(vec![
            rule("regex_ins", "regex", "user.*"),
            rule("full_ins", "full", "users"),
        ]);
        assert_eq!(cluster.lookup("users").unwrap().instance, "full_ins");
    }

    #[test]
    fn test_regex_order_breaks_ties() {
        let cluster = cluster_of(vec![
            rule("first", "regex", "log_[0-9]+"),
            rule("second", "regex", "log_.*"),
        ]);
        assert_eq!(cluster.lookup("log_42").unwrap().instance, "first");
        assert_eq!(cluster.lookup("log_archive").unwrap().instance, "second");
    }

    #[test]
    fn test_regex_is_anchored() {
        let cluster = cluster_of(vec![rule("ins", "regex", "log_[0-9]+")]);
        assert!(cluster.lookup("log_7").is_some());
        assert!(cluster.lookup("xlog_7").is_none());
        assert!(cluster.lookup("log_7x").is_none());
        assert!(cluster.lookup("log_").is_none());
    }

    #[test]
    fn test_no_match_is_none() {
        let cluster = cluster_of(vec![rule("ins", "full", "users")]);
        assert!(cluster.lookup("orders").is_none());
    }

    #[test]
    fn test_rule_validation() {
        assert!(LookupRule::from_config(&rule("ins", "full", "")).is_err());
        assert!(LookupRule::from_config(&rule("ins", "", "x")).is_err());
        assert!(LookupRule::from_config(&rule("ins", "prefix", "x")).is_err());
        assert!(LookupRule::from_config(&rule("", "full", "x")).is_err());
        // Invalid regex is rejected at construction, not at match time.
        assert!(LookupRule::from_config(&rule("ins", "regex", "ab[")).is_err());
    }

    #[test]
    fn test_cluster_with_no_surviving_rules_is_absent() {
        // Every rule names an unregistered instance, so the cluster itself
        // must not be registered and the table stays empty.
        let mut cfg = HashMap::new();
        cfg.insert(
            "ACCOUNT".to_string(),
            vec![
                rule("ghost_ins", "full", "users"),
                rule("ghost_ins", "regex", "log_[0-9]+"),
            ],
        );
        let table = ClusterTable::build(&cfg, &InstanceRegistry::default());
        assert!(table.is_empty());
        assert!(table.lookup("ACCOUNT", "users").is_none());
    }

    #[test]
    fn test_unknown_cluster_resolves_none() {
        let table = ClusterTable::default();
        assert!(table.resolve("NOPE", "users").is_none());
        assert!(table.lookup("NOPE", "users").is_none());
    }

    #[test]
    fn test_rule_serialization() {
        let rule = LookupRule::from_config(&rule("account_mongo", "regex", "log_.*")).unwrap();
        let js = serde_json::to_string(&rule).unwrap();
        assert!(js.contains("\"instance\":\"account_mongo\""));
        assert!(js.contains("\"match\":\"regex\""));
        assert!(js.contains("\"express\":\"log_.*\""));
        // The compiled pattern stays internal.
        assert!(!js.contains("pattern"));
    }

    #[test]
    fn test_rule_display() {
        let rule = LookupRule::from_config(&rule("ins", "full", "users")).unwrap();
        assert_eq!(rule.to_string(), "ins:ins exp:users match:full");
    }
}
