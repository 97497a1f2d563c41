/// MongoDB backend instance with a lazy per-consistency session cache
///
/// A `MongoInstance` holds dial parameters and three session slots, one
/// per read-consistency mode. Slots are populated lazily: the first caller
/// that needs a mode dials it, every later caller gets the cached client.
/// `tokio::sync::OnceCell` gives the check/lock/re-check discipline:
/// at most one dial per (instance, mode) can ever succeed, and a
/// failed dial leaves the slot empty so the caller's own retry re-enters
/// the same lazy path.
use mongodb::bson::{doc, Document};
use mongodb::options::{
    ClientOptions, Credential, ReadConcern, ReadPreference, SelectionCriteria, ServerAddress,
};
use mongodb::{Client, Collection};
use std::future::Future;
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::config::{DbConfig, DB_TYPE_MONGO};
use crate::error::{ConfigError, Error};

/// Requested read-visibility guarantee for a document-store operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Most available, weakest ordering
    Eventual = 0,
    /// Session-local read stickiness
    Monotonic = 1,
    /// Always-latest, least available under partition
    Strong = 2,
}

impl ReadMode {
    fn slot(self) -> usize {
        self as usize
    }
}

pub struct MongoInstance {
    db_name: String,
    addrs: Vec<ServerAddress>,
    timeout: Duration,
    user: String,
    passwd: String,
    sessions: [OnceCell<Client>; 3],
}

impl MongoInstance {
    /// Validate dial parameters; no network activity happens here.
    pub fn from_config(dbname: &str, dbcfg: &serde_json::Value) -> Result<MongoInstance, ConfigError> {
        let cfg = DbConfig::from_value(dbname, dbcfg)?;
        if cfg.addrs.is_empty() {
            return Err(ConfigError::MissingField {
                field: "addrs",
                dbname: dbname.to_string(),
            });
        }

        let addrs = cfg
            .addrs
            .iter()
            .map(|a| ServerAddress::parse(a))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::InvalidValue {
                field: "addrs",
                dbname: dbname.to_string(),
                reason: e.to_string(),
            })?;

        Ok(MongoInstance {
            db_name: dbname.to_string(),
            addrs,
            timeout: cfg.dial_timeout(),
            user: cfg.user,
            passwd: cfg.passwd,
            sessions: [OnceCell::new(), OnceCell::new(), OnceCell::new()],
        })
    }

    pub fn db_type(&self) -> &'static str {
        DB_TYPE_MONGO
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Cached session for the mode, dialing it on first use
    pub async fn session(&self, mode: ReadMode) -> Result<&Client, Error> {
        self.session_with(mode, || self.dial(mode)).await
    }

    /// Session lookup with the dial supplied by the caller. Concurrent
    /// first users of a slot race here; the cell admits exactly one dial
    /// and parks the rest until it resolves.
    async fn session_with<F, Fut>(&self, mode: ReadMode, dial: F) -> Result<&Client, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Client, Error>>,
    {
        self.sessions[mode.slot()].get_or_try_init(dial).await
    }

    /// Cheap per-call duplicate bound to the target table, sharing the
    /// cached session's connection topology. Ownership guarantees release
    /// on every exit path.
    pub fn collection(&self, client: &Client, table: &str) -> Collection<Document> {
        client.database(&self.db_name).collection::<Document>(table)
    }

    async fn dial(&self, mode: ReadMode) -> Result<Client, Error> {
        let mut opts = ClientOptions::builder().hosts(self.addrs.clone()).build();
        opts.connect_timeout = Some(self.timeout);
        opts.server_selection_timeout = Some(self.timeout);
        opts.default_database = Some(self.db_name.clone());

        let (preference, concern) = match mode {
            ReadMode::Eventual => (
                ReadPreference::Nearest {
                    options: Default::default(),
                },
                ReadConcern::local(),
            ),
            ReadMode::Monotonic => (
                ReadPreference::PrimaryPreferred {
                    options: Default::default(),
                },
                ReadConcern::local(),
            ),
            ReadMode::Strong => (ReadPreference::Primary, ReadConcern::majority()),
        };
        opts.selection_criteria = Some(SelectionCriteria::ReadPreference(preference));
        opts.read_concern = Some(concern);

        if !self.user.is_empty() {
            opts.credential = Some(
                Credential::builder()
                    .username(self.user.clone())
                    .password(self.passwd.clone())
                    .build(),
            );
        }

        let client = Client::with_options(opts)?;
        // Client construction is lazy; ping so connectivity failures
        // surface here, on first use, instead of inside the first query.
        client
            .database(&self.db_name)
            .run_command(doc! { "ping": 1 }, None)
            .await?;

        log::info!(
            "mongo session established db:{} mode:{:?}",
            self.db_name,
            mode
        );
        Ok(client)
    }
}
