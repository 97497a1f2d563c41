/// Instance registry and backend variant dispatch
///
/// The registry owns every backend instance handle, built once from the
/// configuration via a type-tag factory. Unsupported type tags and failing
/// backend constructors are logged and skipped; the router stays usable
/// with whatever instances survive. The map is read-only once construction
/// completes, so call-time lookups need no locking.
pub mod mongo;
pub mod sql;

use std::collections::HashMap;

use crate::config::{
    check_varname, InstanceConfig, DB_TYPE_MONGO, DB_TYPE_MYSQL, DB_TYPE_POSTGRES,
};

pub use mongo::{MongoInstance, ReadMode};
pub use sql::{Db, SqlInstance, SqlKind};

/// One configured backend instance, polymorphic over backend kind
pub enum Instance {
    Mongo(MongoInstance),
    Sql(SqlInstance),
}

impl Instance {
    /// Type tag as it appears in the configuration
    pub fn db_type(&self) -> &'static str {
        match self {
            Instance::Mongo(m) => m.db_type(),
            Instance::Sql(s) => s.db_type(),
        }
    }

    pub fn db_name(&self) -> &str {
        match self {
            Instance::Mongo(m) => m.db_name(),
            Instance::Sql(s) => s.db_name(),
        }
    }

    pub fn as_mongo(&self) -> Option<&MongoInstance> {
        match self {
            Instance::Mongo(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> Option<&SqlInstance> {
        match self {
            Instance::Sql(s) => Some(s),
            _ => None,
        }
    }
}

/// Name to instance map, read-only after construction
#[derive(Default)]
pub struct InstanceRegistry {
    instances: HashMap<String, Instance>,
}

impl InstanceRegistry {
    /// Insert an instance; a colliding name is overwritten. Last write
    /// wins: the source map is unordered, so collisions are a documented
    /// configuration ambiguity, not an error.
    pub fn add(&mut self, name: impl Into<String>, instance: Instance) {
        self.instances.insert(name.into(), instance);
    }

    pub fn get(&self, name: &str) -> Option<&Instance> {
        self.instances.get(name)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Build the registry from configuration, fail-soft per entry.
    ///
    /// Relational instances dial eagerly here; document-store instances
    /// only validate their dial parameters.
    pub async fn build(instances: &HashMap<String, InstanceConfig>) -> InstanceRegistry {
        let mut registry = InstanceRegistry::default();

        for (name, ins) in instances {
            if let Err(e) = check_varname(name) {
                log::error!("instance name config err:{e}");
                continue;
            }
            if let Err(e) = check_varname(&ins.dbtype) {
                log::error!("dbtype instance:{name} err:{e}");
                continue;
            }
            if let Err(e) = check_varname(&ins.dbname) {
                log::error!("dbname instance:{name} err:{e}");
                continue;
            }
            if ins.dbcfg.is_null() {
                log::error!("empty dbcfg instance:{name}");
                continue;
            }

            match ins.dbtype.as_str() {
                DB_TYPE_MONGO => match MongoInstance::from_config(&ins.dbname, &ins.dbcfg) {
                    Ok(m) => registry.add(name.clone(), Instance::Mongo(m)),
                    Err(e) => log::error!("init mongo instance:{name} err:{e}"),
                },
                DB_TYPE_MYSQL | DB_TYPE_POSTGRES => {
                    let kind = if ins.dbtype == DB_TYPE_MYSQL {
                        SqlKind::Mysql
                    } else {
                        SqlKind::Postgres
                    };
                    match SqlInstance::connect(kind, &ins.dbname, &ins.dbcfg).await {
                        Ok(s) => registry.add(name.clone(), Instance::Sql(s)),
                        Err(e) => log::error!("init sql instance:{name} err:{e}"),
                    }
                }
                other => log::error!("db type not support:{other} instance:{name}"),
            }
        }

        registry
    }
}
