//! Active configuration.
//!
//! The configuration and the rule compiled from it are published together
//! as one immutable snapshot. Changes build and validate a new snapshot
//! and swap it in; routing calls in flight keep the one they loaded.

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use shardroute_config::{Config, ShardingRuleConfig};
use tracing::{info, warn};

use crate::checker;
use crate::route::RouteEngine;
use crate::rule::{Error, ShardingRule};
use crate::sharding::HintContext;

static SNAPSHOT: Lazy<ArcSwap<Snapshot>> = Lazy::new(|| ArcSwap::from_pointee(Snapshot::empty()));

static LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Configuration and its compiled rule.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub config: Config,
    pub rule: Arc<ShardingRule>,
}

impl Snapshot {
    /// Compile the rule and validate binding groups.
    pub fn new(config: Config) -> Result<Self, Error> {
        let data_sources = config.data_source_names();
        let rule = ShardingRule::new(&config.sharding, &data_sources)?;

        let groups = &config.sharding.binding_tables;
        if !groups.is_empty()
            && !checker::is_valid_binding_table_groups(groups, &config.sharding, &data_sources)?
        {
            return Err(Error::InvalidBindingConfiguration(
                config.sharding.binding_table_names(),
            ));
        }

        Ok(Self {
            config,
            rule: Arc::new(rule),
        })
    }

    fn empty() -> Self {
        Self {
            rule: Arc::new(ShardingRule::empty()),
            config: Config::default(),
        }
    }

    pub fn engine(&self) -> RouteEngine {
        RouteEngine::new(self.rule.clone())
    }

    /// Hint context for a statement. Hints in comments are
    /// read only if enabled.
    pub fn hints(&self, sql: Option<&str>) -> HintContext {
        match sql {
            Some(sql) if self.config.general.sql_comment_hints => HintContext::new().with_sql(sql),
            _ => HintContext::new(),
        }
    }

    pub fn data_sources(&self) -> Vec<String> {
        self.config.data_source_names()
    }
}

/// Currently active snapshot.
pub fn snapshot() -> Arc<Snapshot> {
    SNAPSHOT.load().clone()
}

/// Load the configuration file from disk and activate it.
pub fn load(path: impl AsRef<Path>) -> Result<Arc<Snapshot>, Error> {
    let config = Config::load(path)?;
    set(config)
}

/// Activate a configuration. On error, the active snapshot stays.
pub fn set(config: Config) -> Result<Arc<Snapshot>, Error> {
    let _lock = LOCK.lock();
    publish(config)
}

/// Replace table rules, checking the change first.
pub fn alter(altered: &ShardingRuleConfig) -> Result<Arc<Snapshot>, Error> {
    let _lock = LOCK.lock();
    let current = snapshot();

    checker::check_alteration(altered, &current.config.sharding, &current.data_sources())?;

    let mut config = current.config.clone();
    config.sharding = current.config.sharding.altered(altered);
    publish(config)
}

/// Add table rules, checking them first. With `if_not_exists`,
/// tables that already exist are left as they are.
pub fn create(created: &ShardingRuleConfig, if_not_exists: bool) -> Result<Arc<Snapshot>, Error> {
    let _lock = LOCK.lock();
    let current = snapshot();
    let sharding = &current.config.sharding;

    checker::check_creation(created, sharding, &current.data_sources(), if_not_exists)?;

    let mut created = created.clone();
    created.tables.retain(|t| !sharding.contains_table(&t.logic_table));
    created
        .auto_tables
        .retain(|t| !sharding.contains_table(&t.logic_table));

    let mut config = current.config.clone();
    config.sharding = sharding.altered(&created);
    publish(config)
}

fn publish(config: Config) -> Result<Arc<Snapshot>, Error> {
    let snapshot = match Snapshot::new(config) {
        Ok(snapshot) => Arc::new(snapshot),
        Err(err) => {
            warn!("configuration rejected: {}", err);
            return Err(err);
        }
    };

    SNAPSHOT.store(snapshot.clone());
    info!(
        "sharding rule activated [tables: {}, data sources: {}]",
        snapshot.config.sharding.logic_tables().len(),
        snapshot.config.data_sources.len()
    );

    Ok(snapshot)
}
