//! Configuration checks run before a rule change is applied.

use shardroute_config::{BindingTableGroup, ShardingRuleConfig};

use crate::rule::Error;
use crate::sharding::AlgorithmRegistry;

pub mod binding;
pub mod statement;

/// Runs checks against a set of algorithm types.
#[derive(Debug, Clone, Default)]
pub struct Checker {
    registry: AlgorithmRegistry,
}

impl Checker {
    pub fn new(registry: AlgorithmRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &AlgorithmRegistry {
        &self.registry
    }
}

/// Would the binding groups be valid against the current configuration.
pub fn is_valid_binding_table_groups(
    groups: &[BindingTableGroup],
    current: &ShardingRuleConfig,
    data_sources: &[String],
) -> Result<bool, Error> {
    Checker::default().is_valid_binding_table_groups(groups, current, data_sources)
}

/// Check tables about to be created.
pub fn check_creation(
    created: &ShardingRuleConfig,
    current: &ShardingRuleConfig,
    data_sources: &[String],
    if_not_exists: bool,
) -> Result<(), Error> {
    Checker::default().check_creation(created, current, data_sources, if_not_exists)
}

/// Check tables about to be altered, including the binding groups they're in.
pub fn check_alteration(
    altered: &ShardingRuleConfig,
    current: &ShardingRuleConfig,
    data_sources: &[String],
) -> Result<(), Error> {
    Checker::default().check_alteration(altered, current, data_sources)
}
