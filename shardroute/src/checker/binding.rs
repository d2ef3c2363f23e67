//! Binding table groups.
//!
//! Tables can only be bound if a row with the same sharding value
//! lands on the same data source and the same table suffix in all of them.
//! That requires identical topology and algorithms that shard the same way,
//! which is decided by comparing algorithm structures.

use std::collections::HashSet;

use indexmap::IndexMap;
use shardroute_config::{BindingTableGroup, ShardingRuleConfig};
use tracing::debug;

use super::Checker;
use crate::rule::{
    create_algorithms, create_tables, effective_strategy, Algorithms, Dimension, Error,
    ShardingTable,
};

impl Checker {
    /// Check the groups against a copy of the current configuration.
    /// The configuration passed in is left as-is.
    pub fn is_valid_binding_table_groups(
        &self,
        groups: &[BindingTableGroup],
        current: &ShardingRuleConfig,
        data_sources: &[String],
    ) -> Result<bool, Error> {
        let mut checked = current.clone();
        checked.binding_tables = groups.to_vec();
        self.check_binding(&checked, data_sources)
    }

    /// Check every binding group of the configuration.
    pub(super) fn check_binding(
        &self,
        config: &ShardingRuleConfig,
        data_sources: &[String],
    ) -> Result<bool, Error> {
        let algorithms = create_algorithms(config, self.registry())?;
        let tables = create_tables(config, data_sources, &algorithms)?;

        for group in &config.binding_tables {
            let members = group
                .tables()
                .iter()
                .map(|t| t.to_lowercase())
                .collect::<Vec<_>>();

            if members.len() <= 1 {
                debug!("binding group \"{}\" has less than 2 tables", group);
                return Ok(false);
            }

            let sample = table(&members[0], &tables)?;
            for member in &members[1..] {
                let table = table(member, &tables)?;

                let valid = same_data_sources(sample, table)
                    && same_suffixes(sample, table)
                    && same_structure(sample, table, Dimension::Database, config, &algorithms)
                    && same_structure(sample, table, Dimension::Table, config, &algorithms);

                if !valid {
                    debug!(
                        "\"{}\" and \"{}\" can't be bound",
                        sample.logic_table, table.logic_table
                    );
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }
}

fn table<'a>(
    name: &str,
    tables: &'a IndexMap<String, ShardingTable>,
) -> Result<&'a ShardingTable, Error> {
    tables
        .get(name)
        .ok_or_else(|| Error::MissingLogicTable(vec![name.to_string()]))
}

fn same_data_sources(sample: &ShardingTable, table: &ShardingTable) -> bool {
    sample.actual_data_sources == table.actual_data_sources
}

fn same_suffixes(sample: &ShardingTable, table: &ShardingTable) -> bool {
    sample.actual_data_sources.iter().all(|data_source| {
        let suffixes = |table: &ShardingTable| {
            table
                .actual_tables(data_source)
                .map(|tables| {
                    tables
                        .iter()
                        .map(|name| table.table_info.suffix(name).to_string())
                        .collect::<HashSet<_>>()
                })
                .unwrap_or_default()
        };
        suffixes(sample) == suffixes(table)
    })
}

/// Unsharded dimensions match each other; anything else needs
/// structures reported by the algorithms, and they must be equal.
fn same_structure(
    sample: &ShardingTable,
    table: &ShardingTable,
    dimension: Dimension,
    config: &ShardingRuleConfig,
    algorithms: &Algorithms,
) -> bool {
    let sample_strategy = effective_strategy(sample, dimension, config);
    let strategy = effective_strategy(table, dimension, config);

    if sample_strategy.is_none() && strategy.is_none() {
        return true;
    }

    match (
        structure(sample, dimension, config, algorithms),
        structure(table, dimension, config, algorithms),
    ) {
        (Some(left), Some(right)) => left == right,
        _ => false,
    }
}

fn structure(
    table: &ShardingTable,
    dimension: Dimension,
    config: &ShardingRuleConfig,
    algorithms: &Algorithms,
) -> Option<String> {
    let strategy = effective_strategy(table, dimension, config);
    let algorithm = algorithms.get(strategy.algorithm()?)?;
    let prefix = match dimension {
        Dimension::Database => &table.data_source_info.prefix,
        Dimension::Table => &table.table_info.prefix,
    };
    let column = strategy.column_label(config.default_sharding_column.as_deref());

    algorithm.structure(prefix, &column)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::checker::is_valid_binding_table_groups;
    use crate::rule::test::{config, data_sources};
    use shardroute_config::{AlgorithmConfig, AutoTableRuleConfig, ShardingStrategyConfig};

    fn groups(groups: &[&str]) -> Vec<BindingTableGroup> {
        groups.iter().map(BindingTableGroup::new).collect()
    }

    #[test]
    fn test_valid_group() {
        let config = config();
        for group in ["t_order, t_order_item", " T_ORDER_ITEM ,t_order"] {
            assert!(
                is_valid_binding_table_groups(&groups(&[group]), &config, &data_sources()).unwrap()
            );
        }
        // Input isn't touched.
        assert_eq!(config, crate::rule::test::config());
    }

    #[test]
    fn test_single_table_group() {
        assert!(
            !is_valid_binding_table_groups(&groups(&["t_order"]), &config(), &data_sources())
                .unwrap()
        );
        assert!(!is_valid_binding_table_groups(
            &groups(&["t_order, t_order_item", ""]),
            &config(),
            &data_sources()
        )
        .unwrap());
    }

    #[test]
    fn test_different_data_sources() {
        let mut config = config();
        config.tables[1].actual_data_nodes = Some("ds_0.t_order_item_${0..1}".into());

        for group in ["t_order, t_order_item", "t_order_item, t_order"] {
            assert!(
                !is_valid_binding_table_groups(&groups(&[group]), &config, &data_sources())
                    .unwrap()
            );
        }
    }

    #[test]
    fn test_different_suffixes() {
        let mut config = config();
        config.tables[1].actual_data_nodes = Some("ds_${0..1}.t_order_item_${1..2}".into());
        assert!(!is_valid_binding_table_groups(
            &groups(&["t_order, t_order_item"]),
            &config,
            &data_sources()
        )
        .unwrap());
    }

    #[test]
    fn test_different_algorithms() {
        let mut config = config();
        config.algorithms.insert(
            "t_order_item_inline".into(),
            AlgorithmConfig::new("inline")
                .prop("algorithm_expression", "t_order_item_${(order_id + 1) % 2}"),
        );

        for group in ["t_order, t_order_item", "t_order_item, t_order"] {
            assert!(
                !is_valid_binding_table_groups(&groups(&[group]), &config, &data_sources())
                    .unwrap()
            );
        }

        // Same expression on another column.
        let mut config = crate::rule::test::config();
        config.tables[1].table_strategy =
            Some(ShardingStrategyConfig::standard("item_id", "t_order_item_inline"));
        config.algorithms.insert(
            "t_order_item_inline".into(),
            AlgorithmConfig::new("inline")
                .prop("algorithm_expression", "t_order_item_${item_id % 2}"),
        );
        assert!(is_valid_binding_table_groups(
            &groups(&["t_order, t_order_item"]),
            &config,
            &data_sources()
        )
        .unwrap());
    }

    #[test]
    fn test_missing_algorithm() {
        let mut config = config();
        for table in config.tables.iter_mut() {
            table.table_strategy = Some(ShardingStrategyConfig::standard("order_id", "missing"));
        }
        assert!(!is_valid_binding_table_groups(
            &groups(&["t_order, t_order_item"]),
            &config,
            &data_sources()
        )
        .unwrap());
    }

    #[test]
    fn test_auto_tables() {
        let mut config = config();
        config.auto_tables.push(AutoTableRuleConfig {
            logic_table: "t_user_detail".into(),
            actual_data_sources: "ds_${0..1}".into(),
            sharding_strategy: ShardingStrategyConfig::standard("user_id", "mod_4"),
        });
        assert!(is_valid_binding_table_groups(
            &groups(&["t_user, t_user_detail"]),
            &config,
            &data_sources()
        )
        .unwrap());

        config.algorithms.insert(
            "mod_4_again".into(),
            AlgorithmConfig::new("mod").prop("sharding_count", 4),
        );
        config.auto_tables[1].sharding_strategy =
            ShardingStrategyConfig::standard("user_id", "mod_4_again");
        assert!(is_valid_binding_table_groups(
            &groups(&["t_user, t_user_detail"]),
            &config,
            &data_sources()
        )
        .unwrap());

        config.algorithms.insert(
            "hash_4".into(),
            AlgorithmConfig::new("hash_mod").prop("sharding_count", 4),
        );
        config.auto_tables[1].sharding_strategy =
            ShardingStrategyConfig::standard("user_id", "hash_4");
        assert!(!is_valid_binding_table_groups(
            &groups(&["t_user, t_user_detail"]),
            &config,
            &data_sources()
        )
        .unwrap());
    }

    #[test]
    fn test_missing_table() {
        match is_valid_binding_table_groups(
            &groups(&["t_order, t_missing"]),
            &config(),
            &data_sources(),
        ) {
            Err(Error::MissingLogicTable(tables)) => assert_eq!(tables, vec!["t_missing"]),
            other => panic!("expected missing table, got {:?}", other),
        }

        // A trailing comma names an empty table.
        match is_valid_binding_table_groups(&groups(&["t_order,"]), &config(), &data_sources()) {
            Err(Error::MissingLogicTable(tables)) => assert_eq!(tables, vec![""]),
            other => panic!("expected missing table, got {:?}", other),
        }
    }
}
