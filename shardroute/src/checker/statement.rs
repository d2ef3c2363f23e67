//! Checks for statements creating or altering sharded tables.

use indexmap::IndexSet;
use shardroute_config::{ShardingRuleConfig, ShardingStrategyConfig};
use tracing::debug;

use super::Checker;
use crate::rule::{create_algorithms, Algorithms, Dimension, Error, ShardingTable};
use crate::sharding::{algorithm::Inline, split_and_evaluate, DataNode, DataNodeInfo, ShardingValue};

impl Checker {
    /// Tables in `created` are about to be added to `current`.
    pub fn check_creation(
        &self,
        created: &ShardingRuleConfig,
        current: &ShardingRuleConfig,
        data_sources: &[String],
        if_not_exists: bool,
    ) -> Result<(), Error> {
        check_names(created, current, Some(if_not_exists))?;
        self.check_tables(created, current, data_sources)
    }

    /// Tables in `altered` are about to replace their definitions in `current`.
    pub fn check_alteration(
        &self,
        altered: &ShardingRuleConfig,
        current: &ShardingRuleConfig,
        data_sources: &[String],
    ) -> Result<(), Error> {
        check_names(altered, current, None)?;
        self.check_tables(altered, current, data_sources)?;
        self.check_altered_binding(altered, current, data_sources)
    }

    fn check_tables(
        &self,
        statement: &ShardingRuleConfig,
        current: &ShardingRuleConfig,
        data_sources: &[String],
    ) -> Result<(), Error> {
        check_data_sources(statement, data_sources)?;

        // Algorithms declared by the statement shadow existing ones.
        let merged = current.altered(statement);
        let algorithms = create_algorithms(&merged, self.registry())?;
        let default_column = merged.default_sharding_column.as_deref();

        for table in &statement.auto_tables {
            let name = table.sharding_strategy.algorithm().unwrap_or_default();
            let algorithm = algorithms
                .get(name)
                .ok_or_else(|| Error::AlgorithmNotFound {
                    table: table.logic_table.clone(),
                    algorithm: name.to_string(),
                })?;
            if !algorithm.is_auto() {
                return Err(Error::InvalidAlgorithmAssignment {
                    table: table.logic_table.clone(),
                    reason: format!("auto sharding algorithm is required, \"{}\" isn't", name),
                });
            }
        }

        for config in &statement.tables {
            let table = ShardingTable::from_config(config, data_sources)?;

            if let Some(strategy) = &config.database_strategy {
                check_strategy(
                    &table,
                    Dimension::Database,
                    strategy,
                    &merged,
                    &algorithms,
                    default_column,
                )?;
            }
            if let Some(strategy) = &config.table_strategy {
                check_strategy(
                    &table,
                    Dimension::Table,
                    strategy,
                    &merged,
                    &algorithms,
                    default_column,
                )?;
            }
        }

        Ok(())
    }

    /// Re-check binding groups that contain an altered table
    /// against the configuration as it would be after the change.
    fn check_altered_binding(
        &self,
        altered: &ShardingRuleConfig,
        current: &ShardingRuleConfig,
        data_sources: &[String],
    ) -> Result<(), Error> {
        if current.binding_tables.is_empty() {
            return Ok(());
        }

        let binding_tables = current.binding_table_names();
        if binding_tables.len() <= 1 {
            return Ok(());
        }

        let altered_tables = altered.logic_tables();
        let affected = altered_tables
            .iter()
            .any(|t| binding_tables.iter().any(|b| b.eq_ignore_ascii_case(t)));
        if !affected {
            return Ok(());
        }

        let checked = current.altered(altered);
        if self.check_binding(&checked, data_sources)? {
            Ok(())
        } else {
            debug!("alteration of [{}] breaks binding groups", altered_tables.join(", "));
            Err(Error::InvalidBindingConfiguration(altered_tables))
        }
    }
}

/// `if_not_exists` is `Some` when creating.
fn check_names(
    statement: &ShardingRuleConfig,
    current: &ShardingRuleConfig,
    if_not_exists: Option<bool>,
) -> Result<(), Error> {
    let names = statement.logic_tables();

    let mut seen = IndexSet::new();
    let mut duplicates = IndexSet::new();
    for name in &names {
        if !seen.insert(name.to_lowercase()) {
            duplicates.insert(name.to_lowercase());
        }
    }
    if !duplicates.is_empty() {
        return Err(Error::DuplicateRule(duplicates.into_iter().collect()));
    }

    match if_not_exists {
        Some(false) => {
            let existing = names
                .iter()
                .filter(|n| current.contains_table(n))
                .cloned()
                .collect::<Vec<_>>();
            if !existing.is_empty() {
                return Err(Error::DuplicateRule(existing));
            }
        }
        Some(true) => (),
        None => {
            let missing = names
                .iter()
                .filter(|n| !current.contains_table(n))
                .cloned()
                .collect::<Vec<_>>();
            if !missing.is_empty() {
                return Err(Error::MissingRule(missing));
            }
        }
    }

    Ok(())
}

/// Data sources the statement's tables are placed in.
fn required_data_sources(statement: &ShardingRuleConfig) -> Result<IndexSet<String>, Error> {
    let mut required = IndexSet::new();

    for table in &statement.tables {
        let Some(nodes) = table
            .actual_data_nodes
            .as_deref()
            .filter(|n| !n.trim().is_empty())
        else {
            continue;
        };
        for node in split_and_evaluate(nodes)? {
            match DataNode::parse(&node) {
                Ok(node) => required.insert(node.data_source),
                Err(_) => required.insert(node),
            };
        }
    }

    for table in &statement.auto_tables {
        required.extend(split_and_evaluate(&table.actual_data_sources)?);
    }

    Ok(required)
}

fn check_data_sources(
    statement: &ShardingRuleConfig,
    data_sources: &[String],
) -> Result<(), Error> {
    let missing = required_data_sources(statement)?
        .into_iter()
        .filter(|ds| !data_sources.iter().any(|d| d.eq_ignore_ascii_case(ds)))
        .collect::<Vec<_>>();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::MissingDataSources(missing))
    }
}

fn check_strategy(
    table: &ShardingTable,
    dimension: Dimension,
    strategy: &ShardingStrategyConfig,
    config: &ShardingRuleConfig,
    algorithms: &Algorithms,
    default_column: Option<&str>,
) -> Result<(), Error> {
    let invalid = |reason: String| Error::InvalidAlgorithmAssignment {
        table: table.logic_table.clone(),
        reason,
    };

    let Some(name) = strategy.algorithm() else {
        // Unsharded dimension, only possible with a single target.
        return match dimension {
            Dimension::Database if table.actual_data_sources.len() > 1 => Err(invalid(format!(
                "database strategy is none, but data nodes span {} data sources",
                table.actual_data_sources.len()
            ))),
            Dimension::Table if table.actual_table_names().len() > 1 => Err(invalid(format!(
                "table strategy is none, but data nodes have {} tables",
                table.actual_table_names().len()
            ))),
            _ => Ok(()),
        };
    };

    let algorithm = algorithms
        .get(name)
        .ok_or_else(|| Error::AlgorithmNotFound {
            table: table.logic_table.clone(),
            algorithm: name.to_string(),
        })?;

    if algorithm.is_auto() {
        return Err(invalid(format!(
            "auto sharding algorithm \"{}\" can't be used by a table with explicit data nodes",
            name
        )));
    }

    let columns = strategy.columns(default_column);
    let needs_column = matches!(
        strategy,
        ShardingStrategyConfig::Standard { .. } | ShardingStrategyConfig::Complex { .. }
    );
    if needs_column && columns.is_empty() {
        return Err(Error::InvalidStrategy {
            table: table.logic_table.clone(),
            dimension: dimension.as_str(),
            reason: "sharding column is required".into(),
        });
    }

    let is_inline = config
        .algorithms
        .get(name)
        .map(|a| a.kind.eq_ignore_ascii_case(Inline::KIND))
        .unwrap_or(false);
    if is_inline {
        let info = match dimension {
            Dimension::Database => &table.data_source_info,
            Dimension::Table => &table.table_info,
        };
        check_inline_expression(table, name, &columns, config, info)?;
    }

    Ok(())
}

/// An inline expression must produce names that look like the data nodes.
fn check_inline_expression(
    table: &ShardingTable,
    name: &str,
    columns: &[String],
    config: &ShardingRuleConfig,
    info: &DataNodeInfo,
) -> Result<(), Error> {
    let (Some(algorithm), Some(column)) = (config.algorithms.get(name), columns.first()) else {
        return Ok(());
    };

    let evaluated = Inline::new(&algorithm.props)
        .and_then(|inline| inline.evaluate(column, &ShardingValue::Integer(1)));

    match evaluated {
        Ok(result) if !result.to_lowercase().starts_with(&info.prefix.to_lowercase()) => {
            Err(Error::InvalidAlgorithmAssignment {
                table: table.logic_table.clone(),
                reason: format!(
                    "inline expression \"{}\" doesn't match the actual data nodes",
                    result
                ),
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::checker::{check_alteration, check_creation};
    use crate::rule::test::{config, data_sources};
    use shardroute_config::{AlgorithmConfig, AutoTableRuleConfig, TableRuleConfig};

    fn statement(tables: Vec<TableRuleConfig>) -> ShardingRuleConfig {
        ShardingRuleConfig {
            tables,
            ..Default::default()
        }
    }

    fn t_new() -> TableRuleConfig {
        TableRuleConfig {
            logic_table: "t_new".into(),
            actual_data_nodes: Some("ds_${0..1}.t_new_${0..1}".into()),
            database_strategy: Some(ShardingStrategyConfig::standard(
                "order_id",
                "database_inline",
            )),
            table_strategy: Some(ShardingStrategyConfig::standard("order_id", "t_new_inline")),
        }
    }

    fn created() -> ShardingRuleConfig {
        let mut created = statement(vec![t_new()]);
        created.algorithms.insert(
            "t_new_inline".into(),
            AlgorithmConfig::new("inline").prop("algorithm_expression", "t_new_${order_id % 2}"),
        );
        created
    }

    #[test]
    fn test_create() {
        check_creation(&created(), &config(), &data_sources(), false).unwrap();
    }

    #[test]
    fn test_duplicate_rule() {
        let mut twice = created();
        let mut duplicate = t_new();
        duplicate.logic_table = "T_NEW".into();
        twice.tables.push(duplicate);
        match check_creation(&twice, &config(), &data_sources(), true) {
            Err(Error::DuplicateRule(names)) => assert_eq!(names, vec!["t_new"]),
            other => panic!("expected duplicate rule, got {:?}", other),
        }

        let mut existing = created();
        existing.tables[0].logic_table = "T_ORDER".into();
        existing.tables[0].actual_data_nodes = Some("ds_${0..1}.t_order_${0..1}".into());
        existing.tables[0].table_strategy =
            Some(ShardingStrategyConfig::standard("order_id", "t_order_inline"));
        assert!(matches!(
            check_creation(&existing, &config(), &data_sources(), false),
            Err(Error::DuplicateRule(_))
        ));
        check_creation(&existing, &config(), &data_sources(), true).unwrap();
    }

    #[test]
    fn test_missing_rule() {
        match check_alteration(&created(), &config(), &data_sources()) {
            Err(Error::MissingRule(names)) => assert_eq!(names, vec!["t_new"]),
            other => panic!("expected missing rule, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_data_sources() {
        // Data source names ignore case.
        let upper = vec!["DS_0".to_string(), "DS_1".to_string()];
        check_creation(&created(), &config(), &upper, false).unwrap();

        let mut created = created();
        created.tables[0].actual_data_nodes = Some("ds_${0..2}.t_new_${0..1}".into());
        created.auto_tables.push(AutoTableRuleConfig {
            logic_table: "t_auto".into(),
            actual_data_sources: "ds_0, ds_3".into(),
            sharding_strategy: ShardingStrategyConfig::standard("id", "mod_4"),
        });
        match check_creation(&created, &config(), &data_sources(), false) {
            Err(Error::MissingDataSources(names)) => assert_eq!(names, vec!["ds_2", "ds_3"]),
            other => panic!("expected missing data sources, got {:?}", other),
        }
    }

    #[test]
    fn test_none_strategy() {
        let mut created = created();
        created.tables[0].database_strategy = Some(ShardingStrategyConfig::None);
        assert!(matches!(
            check_creation(&created, &config(), &data_sources(), false),
            Err(Error::InvalidAlgorithmAssignment { .. })
        ));

        created.tables[0].actual_data_nodes = Some("ds_0.t_new_${0..1}".into());
        check_creation(&created, &config(), &data_sources(), false).unwrap();

        created.tables[0].table_strategy = Some(ShardingStrategyConfig::None);
        assert!(matches!(
            check_creation(&created, &config(), &data_sources(), false),
            Err(Error::InvalidAlgorithmAssignment { .. })
        ));

        created.tables[0].actual_data_nodes = Some("ds_0.t_new".into());
        check_creation(&created, &config(), &data_sources(), false).unwrap();
    }

    #[test]
    fn test_auto_algorithm_assignment() {
        let mut created = created();
        created.tables[0].table_strategy = Some(ShardingStrategyConfig::standard("id", "mod_4"));
        assert!(matches!(
            check_creation(&created, &config(), &data_sources(), false),
            Err(Error::InvalidAlgorithmAssignment { .. })
        ));

        let mut created = statement(vec![]);
        created.auto_tables.push(AutoTableRuleConfig {
            logic_table: "t_auto".into(),
            actual_data_sources: "ds_${0..1}".into(),
            sharding_strategy: ShardingStrategyConfig::standard("id", "database_inline"),
        });
        assert!(matches!(
            check_creation(&created, &config(), &data_sources(), false),
            Err(Error::InvalidAlgorithmAssignment { .. })
        ));

        created.auto_tables[0].sharding_strategy = ShardingStrategyConfig::standard("id", "mod_4");
        check_creation(&created, &config(), &data_sources(), false).unwrap();
    }

    #[test]
    fn test_algorithm_not_found() {
        let mut created = created();
        created.tables[0].table_strategy = Some(ShardingStrategyConfig::standard("id", "missing"));
        match check_creation(&created, &config(), &data_sources(), false) {
            Err(Error::AlgorithmNotFound { table, algorithm }) => {
                assert_eq!(table, "t_new");
                assert_eq!(algorithm, "missing");
            }
            other => panic!("expected algorithm not found, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_column() {
        let mut created = created();
        created.tables[0].table_strategy = Some(ShardingStrategyConfig::Standard {
            column: None,
            algorithm: "t_new_inline".into(),
        });
        assert!(matches!(
            check_creation(&created, &config(), &data_sources(), false),
            Err(Error::InvalidStrategy { .. })
        ));

        let mut current = config();
        current.default_sharding_column = Some("order_id".into());
        check_creation(&created, &current, &data_sources(), false).unwrap();
    }

    #[test]
    fn test_inline_expression_mismatch() {
        let mut created = created();
        created.algorithms.insert(
            "t_new_inline".into(),
            AlgorithmConfig::new("inline").prop("algorithm_expression", "t_old_${order_id % 2}"),
        );
        assert!(matches!(
            check_creation(&created, &config(), &data_sources(), false),
            Err(Error::InvalidAlgorithmAssignment { .. })
        ));

        // Evaluation errors aren't reported here.
        created.algorithms.insert(
            "t_new_inline".into(),
            AlgorithmConfig::new("inline").prop("algorithm_expression", "t_new_${item_id % 2}"),
        );
        check_creation(&created, &config(), &data_sources(), false).unwrap();
    }

    #[test]
    fn test_alter_binding_table() {
        let current = config();

        // Same shape, different algorithm name.
        let mut altered = statement(vec![current.tables[1].clone()]);
        altered.tables[0].table_strategy =
            Some(ShardingStrategyConfig::standard("order_id", "t_order_item_inline_v2"));
        altered.algorithms.insert(
            "t_order_item_inline_v2".into(),
            AlgorithmConfig::new("inline")
                .prop("algorithm_expression", "t_order_item_${order_id % 2}"),
        );
        check_alteration(&altered, &current, &data_sources()).unwrap();

        // Moved to a single data source.
        let mut altered = statement(vec![current.tables[1].clone()]);
        altered.tables[0].actual_data_nodes = Some("ds_0.t_order_item_${0..1}".into());
        match check_alteration(&altered, &current, &data_sources()) {
            Err(Error::InvalidBindingConfiguration(tables)) => {
                assert_eq!(tables, vec!["t_order_item"])
            }
            other => panic!("expected invalid binding configuration, got {:?}", other),
        }

        // Not in a binding group.
        let mut altered = statement(vec![]);
        altered.auto_tables.push(current.auto_tables[0].clone());
        altered.auto_tables[0].actual_data_sources = "ds_0".into();
        check_alteration(&altered, &current, &data_sources()).unwrap();
    }
}
