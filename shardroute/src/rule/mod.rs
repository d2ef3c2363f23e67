//! Compiled sharding rule.
//!
//! Built from configuration once, then shared read-only by every
//! routing call until the configuration changes.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use shardroute_config::{ShardingRuleConfig, ShardingStrategyConfig};
use tracing::debug;

use crate::sharding::{AlgorithmRegistry, ShardingAlgorithm, ShardingStrategy};

pub mod error;
pub mod table;

pub use error::Error;
pub use table::ShardingTable;

/// Algorithms by configured name.
pub type Algorithms = IndexMap<String, Arc<dyn ShardingAlgorithm>>;

/// Which dimension a strategy shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Database,
    Table,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Table => "table",
        }
    }
}

/// Instantiate every configured algorithm.
pub fn create_algorithms(
    config: &ShardingRuleConfig,
    registry: &AlgorithmRegistry,
) -> Result<Algorithms, Error> {
    config
        .algorithms
        .iter()
        .map(|(name, algorithm)| Ok((name.clone(), registry.create(algorithm)?)))
        .collect()
}

/// Build the topology of every configured table, keyed by lowercase name.
/// The first declaration of a name wins.
pub fn create_tables(
    config: &ShardingRuleConfig,
    data_sources: &[String],
    algorithms: &Algorithms,
) -> Result<IndexMap<String, ShardingTable>, Error> {
    let mut tables = IndexMap::new();

    for table in &config.tables {
        let key = table.logic_table.to_lowercase();
        if !tables.contains_key(&key) {
            tables.insert(key, ShardingTable::from_config(table, data_sources)?);
        }
    }

    for table in &config.auto_tables {
        let key = table.logic_table.to_lowercase();
        if tables.contains_key(&key) {
            continue;
        }

        let name = table.sharding_strategy.algorithm().unwrap_or_default();
        let algorithm = algorithms
            .get(name)
            .ok_or_else(|| Error::AlgorithmNotFound {
                table: table.logic_table.clone(),
                algorithm: name.to_string(),
            })?;
        let count = match (algorithm.is_auto(), algorithm.sharding_count()) {
            (true, Some(count)) => count,
            _ => {
                return Err(Error::InvalidAlgorithmAssignment {
                    table: table.logic_table.clone(),
                    reason: format!(
                        "auto table requires an auto sharding algorithm, \"{}\" is \"{}\"",
                        name,
                        algorithm.kind()
                    ),
                })
            }
        };

        tables.insert(key, ShardingTable::from_auto_config(table, count)?);
    }

    Ok(tables)
}

/// Strategy config in effect for a dimension: the table's own,
/// then the rule default, then `None`.
pub fn effective_strategy(
    table: &ShardingTable,
    dimension: Dimension,
    config: &ShardingRuleConfig,
) -> ShardingStrategyConfig {
    let (own, default) = match dimension {
        Dimension::Database => (
            &table.database_strategy,
            &config.default_database_strategy,
        ),
        Dimension::Table => (&table.table_strategy, &config.default_table_strategy),
    };

    own.as_ref()
        .or(default.as_ref())
        .cloned()
        .unwrap_or(ShardingStrategyConfig::None)
}

/// Table's route configuration: topology plus compiled strategies.
#[derive(Debug, Clone)]
pub struct TableRule {
    pub table: ShardingTable,
    pub database_strategy: ShardingStrategy,
    pub table_strategy: ShardingStrategy,
}

impl TableRule {
    pub fn strategy(&self, dimension: Dimension) -> &ShardingStrategy {
        match dimension {
            Dimension::Database => &self.database_strategy,
            Dimension::Table => &self.table_strategy,
        }
    }
}

/// Sharding rule: tables, binding groups and algorithms.
#[derive(Debug, Clone)]
pub struct ShardingRule {
    tables: IndexMap<String, TableRule>,
    /// Lowercase table names per binding group.
    binding_groups: Vec<Vec<String>>,
    algorithms: Algorithms,
    data_sources: Vec<String>,
    config: ShardingRuleConfig,
}

impl ShardingRule {
    /// Compile the rule with the built-in algorithm types.
    pub fn new(config: &ShardingRuleConfig, data_sources: &[String]) -> Result<Self, Error> {
        Self::with_registry(config, data_sources, &AlgorithmRegistry::default())
    }

    pub fn with_registry(
        config: &ShardingRuleConfig,
        data_sources: &[String],
        registry: &AlgorithmRegistry,
    ) -> Result<Self, Error> {
        let algorithms = create_algorithms(config, registry)?;
        let topology = create_tables(config, data_sources, &algorithms)?;

        let mut missing = IndexSet::new();
        for table in topology.values() {
            missing.extend(
                table
                    .actual_data_sources
                    .iter()
                    .filter(|ds| !data_sources.iter().any(|d| d.eq_ignore_ascii_case(ds)))
                    .cloned(),
            );
        }
        if !missing.is_empty() {
            return Err(Error::MissingDataSources(missing.into_iter().collect()));
        }

        let mut tables = IndexMap::new();
        for (key, table) in topology {
            let database_strategy = compile_strategy(
                &table,
                Dimension::Database,
                &effective_strategy(&table, Dimension::Database, config),
                config,
                &algorithms,
            )?;
            let table_strategy = compile_strategy(
                &table,
                Dimension::Table,
                &effective_strategy(&table, Dimension::Table, config),
                config,
                &algorithms,
            )?;
            tables.insert(
                key,
                TableRule {
                    table,
                    database_strategy,
                    table_strategy,
                },
            );
        }

        let mut binding_groups = vec![];
        for group in &config.binding_tables {
            let members = group
                .tables()
                .iter()
                .map(|t| t.to_lowercase())
                .collect::<Vec<_>>();
            let missing = members
                .iter()
                .filter(|t| !tables.contains_key(*t))
                .cloned()
                .collect::<Vec<_>>();
            if !missing.is_empty() {
                return Err(Error::MissingLogicTable(missing));
            }
            binding_groups.push(members);
        }

        debug!(
            "sharding rule compiled: {} tables, {} binding groups, {} algorithms",
            tables.len(),
            binding_groups.len(),
            algorithms.len()
        );

        Ok(Self {
            tables,
            binding_groups,
            algorithms,
            data_sources: data_sources.to_vec(),
            config: config.clone(),
        })
    }

    /// Rule without tables.
    pub fn empty() -> Self {
        Self {
            tables: IndexMap::new(),
            binding_groups: vec![],
            algorithms: IndexMap::new(),
            data_sources: vec![],
            config: ShardingRuleConfig::default(),
        }
    }

    /// Route configuration of a logical table. Names ignore case.
    pub fn table_rule(&self, name: &str) -> Option<&TableRule> {
        self.tables.get(&name.to_lowercase())
    }

    pub fn table_rules(&self) -> impl Iterator<Item = &TableRule> {
        self.tables.values()
    }

    pub fn algorithm(&self, name: &str) -> Option<&Arc<dyn ShardingAlgorithm>> {
        self.algorithms.get(name)
    }

    pub fn data_sources(&self) -> &[String] {
        &self.data_sources
    }

    pub fn config(&self) -> &ShardingRuleConfig {
        &self.config
    }

    /// Lowercase names of the tables in the same binding group as `table`,
    /// the table itself included.
    pub fn binding_tables(&self, table: &str) -> Vec<&str> {
        let table = table.to_lowercase();
        let mut result: Vec<&str> = vec![];
        for group in self.binding_groups.iter().filter(|g| g.contains(&table)) {
            for member in group {
                if !result.contains(&member.as_str()) {
                    result.push(member);
                }
            }
        }
        result
    }

    /// Both tables are in one binding group.
    pub fn is_binding(&self, left: &str, right: &str) -> bool {
        let (left, right) = (left.to_lowercase(), right.to_lowercase());
        self.binding_groups
            .iter()
            .any(|group| group.contains(&left) && group.contains(&right))
    }

    /// All the tables are in one binding group. False for no tables.
    pub fn is_all_binding_tables<S: AsRef<str>>(&self, tables: &[S]) -> bool {
        if tables.is_empty() {
            return false;
        }
        let tables = tables
            .iter()
            .map(|t| t.as_ref().to_lowercase())
            .collect::<Vec<_>>();

        self.binding_groups
            .iter()
            .any(|group| tables.iter().all(|t| group.contains(t)))
    }

    /// Rule of the logical table owning an actual table.
    pub fn find_table_rule_by_actual_table(&self, actual_table: &str) -> Option<&TableRule> {
        self.tables
            .values()
            .find(|rule| rule.table.has_actual_table(actual_table))
    }

    /// Logical table owning an actual table.
    pub fn find_logic_table_by_actual_table(&self, actual_table: &str) -> Option<&str> {
        self.find_table_rule_by_actual_table(actual_table)
            .map(|rule| rule.table.logic_table.as_str())
    }

    /// Actual tables of the tables bound to `logic_table`, for the statement
    /// routed to `actual_table` in `data_source`. Bound tables sit at the
    /// same position in the data source as `actual_table`. Only tables listed
    /// in `available` are included; `logic_table` itself never is.
    ///
    /// Keys and values use the configured spelling.
    pub fn binding_actual_tables<S: AsRef<str>>(
        &self,
        data_source: &str,
        logic_table: &str,
        actual_table: &str,
        available: &[S],
    ) -> IndexMap<String, String> {
        let mut result = IndexMap::new();

        let Some(index) = self
            .table_rule(logic_table)
            .and_then(|rule| rule.table.actual_table_index(data_source, actual_table))
        else {
            return result;
        };

        for bound in self.binding_tables(logic_table) {
            if bound.eq_ignore_ascii_case(logic_table)
                || !available.iter().any(|t| t.as_ref().eq_ignore_ascii_case(bound))
            {
                continue;
            }

            let Some(rule) = self.table_rule(bound) else {
                continue;
            };
            let actual = rule
                .table
                .actual_tables(data_source)
                .and_then(|tables| tables.get_index(index));

            if let Some(actual) = actual {
                result.insert(rule.table.logic_table.clone(), actual.clone());
            }
        }

        result
    }
}

/// Turn a strategy config into a strategy, checking its algorithm fits the table.
fn compile_strategy(
    table: &ShardingTable,
    dimension: Dimension,
    strategy: &ShardingStrategyConfig,
    config: &ShardingRuleConfig,
    algorithms: &Algorithms,
) -> Result<ShardingStrategy, Error> {
    let Some(name) = strategy.algorithm() else {
        return Ok(ShardingStrategy::None);
    };

    let algorithm = algorithms
        .get(name)
        .cloned()
        .ok_or_else(|| Error::AlgorithmNotFound {
            table: table.logic_table.clone(),
            algorithm: name.to_string(),
        })?;

    if algorithm.is_auto() && !table.auto {
        return Err(Error::InvalidAlgorithmAssignment {
            table: table.logic_table.clone(),
            reason: format!(
                "auto sharding algorithm \"{}\" can't be used by a table with explicit data nodes",
                name
            ),
        });
    }

    if !algorithm.is_auto() && table.auto {
        return Err(Error::InvalidAlgorithmAssignment {
            table: table.logic_table.clone(),
            reason: format!(
                "auto table requires an auto sharding algorithm, \"{}\" is \"{}\"",
                name,
                algorithm.kind()
            ),
        });
    }

    let columns = strategy.columns(config.default_sharding_column.as_deref());
    let invalid = |reason: &str| Error::InvalidStrategy {
        table: table.logic_table.clone(),
        dimension: dimension.as_str(),
        reason: reason.to_string(),
    };

    Ok(match strategy {
        ShardingStrategyConfig::None => ShardingStrategy::None,
        ShardingStrategyConfig::Standard { .. } => ShardingStrategy::Standard {
            column: columns
                .into_iter()
                .next()
                .ok_or_else(|| invalid("standard strategy needs a sharding column"))?,
            algorithm,
        },
        ShardingStrategyConfig::Complex { .. } => {
            if columns.is_empty() {
                return Err(invalid("complex strategy needs sharding columns"));
            }
            ShardingStrategy::Complex { columns, algorithm }
        }
        ShardingStrategyConfig::Hint { .. } => ShardingStrategy::Hint { algorithm },
    })
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use shardroute_config::{
        AlgorithmConfig, AutoTableRuleConfig, BindingTableGroup, TableRuleConfig,
    };

    pub(crate) fn data_sources() -> Vec<String> {
        vec!["ds_0".into(), "ds_1".into()]
    }

    /// `t_order` and `t_order_item`, 2 data sources x 2 tables,
    /// `id % 2` in both dimensions, plus `t_user` as an auto table.
    pub(crate) fn config() -> ShardingRuleConfig {
        ShardingRuleConfig {
            tables: vec![
                TableRuleConfig {
                    logic_table: "t_order".into(),
                    actual_data_nodes: Some("ds_${0..1}.t_order_${0..1}".into()),
                    database_strategy: Some(ShardingStrategyConfig::standard(
                        "order_id",
                        "database_inline",
                    )),
                    table_strategy: Some(ShardingStrategyConfig::standard(
                        "order_id",
                        "t_order_inline",
                    )),
                },
                TableRuleConfig {
                    logic_table: "t_order_item".into(),
                    actual_data_nodes: Some("ds_${0..1}.t_order_item_${0..1}".into()),
                    database_strategy: Some(ShardingStrategyConfig::standard(
                        "order_id",
                        "database_inline",
                    )),
                    table_strategy: Some(ShardingStrategyConfig::standard(
                        "order_id",
                        "t_order_item_inline",
                    )),
                },
            ],
            auto_tables: vec![AutoTableRuleConfig {
                logic_table: "t_user".into(),
                actual_data_sources: "ds_${0..1}".into(),
                sharding_strategy: ShardingStrategyConfig::standard("user_id", "mod_4"),
            }],
            binding_tables: vec![BindingTableGroup::new("t_order, t_order_item")],
            algorithms: [
                (
                    "database_inline",
                    AlgorithmConfig::new("inline").prop("algorithm_expression", "ds_${order_id % 2}"),
                ),
                (
                    "t_order_inline",
                    AlgorithmConfig::new("inline")
                        .prop("algorithm_expression", "t_order_${order_id % 2}"),
                ),
                (
                    "t_order_item_inline",
                    AlgorithmConfig::new("inline")
                        .prop("algorithm_expression", "t_order_item_${order_id % 2}"),
                ),
                (
                    "mod_4",
                    AlgorithmConfig::new("mod").prop("sharding_count", 4),
                ),
            ]
            .into_iter()
            .map(|(name, algorithm)| (name.to_string(), algorithm))
            .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_compile() {
        let rule = ShardingRule::new(&config(), &data_sources()).unwrap();

        let order = rule.table_rule("T_ORDER").unwrap();
        assert_eq!(order.table.data_nodes.len(), 4);
        assert_eq!(order.database_strategy.columns(), vec!["order_id"]);

        let user = rule.table_rule("t_user").unwrap();
        assert!(user.database_strategy.is_none());
        assert_eq!(user.table_strategy.columns(), vec!["user_id"]);

        assert_eq!(rule.binding_tables("t_order"), vec!["t_order", "t_order_item"]);
        assert!(rule.binding_tables("t_user").is_empty());
        assert!(rule.is_binding("T_ORDER_ITEM", "t_order"));
        assert!(!rule.is_binding("t_user", "t_order"));
    }

    #[test]
    fn test_default_strategy() {
        let mut config = config();
        config.tables[0].database_strategy = None;
        config.default_database_strategy = Some(ShardingStrategyConfig::Standard {
            column: None,
            algorithm: "database_inline".into(),
        });
        config.default_sharding_column = Some("user_id".into());

        let rule = ShardingRule::new(&config, &data_sources()).unwrap();
        let order = rule.table_rule("t_order").unwrap();
        assert_eq!(order.database_strategy.columns(), vec!["user_id"]);

        config.default_sharding_column = None;
        assert!(matches!(
            ShardingRule::new(&config, &data_sources()),
            Err(Error::InvalidStrategy { .. })
        ));

        config.default_database_strategy = None;
        let rule = ShardingRule::new(&config, &data_sources()).unwrap();
        assert!(rule.table_rule("t_order").unwrap().database_strategy.is_none());
    }

    #[test]
    fn test_algorithm_assignment() {
        let mut config = config();
        config.tables[0].table_strategy =
            Some(ShardingStrategyConfig::standard("order_id", "mod_4"));
        assert!(matches!(
            ShardingRule::new(&config, &data_sources()),
            Err(Error::InvalidAlgorithmAssignment { .. })
        ));

        let mut config = super::test::config();
        config.auto_tables[0].sharding_strategy =
            ShardingStrategyConfig::standard("user_id", "t_order_inline");
        assert!(matches!(
            ShardingRule::new(&config, &data_sources()),
            Err(Error::InvalidAlgorithmAssignment { .. })
        ));

        let mut config = super::test::config();
        config.tables[0].table_strategy =
            Some(ShardingStrategyConfig::standard("order_id", "missing"));
        assert!(matches!(
            ShardingRule::new(&config, &data_sources()),
            Err(Error::AlgorithmNotFound { .. })
        ));
    }

    #[test]
    fn test_missing_data_sources() {
        match ShardingRule::new(&config(), &["ds_0".to_string()]) {
            Err(Error::MissingDataSources(missing)) => assert_eq!(missing, vec!["ds_1"]),
            other => panic!("expected missing data sources, got {:?}", other),
        }
        assert!(ShardingRule::empty().table_rule("t_order").is_none());
    }

    #[test]
    fn test_data_sources_ignore_case() {
        let upper = vec!["DS_0".to_string(), "DS_1".to_string()];
        let rule = ShardingRule::new(&config(), &upper).unwrap();
        let order = rule.table_rule("t_order").unwrap();
        assert_eq!(order.table.actual_tables("DS_1").unwrap().len(), 2);
    }

    #[test]
    fn test_all_binding_tables() {
        let rule = ShardingRule::new(&config(), &data_sources()).unwrap();

        assert!(rule.is_all_binding_tables(&["t_order", "T_ORDER_ITEM"]));
        assert!(rule.is_all_binding_tables(&["t_order_item"]));
        assert!(!rule.is_all_binding_tables(&["t_order", "t_user"]));
        assert!(!rule.is_all_binding_tables(&["t_user"]));
        assert!(!rule.is_all_binding_tables::<&str>(&[]));
    }

    #[test]
    fn test_find_by_actual_table() {
        let rule = ShardingRule::new(&config(), &data_sources()).unwrap();

        assert_eq!(
            rule.find_logic_table_by_actual_table("T_ORDER_ITEM_1"),
            Some("t_order_item")
        );
        assert_eq!(rule.find_logic_table_by_actual_table("t_user_3"), Some("t_user"));
        assert!(rule.find_table_rule_by_actual_table("t_order_2").is_none());
    }

    #[test]
    fn test_binding_actual_tables() {
        let rule = ShardingRule::new(&config(), &data_sources()).unwrap();

        let bound = rule.binding_actual_tables("ds_1", "t_order", "t_order_1", &["t_order_item"]);
        assert_eq!(
            bound.into_iter().collect::<Vec<_>>(),
            vec![("t_order_item".to_string(), "t_order_item_1".to_string())]
        );

        let bound = rule.binding_actual_tables("ds_0", "T_ORDER_ITEM", "t_order_item_0", &["t_order"]);
        assert_eq!(bound.get("t_order").map(String::as_str), Some("t_order_0"));

        // Not in the statement, not bound, or not an actual table.
        assert!(rule
            .binding_actual_tables::<&str>("ds_0", "t_order", "t_order_0", &[])
            .is_empty());
        assert!(rule
            .binding_actual_tables("ds_0", "t_user", "t_user_0", &["t_order"])
            .is_empty());
        assert!(rule
            .binding_actual_tables("ds_0", "t_order", "t_order_9", &["t_order_item"])
            .is_empty());
    }

    #[test]
    fn test_missing_binding_table() {
        let mut config = config();
        config
            .binding_tables
            .push(BindingTableGroup::new("t_order, t_missing"));
        match ShardingRule::new(&config, &data_sources()) {
            Err(Error::MissingLogicTable(tables)) => assert_eq!(tables, vec!["t_missing"]),
            other => panic!("expected missing table, got {:?}", other),
        }

        let mut config = super::test::config();
        config.binding_tables = vec![BindingTableGroup::new("t_order, t_order_item,")];
        assert!(matches!(
            ShardingRule::new(&config, &data_sources()),
            Err(Error::MissingLogicTable(_))
        ));
    }
}
