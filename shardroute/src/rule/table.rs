use indexmap::{IndexMap, IndexSet};
use shardroute_config::{AutoTableRuleConfig, ShardingStrategyConfig, TableRuleConfig};

use super::Error;
use crate::sharding::{split_and_evaluate, DataNode, DataNodeInfo};

/// Physical footprint of a logical table.
#[derive(Debug, Clone)]
pub struct ShardingTable {
    /// Name as configured.
    pub logic_table: String,
    /// Every placement, in declaration order.
    pub data_nodes: Vec<DataNode>,
    pub actual_data_sources: IndexSet<String>,
    /// Actual tables, per data source.
    pub actual_tables: IndexMap<String, IndexSet<String>>,
    pub data_source_info: DataNodeInfo,
    pub table_info: DataNodeInfo,
    /// Strategies declared on the table. The rule's defaults apply when missing.
    pub database_strategy: Option<ShardingStrategyConfig>,
    pub table_strategy: Option<ShardingStrategyConfig>,
    /// Data nodes generated by an auto algorithm.
    pub auto: bool,
}

impl ShardingTable {
    /// Table with explicit data nodes. Without them, the table
    /// exists once in every data source.
    pub fn from_config(config: &TableRuleConfig, data_sources: &[String]) -> Result<Self, Error> {
        let data_nodes = match config
            .actual_data_nodes
            .as_deref()
            .filter(|n| !n.trim().is_empty())
        {
            Some(expression) => split_and_evaluate(expression)?
                .iter()
                .map(|node| DataNode::parse(node))
                .collect::<Result<Vec<_>, _>>()?,
            None => data_sources
                .iter()
                .map(|ds| DataNode::new(ds, &config.logic_table))
                .collect(),
        };

        Self::new(
            &config.logic_table,
            data_nodes,
            config.database_strategy.clone(),
            config.table_strategy.clone(),
            false,
        )
    }

    /// Table with `{logic_table}_{i}` for `i` in `0..sharding_count`,
    /// spread over the data sources round-robin.
    pub fn from_auto_config(
        config: &AutoTableRuleConfig,
        sharding_count: usize,
    ) -> Result<Self, Error> {
        let data_sources = split_and_evaluate(&config.actual_data_sources)?;
        if data_sources.is_empty() {
            return Err(Error::NoDataNodes(config.logic_table.clone()));
        }

        let data_nodes = (0..sharding_count)
            .map(|i| {
                DataNode::new(
                    &data_sources[i % data_sources.len()],
                    format!("{}_{}", config.logic_table, i),
                )
            })
            .collect();

        Self::new(
            &config.logic_table,
            data_nodes,
            Some(ShardingStrategyConfig::None),
            Some(config.sharding_strategy.clone()),
            true,
        )
    }

    fn new(
        logic_table: &str,
        data_nodes: Vec<DataNode>,
        database_strategy: Option<ShardingStrategyConfig>,
        table_strategy: Option<ShardingStrategyConfig>,
        auto: bool,
    ) -> Result<Self, Error> {
        if data_nodes.is_empty() {
            return Err(Error::NoDataNodes(logic_table.to_string()));
        }

        let mut actual_tables: IndexMap<String, IndexSet<String>> = IndexMap::new();
        let mut seen = IndexSet::new();

        for node in &data_nodes {
            if !seen.insert((node.data_source.clone(), node.table.to_lowercase())) {
                return Err(Error::DuplicateDataNode {
                    table: logic_table.to_string(),
                    data_node: node.to_string(),
                });
            }
            actual_tables
                .entry(node.data_source.clone())
                .or_default()
                .insert(node.table.clone());
        }

        let actual_data_sources = actual_tables.keys().cloned().collect::<IndexSet<_>>();
        let data_source_names = actual_data_sources.iter().collect::<Vec<_>>();
        let table_names = data_nodes.iter().map(|n| &n.table).collect::<Vec<_>>();

        Ok(Self {
            logic_table: logic_table.to_string(),
            data_source_info: DataNodeInfo::for_data_sources(&data_source_names),
            table_info: DataNodeInfo::for_tables(logic_table, &table_names),
            data_nodes,
            actual_data_sources,
            actual_tables,
            database_strategy,
            table_strategy,
            auto,
        })
    }

    /// Actual tables in the data source. The name ignores case.
    pub fn actual_tables(&self, data_source: &str) -> Option<&IndexSet<String>> {
        self.actual_tables.get(data_source).or_else(|| {
            self.actual_tables
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(data_source))
                .map(|(_, tables)| tables)
        })
    }

    /// Position of the actual table within its data source.
    pub fn actual_table_index(&self, data_source: &str, actual_table: &str) -> Option<usize> {
        self.actual_tables(data_source)?
            .iter()
            .position(|table| table.eq_ignore_ascii_case(actual_table))
    }

    /// Is this one of the table's actual tables, in any data source.
    pub fn has_actual_table(&self, actual_table: &str) -> bool {
        self.data_nodes
            .iter()
            .any(|node| node.table.eq_ignore_ascii_case(actual_table))
    }

    /// Every distinct actual table name.
    pub fn actual_table_names(&self) -> IndexSet<String> {
        self.data_nodes.iter().map(|n| n.table.clone()).collect()
    }

    pub fn contains_data_node(&self, data_node: &DataNode) -> bool {
        self.actual_tables(&data_node.data_source)
            .map(|tables| tables.contains(&data_node.table))
            .unwrap_or(false)
    }

    pub fn is(&self, name: &str) -> bool {
        self.logic_table.eq_ignore_ascii_case(name)
    }
}
