use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Sharding rule: every sharded table, binding groups, defaults
/// and the algorithms referenced by name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ShardingRuleConfig {
    /// Tables with explicit data nodes.
    #[serde(default)]
    pub tables: Vec<TableRuleConfig>,
    /// Tables whose data nodes are generated by an auto algorithm.
    #[serde(default)]
    pub auto_tables: Vec<AutoTableRuleConfig>,
    /// Groups of tables that always shard together.
    #[serde(default)]
    pub binding_tables: Vec<BindingTableGroup>,
    /// Database strategy used by tables that don't declare one.
    #[serde(default)]
    pub default_database_strategy: Option<ShardingStrategyConfig>,
    /// Table strategy used by tables that don't declare one.
    #[serde(default)]
    pub default_table_strategy: Option<ShardingStrategyConfig>,
    /// Column used by standard and complex strategies without an explicit column.
    #[serde(default)]
    pub default_sharding_column: Option<String>,
    /// Sharding algorithms, by name.
    #[serde(default)]
    pub algorithms: IndexMap<String, AlgorithmConfig>,
}

impl ShardingRuleConfig {
    /// Names of all configured logical tables, in declaration order.
    pub fn logic_tables(&self) -> Vec<String> {
        self.tables
            .iter()
            .map(|t| t.logic_table.clone())
            .chain(self.auto_tables.iter().map(|t| t.logic_table.clone()))
            .collect()
    }

    /// Is the table configured, ignoring case.
    pub fn contains_table(&self, name: &str) -> bool {
        self.logic_tables()
            .iter()
            .any(|t| t.eq_ignore_ascii_case(name))
    }

    /// Every table mentioned in a binding group.
    pub fn binding_table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = vec![];
        for group in &self.binding_tables {
            for table in group.tables().into_iter().filter(|t| !t.is_empty()) {
                if !names.iter().any(|n| n.eq_ignore_ascii_case(&table)) {
                    names.push(table);
                }
            }
        }
        names
    }

    /// Copy of this configuration with the altered tables replaced
    /// and the altered algorithms added.
    pub fn altered(&self, altered: &ShardingRuleConfig) -> Self {
        let names = altered.logic_tables();
        let replaced = |table: &str| names.iter().any(|n| n.eq_ignore_ascii_case(table));

        let mut result = self.clone();
        result.tables.retain(|t| !replaced(&t.logic_table));
        result.auto_tables.retain(|t| !replaced(&t.logic_table));
        result.tables.extend(altered.tables.iter().cloned());
        result.auto_tables.extend(altered.auto_tables.iter().cloned());
        for (name, algorithm) in &altered.algorithms {
            result.algorithms.insert(name.clone(), algorithm.clone());
        }
        result
    }
}

/// Sharded table with explicit data nodes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TableRuleConfig {
    /// Table name as written in SQL.
    pub logic_table: String,
    /// Inline expression of data nodes, e.g. `ds_${0..1}.t_order_${0..1}`.
    /// If not set, the table exists once in every data source.
    #[serde(default)]
    pub actual_data_nodes: Option<String>,
    #[serde(default)]
    pub database_strategy: Option<ShardingStrategyConfig>,
    #[serde(default)]
    pub table_strategy: Option<ShardingStrategyConfig>,
}

/// Sharded table with data nodes generated from the algorithm's sharding count.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AutoTableRuleConfig {
    pub logic_table: String,
    /// Inline expression of data sources, e.g. `ds_${0..1}`.
    pub actual_data_sources: String,
    pub sharding_strategy: ShardingStrategyConfig,
}

/// Comma-separated list of logical tables, e.g. `"t_order, t_order_item"`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default, JsonSchema)]
#[serde(transparent)]
pub struct BindingTableGroup(pub String);

impl BindingTableGroup {
    pub fn new(reference: impl ToString) -> Self {
        Self(reference.to_string())
    }

    /// Member tables, trimmed. Empty entries are kept so they
    /// fail the table lookup instead of shrinking the group.
    pub fn tables(&self) -> Vec<String> {
        self.0.split(',').map(|t| t.trim().to_string()).collect()
    }
}

impl Display for BindingTableGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How one dimension (database or table) is sharded.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShardingStrategyConfig {
    /// Don't shard this dimension.
    None,
    /// Single sharding column.
    Standard {
        #[serde(default)]
        column: Option<String>,
        algorithm: String,
    },
    /// Multiple sharding columns passed to the algorithm together.
    Complex {
        #[serde(default)]
        columns: Vec<String>,
        algorithm: String,
    },
    /// Values come from hints instead of the statement.
    Hint { algorithm: String },
}

impl ShardingStrategyConfig {
    pub fn standard(column: impl ToString, algorithm: impl ToString) -> Self {
        Self::Standard {
            column: Some(column.to_string()),
            algorithm: algorithm.to_string(),
        }
    }

    pub fn complex(columns: &[&str], algorithm: impl ToString) -> Self {
        Self::Complex {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            algorithm: algorithm.to_string(),
        }
    }

    pub fn hint(algorithm: impl ToString) -> Self {
        Self::Hint {
            algorithm: algorithm.to_string(),
        }
    }

    /// Name of the referenced algorithm.
    pub fn algorithm(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Standard { algorithm, .. }
            | Self::Complex { algorithm, .. }
            | Self::Hint { algorithm } => Some(algorithm.as_str()),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn is_hint(&self) -> bool {
        matches!(self, Self::Hint { .. })
    }

    /// Sharding columns, falling back to the default column.
    pub fn columns(&self, default_column: Option<&str>) -> Vec<String> {
        match self {
            Self::Standard { column, .. } => column
                .as_deref()
                .or(default_column)
                .map(|c| vec![c.to_string()])
                .unwrap_or_default(),
            Self::Complex { columns, .. } => {
                if columns.is_empty() {
                    default_column.map(|c| vec![c.to_string()]).unwrap_or_default()
                } else {
                    columns.clone()
                }
            }
            Self::None | Self::Hint { .. } => vec![],
        }
    }

    /// Column label used when comparing algorithm structures.
    pub fn column_label(&self, default_column: Option<&str>) -> String {
        match self {
            Self::Standard { .. } | Self::Complex { .. } => self.columns(default_column).join(","),
            Self::None | Self::Hint { .. } => default_column.unwrap_or_default().to_string(),
        }
    }
}

/// Sharding algorithm definition.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AlgorithmConfig {
    /// Algorithm type, e.g. `inline` or `mod`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub props: Props,
}

impl AlgorithmConfig {
    pub fn new(kind: impl ToString) -> Self {
        Self {
            kind: kind.to_string(),
            props: Props::default(),
        }
    }

    pub fn prop(mut self, name: impl ToString, value: impl Into<FlexibleType>) -> Self {
        self.props.0.insert(name.to_string(), value.into());
        self
    }
}

/// Algorithm properties.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default, JsonSchema)]
#[serde(transparent)]
pub struct Props(pub IndexMap<String, FlexibleType>);

impl Props {
    pub fn get(&self, name: &str) -> Option<&FlexibleType> {
        self.0.get(name)
    }

    pub fn string(&self, name: &str) -> Option<String> {
        self.get(name).map(|v| v.to_string())
    }

    /// Integer property; accepts numeric strings.
    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            FlexibleType::Integer(i) => Some(*i),
            FlexibleType::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean property; accepts `"true"`/`"false"` strings.
    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            FlexibleType::Boolean(b) => Some(*b),
            FlexibleType::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl Display for Props {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let props = self
            .0
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>();
        write!(f, "{}", props.join(","))
    }
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Eq, Hash, JsonSchema)]
#[serde(untagged)]
pub enum FlexibleType {
    Integer(i64),
    Boolean(bool),
    Uuid(uuid::Uuid),
    String(String),
}

impl Display for FlexibleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{}", i),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Uuid(u) => write!(f, "{}", u),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for FlexibleType {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FlexibleType {
    fn from(value: i32) -> Self {
        Self::Integer(value as i64)
    }
}

impl From<bool> for FlexibleType {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<uuid::Uuid> for FlexibleType {
    fn from(value: uuid::Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<String> for FlexibleType {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for FlexibleType {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_binding_group_tables() {
        let group = BindingTableGroup::new(" t_order ,t_order_item ");
        assert_eq!(group.tables(), vec!["t_order", "t_order_item"]);

        let group = BindingTableGroup::new("t_order,");
        assert_eq!(group.tables(), vec!["t_order", ""]);
    }

    #[test]
    fn test_strategy_columns() {
        let standard = ShardingStrategyConfig::Standard {
            column: None,
            algorithm: "inline".into(),
        };
        assert_eq!(standard.columns(Some("order_id")), vec!["order_id"]);
        assert!(standard.columns(None).is_empty());

        let complex = ShardingStrategyConfig::complex(&["user_id", "order_id"], "complex");
        assert_eq!(complex.column_label(None), "user_id,order_id");

        let hint = ShardingStrategyConfig::hint("hint");
        assert!(hint.columns(Some("order_id")).is_empty());
        assert_eq!(hint.algorithm(), Some("hint"));
        assert_eq!(ShardingStrategyConfig::None.algorithm(), None);
    }

    #[test]
    fn test_altered() {
        let current = ShardingRuleConfig {
            tables: vec![
                TableRuleConfig {
                    logic_table: "t_order".into(),
                    actual_data_nodes: Some("ds_${0..1}.t_order_${0..1}".into()),
                    ..Default::default()
                },
                TableRuleConfig {
                    logic_table: "t_order_item".into(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let altered = ShardingRuleConfig {
            tables: vec![TableRuleConfig {
                logic_table: "T_ORDER".into(),
                actual_data_nodes: Some("ds_0.t_order_0".into()),
                ..Default::default()
            }],
            algorithms: [("mod".to_string(), AlgorithmConfig::new("mod"))]
                .into_iter()
                .collect(),
            ..Default::default()
        };

        let merged = current.altered(&altered);
        assert_eq!(merged.logic_tables(), vec!["t_order_item", "T_ORDER"]);
        assert!(merged.algorithms.contains_key("mod"));
        // Original is untouched.
        assert_eq!(current.tables.len(), 2);
        assert!(current.algorithms.is_empty());
    }

    #[test]
    fn test_props() {
        let algorithm = AlgorithmConfig::new("mod")
            .prop("sharding_count", 4)
            .prop("allow_range_query", "true")
            .prop("algorithm_expression", "t_${id % 4}");
        assert_eq!(algorithm.props.integer("sharding_count"), Some(4));
        assert_eq!(algorithm.props.boolean("allow_range_query"), Some(true));
        assert_eq!(
            algorithm.props.string("algorithm_expression").as_deref(),
            Some("t_${id % 4}")
        );
        assert_eq!(algorithm.props.integer("missing"), None);
    }
}
