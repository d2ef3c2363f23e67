use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::path::Path;
use tracing::{info, warn};

use crate::error::Error;
use crate::general::General;
use crate::sharding::ShardingRuleConfig;

/// Configuration file, `shardroute.toml` by default.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: General,

    /// Physical data sources. Names are used by data node expressions.
    #[serde(default)]
    pub data_sources: Vec<DataSource>,

    /// Sharding rule.
    #[serde(default)]
    pub sharding: ShardingRuleConfig,
}

impl Config {
    /// Load configuration from disk. Missing file means defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();

        let config = if let Ok(source) = read_to_string(path) {
            let config = Self::parse(&source)?;
            info!("loaded \"{}\"", path.display());
            config
        } else {
            warn!(
                "\"{}\" doesn't exist, loading defaults instead",
                path.display()
            );
            Self::default()
        };

        config.check();

        Ok(config)
    }

    /// Load configuration from disk, failing if the file doesn't exist.
    pub fn load_required(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        Self::load(path)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(source: &str) -> Result<Self, Error> {
        toml::from_str(source).map_err(|err| Error::config(source, err))
    }

    /// Names of all data sources, in declaration order.
    pub fn data_source_names(&self) -> Vec<String> {
        self.data_sources.iter().map(|ds| ds.name.clone()).collect()
    }

    /// Warn about settings that parse but are probably wrong.
    pub fn check(&self) {
        let mut seen: Vec<&str> = vec![];
        for ds in &self.data_sources {
            if seen.contains(&ds.name.as_str()) {
                warn!("data source \"{}\" is declared more than once", ds.name);
            }
            seen.push(&ds.name);
        }

        for (name, algorithm) in &self.sharding.algorithms {
            let referenced = self
                .sharding
                .tables
                .iter()
                .flat_map(|t| [t.database_strategy.as_ref(), t.table_strategy.as_ref()])
                .chain(
                    self.sharding
                        .auto_tables
                        .iter()
                        .map(|t| Some(&t.sharding_strategy)),
                )
                .chain([
                    self.sharding.default_database_strategy.as_ref(),
                    self.sharding.default_table_strategy.as_ref(),
                ])
                .flatten()
                .any(|s| s.algorithm() == Some(name.as_str()));

            if !referenced {
                warn!(
                    "sharding algorithm \"{}\" ({}) is not used by any table",
                    name, algorithm.kind
                );
            }
        }
    }
}

/// Physical database that holds some of the actual tables.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DataSource {
    /// Name referenced by data nodes, e.g. `ds_0`.
    pub name: String,
    /// Connection string. Informational only.
    #[serde(default)]
    pub url: Option<String>,
}

impl DataSource {
    pub fn new(name: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            url: None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sharding::{FlexibleType, ShardingStrategyConfig};
    use std::io::Write;

    const SOURCE: &str = r#"
[general]
log_format = "json"

[[data_sources]]
name = "ds_0"

[[data_sources]]
name = "ds_1"
url = "postgres://localhost:5432/ds_1"

[sharding]
binding_tables = ["t_order, t_order_item"]
default_sharding_column = "order_id"

[[sharding.tables]]
logic_table = "t_order"
actual_data_nodes = "ds_${0..1}.t_order_${0..1}"
database_strategy = { type = "standard", column = "user_id", algorithm = "database_inline" }
table_strategy = { type = "standard", algorithm = "t_order_inline" }

[[sharding.tables]]
logic_table = "t_hint"
actual_data_nodes = "ds_${0..1}.t_hint_${0..1}"
database_strategy = { type = "hint", algorithm = "hint_db" }
table_strategy = { type = "none" }

[[sharding.auto_tables]]
logic_table = "t_user"
actual_data_sources = "ds_${0..1}"
sharding_strategy = { type = "standard", column = "user_id", algorithm = "user_mod" }

[sharding.algorithms.database_inline]
type = "inline"
props = { algorithm_expression = "ds_${user_id % 2}" }

[sharding.algorithms.t_order_inline]
type = "inline"
props = { algorithm_expression = "t_order_${order_id % 2}", allow_range_query = true }

[sharding.algorithms.hint_db]
type = "hint_inline"

[sharding.algorithms.user_mod]
type = "mod"
props = { sharding_count = 4 }
"#;

    #[test]
    fn test_parse() {
        let config = Config::parse(SOURCE).unwrap();
        assert_eq!(config.general.log_format, crate::LogFormat::Json);
        assert!(config.general.sql_comment_hints);
        assert_eq!(config.data_source_names(), vec!["ds_0", "ds_1"]);
        assert_eq!(config.sharding.tables.len(), 2);
        assert_eq!(config.sharding.auto_tables.len(), 1);
        assert_eq!(
            config.sharding.binding_tables[0].tables(),
            vec!["t_order", "t_order_item"]
        );

        let order = &config.sharding.tables[0];
        assert_eq!(
            order.database_strategy,
            Some(ShardingStrategyConfig::standard("user_id", "database_inline"))
        );
        assert_eq!(
            order.table_strategy.as_ref().unwrap().columns(Some("order_id")),
            vec!["order_id"]
        );
        assert_eq!(
            config.sharding.tables[1].table_strategy,
            Some(ShardingStrategyConfig::None)
        );

        let inline = &config.sharding.algorithms["t_order_inline"];
        assert_eq!(
            inline.props.get("allow_range_query"),
            Some(&FlexibleType::Boolean(true))
        );
        assert_eq!(
            config.sharding.algorithms["user_mod"].props.integer("sharding_count"),
            Some(4)
        );
        assert!(config.sharding.algorithms["hint_db"].props.0.is_empty());
    }

    #[test]
    fn test_syntax_error_line() {
        let source = "[general]\nlog_format = \"text\"\nunknown_setting = 1\n";
        match Config::parse(source) {
            Err(Error::Syntax(_, line)) => assert_eq!(line, 3),
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SOURCE.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.sharding.logic_tables(), vec!["t_order", "t_hint", "t_user"]);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shardroute.toml");

        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::default());

        assert!(matches!(
            Config::load_required(&path),
            Err(Error::NotFound(_))
        ));
    }
}
