use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use shardroute_config::{BindingTableGroup, Config};
use thiserror::Error;
use tracing::{error, info};

use crate::checker;
use crate::config::{self, Snapshot};
use crate::route::RouteResult;
use crate::sharding::{ShardingCondition, ShardingValue};

/// Resolve logical tables to physical data nodes and check sharding rules.
#[derive(Parser, Debug)]
#[command(name = "", version = concat!("shardroute v", env!("CARGO_PKG_VERSION")))]
pub struct Cli {
    /// Path to the configuration file. Default: "shardroute.toml"
    #[arg(short, long, default_value = "shardroute.toml")]
    pub config: PathBuf,
    /// Subcommand.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Route a statement on a logical table.
    Route {
        /// Logical table.
        #[arg(short, long)]
        table: String,

        /// Statement alternative, e.g. "order_id=1|2,user_id>=10".
        /// Repeat for multi-row statements.
        #[arg(long)]
        condition: Vec<String>,

        /// Database hint value for the table.
        #[arg(long)]
        database_hint: Vec<String>,

        /// Table hint value for the table.
        #[arg(long)]
        table_hint: Vec<String>,

        /// Table bound to TABLE that the statement also uses, e.g. in a join.
        #[arg(long)]
        binding: Vec<String>,

        /// Statement text, searched for hint comments.
        #[arg(long)]
        sql: Option<String>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Check the configuration file for errors.
    Configcheck,

    /// Check binding table groups against the configuration.
    CheckBinding {
        /// Comma-separated tables, e.g. "t_order, t_order_item".
        #[arg(short, long, required = true)]
        group: Vec<String>,
    },

    /// Print the JSON schema of the configuration file.
    Schema,
}

#[derive(Debug, Error)]
pub enum ConfigCheckError {
    #[error("configuration file \"{0}\" doesn't exist")]
    NotFound(PathBuf),

    #[error("{0}")]
    Invalid(#[from] crate::rule::Error),
}

/// Confirm that the configuration file is valid: it parses, the rule
/// compiles and the binding groups hold.
pub fn config_check(path: &Path) -> Result<Snapshot, ConfigCheckError> {
    if !path.exists() {
        return Err(ConfigCheckError::NotFound(path.to_path_buf()));
    }

    let config = Config::load(path).map_err(crate::rule::Error::from)?;
    Ok(Snapshot::new(config)?)
}

#[allow(clippy::print_stdout)]
pub fn route(commands: Commands) -> Result<(), Box<dyn std::error::Error>> {
    if let Commands::Route {
        table,
        condition,
        database_hint,
        table_hint,
        binding,
        sql,
        json,
    } = commands
    {
        let snapshot = config::snapshot();

        let conditions = condition
            .iter()
            .map(|text| ShardingCondition::parse(&table, text))
            .collect::<Result<Vec<_>, _>>()?;

        let mut hints = snapshot.hints(sql.as_deref());
        for value in &database_hint {
            hints.add_database_value(&table, ShardingValue::parse(value));
        }
        for value in &table_hint {
            hints.add_table_value(&table, ShardingValue::parse(value));
        }

        let engine = snapshot.engine();
        let result = if binding.is_empty() {
            engine.route(&table, &conditions, &hints)?
        } else {
            let tables = std::iter::once(table.clone())
                .chain(binding)
                .collect::<Vec<_>>();
            engine.route_binding(&tables, &conditions, &hints)?
        };

        if json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            print_route(&table, &result);
        }
    }

    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_route(table: &str, result: &RouteResult) {
    println!("{} -> {} data nodes", table, result.len());
    for unit in &result.units {
        for mapper in &unit.tables {
            println!("  {}.{}", unit.data_source.actual_name, mapper.actual_name);
        }
    }
}

#[allow(clippy::print_stdout)]
pub fn check_binding(commands: Commands) -> Result<(), Box<dyn std::error::Error>> {
    if let Commands::CheckBinding { group } = commands {
        let snapshot = config::snapshot();
        let groups = group
            .iter()
            .map(BindingTableGroup::new)
            .collect::<Vec<_>>();

        let valid = checker::is_valid_binding_table_groups(
            &groups,
            &snapshot.config.sharding,
            &snapshot.data_sources(),
        )?;

        let groups = groups.iter().map(|g| g.to_string()).collect::<Vec<_>>();
        if valid {
            info!("binding groups [{}] are valid", groups.join("; "));
            println!("valid");
        } else {
            error!("binding groups [{}] are not valid", groups.join("; "));
            println!("invalid");
        }
    }

    Ok(())
}

#[allow(clippy::print_stdout)]
pub fn schema() -> Result<(), Box<dyn std::error::Error>> {
    let schema = schemars::schema_for!(Config);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_route() {
        let cli = Cli::parse_from([
            "shardroute",
            "-c",
            "test.toml",
            "route",
            "--table",
            "t_order",
            "--condition",
            "order_id=1",
            "--condition",
            "order_id=2",
            "--table-hint",
            "3",
            "--binding",
            "t_order_item",
            "--json",
        ]);
        assert_eq!(cli.config, PathBuf::from("test.toml"));
        match cli.command {
            Commands::Route {
                table,
                condition,
                table_hint,
                database_hint,
                binding,
                json,
                ..
            } => {
                assert_eq!(binding, vec!["t_order_item"]);
                assert_eq!(table, "t_order");
                assert_eq!(condition, vec!["order_id=1", "order_id=2"]);
                assert_eq!(table_hint, vec!["3"]);
                assert!(database_hint.is_empty());
                assert!(json);
            }
            other => panic!("expected route, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_check_binding() {
        let cli = Cli::parse_from([
            "shardroute",
            "check-binding",
            "--group",
            "t_order, t_order_item",
        ]);
        assert_eq!(cli.config, PathBuf::from("shardroute.toml"));
        assert!(matches!(cli.command, Commands::CheckBinding { group } if group.len() == 1));
    }

    #[test]
    fn test_config_check() {
        let missing = PathBuf::from("/definitely/not/here/shardroute.toml");
        assert!(matches!(
            config_check(&missing),
            Err(ConfigCheckError::NotFound(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"
[[data_sources]]
name = "ds_0"

[[sharding.tables]]
logic_table = "t_order"
actual_data_nodes = "ds_0.t_order_${0..1}"
table_strategy = { type = "standard", column = "order_id", algorithm = "missing" }
"#,
        )
        .unwrap();
        let path = file.path().to_path_buf();
        assert!(matches!(
            config_check(&path),
            Err(ConfigCheckError::Invalid(
                crate::rule::Error::AlgorithmNotFound { .. }
            ))
        ));
    }
}
