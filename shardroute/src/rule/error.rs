use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("sharding table rule not found for: {}", .0.join(", "))]
    MissingLogicTable(Vec<String>),

    #[error("invalid binding table configuration for: {}", .0.join(", "))]
    InvalidBindingConfiguration(Vec<String>),

    #[error("invalid algorithm for table \"{table}\": {reason}")]
    InvalidAlgorithmAssignment { table: String, reason: String },

    #[error("sharding algorithm \"{algorithm}\" used by \"{table}\" is not configured")]
    AlgorithmNotFound { table: String, algorithm: String },

    #[error("duplicate sharding rule: {}", .0.join(", "))]
    DuplicateRule(Vec<String>),

    #[error("sharding rule doesn't exist: {}", .0.join(", "))]
    MissingRule(Vec<String>),

    #[error("data sources don't exist: {}", .0.join(", "))]
    MissingDataSources(Vec<String>),

    #[error("invalid {dimension} strategy for table \"{table}\": {reason}")]
    InvalidStrategy {
        table: String,
        dimension: &'static str,
        reason: String,
    },

    #[error("data node \"{data_node}\" of table \"{table}\" is declared more than once")]
    DuplicateDataNode { table: String, data_node: String },

    #[error("table \"{0}\" has no data nodes")]
    NoDataNodes(String),

    #[error("{0}")]
    Sharding(#[from] crate::sharding::Error),

    #[error("{0}")]
    Config(#[from] shardroute_config::Error),
}
