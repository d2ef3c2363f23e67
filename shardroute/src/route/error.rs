use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no database route for table \"{table}\" with values [{values}], data sources: {data_sources}")]
    EmptyDatabaseRoute {
        table: String,
        values: String,
        data_sources: String,
    },

    #[error("table \"{table}\" routed to data sources [{routed}] outside of its data sources: {data_sources}")]
    InvalidDatabaseRoute {
        table: String,
        routed: String,
        data_sources: String,
    },

    #[error("table \"{table}\" routed to tables [{routed}] in \"{data_source}\", actual tables: {tables}")]
    InvalidTableRoute {
        table: String,
        data_source: String,
        routed: String,
        tables: String,
    },

    #[error("no sharding rule for table \"{0}\"")]
    NoTableRule(String),

    #[error("tables [{0}] aren't bound to each other")]
    NotBindingTables(String),

    #[error("{0}")]
    Sharding(#[from] crate::sharding::Error),

    #[error("{0}")]
    Rule(#[from] crate::rule::Error),
}
