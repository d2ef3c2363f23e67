//! Out-of-band sharding values.
//!
//! Hints come from two places: values set on the session by the caller,
//! and values embedded in a statement comment:
//!
//! ```sql
//! /* shardroute_hint: t_order.database_value=1, t_order.table_value=3|4 */
//! SELECT * FROM t_order
//! ```
//!
//! Values from the statement take precedence over session values.

use fnv::FnvHashMap as HashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::ShardingValue;

static HINT_COMMENT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*\s*shardroute_hint\s*:(.*?)\*/").unwrap());

const DATABASE_VALUE: &str = "database_value";
const TABLE_VALUE: &str = "table_value";

#[derive(Debug, Clone, Default, PartialEq)]
struct Values {
    /// Values for every table.
    all: Vec<ShardingValue>,
    /// Values per table, keyed by lowercase name.
    tables: HashMap<String, Vec<ShardingValue>>,
}

impl Values {
    fn get(&self, table: &str) -> &[ShardingValue] {
        match self.tables.get(&table.to_lowercase()) {
            Some(values) if !values.is_empty() => values,
            _ => &self.all,
        }
    }

    fn add(&mut self, table: Option<&str>, value: ShardingValue) {
        match table {
            Some(table) => self
                .tables
                .entry(table.to_lowercase())
                .or_default()
                .push(value),
            None => self.all.push(value),
        }
    }

    fn is_empty(&self) -> bool {
        self.all.is_empty() && self.tables.values().all(|v| v.is_empty())
    }
}

/// Hints parsed from statement comments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlHints {
    database: Values,
    table: Values,
}

impl SqlHints {
    /// Find `shardroute_hint:` comments in the statement.
    pub fn parse(sql: &str) -> Self {
        let mut hints = Self::default();

        for captures in HINT_COMMENT_REGEX.captures_iter(sql) {
            let Some(body) = captures.get(1) else {
                continue;
            };

            for pair in body.as_str().split(',') {
                let Some((key, values)) = pair.split_once('=') else {
                    debug!("ignoring malformed hint \"{}\"", pair.trim());
                    continue;
                };
                let key = key.trim();
                let (table, dimension) = match key.rsplit_once('.') {
                    Some((table, dimension)) => (Some(table.trim()), dimension.trim()),
                    None => (None, key),
                };

                let target = if dimension.eq_ignore_ascii_case(DATABASE_VALUE) {
                    &mut hints.database
                } else if dimension.eq_ignore_ascii_case(TABLE_VALUE) {
                    &mut hints.table
                } else {
                    debug!("ignoring unknown hint \"{}\"", key);
                    continue;
                };

                for value in values.split('|').map(str::trim).filter(|v| !v.is_empty()) {
                    target.add(table, ShardingValue::parse(value));
                }
            }
        }

        hints
    }

    pub fn is_empty(&self) -> bool {
        self.database.is_empty() && self.table.is_empty()
    }
}

/// Hint values visible to one routing call.
///
/// Owned by the caller and passed to the route engine explicitly,
/// so concurrent calls never observe each other's hints.
#[derive(Debug, Clone, Default)]
pub struct HintContext {
    session_database: Values,
    session_table: Values,
    database_only: bool,
    sql: SqlHints,
}

impl HintContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hints from the statement comments, if enabled.
    pub fn with_sql(mut self, sql: &str) -> Self {
        self.sql = SqlHints::parse(sql);
        self
    }

    pub fn add_database_value(&mut self, table: &str, value: impl Into<ShardingValue>) {
        self.database_only = false;
        self.session_database.add(Some(table), value.into());
    }

    pub fn add_table_value(&mut self, table: &str, value: impl Into<ShardingValue>) {
        self.database_only = false;
        self.session_table.add(Some(table), value.into());
    }

    /// Route every table by database value only. Replaces all session hints.
    pub fn set_database_value(&mut self, value: impl Into<ShardingValue>) {
        self.session_database = Values::default();
        self.session_table = Values::default();
        self.session_database.add(None, value.into());
        self.database_only = true;
    }

    pub fn is_database_only(&self) -> bool {
        self.database_only
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Are there any hint values for this table.
    pub fn has_hint_for(&self, table: &str) -> bool {
        !self.database_values(table).is_empty() || !self.table_values(table).is_empty()
    }

    /// Database dimension values for the table.
    pub fn database_values(&self, table: &str) -> Vec<ShardingValue> {
        let sql = self.sql.database.get(table);
        if !sql.is_empty() {
            return sql.to_vec();
        }
        self.session_database.get(table).to_vec()
    }

    /// Table dimension values for the table.
    pub fn table_values(&self, table: &str) -> Vec<ShardingValue> {
        let sql = self.sql.table.get(table);
        if !sql.is_empty() {
            return sql.to_vec();
        }
        self.session_table.get(table).to_vec()
    }
}
