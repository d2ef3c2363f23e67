use std::sync::Arc;

use indexmap::IndexSet;
use tracing::debug;

use super::{Error, RouteMapper, RouteResult, RouteUnit};
use crate::rule::{Dimension, ShardingRule, TableRule};
use crate::sharding::{
    value::display_values, DataNode, HintContext, ShardingCondition, ShardingConditionValue,
    ShardingStrategy, ShardingValue,
};

/// Where the values of a dimension come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Hint,
    Condition,
    Mixed,
}

/// Resolves logical tables to data nodes.
///
/// Holds nothing but the compiled rule, so one engine can serve
/// any number of concurrent calls.
#[derive(Debug, Clone)]
pub struct RouteEngine {
    rule: Arc<ShardingRule>,
}

impl RouteEngine {
    pub fn new(rule: Arc<ShardingRule>) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> &ShardingRule {
        &self.rule
    }

    /// Route a statement on `table`.
    ///
    /// Each condition is one alternative of the statement (e.g. a row of
    /// a multi-row insert) and is routed on its own; the results are merged.
    pub fn route(
        &self,
        table: &str,
        conditions: &[ShardingCondition],
        hints: &HintContext,
    ) -> Result<RouteResult, Error> {
        let rule = self
            .rule
            .table_rule(table)
            .ok_or_else(|| Error::NoTableRule(table.to_string()))?;
        let logic_table = rule.table.logic_table.as_str();

        let database_hint = rule.database_strategy.is_hint()
            || !hints.database_values(logic_table).is_empty();
        let table_hint = rule.table_strategy.is_hint()
            || !hints.table_values(logic_table).is_empty()
            || hints.is_database_only();

        let mode = match (database_hint, table_hint) {
            (true, true) => Mode::Hint,
            (false, false) => Mode::Condition,
            _ => Mode::Mixed,
        };
        debug!(
            "routing \"{}\" in {:?} mode [conditions: {}]",
            logic_table,
            mode,
            conditions.len()
        );

        let hint_database = || {
            hint_values(
                logic_table,
                &rule.database_strategy,
                hints.database_values(logic_table),
            )
        };
        let hint_table = || {
            hint_values(
                logic_table,
                &rule.table_strategy,
                hints.table_values(logic_table),
            )
        };

        let mut passes = vec![];
        if mode == Mode::Hint || conditions.is_empty() {
            // Without conditions, the condition-driven dimension reads the
            // hint context too. It's usually empty and routes to everything.
            passes.push((hint_database(), hint_table()));
        } else {
            for condition in conditions {
                let database = if database_hint {
                    hint_database()
                } else {
                    self.condition_values(rule, Dimension::Database, condition)
                };
                let table = if table_hint {
                    hint_table()
                } else {
                    self.condition_values(rule, Dimension::Table, condition)
                };
                passes.push((database, table));
            }
        }

        let mut data_nodes = IndexSet::new();
        let mut original_data_nodes = vec![];

        for (database, table) in passes {
            let nodes = self.route_once(rule, &database, &table)?;
            data_nodes.extend(nodes.iter().cloned());
            original_data_nodes.push(nodes);
        }

        let units = data_nodes
            .into_iter()
            .map(|node| RouteUnit {
                data_source: RouteMapper::new(&node.data_source, &node.data_source),
                tables: vec![RouteMapper::new(logic_table, &node.table)],
            })
            .collect::<Vec<_>>();
        debug!("\"{}\" routed to {} units", logic_table, units.len());

        Ok(RouteResult {
            units,
            original_data_nodes,
        })
    }

    /// Route a statement on bound tables, e.g. a join of `t_order` and
    /// `t_order_item`. The first table is routed and every unit also maps
    /// the other tables to their actual tables in the same position.
    pub fn route_binding<S: AsRef<str>>(
        &self,
        tables: &[S],
        conditions: &[ShardingCondition],
        hints: &HintContext,
    ) -> Result<RouteResult, Error> {
        let primary = match tables {
            [] => return Err(Error::NotBindingTables(String::new())),
            [table] => return self.route(table.as_ref(), conditions, hints),
            [primary, ..] => primary.as_ref(),
        };

        if !self.rule.is_all_binding_tables(tables) {
            return Err(Error::NotBindingTables(
                tables
                    .iter()
                    .map(|t| t.as_ref())
                    .collect::<Vec<_>>()
                    .join(", "),
            ));
        }

        let mut result = self.route(primary, conditions, hints)?;
        for unit in &mut result.units {
            let Some(routed) = unit.tables.first().cloned() else {
                continue;
            };
            let bound = self.rule.binding_actual_tables(
                &unit.data_source.actual_name,
                &routed.logic_name,
                &routed.actual_name,
                tables,
            );
            unit.tables.extend(
                bound
                    .into_iter()
                    .map(|(logic, actual)| RouteMapper::new(logic, actual)),
            );
        }

        Ok(result)
    }

    /// Condition values that shard a dimension of the table: values on the
    /// table itself or on a table bound to it, on one of the strategy's columns.
    fn condition_values(
        &self,
        rule: &TableRule,
        dimension: Dimension,
        condition: &ShardingCondition,
    ) -> Vec<ShardingConditionValue> {
        let columns = rule.strategy(dimension).columns();
        let logic_table = &rule.table.logic_table;

        condition
            .values
            .iter()
            .filter(|value| {
                value.table.eq_ignore_ascii_case(logic_table)
                    || self.rule.is_binding(&value.table, logic_table)
            })
            .filter(|value| columns.iter().any(|c| c.eq_ignore_ascii_case(&value.column)))
            .cloned()
            .collect()
    }

    /// Route one pass: data sources first, then tables in each of them.
    fn route_once(
        &self,
        rule: &TableRule,
        database_values: &[ShardingConditionValue],
        table_values: &[ShardingConditionValue],
    ) -> Result<Vec<DataNode>, Error> {
        let table = &rule.table;
        let logic_table = table.logic_table.as_str();

        let data_sources = if database_values.is_empty() {
            table.actual_data_sources.clone()
        } else {
            let routed = rule.database_strategy.narrow(
                logic_table,
                &table.actual_data_sources,
                database_values,
                &table.data_source_info,
            )?;

            if routed.is_empty() {
                return Err(Error::EmptyDatabaseRoute {
                    table: logic_table.to_string(),
                    values: display_values(&flatten(database_values)),
                    data_sources: join(&table.actual_data_sources),
                });
            }

            configured(&routed, &table.actual_data_sources).ok_or_else(|| {
                Error::InvalidDatabaseRoute {
                    table: logic_table.to_string(),
                    routed: join(&routed),
                    data_sources: join(&table.actual_data_sources),
                }
            })?
        };
        debug!("\"{}\" data sources: [{}]", logic_table, join(&data_sources));

        let mut nodes = vec![];
        for data_source in &data_sources {
            let Some(actual_tables) = table.actual_tables(data_source) else {
                continue;
            };

            let tables = if table_values.is_empty() {
                actual_tables.clone()
            } else {
                let routed = rule.table_strategy.narrow(
                    logic_table,
                    actual_tables,
                    table_values,
                    &table.table_info,
                )?;

                configured(&routed, actual_tables).ok_or_else(|| Error::InvalidTableRoute {
                    table: logic_table.to_string(),
                    data_source: data_source.clone(),
                    routed: join(&routed),
                    tables: join(actual_tables),
                })?
            };
            debug!(
                "\"{}\" tables in \"{}\": [{}]",
                logic_table,
                data_source,
                join(&tables)
            );

            nodes.extend(
                tables
                    .iter()
                    .map(|actual_table| DataNode::new(data_source, actual_table)),
            );
        }

        Ok(nodes)
    }
}

/// Hint values presented the way the strategy reads them. Non-hint
/// strategies see them as an `IN` list on each of their columns.
fn hint_values(
    table: &str,
    strategy: &ShardingStrategy,
    values: Vec<ShardingValue>,
) -> Vec<ShardingConditionValue> {
    if values.is_empty() {
        return vec![];
    }

    match strategy {
        ShardingStrategy::None => vec![],
        ShardingStrategy::Hint { .. } => {
            vec![ShardingConditionValue::in_list(table, "", values)]
        }
        ShardingStrategy::Standard { .. } | ShardingStrategy::Complex { .. } => strategy
            .columns()
            .iter()
            .map(|column| ShardingConditionValue::in_list(table, column, values.iter().cloned()))
            .collect(),
    }
}

/// Map routed names to their configured spelling.
/// `None` if any of them isn't configured.
fn configured(routed: &IndexSet<String>, names: &IndexSet<String>) -> Option<IndexSet<String>> {
    routed
        .iter()
        .map(|name| names.iter().find(|n| n.eq_ignore_ascii_case(name)).cloned())
        .collect()
}

fn flatten(values: &[ShardingConditionValue]) -> Vec<ShardingValue> {
    values.iter().flat_map(|v| v.values.iter().cloned()).collect()
}

fn join(names: &IndexSet<String>) -> String {
    names.iter().cloned().collect::<Vec<_>>().join(", ")
}
