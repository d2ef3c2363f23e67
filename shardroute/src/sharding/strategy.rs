use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use tracing::trace;

use super::{
    AlgorithmInput, DataNodeInfo, Error, ShardingAlgorithm, ShardingConditionValue, ShardingValue,
    ValueRange,
};

/// How one dimension of a table is sharded.
#[derive(Debug, Clone)]
pub enum ShardingStrategy {
    /// Not sharded: every candidate.
    None,
    /// One sharding column.
    Standard {
        column: String,
        algorithm: Arc<dyn ShardingAlgorithm>,
    },
    /// Several columns, passed to the algorithm together.
    Complex {
        columns: Vec<String>,
        algorithm: Arc<dyn ShardingAlgorithm>,
    },
    /// Values come from hints, columns are ignored.
    Hint { algorithm: Arc<dyn ShardingAlgorithm> },
}

impl ShardingStrategy {
    /// Columns condition values are matched against.
    pub fn columns(&self) -> Vec<String> {
        match self {
            Self::Standard { column, .. } => vec![column.clone()],
            Self::Complex { columns, .. } => columns.clone(),
            Self::None | Self::Hint { .. } => vec![],
        }
    }

    pub fn algorithm(&self) -> Option<&Arc<dyn ShardingAlgorithm>> {
        match self {
            Self::None => None,
            Self::Standard { algorithm, .. }
            | Self::Complex { algorithm, .. }
            | Self::Hint { algorithm } => Some(algorithm),
        }
    }

    pub fn is_hint(&self) -> bool {
        matches!(self, Self::Hint { .. })
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Narrow candidates down to the names the values shard to.
    ///
    /// Values on the same column are conjunctive. Without values
    /// for the strategy's columns, all candidates are returned.
    pub fn narrow(
        &self,
        table: &str,
        candidates: &IndexSet<String>,
        values: &[ShardingConditionValue],
        data_node_info: &DataNodeInfo,
    ) -> Result<IndexSet<String>, Error> {
        match self {
            Self::None => Ok(candidates.clone()),

            Self::Standard { column, algorithm } => {
                let mut result: Option<IndexSet<String>> = None;

                for value in values
                    .iter()
                    .filter(|v| v.column.eq_ignore_ascii_case(column))
                {
                    let shards = if value.is_list() {
                        let input = AlgorithmInput::Precise {
                            table,
                            column,
                            values: &value.values,
                        };
                        algorithm.shard(candidates, &input, data_node_info)?
                    } else {
                        match value.range() {
                            Some(range) => {
                                let input = AlgorithmInput::Range {
                                    table,
                                    column,
                                    range: &range,
                                };
                                algorithm.shard(candidates, &input, data_node_info)?
                            }
                            None => candidates.clone(),
                        }
                    };
                    trace!(
                        "{} [{}] {:?} -> {:?}",
                        algorithm.kind(),
                        column,
                        value.values,
                        shards
                    );

                    result = Some(match result {
                        Some(previous) => previous
                            .into_iter()
                            .filter(|name| shards.contains(name))
                            .collect(),
                        None => shards,
                    });
                }

                Ok(result.unwrap_or_else(|| candidates.clone()))
            }

            Self::Complex { columns, algorithm } => {
                let mut lists: IndexMap<String, Vec<ShardingValue>> = IndexMap::new();
                let mut ranges: IndexMap<String, ValueRange> = IndexMap::new();

                for column in columns {
                    for value in values
                        .iter()
                        .filter(|v| v.column.eq_ignore_ascii_case(column))
                    {
                        if value.is_list() {
                            match lists.get_mut(column) {
                                Some(list) => list.retain(|v| value.values.contains(v)),
                                None => {
                                    lists.insert(column.clone(), value.values.clone());
                                }
                            }
                        } else if let Some(range) = value.range() {
                            let range = match ranges.get(column) {
                                Some(previous) => previous.intersect(&range),
                                None => range,
                            };
                            ranges.insert(column.clone(), range);
                        }
                    }
                }

                if lists.is_empty() && ranges.is_empty() {
                    return Ok(candidates.clone());
                }

                let input = AlgorithmInput::Complex {
                    table,
                    values: &lists,
                    ranges: &ranges,
                };
                let shards = algorithm.shard(candidates, &input, data_node_info)?;
                trace!(
                    "{} {:?} {:?} -> {:?}",
                    algorithm.kind(),
                    lists,
                    ranges,
                    shards
                );
                Ok(shards)
            }

            Self::Hint { algorithm } => {
                let hints = values
                    .iter()
                    .flat_map(|v| v.values.iter().cloned())
                    .collect::<Vec<_>>();
                if hints.is_empty() {
                    return Ok(candidates.clone());
                }
                let input = AlgorithmInput::Hint {
                    table,
                    values: &hints,
                };
                let shards = algorithm.shard(candidates, &input, data_node_info)?;
                trace!("{} hint {:?} -> {:?}", algorithm.kind(), hints, shards);
                Ok(shards)
            }
        }
    }
}
