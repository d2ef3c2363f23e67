use indexmap::IndexSet;
use shardroute_config::Props;
use tracing::trace;

use super::{auto_structure, by_suffix, sharding_count, AlgorithmInput, ShardingAlgorithm};
use crate::sharding::{DataNodeInfo, Error, ShardingValue, ValueRange};

/// `value mod sharding_count` picks the table with that suffix.
#[derive(Debug)]
pub struct Modulo {
    count: usize,
    props: Props,
}

impl Modulo {
    pub const KIND: &'static str = "mod";

    pub fn new(props: &Props) -> Result<Self, Error> {
        Ok(Self {
            count: sharding_count(Self::KIND, props)?,
            props: props.clone(),
        })
    }

    fn partition(&self, value: &ShardingValue) -> Result<u64, Error> {
        let integer = value.integer().ok_or_else(|| Error::AlgorithmEvaluation {
            algorithm: Self::KIND.to_string(),
            reason: format!("\"{}\" is not an integer", value),
        })?;
        Ok(integer.rem_euclid(self.count as i64) as u64)
    }

    /// Partitions covered by a range, `None` if it covers all of them.
    fn range_partitions(&self, range: &ValueRange) -> Option<IndexSet<u64>> {
        let (Some(lower), Some(upper)) = range.integer_bounds()? else {
            return None;
        };
        if (upper as i128) - (lower as i128) + 1 >= self.count as i128 {
            return None;
        }
        // Empty if upper < lower.
        Some((lower..=upper).map(|v| v.rem_euclid(self.count as i64) as u64).collect())
    }
}

impl ShardingAlgorithm for Modulo {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn is_auto(&self) -> bool {
        true
    }

    fn sharding_count(&self) -> Option<usize> {
        Some(self.count)
    }

    fn shard(
        &self,
        candidates: &IndexSet<String>,
        input: &AlgorithmInput<'_>,
        data_node_info: &DataNodeInfo,
    ) -> Result<IndexSet<String>, Error> {
        let partitions = match input {
            AlgorithmInput::Precise { values, .. } | AlgorithmInput::Hint { values, .. } => values
                .iter()
                .map(|value| self.partition(value))
                .collect::<Result<IndexSet<_>, _>>()?,

            AlgorithmInput::Range { range, .. } => match self.range_partitions(range) {
                Some(partitions) => partitions,
                None => return Ok(candidates.clone()),
            },

            AlgorithmInput::Complex { values, ranges, .. } => {
                if !ranges.is_empty() {
                    return Ok(candidates.clone());
                }
                values
                    .values()
                    .flatten()
                    .map(|value| self.partition(value))
                    .collect::<Result<IndexSet<_>, _>>()?
            }
        };

        trace!("mod {} -> partitions {:?}", self.count, partitions);

        Ok(by_suffix(candidates, data_node_info, &partitions))
    }

    fn structure(&self, _prefix: &str, _column: &str) -> Option<String> {
        Some(auto_structure(Self::KIND, &self.props))
    }
}
