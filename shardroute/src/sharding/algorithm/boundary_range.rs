use indexmap::IndexSet;
use shardroute_config::Props;

use super::{auto_structure, by_suffix, required_prop, AlgorithmInput, ShardingAlgorithm};
use crate::sharding::{DataNodeInfo, Error, ShardingValue, ValueRange};

/// Partitions split at ascending boundaries `b1..bk`:
/// partition `0` is `< b1`, partition `i` is `[bi, bi+1)`, partition `k` is `>= bk`.
#[derive(Debug)]
pub struct BoundaryRange {
    boundaries: Vec<i64>,
    props: Props,
}

impl BoundaryRange {
    pub const KIND: &'static str = "boundary_range";
    const PROPERTY: &'static str = "sharding_ranges";

    pub fn new(props: &Props) -> Result<Self, Error> {
        let ranges = required_prop(Self::KIND, props, Self::PROPERTY)?;
        let invalid = |reason: String| Error::InvalidProperty {
            algorithm: Self::KIND.to_string(),
            property: Self::PROPERTY.to_string(),
            reason,
        };

        let boundaries = ranges
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(|b| {
                b.parse::<i64>()
                    .map_err(|_| invalid(format!("\"{}\" is not an integer", b)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if boundaries.is_empty() {
            return Err(invalid("no boundaries".into()));
        }
        if boundaries.windows(2).any(|w| w[0] >= w[1]) {
            return Err(invalid("boundaries must be ascending".into()));
        }

        Ok(Self {
            boundaries,
            props: props.clone(),
        })
    }

    fn partition(&self, value: i64) -> u64 {
        self.boundaries.partition_point(|b| *b <= value) as u64
    }

    fn value_partition(&self, value: &ShardingValue) -> Result<u64, Error> {
        let integer = value.integer().ok_or_else(|| Error::AlgorithmEvaluation {
            algorithm: Self::KIND.to_string(),
            reason: format!("\"{}\" is not an integer", value),
        })?;
        Ok(self.partition(integer))
    }

    fn range_partitions(&self, range: &ValueRange) -> Option<IndexSet<u64>> {
        let (lower, upper) = range.integer_bounds()?;
        let first = lower.map(|l| self.partition(l)).unwrap_or(0);
        let last = upper
            .map(|u| self.partition(u))
            .unwrap_or(self.boundaries.len() as u64);
        match (lower, upper) {
            (Some(l), Some(u)) if u < l => Some(IndexSet::new()),
            _ => Some((first..=last).collect()),
        }
    }
}

impl ShardingAlgorithm for BoundaryRange {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn is_auto(&self) -> bool {
        true
    }

    fn sharding_count(&self) -> Option<usize> {
        Some(self.boundaries.len() + 1)
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
                .map(|value| self.value_partition(value))
                .collect::<Result<IndexSet<_>, _>>()?,

            AlgorithmInput::Range { range, .. } => match self.range_partitions(range) {
                Some(partitions) => partitions,
                None => return Ok(candidates.clone()),
            },

            AlgorithmInput::Complex { values, ranges, .. } => {
                let mut partitions = values
                    .values()
                    .flatten()
                    .map(|value| self.value_partition(value))
                    .collect::<Result<IndexSet<_>, _>>()?;
                for range in ranges.values() {
                    match self.range_partitions(range) {
                        Some(covered) => partitions.extend(covered),
                        None => return Ok(candidates.clone()),
                    }
                }
                partitions
            }
        };

        Ok(by_suffix(candidates, data_node_info, &partitions))
    }

    fn structure(&self, _prefix: &str, _column: &str) -> Option<String> {
        Some(auto_structure(Self::KIND, &self.props))
    }
}
