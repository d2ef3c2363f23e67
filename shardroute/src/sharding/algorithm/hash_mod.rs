use indexmap::IndexSet;
use sha1::{Digest, Sha1};
use shardroute_config::Props;

use super::{auto_structure, by_suffix, sharding_count, AlgorithmInput, ShardingAlgorithm};
use crate::sharding::{DataNodeInfo, Error, ShardingValue};

/// Hash of the value's text, `mod sharding_count`.
#[derive(Debug)]
pub struct HashMod {
    count: usize,
    props: Props,
}

impl HashMod {
    pub const KIND: &'static str = "hash_mod";

    pub fn new(props: &Props) -> Result<Self, Error> {
        Ok(Self {
            count: sharding_count(Self::KIND, props)?,
            props: props.clone(),
        })
    }

    /// First 8 bytes of the SHA-1 digest, big-endian.
    pub fn hash(value: &ShardingValue) -> u64 {
        let digest = Sha1::digest(value.to_string().as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(bytes)
    }

    fn partition(&self, value: &ShardingValue) -> u64 {
        Self::hash(value) % self.count as u64
    }
}

impl ShardingAlgorithm for HashMod {
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
        let partitions: IndexSet<u64> = match input {
            AlgorithmInput::Precise { values, .. } | AlgorithmInput::Hint { values, .. } => {
                values.iter().map(|value| self.partition(value)).collect()
            }
            AlgorithmInput::Complex { values, ranges, .. } if ranges.is_empty() => values
                .values()
                .flatten()
                .map(|value| self.partition(value))
                .collect(),
            AlgorithmInput::Range { .. } | AlgorithmInput::Complex { .. } => {
                return Ok(candidates.clone())
            }
        };

        Ok(by_suffix(candidates, data_node_info, &partitions))
    }

    fn structure(&self, _prefix: &str, _column: &str) -> Option<String> {
        Some(auto_structure(Self::KIND, &self.props))
    }
}
