//! Sharding algorithms.
//!
//! An algorithm maps sharding values to physical names. Algorithms are
//! created by type name from the configuration; applications can register
//! their own types on an [`AlgorithmRegistry`].

use std::fmt::Debug;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use shardroute_config::{AlgorithmConfig, Props};

use super::{DataNodeInfo, Error, ShardingValue, ValueRange};

pub mod boundary_range;
pub mod complex_inline;
pub mod hash_mod;
pub mod hint_inline;
pub mod inline;
pub mod modulo;

pub use boundary_range::BoundaryRange;
pub use complex_inline::ComplexInline;
pub use hash_mod::HashMod;
pub use hint_inline::HintInline;
pub use inline::Inline;
pub use modulo::Modulo;

/// Values handed to an algorithm by a strategy.
#[derive(Debug, Clone, Copy)]
pub enum AlgorithmInput<'a> {
    /// `=` / `IN` on one column.
    Precise {
        table: &'a str,
        column: &'a str,
        values: &'a [ShardingValue],
    },
    /// Range predicate on one column.
    Range {
        table: &'a str,
        column: &'a str,
        range: &'a ValueRange,
    },
    /// All configured columns at once.
    Complex {
        table: &'a str,
        values: &'a IndexMap<String, Vec<ShardingValue>>,
        ranges: &'a IndexMap<String, ValueRange>,
    },
    /// Hint values, no column.
    Hint {
        table: &'a str,
        values: &'a [ShardingValue],
    },
}

impl AlgorithmInput<'_> {
    pub fn table(&self) -> &str {
        match self {
            Self::Precise { table, .. }
            | Self::Range { table, .. }
            | Self::Complex { table, .. }
            | Self::Hint { table, .. } => table,
        }
    }
}

pub trait ShardingAlgorithm: Debug + Send + Sync {
    /// Type name, e.g. `inline`.
    fn kind(&self) -> &str;

    /// Auto algorithms generate the table's data nodes themselves.
    fn is_auto(&self) -> bool {
        false
    }

    /// Number of tables an auto algorithm distributes rows over.
    fn sharding_count(&self) -> Option<usize> {
        None
    }

    /// Pick the target names among candidates. Names that aren't
    /// candidates are returned as-is and rejected by the caller.
    fn shard(
        &self,
        candidates: &IndexSet<String>,
        input: &AlgorithmInput<'_>,
        data_node_info: &DataNodeInfo,
    ) -> Result<IndexSet<String>, Error>;

    /// Signature used to decide if two tables shard identically.
    /// `None` means the algorithm can't be compared.
    fn structure(&self, _prefix: &str, _column: &str) -> Option<String> {
        None
    }
}

type Constructor = Arc<dyn Fn(&Props) -> Result<Arc<dyn ShardingAlgorithm>, Error> + Send + Sync>;

/// Algorithm types available to the configuration.
#[derive(Clone)]
pub struct AlgorithmRegistry {
    constructors: IndexMap<String, Constructor>,
}

impl Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgorithmRegistry")
            .field("types", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Inline::KIND, |props| Ok(Arc::new(Inline::new(props)?)));
        registry.register(HintInline::KIND, |props| {
            Ok(Arc::new(HintInline::new(props)?))
        });
        registry.register(ComplexInline::KIND, |props| {
            Ok(Arc::new(ComplexInline::new(props)?))
        });
        registry.register(Modulo::KIND, |props| Ok(Arc::new(Modulo::new(props)?)));
        registry.register(HashMod::KIND, |props| Ok(Arc::new(HashMod::new(props)?)));
        registry.register(BoundaryRange::KIND, |props| {
            Ok(Arc::new(BoundaryRange::new(props)?))
        });
        registry
    }
}

impl AlgorithmRegistry {
    /// Registry without the built-in types.
    pub fn empty() -> Self {
        Self {
            constructors: IndexMap::new(),
        }
    }

    /// Add or replace an algorithm type. Type names ignore case.
    pub fn register<F>(&mut self, kind: &str, constructor: F)
    where
        F: Fn(&Props) -> Result<Arc<dyn ShardingAlgorithm>, Error> + Send + Sync + 'static,
    {
        self.constructors
            .insert(kind.to_lowercase(), Arc::new(constructor));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(&kind.to_lowercase())
    }

    /// Instantiate the configured algorithm.
    pub fn create(&self, config: &AlgorithmConfig) -> Result<Arc<dyn ShardingAlgorithm>, Error> {
        let constructor = self
            .constructors
            .get(&config.kind.to_lowercase())
            .ok_or_else(|| Error::UnknownAlgorithmType(config.kind.clone()))?;
        constructor(&config.props)
    }
}

/// Pick candidates matching evaluated names, keeping the candidate's spelling.
pub(crate) fn matching<'a>(
    candidates: &IndexSet<String>,
    names: impl IntoIterator<Item = &'a str>,
) -> IndexSet<String> {
    names
        .into_iter()
        .map(|name| {
            candidates
                .iter()
                .find(|c| c.eq_ignore_ascii_case(name))
                .cloned()
                .unwrap_or_else(|| name.to_string())
        })
        .collect()
}

/// Candidates whose numeric suffix is one of the given partitions.
pub(crate) fn by_suffix(
    candidates: &IndexSet<String>,
    data_node_info: &DataNodeInfo,
    partitions: &IndexSet<u64>,
) -> IndexSet<String> {
    candidates
        .iter()
        .filter(|c| {
            data_node_info
                .suffix_number(c)
                .map(|n| partitions.contains(&n))
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Structure of auto algorithms: type and properties.
pub(crate) fn auto_structure(kind: &str, props: &Props) -> String {
    format!("{}({})", kind, props)
}

pub(crate) fn required_prop(kind: &str, props: &Props, name: &str) -> Result<String, Error> {
    props.string(name).ok_or_else(|| Error::MissingProperty {
        algorithm: kind.to_string(),
        property: name.to_string(),
    })
}

pub(crate) fn sharding_count(kind: &str, props: &Props) -> Result<usize, Error> {
    const PROPERTY: &str = "sharding_count";

    let count = props.integer(PROPERTY).ok_or_else(|| {
        if props.get(PROPERTY).is_some() {
            Error::InvalidProperty {
                algorithm: kind.to_string(),
                property: PROPERTY.to_string(),
                reason: "not an integer".into(),
            }
        } else {
            Error::MissingProperty {
                algorithm: kind.to_string(),
                property: PROPERTY.to_string(),
            }
        }
    })?;

    if count <= 0 {
        return Err(Error::InvalidProperty {
            algorithm: kind.to_string(),
            property: PROPERTY.to_string(),
            reason: "must be greater than zero".into(),
        });
    }

    Ok(count as usize)
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    pub(crate) fn candidates(names: &[&str]) -> IndexSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[derive(Debug)]
    struct Everything;

    impl ShardingAlgorithm for Everything {
        fn kind(&self) -> &str {
            "everything"
        }

        fn shard(
            &self,
            candidates: &IndexSet<String>,
            _input: &AlgorithmInput<'_>,
            _data_node_info: &DataNodeInfo,
        ) -> Result<IndexSet<String>, Error> {
            Ok(candidates.clone())
        }
    }

    #[test]
    fn test_registry() {
        let registry = AlgorithmRegistry::default();
        for kind in ["inline", "HINT_INLINE", "complex_inline", "mod", "hash_mod", "boundary_range"] {
            assert!(registry.contains(kind), "{}", kind);
        }

        let algorithm = registry
            .create(&AlgorithmConfig::new("MOD").prop("sharding_count", 4))
            .unwrap();
        assert!(algorithm.is_auto());
        assert_eq!(algorithm.sharding_count(), Some(4));

        assert!(matches!(
            registry.create(&AlgorithmConfig::new("everything")),
            Err(Error::UnknownAlgorithmType(_))
        ));

        let mut registry = AlgorithmRegistry::empty();
        registry.register("everything", |_| Ok(Arc::new(Everything)));
        let algorithm = registry.create(&AlgorithmConfig::new("everything")).unwrap();
        assert_eq!(algorithm.kind(), "everything");
        assert!(algorithm.structure("t_", "id").is_none());
    }

    #[test]
    fn test_sharding_count_prop() {
        assert!(matches!(
            sharding_count("mod", &Props::default()),
            Err(Error::MissingProperty { .. })
        ));
        let props = AlgorithmConfig::new("mod").prop("sharding_count", 0).props;
        assert!(matches!(
            sharding_count("mod", &props),
            Err(Error::InvalidProperty { .. })
        ));
    }

    #[test]
    fn test_matching_keeps_candidate_spelling() {
        let result = matching(&candidates(&["T_ORDER_0", "t_order_1"]), ["t_order_0", "t_order_9"]);
        assert_eq!(result, candidates(&["T_ORDER_0", "t_order_9"]));
    }
}
