use indexmap::IndexSet;
use shardroute_config::Props;

use super::{matching, AlgorithmInput, ShardingAlgorithm};
use crate::sharding::{expression::Variables, DataNodeInfo, Error, ShardingValue, Template};

/// Hint algorithm written as an expression over `value`, e.g. `ds_${value % 2}`.
#[derive(Debug)]
pub struct HintInline {
    template: Template,
}

impl HintInline {
    pub const KIND: &'static str = "hint_inline";
    const DEFAULT_EXPRESSION: &'static str = "${value}";

    pub fn new(props: &Props) -> Result<Self, Error> {
        let expression = props
            .string("algorithm_expression")
            .unwrap_or_else(|| Self::DEFAULT_EXPRESSION.to_string());
        Ok(Self {
            template: Template::parse(&expression)?,
        })
    }

    fn evaluate(&self, values: &[ShardingValue]) -> Result<Vec<String>, Error> {
        values
            .iter()
            .map(|value| {
                self.template
                    .evaluate(&Variables::default().bind("value", value.clone()))
            })
            .collect()
    }
}

impl ShardingAlgorithm for HintInline {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn shard(
        &self,
        candidates: &IndexSet<String>,
        input: &AlgorithmInput<'_>,
        _data_node_info: &DataNodeInfo,
    ) -> Result<IndexSet<String>, Error> {
        match input {
            AlgorithmInput::Hint { values, .. } | AlgorithmInput::Precise { values, .. } => {
                let names = self.evaluate(values)?;
                Ok(matching(candidates, names.iter().map(|n| n.as_str())))
            }
            AlgorithmInput::Range { .. } | AlgorithmInput::Complex { .. } => Ok(candidates.clone()),
        }
    }

    fn structure(&self, prefix: &str, _column: &str) -> Option<String> {
        let structure = self.template.source().replacen(prefix, "", 1);
        Some(structure.split_whitespace().collect())
    }
}

#[cfg(test)]
mod test {
    use super::super::test::candidates;
    use super::*;
    use shardroute_config::AlgorithmConfig;

    #[test]
    fn test_hint() {
        let algorithm = HintInline::new(
            &AlgorithmConfig::new("hint_inline")
                .prop("algorithm_expression", "ds_${value % 2}")
                .props,
        )
        .unwrap();
        let data_sources = candidates(&["ds_0", "ds_1"]);
        let values: [ShardingValue; 1] = [3.into()];
        let result = algorithm
            .shard(
                &data_sources,
                &AlgorithmInput::Hint {
                    table: "t_order",
                    values: &values,
                },
                &DataNodeInfo::default(),
            )
            .unwrap();
        assert_eq!(result, candidates(&["ds_1"]));
    }

    #[test]
    fn test_default_expression() {
        let algorithm = HintInline::new(&Props::default()).unwrap();
        let tables = candidates(&["t_order_0", "t_order_1"]);
        let values: [ShardingValue; 1] = ["T_ORDER_1".into()];
        let result = algorithm
            .shard(
                &tables,
                &AlgorithmInput::Hint {
                    table: "t_order",
                    values: &values,
                },
                &DataNodeInfo::default(),
            )
            .unwrap();
        assert_eq!(result, candidates(&["t_order_1"]));
    }
}
