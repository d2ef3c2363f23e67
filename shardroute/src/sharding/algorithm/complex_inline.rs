use indexmap::{IndexMap, IndexSet};
use shardroute_config::Props;

use super::{matching, required_prop, AlgorithmInput, ShardingAlgorithm};
use crate::sharding::{expression::Variables, DataNodeInfo, Error, ShardingValue, Template};

/// Multi-column algorithm written as an expression,
/// e.g. `t_order_${(user_id + order_id) % 2}`.
#[derive(Debug)]
pub struct ComplexInline {
    template: Template,
    columns: Vec<String>,
}

impl ComplexInline {
    pub const KIND: &'static str = "complex_inline";

    pub fn new(props: &Props) -> Result<Self, Error> {
        let expression = required_prop(Self::KIND, props, "algorithm_expression")?;
        let template = Template::parse(&expression)?;

        let columns = match props.string("sharding_columns") {
            Some(columns) => columns
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            None => template.variables().iter().map(|v| v.to_string()).collect(),
        };

        Ok(Self { template, columns })
    }

    fn shard_values(
        &self,
        candidates: &IndexSet<String>,
        values: &IndexMap<String, Vec<ShardingValue>>,
    ) -> Result<IndexSet<String>, Error> {
        let complete = self
            .columns
            .iter()
            .all(|column| values.keys().any(|c| c.eq_ignore_ascii_case(column)));

        if !complete {
            return Ok(candidates.clone());
        }

        let names = evaluate_product(&self.template, values)?;
        Ok(matching(candidates, names.iter().map(|n| n.as_str())))
    }
}

impl ShardingAlgorithm for ComplexInline {
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
            AlgorithmInput::Complex { values, ranges, .. } => {
                if !ranges.is_empty() {
                    return Ok(candidates.clone());
                }
                self.shard_values(candidates, values)
            }

            AlgorithmInput::Precise { column, values, .. } => {
                let values = IndexMap::from([(column.to_string(), values.to_vec())]);
                self.shard_values(candidates, &values)
            }

            AlgorithmInput::Hint { values, .. } => {
                let values = self
                    .columns
                    .iter()
                    .map(|column| (column.clone(), values.to_vec()))
                    .collect();
                self.shard_values(candidates, &values)
            }

            AlgorithmInput::Range { .. } => Ok(candidates.clone()),
        }
    }

    fn structure(&self, prefix: &str, column: &str) -> Option<String> {
        let mut structure = self.template.source().replacen(prefix, "", 1);
        for column in column.split(',') {
            structure = structure.replacen(column.trim(), "", 1);
        }
        Some(structure.split_whitespace().collect())
    }
}

/// Evaluate the template for every combination of column values.
/// The first column varies slowest.
pub(super) fn evaluate_product(
    template: &Template,
    values: &IndexMap<String, Vec<ShardingValue>>,
) -> Result<Vec<String>, Error> {
    let mut combinations = vec![Variables::default()];

    for (column, column_values) in values {
        combinations = combinations
            .into_iter()
            .flat_map(|variables| {
                column_values
                    .iter()
                    .map(move |value| variables.clone().bind(column, value.clone()))
            })
            .collect();
    }

    combinations
        .iter()
        .map(|variables| template.evaluate(variables))
        .collect()
}

#[cfg(test)]
mod test {
    use super::super::test::candidates;
    use super::*;
    use crate::sharding::ValueRange;
    use shardroute_config::AlgorithmConfig;
    use std::ops::Bound;

    fn algorithm() -> ComplexInline {
        ComplexInline::new(
            &AlgorithmConfig::new("complex_inline")
                .prop("algorithm_expression", "t_order_${(user_id + order_id) % 4}")
                .prop("sharding_columns", "user_id, order_id")
                .props,
        )
        .unwrap()
    }

    #[test]
    fn test_all_columns() {
        let tables = candidates(&["t_order_0", "t_order_1", "t_order_2", "t_order_3"]);
        let values = IndexMap::from([
            ("user_id".to_string(), vec![ShardingValue::from(1), ShardingValue::from(2)]),
            ("order_id".to_string(), vec![ShardingValue::from(1)]),
        ]);
        let ranges = IndexMap::new();

        let result = algorithm()
            .shard(
                &tables,
                &AlgorithmInput::Complex {
                    table: "t_order",
                    values: &values,
                    ranges: &ranges,
                },
                &DataNodeInfo::default(),
            )
            .unwrap();
        assert_eq!(result, candidates(&["t_order_2", "t_order_3"]));
    }

    #[test]
    fn test_incomplete_returns_all() {
        let tables = candidates(&["t_order_0", "t_order_1"]);
        let values = IndexMap::from([("user_id".to_string(), vec![ShardingValue::from(1)])]);
        let ranges = IndexMap::new();

        let result = algorithm()
            .shard(
                &tables,
                &AlgorithmInput::Complex {
                    table: "t_order",
                    values: &values,
                    ranges: &ranges,
                },
                &DataNodeInfo::default(),
            )
            .unwrap();
        assert_eq!(result, tables);

        let ranges = IndexMap::from([(
            "order_id".to_string(),
            ValueRange::new(Bound::Unbounded, Bound::Excluded(ShardingValue::from(10))),
        )]);
        let result = algorithm()
            .shard(
                &tables,
                &AlgorithmInput::Complex {
                    table: "t_order",
                    values: &values,
                    ranges: &ranges,
                },
                &DataNodeInfo::default(),
            )
            .unwrap();
        assert_eq!(result, tables);
    }

    #[test]
    fn test_structure() {
        assert_eq!(
            algorithm().structure("t_order_", "user_id,order_id").unwrap(),
            "${(+)%4}"
        );
    }
}
