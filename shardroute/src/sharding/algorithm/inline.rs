use indexmap::IndexSet;
use shardroute_config::Props;
use tracing::trace;

use super::{
    complex_inline::evaluate_product, matching, required_prop, AlgorithmInput, ShardingAlgorithm,
};
use crate::sharding::{expression::Variables, DataNodeInfo, Error, ShardingValue, Template};

/// Single-column algorithm written as an expression, e.g. `t_order_${order_id % 2}`.
#[derive(Debug)]
pub struct Inline {
    template: Template,
    allow_range_query: bool,
}

impl Inline {
    pub const KIND: &'static str = "inline";

    pub fn new(props: &Props) -> Result<Self, Error> {
        let expression = required_prop(Self::KIND, props, "algorithm_expression")?;
        Ok(Self {
            template: Template::parse(&expression)?,
            allow_range_query: props.boolean("allow_range_query").unwrap_or(false),
        })
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Name for one value of the sharding column.
    pub fn evaluate(&self, column: &str, value: &ShardingValue) -> Result<String, Error> {
        self.template
            .evaluate(&Variables::default().bind(column, value.clone()))
    }
}

impl ShardingAlgorithm for Inline {
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
            AlgorithmInput::Precise { column, values, .. } => {
                let names = values
                    .iter()
                    .map(|value| self.evaluate(column, value))
                    .collect::<Result<Vec<_>, _>>()?;
                trace!("{} {} -> {:?}", self.template, column, names);
                Ok(matching(candidates, names.iter().map(|n| n.as_str())))
            }

            AlgorithmInput::Hint { values, .. } => {
                let variables = self.template.variables();
                let names = values
                    .iter()
                    .map(|value| {
                        let bound = variables.iter().fold(Variables::default(), |vars, name| {
                            vars.bind(name, value.clone())
                        });
                        self.template.evaluate(&bound)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(matching(candidates, names.iter().map(|n| n.as_str())))
            }

            AlgorithmInput::Complex { values, ranges, .. } if ranges.is_empty() => {
                let names = evaluate_product(&self.template, values)?;
                Ok(matching(candidates, names.iter().map(|n| n.as_str())))
            }

            AlgorithmInput::Range { column, .. } => self.range(candidates, column),

            AlgorithmInput::Complex { ranges, .. } => {
                let column = ranges.keys().next().map(|c| c.as_str()).unwrap_or_default();
                self.range(candidates, column)
            }
        }
    }

    fn structure(&self, prefix: &str, column: &str) -> Option<String> {
        let structure = self
            .template
            .source()
            .replacen(prefix, "", 1)
            .replacen(column, "", 1);
        Some(structure.split_whitespace().collect())
    }
}

impl Inline {
    fn range(&self, candidates: &IndexSet<String>, column: &str) -> Result<IndexSet<String>, Error> {
        if self.allow_range_query {
            Ok(candidates.clone())
        } else {
            Err(Error::RangeQueryNotAllowed {
                algorithm: self.template.to_string(),
                column: column.to_string(),
            })
        }
    }
}
