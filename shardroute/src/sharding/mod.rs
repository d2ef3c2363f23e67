//! Sharding primitives: values, conditions, hints, expressions,
//! algorithms and strategies.

pub mod algorithm;
pub mod condition;
pub mod data_node;
pub mod error;
pub mod expression;
pub mod hint;
pub mod strategy;
pub mod value;

pub use algorithm::{AlgorithmInput, AlgorithmRegistry, ShardingAlgorithm};
pub use condition::{Operator, ShardingCondition, ShardingConditionValue, ValueRange};
pub use data_node::{DataNode, DataNodeInfo};
pub use error::Error;
pub use expression::{split_and_evaluate, Template};
pub use hint::{HintContext, SqlHints};
pub use strategy::ShardingStrategy;
pub use value::ShardingValue;
