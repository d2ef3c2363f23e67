use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use shardroute_config::FlexibleType;
use uuid::Uuid;

/// Sharding key value, already extracted from a statement or a hint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ShardingValue {
    Integer(i64),
    Uuid(Uuid),
    String(String),
}

impl ShardingValue {
    /// Guess the type from text: integer, then UUID, then string.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if let Ok(integer) = value.parse::<i64>() {
            Self::Integer(integer)
        } else if let Ok(uuid) = value.parse::<Uuid>() {
            Self::Uuid(uuid)
        } else {
            Self::String(value.to_string())
        }
    }

    pub fn integer(&self) -> Option<i64> {
        match self {
            Self::Integer(integer) => Some(*integer),
            _ => None,
        }
    }
}

impl FromStr for ShardingValue {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl Display for ShardingValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(integer) => write!(f, "{}", integer),
            Self::Uuid(uuid) => write!(f, "{}", uuid),
            Self::String(string) => write!(f, "{}", string),
        }
    }
}

impl From<i64> for ShardingValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for ShardingValue {
    fn from(value: i32) -> Self {
        Self::Integer(value as i64)
    }
}

impl From<Uuid> for ShardingValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<String> for ShardingValue {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<&str> for ShardingValue {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<&FlexibleType> for ShardingValue {
    fn from(value: &FlexibleType) -> Self {
        match value {
            FlexibleType::Integer(integer) => Self::Integer(*integer),
            FlexibleType::Uuid(uuid) => Self::Uuid(*uuid),
            FlexibleType::Boolean(b) => Self::String(b.to_string()),
            FlexibleType::String(s) => Self::String(s.clone()),
        }
    }
}

/// Render a list of values for error messages.
pub(crate) fn display_values(values: &[ShardingValue]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
