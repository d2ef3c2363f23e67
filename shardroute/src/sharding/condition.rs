//! Sharding conditions extracted from a statement.
//!
//! Extraction itself happens upstream; these types are what the
//! route engine consumes.

use std::fmt::Display;
use std::ops::Bound;

use super::{Error, ShardingValue};

/// Predicate operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    In,
    Between,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl Operator {
    /// `=` and `IN` carry discrete values, everything else is a range.
    pub fn is_list(&self) -> bool {
        matches!(self, Self::Equal | Self::In)
    }
}

/// Range of sharding values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueRange {
    pub lower: Bound<ShardingValue>,
    pub upper: Bound<ShardingValue>,
}

impl ValueRange {
    pub fn new(lower: Bound<ShardingValue>, upper: Bound<ShardingValue>) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, value: &ShardingValue) -> bool {
        let lower = match &self.lower {
            Bound::Included(bound) => value >= bound,
            Bound::Excluded(bound) => value > bound,
            Bound::Unbounded => true,
        };
        let upper = match &self.upper {
            Bound::Included(bound) => value <= bound,
            Bound::Excluded(bound) => value < bound,
            Bound::Unbounded => true,
        };
        lower && upper
    }

    /// Values in both ranges.
    pub fn intersect(&self, other: &ValueRange) -> ValueRange {
        use Bound::*;

        let lower = match (&self.lower, &other.lower) {
            (Unbounded, bound) | (bound, Unbounded) => bound.clone(),
            (Included(a), Included(b)) => Included(a.max(b).clone()),
            (Excluded(a), Excluded(b)) => Excluded(a.max(b).clone()),
            (Included(i), Excluded(e)) | (Excluded(e), Included(i)) => {
                if e >= i {
                    Excluded(e.clone())
                } else {
                    Included(i.clone())
                }
            }
        };

        let upper = match (&self.upper, &other.upper) {
            (Unbounded, bound) | (bound, Unbounded) => bound.clone(),
            (Included(a), Included(b)) => Included(a.min(b).clone()),
            (Excluded(a), Excluded(b)) => Excluded(a.min(b).clone()),
            (Included(i), Excluded(e)) | (Excluded(e), Included(i)) => {
                if e <= i {
                    Excluded(e.clone())
                } else {
                    Included(i.clone())
                }
            }
        };

        ValueRange::new(lower, upper)
    }

    /// Inclusive integer bounds. `None` if a bound isn't an integer;
    /// an inner `None` means that side is open.
    pub fn integer_bounds(&self) -> Option<(Option<i64>, Option<i64>)> {
        let lower = match &self.lower {
            Bound::Included(v) => Some(v.integer()?),
            Bound::Excluded(v) => Some(v.integer()?.checked_add(1)?),
            Bound::Unbounded => None,
        };
        let upper = match &self.upper {
            Bound::Included(v) => Some(v.integer()?),
            Bound::Excluded(v) => Some(v.integer()?.checked_sub(1)?),
            Bound::Unbounded => None,
        };
        Some((lower, upper))
    }
}

impl Display for ValueRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.lower {
            Bound::Included(v) => write!(f, "[{}", v)?,
            Bound::Excluded(v) => write!(f, "({}", v)?,
            Bound::Unbounded => write!(f, "(-∞")?,
        }
        write!(f, "..")?;
        match &self.upper {
            Bound::Included(v) => write!(f, "{}]", v),
            Bound::Excluded(v) => write!(f, "{})", v),
            Bound::Unbounded => write!(f, "+∞)"),
        }
    }
}

/// One predicate on one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardingConditionValue {
    /// Table the column belongs to.
    pub table: String,
    pub column: String,
    pub operator: Operator,
    /// Right-hand side. `Between` has exactly two.
    pub values: Vec<ShardingValue>,
}

impl ShardingConditionValue {
    pub fn equal(table: &str, column: &str, value: impl Into<ShardingValue>) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            operator: Operator::Equal,
            values: vec![value.into()],
        }
    }

    pub fn in_list<V: Into<ShardingValue>>(
        table: &str,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            operator: Operator::In,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn between(
        table: &str,
        column: &str,
        low: impl Into<ShardingValue>,
        high: impl Into<ShardingValue>,
    ) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            operator: Operator::Between,
            values: vec![low.into(), high.into()],
        }
    }

    /// `column <op> value` for the comparison operators.
    pub fn compare(
        table: &str,
        column: &str,
        operator: Operator,
        value: impl Into<ShardingValue>,
    ) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            operator,
            values: vec![value.into()],
        }
    }

    pub fn is_list(&self) -> bool {
        self.operator.is_list()
    }

    /// Range covered by this predicate, if it's a range predicate.
    pub fn range(&self) -> Option<ValueRange> {
        let first = self.values.first().cloned()?;
        let range = match self.operator {
            Operator::Equal | Operator::In => return None,
            Operator::Between => ValueRange::new(
                Bound::Included(first),
                Bound::Included(self.values.get(1)?.clone()),
            ),
            Operator::GreaterThan => ValueRange::new(Bound::Excluded(first), Bound::Unbounded),
            Operator::GreaterThanOrEqual => {
                ValueRange::new(Bound::Included(first), Bound::Unbounded)
            }
            Operator::LessThan => ValueRange::new(Bound::Unbounded, Bound::Excluded(first)),
            Operator::LessThanOrEqual => ValueRange::new(Bound::Unbounded, Bound::Included(first)),
        };
        Some(range)
    }

    /// Parse the textual form used on the command line:
    /// `col=1`, `col=1|2|3`, `col=1..5`, `col>=3`, `col<10`.
    pub fn parse(table: &str, text: &str) -> Result<Self, Error> {
        let invalid = || Error::InvalidCondition(text.to_string());

        let position = text.find(['=', '<', '>']).ok_or_else(invalid)?;
        let column = text[..position].trim();
        let rest = &text[position..];

        let (operator, value) = if let Some(value) = rest.strip_prefix(">=") {
            (Operator::GreaterThanOrEqual, value)
        } else if let Some(value) = rest.strip_prefix("<=") {
            (Operator::LessThanOrEqual, value)
        } else if let Some(value) = rest.strip_prefix('>') {
            (Operator::GreaterThan, value)
        } else if let Some(value) = rest.strip_prefix('<') {
            (Operator::LessThan, value)
        } else {
            (Operator::Equal, &rest[1..])
        };
        let value = value.trim();

        if column.is_empty() || value.is_empty() {
            return Err(invalid());
        }

        if operator != Operator::Equal {
            return Ok(Self::compare(table, column, operator, value));
        }

        if let Some((low, high)) = value.split_once("..") {
            if low.trim().is_empty() || high.trim().is_empty() {
                return Err(invalid());
            }
            return Ok(Self::between(table, column, low, high));
        }

        let values = value.split('|').map(str::trim).collect::<Vec<_>>();
        if values.iter().any(|v| v.is_empty()) {
            return Err(invalid());
        }

        if values.len() == 1 {
            Ok(Self::equal(table, column, values[0]))
        } else {
            Ok(Self::in_list(table, column, values))
        }
    }
}

/// One alternative of a statement: a row of a multi-row `INSERT`,
/// or the conjunctive predicates of a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardingCondition {
    pub values: Vec<ShardingConditionValue>,
}

impl ShardingCondition {
    pub fn new(values: Vec<ShardingConditionValue>) -> Self {
        Self { values }
    }

    pub fn with(mut self, value: ShardingConditionValue) -> Self {
        self.values.push(value);
        self
    }

    /// Comma-separated list of [`ShardingConditionValue::parse`] forms.
    pub fn parse(table: &str, text: &str) -> Result<Self, Error> {
        let values = text
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(|part| ShardingConditionValue::parse(table, part))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(values))
    }
}
