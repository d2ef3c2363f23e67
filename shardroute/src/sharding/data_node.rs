use std::fmt::Display;
use std::str::FromStr;

use serde::Serialize;

use super::Error;

/// Physical placement of a logical table: `data_source.table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DataNode {
    pub data_source: String,
    pub table: String,
}

impl DataNode {
    pub fn new(data_source: impl ToString, table: impl ToString) -> Self {
        Self {
            data_source: data_source.to_string(),
            table: table.to_string(),
        }
    }

    /// Parse `ds.table`. Exactly one separator, both sides non-empty.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let text = text.trim();
        let mut parts = text.split('.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(data_source), Some(table), None)
                if !data_source.is_empty() && !table.is_empty() =>
            {
                Ok(Self::new(data_source, table))
            }
            _ => Err(Error::InvalidDataNode(text.to_string())),
        }
    }

    pub fn is_valid(text: &str) -> bool {
        Self::parse(text).is_ok()
    }
}

impl FromStr for DataNode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for DataNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.data_source, self.table)
    }
}

/// Naming pattern of physical names in one dimension,
/// e.g. `t_order_` + `0`, `1`, ... for tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataNodeInfo {
    pub prefix: String,
    pub suffix_min_length: usize,
    pub padding_char: char,
}

impl Default for DataNodeInfo {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            suffix_min_length: 1,
            padding_char: Self::PADDING_CHAR,
        }
    }
}

impl DataNodeInfo {
    pub const PADDING_CHAR: char = '0';

    /// Pattern of data source names: the first name without its numeric suffix.
    pub fn for_data_sources<S: AsRef<str>>(names: &[S]) -> Self {
        let Some(first) = names.first() else {
            return Self::default();
        };
        let prefix = strip_numeric_suffix(first.as_ref()).to_string();
        Self::with_prefix(prefix, names)
    }

    /// Pattern of actual table names. If the first table starts with the logical
    /// name, the prefix is the logical name plus whatever separates it from the number.
    pub fn for_tables<S: AsRef<str>>(logic_table: &str, tables: &[S]) -> Self {
        let Some(first) = tables.first() else {
            return Self::default();
        };
        let first = first.as_ref();

        let prefix = match first.get(..logic_table.len()) {
            Some(head) if head.eq_ignore_ascii_case(logic_table) => format!(
                "{}{}",
                logic_table,
                strip_numeric_suffix(&first[logic_table.len()..])
            ),
            _ => strip_numeric_suffix(first).to_string(),
        };

        Self::with_prefix(prefix, tables)
    }

    fn with_prefix<S: AsRef<str>>(prefix: String, names: &[S]) -> Self {
        let suffix_min_length = names
            .iter()
            .map(|name| name.as_ref().len().saturating_sub(prefix.len()))
            .min()
            .unwrap_or(1);

        Self {
            prefix,
            suffix_min_length,
            padding_char: Self::PADDING_CHAR,
        }
    }

    /// Name without the prefix (case-insensitive). Names that don't
    /// carry the prefix are returned as is.
    pub fn suffix<'a>(&self, name: &'a str) -> &'a str {
        match name.get(..self.prefix.len()) {
            Some(head) if head.eq_ignore_ascii_case(&self.prefix) => &name[self.prefix.len()..],
            _ => name,
        }
    }

    /// Numeric suffix of a physical name, e.g. `t_order_03` is `3`.
    pub fn suffix_number(&self, name: &str) -> Option<u64> {
        let suffix = self.suffix(name);
        suffix.parse().ok().or_else(|| {
            let digits = &name[strip_numeric_suffix(name).len()..];
            digits.parse().ok()
        })
    }

    /// Physical name for a suffix number, padded to the minimum suffix length.
    pub fn name(&self, number: u64) -> String {
        let number = number.to_string();
        let padding = self.suffix_min_length.saturating_sub(number.len());
        let mut name = self.prefix.clone();
        name.extend(std::iter::repeat(self.padding_char).take(padding));
        name.push_str(&number);
        name
    }
}

fn strip_numeric_suffix(name: &str) -> &str {
    name.trim_end_matches(|c: char| c.is_ascii_digit())
}
