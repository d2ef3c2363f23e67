use serde::Serialize;

use crate::sharding::DataNode;

/// Logical name and the physical name it was routed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteMapper {
    pub logic_name: String,
    pub actual_name: String,
}

impl RouteMapper {
    pub fn new(logic_name: impl ToString, actual_name: impl ToString) -> Self {
        Self {
            logic_name: logic_name.to_string(),
            actual_name: actual_name.to_string(),
        }
    }
}

/// One data source and the tables the statement uses in it. The first
/// table is the one routed; bound tables follow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteUnit {
    pub data_source: RouteMapper,
    pub tables: Vec<RouteMapper>,
}

impl RouteUnit {
    /// Data node of the routed table.
    pub fn data_node(&self) -> Option<DataNode> {
        self.tables
            .first()
            .map(|table| DataNode::new(&self.data_source.actual_name, &table.actual_name))
    }

    /// Actual table a logical table maps to in this unit. Names ignore case.
    pub fn actual_table(&self, logic_table: &str) -> Option<&str> {
        self.tables
            .iter()
            .find(|mapper| mapper.logic_name.eq_ignore_ascii_case(logic_table))
            .map(|mapper| mapper.actual_name.as_str())
    }
}

/// Where a statement on a logical table goes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouteResult {
    /// Distinct units, in the order they were first routed to.
    pub units: Vec<RouteUnit>,
    /// Data nodes of each routed condition.
    pub original_data_nodes: Vec<Vec<DataNode>>,
}

impl RouteResult {
    pub fn data_nodes(&self) -> Vec<DataNode> {
        self.units.iter().filter_map(|u| u.data_node()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }
}
