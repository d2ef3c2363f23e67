//! Sharding route resolution.
//!
//! Given a logical table, the sharding conditions of a statement and
//! optional hints, [`route::RouteEngine`] resolves the physical data nodes
//! the statement must run on. [`checker`] validates binding table groups
//! and rule changes before they're applied.

pub mod checker;
pub mod cli;
pub mod config;
pub mod logger;
pub mod route;
pub mod rule;
pub mod sharding;

pub use route::{RouteEngine, RouteResult, RouteUnit};
pub use rule::ShardingRule;
