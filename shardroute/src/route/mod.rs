//! Route resolution: logical table + conditions + hints to data nodes.

pub mod engine;
pub mod error;
pub mod result;

pub use engine::RouteEngine;
pub use error::Error;
pub use result::{RouteMapper, RouteResult, RouteUnit};
