use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Settings that apply to the router as a whole.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct General {
    /// Log output format.
    ///
    /// _Default:_ `text`
    #[serde(default)]
    pub log_format: LogFormat,

    /// Read sharding hints embedded in SQL comments, e.g.
    /// `/* shardroute_hint: t_order.table_value=1 */`.
    ///
    /// _Default:_ `true`
    #[serde(default = "General::sql_comment_hints")]
    pub sql_comment_hints: bool,
}

impl Default for General {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            sql_comment_hints: Self::sql_comment_hints(),
        }
    }
}

impl General {
    fn sql_comment_hints() -> bool {
        true
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}
