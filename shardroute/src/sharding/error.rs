use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid inline expression \"{expression}\": {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error("variable \"{0}\" is not bound")]
    UnboundVariable(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow")]
    Overflow,

    #[error("arithmetic on non-integer value \"{0}\"")]
    NotAnInteger(String),

    #[error("algorithm \"{algorithm}\" failed: {reason}")]
    AlgorithmEvaluation { algorithm: String, reason: String },

    #[error("range query on \"{column}\" isn't supported by algorithm \"{algorithm}\"")]
    RangeQueryNotAllowed { algorithm: String, column: String },

    #[error("algorithm \"{algorithm}\" requires property \"{property}\"")]
    MissingProperty { algorithm: String, property: String },

    #[error("algorithm \"{algorithm}\" property \"{property}\" is invalid: {reason}")]
    InvalidProperty {
        algorithm: String,
        property: String,
        reason: String,
    },

    #[error("unknown algorithm type \"{0}\"")]
    UnknownAlgorithmType(String),

    #[error("invalid data node \"{0}\"")]
    InvalidDataNode(String),

    #[error("invalid sharding condition \"{0}\"")]
    InvalidCondition(String),
}

impl Error {
    pub(crate) fn expression(expression: &str, reason: impl ToString) -> Self {
        Self::InvalidExpression {
            expression: expression.to_string(),
            reason: reason.to_string(),
        }
    }
}
