//! Configuration errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Deser(#[from] toml::de::Error),

    #[error("{0}, line {1}")]
    Syntax(String, usize),

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("\"{}\" not found", .0.display())]
    NotFound(PathBuf),
}

impl Error {
    /// Attach the line number of the offending TOML to the error.
    pub fn config(source: &str, err: toml::de::Error) -> Self {
        let message = err.message().to_string();

        let line = err
            .span()
            .and_then(|span| source.get(..span.start))
            .map(|before| before.matches('\n').count() + 1)
            .unwrap_or(0);

        Self::Syntax(message, line)
    }
}
