//! Log output.

use std::io::IsTerminal;

use shardroute_config::LogFormat;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy()
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info` level.
/// Calling this more than once is harmless.
pub fn init(format: LogFormat) {
    let registry = tracing_subscriber::registry().with(filter());

    let result = match format {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_ansi(std::io::stderr().is_terminal())
                    .with_writer(std::io::stderr)
                    .with_file(false),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_file(false),
            )
            .try_init(),
    };

    // Already installed, e.g. by another test.
    if let Err(err) = result {
        tracing::debug!("logger not installed: {}", err);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_init_twice() {
        init(LogFormat::Text);
        init(LogFormat::Json);
        tracing::info!("logger installed");
    }
}
