//! shardroute, sharding route resolution from the command line.

use clap::Parser;
use shardroute::cli::{self, Cli, Commands};
use shardroute::{config, logger};
use shardroute_config::{Config, LogFormat};
use std::process::exit;
use tracing::{error, info};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    match args.command {
        Commands::Schema => {
            return cli::schema();
        }

        Commands::Configcheck => {
            logger::init(LogFormat::Text);
            match cli::config_check(&args.config) {
                Ok(snapshot) => {
                    info!(
                        "✅ config valid [tables: {}, binding groups: {}]",
                        snapshot.config.sharding.logic_tables().len(),
                        snapshot.config.sharding.binding_tables.len()
                    );
                    exit(0);
                }
                Err(err) => {
                    error!("{}", err);
                    exit(1);
                }
            }
        }

        _ => (),
    }

    let config = Config::load(&args.config)?;
    logger::init(config.general.log_format);
    config::set(config)?;

    match args.command {
        command @ Commands::Route { .. } => cli::route(command)?,
        command @ Commands::CheckBinding { .. } => cli::check_binding(command)?,
        Commands::Schema | Commands::Configcheck => (),
    }

    Ok(())
}
