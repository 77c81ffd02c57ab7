//! Taskrelay CLI entry point.

use clap::Parser;

use taskrelay::cli::{commands, handle_error, load_config, Cli, Commands};
use taskrelay::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.json),
    };

    let logger = match LoggerImpl::init(&LogConfig::from(&config.logging)) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Serve(args) => commands::serve::execute(args, config).await,
        Commands::Run(args) => commands::run::execute(args, config, cli.json).await,
        Commands::Health(args) => commands::health::execute(args, config, cli.json).await,
        Commands::Config(args) => commands::config::execute(args, &config, cli.json),
    };

    if let Err(err) = result {
        // Flush buffered file output before exiting.
        drop(logger);
        handle_error(err, cli.json);
    }
    drop(logger);
}
