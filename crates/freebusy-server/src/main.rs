//! freebusy server entry point.

use std::process::ExitCode;

use clap::Parser;

use freebusy_core::init_tracing;
use freebusy_server::{Cli, ServerResult, serve};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ServerResult<()> {
    let config = cli.resolve_config()?;
    init_tracing(&config.log_config()?)?;
    serve(config).await
}
