use beano::config::Config;
use beano::{logging, server};
use clap::Parser;

#[tokio::main]
async fn main() {
    let config = Config::parse();
    logging::init(config.verbose);

    if config.profile {
        log::debug!("profiling flag set, no profiler wired up yet");
    }

    if let Err(e) = server::run(config).await {
        log::error!("fatal: {e}");
        std::process::exit(1);
    }
}
