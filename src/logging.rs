//! `env_logger` initialization.
//!
//! `RUST_LOG` always wins if set; otherwise the `-v`/`-vv` count on the CLI
//! picks a default filter so `beano` is quiet by default and chatty on
//! request, without requiring an environment variable for common debugging.

use log::LevelFilter;

pub fn init(verbosity: u8) {
    let default_level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(default_level)
        .format_timestamp_millis()
        .try_init()
        .ok();
}
