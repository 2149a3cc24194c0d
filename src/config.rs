//! Command-line and environment configuration, parsed with `clap`.
//!
//! Every flag has a `BEANO_*` environment fallback so the server can be
//! configured the same way whether it's started by hand or by a process
//! supervisor that only sets environment variables.

use clap::{Parser, ValueEnum};

/// Which embedded storage engine to run on top of.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "kebab-case")]
pub enum BackendKind {
    /// B+tree-with-buckets, backed by `sled`.
    Btree,
    /// True LSM tree, backed by `rocksdb`.
    Lsm,
    /// LSM with a Bitcask-style value log.
    LsmValuelog,
    /// Bounded in-memory LRU cache, no persistence.
    Inmem,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "beano", version, about = "A memcached-protocol cache server")]
pub struct Config {
    /// Address the wire-protocol listener binds to.
    #[arg(long, env = "BEANO_BIND_ADDRESS", default_value = "127.0.0.1")]
    pub bind_address: String,

    /// Port the wire-protocol listener binds to.
    #[arg(long, env = "BEANO_PORT", default_value_t = 11211)]
    pub port: u16,

    /// Port the admin HTTP surface binds to.
    #[arg(long, env = "BEANO_ADMIN_PORT", default_value_t = 11212)]
    pub admin_port: u16,

    /// Filesystem path the storage engine opens its database at.
    #[arg(long, env = "BEANO_DB_PATH", default_value = "./beano-data")]
    pub db_path: String,

    /// Which storage engine to run.
    #[arg(long, env = "BEANO_BACKEND", value_enum, default_value_t = BackendKind::Btree)]
    pub backend: BackendKind,

    /// Maximum number of entries the in-memory backend holds.
    #[arg(long, env = "BEANO_INMEM_CAPACITY", default_value_t = 1_000_000)]
    pub inmem_capacity: usize,

    /// Expected number of keys the B+tree backend's Bloom filter is sized for.
    #[arg(long, env = "BEANO_BLOOM_CAPACITY", default_value_t = 1_000_000)]
    pub bloom_capacity: usize,

    /// Target false-positive rate for the B+tree backend's Bloom filter.
    #[arg(long, env = "BEANO_BLOOM_FP_RATE", default_value_t = 0.01)]
    pub bloom_fp_rate: f64,

    /// Expose `GET /metrics` on the admin HTTP surface.
    #[arg(long, env = "BEANO_METRICS", default_value_t = false)]
    pub metrics: bool,

    /// Reserved for future profiling hooks; currently only gates a log line.
    #[arg(long, env = "BEANO_PROFILE", default_value_t = false)]
    pub profile: bool,

    /// Increase log verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Config {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn admin_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.admin_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Config::command().debug_assert();
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::parse_from(["beano"]);
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.port, 11211);
        assert_eq!(config.admin_port, 11212);
        assert_eq!(config.backend, BackendKind::Btree);
        assert!(!config.metrics);
    }

    #[test]
    fn backend_flag_parses_each_variant() {
        let config = Config::parse_from(["beano", "--backend", "lsm-valuelog"]);
        assert_eq!(config.backend, BackendKind::LsmValuelog);
    }

    #[test]
    fn bind_addr_combines_address_and_port() {
        let config = Config::parse_from(["beano", "--bind-address", "0.0.0.0", "--port", "9999"]);
        assert_eq!(config.bind_addr(), "0.0.0.0:9999");
    }
}
