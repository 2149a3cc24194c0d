//! # beano
//!
//! A disk-backed cache server that speaks the ASCII memcached wire protocol
//! over TCP and can swap its storage engine live via an admin HTTP endpoint.
//!
//! Four interchangeable storage engines sit behind one [`backend::Backend`]
//! trait:
//!
//! - `btree` — a B+tree with named buckets, on `sled`, fronted by a counting
//!   Bloom filter.
//! - `lsm` — a true LSM tree, on `rocksdb`.
//! - `lsm-valuelog` — an LSM with a Bitcask-style append-only value log.
//! - `inmem` — a bounded in-memory LRU cache with no persistence.
//!
//! [`server::run`] wires a [`config::Config`] into a running process: the
//! TCP acceptor, the hot-swap coordinator, and the admin HTTP surface all
//! share one live backend behind an `ArcSwap`.

#[macro_use]
extern crate log;

pub mod acceptor;
pub mod admin;
pub mod backend;
pub mod bloom;
pub mod config;
pub mod connection;
pub mod error;
pub mod hotswap;
pub mod logging;
pub mod metrics;
pub mod proto;
pub mod server;

pub use backend::Backend;
pub use config::Config;
pub use error::{Error, Result};

/// Crate version, as published to crates.io/Cargo.toml. The wire protocol's
/// `version` command replies with a fixed `VERSION BEANO` regardless of this
/// value — the two are intentionally decoupled.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
