//! Process-wide counters exposed over the admin HTTP surface.
//!
//! Every field is a plain atomic rather than a trait object: there is one
//! metrics sink for the whole process (unlike the teacher's pluggable
//! `CacheMetrics` trait), so a struct of `AtomicU64`s is simpler and avoids
//! a vtable call on every command.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Default)]
pub struct Metrics {
    pub total_connections: AtomicU64,
    pub curr_connections: AtomicU64,
    pub total_threads: AtomicU64,
    pub curr_threads: AtomicU64,
    pub cmd_get: AtomicU64,
    pub cmd_set: AtomicU64,
    pub get_hits: AtomicU64,
    pub get_misses: AtomicU64,
    pub current_items: AtomicU64,
    pub total_items: AtomicU64,
    pub protocol_errors: AtomicU64,
    pub network_errors: AtomicU64,
    pub readonly_errors: AtomicU64,
    response_time_total_micros: AtomicU64,
    response_time_samples: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics::default()
    }

    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.curr_connections.fetch_add(1, Ordering::Relaxed);
        self.total_threads.fetch_add(1, Ordering::Relaxed);
        self.curr_threads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.curr_connections.fetch_sub(1, Ordering::Relaxed);
        self.curr_threads.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_get(&self, hit: bool) {
        self.cmd_get.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.get_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.get_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_set(&self) {
        self.cmd_set.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_network_error(&self) {
        self.network_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_readonly_error(&self) {
        self.readonly_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Records how long a single command took to dispatch, for the
    /// `response_timing` exposition below.
    pub fn record_response_time(&self, started: Instant) {
        let micros = started.elapsed().as_micros().min(u128::from(u64::MAX)) as u64;
        self.response_time_total_micros
            .fetch_add(micros, Ordering::Relaxed);
        self.response_time_samples.fetch_add(1, Ordering::Relaxed);
    }

    fn average_response_micros(&self) -> u64 {
        let samples = self.response_time_samples.load(Ordering::Relaxed);
        if samples == 0 {
            0
        } else {
            self.response_time_total_micros.load(Ordering::Relaxed) / samples
        }
    }

    /// Renders counters in Prometheus text exposition format for `GET /metrics`.
    pub fn render_prometheus(&self) -> String {
        let mut out = String::new();
        let mut push = |name: &str, help: &str, value: u64| {
            out.push_str(&format!("# HELP beano_{name} {help}\n"));
            out.push_str(&format!("# TYPE beano_{name} counter\n"));
            out.push_str(&format!("beano_{name} {value}\n"));
        };

        push(
            "total_connections",
            "total TCP connections accepted",
            self.total_connections.load(Ordering::Relaxed),
        );
        push(
            "curr_connections",
            "currently open TCP connections",
            self.curr_connections.load(Ordering::Relaxed),
        );
        push(
            "total_threads",
            "total connection tasks spawned",
            self.total_threads.load(Ordering::Relaxed),
        );
        push(
            "curr_threads",
            "currently running connection tasks",
            self.curr_threads.load(Ordering::Relaxed),
        );
        push("cmd_get", "get commands processed", self.cmd_get.load(Ordering::Relaxed));
        push("cmd_set", "set commands processed", self.cmd_set.load(Ordering::Relaxed));
        push("get_hits", "get commands that found a value", self.get_hits.load(Ordering::Relaxed));
        push(
            "get_misses",
            "get commands that found nothing",
            self.get_misses.load(Ordering::Relaxed),
        );
        push(
            "current_items",
            "keys currently live in the backend",
            self.current_items.load(Ordering::Relaxed),
        );
        push(
            "total_items",
            "total successful store operations since startup",
            self.total_items.load(Ordering::Relaxed),
        );
        push(
            "protocol_errors",
            "malformed commands rejected",
            self.protocol_errors.load(Ordering::Relaxed),
        );
        push(
            "network_errors",
            "connection I/O failures",
            self.network_errors.load(Ordering::Relaxed),
        );
        push(
            "readonly_errors",
            "mutating commands rejected while read-only",
            self.readonly_errors.load(Ordering::Relaxed),
        );
        push(
            "response_time_avg_micros",
            "average command dispatch latency in microseconds",
            self.average_response_micros(),
        );
        out
    }
}
