//! ASCII memcached wire protocol: request parsing and response framing.
//!
//! Parsing is split into two phases because `set`/`add`/`replace` carry a
//! data block on the line *after* the command line. [`parse_request`] reads
//! only the command line and, for store commands, returns how many body
//! bytes the caller still needs to read off the socket before calling
//! [`execute`].

use crate::backend::{Backend, Direction, Limit};
use crate::error::Error;
use crate::metrics::Metrics;
use std::sync::atomic::{AtomicBool, Ordering};

pub const MAX_COMMAND_ARGS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Set,
    Add,
    Replace,
}

#[derive(Debug, Clone)]
pub enum Request {
    Get { keys: Vec<Vec<u8>> },
    Store { op: StoreOp, key: Vec<u8>, flags: u32, bytes: usize, noreply: bool },
    Delete { key: Vec<u8>, noreply: bool },
    Incr { key: Vec<u8>, delta: i64, noreply: bool },
    Decr { key: Vec<u8>, delta: i64, noreply: bool },
    FlushAll { noreply: bool },
    Version,
    Verbosity { noreply: bool },
    Quit,
    SwitchDb { path: String, noreply: bool },
    DbStats,
    Range { prefix: Vec<u8>, limit: Limit, from: Option<Vec<u8>>, direction: Direction },
}

/// Outcome of parsing a command line: either a request ready to execute, or
/// a store request still waiting on its data block.
pub enum Parsed {
    Ready(Request),
    AwaitingBody { op: StoreOp, key: Vec<u8>, flags: u32, bytes: usize, noreply: bool },
}

/// Parses a single CRLF-stripped command line.
pub fn parse_request(line: &str) -> Result<Parsed, Error> {
    if line.len() < 3 {
        return Err(Error::Protocol("line too short".into()));
    }
    let mut tokens: Vec<&str> = line.split(' ').filter(|t| !t.is_empty()).collect();
    if tokens.is_empty() {
        return Err(Error::Protocol("empty command".into()));
    }

    let noreply = tokens.last().map(|t| *t == "noreply").unwrap_or(false);
    if noreply {
        tokens.pop();
    }

    let cmd = tokens.remove(0).to_ascii_lowercase();
    match cmd.as_str() {
        "get" | "gets" | "range" => parse_range_or_get(&cmd, &tokens),
        "set" | "add" | "replace" => parse_store(&cmd, &tokens, noreply),
        "delete" => {
            let key = tokens
                .first()
                .ok_or_else(|| Error::Protocol("delete requires a key".into()))?;
            Ok(Parsed::Ready(Request::Delete { key: key.as_bytes().to_vec(), noreply }))
        }
        "incr" => parse_counter_cmd(&tokens, noreply, true),
        "decr" => parse_counter_cmd(&tokens, noreply, false),
        "flush_all" => Ok(Parsed::Ready(Request::FlushAll { noreply })),
        "version" => Ok(Parsed::Ready(Request::Version)),
        "verbosity" => {
            if tokens.is_empty() || tokens.len() > 2 {
                return Err(Error::Protocol("verbosity requires 1-2 arguments".into()));
            }
            Ok(Parsed::Ready(Request::Verbosity { noreply }))
        }
        "quit" => Ok(Parsed::Ready(Request::Quit)),
        "switchdb" => {
            let path = tokens
                .first()
                .ok_or_else(|| Error::Protocol("switchdb requires a path".into()))?;
            Ok(Parsed::Ready(Request::SwitchDb { path: path.to_string(), noreply }))
        }
        "dbstats" => Ok(Parsed::Ready(Request::DbStats)),
        other => Err(Error::Protocol(format!("unknown command: {other}"))),
    }
}

fn parse_store(cmd: &str, tokens: &[&str], noreply: bool) -> Result<Parsed, Error> {
    if tokens.len() != 4 {
        return Err(Error::Protocol(format!(
            "{cmd} requires <key> <flags> <exptime> <bytes>"
        )));
    }
    let key = tokens[0].as_bytes().to_vec();
    let flags: u32 = tokens[1]
        .parse()
        .map_err(|_| Error::Protocol("bad flags".into()))?;
    let _exptime: i64 = tokens[2]
        .parse()
        .map_err(|_| Error::Protocol("bad exptime".into()))?;
    let bytes: usize = tokens[3]
        .parse()
        .map_err(|_| Error::Protocol("bad byte count".into()))?;
    let op = match cmd {
        "set" => StoreOp::Set,
        "add" => StoreOp::Add,
        "replace" => StoreOp::Replace,
        _ => unreachable!(),
    };
    Ok(Parsed::AwaitingBody { op, key, flags, bytes, noreply })
}

fn parse_counter_cmd(tokens: &[&str], noreply: bool, incr: bool) -> Result<Parsed, Error> {
    if tokens.len() != 2 {
        return Err(Error::Protocol("incr/decr require <key> <delta>".into()));
    }
    let key = tokens[0].as_bytes().to_vec();
    let delta: i64 = tokens[1]
        .parse()
        .map_err(|_| Error::Protocol("bad delta".into()))?;
    Ok(Parsed::Ready(if incr {
        Request::Incr { key, delta, noreply }
    } else {
        Request::Decr { key, delta, noreply }
    }))
}

fn parse_range_or_get(cmd: &str, tokens: &[&str]) -> Result<Parsed, Error> {
    if cmd == "range" || cmd == "gets" {
        let prefix = tokens
            .first()
            .ok_or_else(|| Error::Protocol("range requires a prefix".into()))?
            .as_bytes()
            .to_vec();
        let limit = tokens
            .get(1)
            .and_then(|t| t.parse::<i64>().ok())
            .map(Limit::from_wire)
            .unwrap_or(Limit::Unlimited);
        let from = tokens.get(2).map(|t| t.as_bytes().to_vec());
        let direction = match tokens.get(3) {
            Some(&"reverse") => Direction::Reverse,
            _ => Direction::Forward,
        };
        return Ok(Parsed::Ready(Request::Range { prefix, limit, from, direction }));
    }

    if tokens.is_empty() {
        return Err(Error::Protocol(format!("{cmd} requires at least one key")));
    }
    Ok(Parsed::Ready(Request::Get {
        keys: tokens.iter().map(|t| t.as_bytes().to_vec()).collect(),
    }))
}

/// Terminal outcome of executing a [`Request`]; the connection loop renders
/// this to wire bytes and decides whether to keep the socket open.
pub enum Response {
    Values(Vec<(Vec<u8>, u32, Vec<u8>)>),
    Stored,
    NotStored,
    Deleted,
    NotFound,
    Ok,
    Version,
    Number(i64),
    DbStats(String),
    SwitchDbAck(String),
    Error,
    Suppressed,
    CloseConnection,
}

impl Response {
    pub fn to_wire(&self) -> Vec<u8> {
        match self {
            Response::Values(items) => {
                let mut out = Vec::new();
                for (key, flags, value) in items {
                    out.extend_from_slice(
                        format!("VALUE {} {} {}\r\n", String::from_utf8_lossy(key), flags, value.len())
                            .as_bytes(),
                    );
                    out.extend_from_slice(value);
                    out.extend_from_slice(b"\r\n");
                }
                out.extend_from_slice(b"END\r\n");
                out
            }
            Response::Stored => b"STORED\r\n".to_vec(),
            Response::NotStored => b"NOT_STORED\r\n".to_vec(),
            Response::Deleted => b"DELETED\r\n".to_vec(),
            Response::NotFound => b"NOT_FOUND\r\n".to_vec(),
            Response::Ok => b"OK\r\n".to_vec(),
            Response::Version => b"VERSION BEANO\r\n".to_vec(),
            Response::Number(n) => format!("{n}\r\n").into_bytes(),
            Response::DbStats(body) => format!("VERSION BEANO\r\n{body}\r\nOK\r\n").into_bytes(),
            Response::SwitchDbAck(path) => format!("{path}\r\nOK\r\n").into_bytes(),
            Response::Error => b"ERROR\r\n".to_vec(),
            Response::Suppressed | Response::CloseConnection => Vec::new(),
        }
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Response::CloseConnection)
    }
}

fn suppress_if_noreply(response: Response, noreply: bool) -> Response {
    if noreply {
        Response::Suppressed
    } else {
        response
    }
}

/// Runs one already-parsed request against `backend`, honoring the
/// read-only gate for mutating commands. `hotswap_tx` lets `switchdb` hand
/// the requested path to the coordinator without the dispatcher knowing how
/// the swap itself happens.
pub fn execute(
    backend: &dyn Backend,
    metrics: &Metrics,
    read_only: &AtomicBool,
    request: Request,
    body: Option<Vec<u8>>,
    hotswap_tx: &tokio::sync::mpsc::Sender<String>,
) -> Response {
    let is_mutation = matches!(
        request,
        Request::Store { .. }
            | Request::Delete { .. }
            | Request::Incr { .. }
            | Request::Decr { .. }
            | Request::FlushAll { .. }
            | Request::SwitchDb { .. }
    );
    if is_mutation && read_only.load(Ordering::SeqCst) {
        metrics.record_readonly_error();
        return Response::Error;
    }

    match request {
        Request::Get { keys } => {
            let mut values = Vec::new();
            for key in keys {
                match backend.get(&key) {
                    Ok(Some(value)) => {
                        metrics.record_get(true);
                        values.push((key, 0u32, value));
                    }
                    _ => metrics.record_get(false),
                }
            }
            Response::Values(values)
        }
        Request::Store { op, key, flags: _, bytes: _, noreply } => {
            let body = body.unwrap_or_default();
            metrics.record_set();
            let result = match op {
                StoreOp::Set => backend.set(&key, &body),
                StoreOp::Add => backend.add(&key, &body),
                StoreOp::Replace => backend.replace(&key, &body),
            };
            let response = match result {
                Ok(created) => {
                    metrics.total_items.fetch_add(1, Ordering::Relaxed);
                    if created {
                        metrics.current_items.fetch_add(1, Ordering::Relaxed);
                    }
                    Response::Stored
                }
                Err(Error::AlreadyExists) | Err(Error::NotFound) => Response::NotStored,
                Err(_) => Response::Error,
            };
            suppress_if_noreply(response, noreply)
        }
        Request::Delete { key, noreply } => {
            let response = match backend.delete(&key, true) {
                Ok(true) => {
                    metrics.current_items.fetch_sub(1, Ordering::Relaxed);
                    Response::Deleted
                }
                Ok(false) => Response::NotFound,
                Err(_) => Response::Error,
            };
            suppress_if_noreply(response, noreply)
        }
        Request::Incr { key, delta, noreply } => {
            let response = counter_response(backend.incr(&key, delta));
            suppress_if_noreply(response, noreply)
        }
        Request::Decr { key, delta, noreply } => {
            let response = counter_response(backend.decr(&key, delta));
            suppress_if_noreply(response, noreply)
        }
        Request::FlushAll { noreply } => {
            let response = match backend.flush() {
                Ok(()) => {
                    metrics.current_items.store(0, Ordering::Relaxed);
                    Response::Ok
                }
                Err(_) => Response::Error,
            };
            suppress_if_noreply(response, noreply)
        }
        Request::Version => Response::Version,
        Request::Verbosity { noreply } => suppress_if_noreply(Response::Ok, noreply),
        Request::Quit => Response::CloseConnection,
        Request::SwitchDb { path, noreply } => {
            let _ = hotswap_tx.try_send(path.clone());
            suppress_if_noreply(Response::SwitchDbAck(path), noreply)
        }
        Request::DbStats => Response::DbStats(backend.stats()),
        Request::Range { prefix, limit, from, direction } => {
            match backend.range(&prefix, limit, from.as_deref(), direction) {
                Ok(entries) => Response::Values(
                    entries
                        .into_iter()
                        .map(|(k, v)| (k, 0u32, v))
                        .collect(),
                ),
                Err(_) => Response::Error,
            }
        }
    }
}

fn counter_response(result: Result<i64, Error>) -> Response {
    match result {
        Ok(n) => Response::Number(n),
        Err(Error::NotFound) => Response::NotFound,
        Err(_) => Response::Error,
    }
}
