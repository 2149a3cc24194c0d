//! LSM-with-value-log backend: a small Bitcask/Badger-style engine.
//!
//! Every write is appended to a single log file; an in-memory `BTreeMap`
//! (the "keydir") maps each live key to its most recent `(offset, length)`
//! in that file, so reads are a single seek + read rather than a tree
//! traversal. Opening the backend replays the log from the start to rebuild
//! the keydir. An exclusive `fs4` file lock stops two processes pointing at
//! the same log file.
//!
//! Log entry format (all integers big-endian):
//! `key_len: u32 | value_len: i32 (-1 = tombstone) | key bytes | value bytes`.

use super::{parse_counter, Backend, Direction, Limit};
use crate::error::{Error, Result};
use fs4::FileExt;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Mutex;

const TOMBSTONE: i32 = -1;

struct KeydirEntry {
    value_offset: u64,
    value_len: u32,
}

struct Inner {
    writer: File,
    reader: File,
    keydir: BTreeMap<Vec<u8>, KeydirEntry>,
    log_len: u64,
}

pub struct LsmValueLogBackend {
    inner: Mutex<Inner>,
    _lock_file: File,
    path: String,
}

impl LsmValueLogBackend {
    pub fn open(path: &str) -> Result<Self> {
        std::fs::create_dir_all(path).map_err(Error::Network)?;
        let dir = PathBuf::from(path);
        let log_path = dir.join("beano.log");
        let lock_path = dir.join("LOCK");

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)
            .map_err(Error::Network)?;
        lock_file
            .try_lock_exclusive()
            .map_err(|e| Error::Storage(format!("value log already locked: {e}")))?;

        let writer = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(Error::Network)?;
        let mut reader = OpenOptions::new()
            .read(true)
            .open(&log_path)
            .map_err(Error::Network)?;

        let (keydir, log_len) = replay(&mut reader)?;

        Ok(LsmValueLogBackend {
            inner: Mutex::new(Inner {
                writer,
                reader,
                keydir,
                log_len,
            }),
            _lock_file: lock_file,
            path: path.to_string(),
        })
    }

    fn append(&self, inner: &mut Inner, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        let mut buf = Vec::with_capacity(8 + key.len() + value.map_or(0, |v| v.len()));
        buf.extend_from_slice(&(key.len() as u32).to_be_bytes());
        let value_len: i32 = value.map_or(TOMBSTONE, |v| v.len() as i32);
        buf.extend_from_slice(&value_len.to_be_bytes());
        buf.extend_from_slice(key);
        let value_offset = inner.log_len + 8 + key.len() as u64;
        if let Some(v) = value {
            buf.extend_from_slice(v);
        }
        inner.writer.write_all(&buf).map_err(Error::Network)?;
        inner.writer.flush().map_err(Error::Network)?;
        inner.log_len += buf.len() as u64;

        match value {
            Some(v) => {
                inner.keydir.insert(
                    key.to_vec(),
                    KeydirEntry {
                        value_offset,
                        value_len: v.len() as u32,
                    },
                );
            }
            None => {
                inner.keydir.remove(key);
            }
        }
        Ok(())
    }

    fn read_value(&self, inner: &mut Inner, entry: &KeydirEntry) -> Result<Vec<u8>> {
        inner
            .reader
            .seek(SeekFrom::Start(entry.value_offset))
            .map_err(Error::Network)?;
        let mut buf = vec![0u8; entry.value_len as usize];
        inner.reader.read_exact(&mut buf).map_err(Error::Network)?;
        Ok(buf)
    }
}

fn replay(reader: &mut File) -> Result<(BTreeMap<Vec<u8>, KeydirEntry>, u64)> {
    reader.seek(SeekFrom::Start(0)).map_err(Error::Network)?;
    let mut keydir = BTreeMap::new();
    let mut offset: u64 = 0;

    loop {
        let mut len_buf = [0u8; 4];
        if reader.read_exact(&mut len_buf).is_err() {
            break;
        }
        let key_len = u32::from_be_bytes(len_buf) as usize;

        let mut vlen_buf = [0u8; 4];
        reader.read_exact(&mut vlen_buf).map_err(Error::Network)?;
        let value_len = i32::from_be_bytes(vlen_buf);

        let mut key = vec![0u8; key_len];
        reader.read_exact(&mut key).map_err(Error::Network)?;

        let value_offset = offset + 8 + key_len as u64;
        if value_len == TOMBSTONE {
            keydir.remove(&key);
            offset = value_offset;
        } else {
            let value_len = value_len as u32;
            reader
                .seek(SeekFrom::Current(value_len as i64))
                .map_err(Error::Network)?;
            keydir.insert(key, KeydirEntry {
                value_offset,
                value_len,
            });
            offset = value_offset + value_len as u64;
        }
    }
    Ok((keydir, offset))
}

impl Backend for LsmValueLogBackend {
    fn set(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let created = !inner.keydir.contains_key(key);
        self.append(&mut inner, key, Some(value))?;
        Ok(created)
    }

    fn add(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner.keydir.contains_key(key) {
            return Err(Error::AlreadyExists);
        }
        self.append(&mut inner, key, Some(value))?;
        Ok(true)
    }

    fn replace(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.keydir.contains_key(key) {
            return Err(Error::NotFound);
        }
        self.append(&mut inner, key, Some(value))?;
        Ok(false)
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut inner = self.inner.lock().unwrap();
        let entry = match inner.keydir.get(key) {
            Some(e) => KeydirEntry {
                value_offset: e.value_offset,
                value_len: e.value_len,
            },
            None => return Ok(None),
        };
        Ok(Some(self.read_value(&mut inner, &entry)?))
    }

    fn delete(&self, key: &[u8], only_if_exists: bool) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.keydir.contains_key(key) {
            let _ = only_if_exists;
            return Ok(false);
        }
        self.append(&mut inner, key, None)?;
        Ok(true)
    }

    fn incr(&self, key: &[u8], delta: i64) -> Result<i64> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner
            .keydir
            .get(key)
            .map(|e| KeydirEntry {
                value_offset: e.value_offset,
                value_len: e.value_len,
            })
            .ok_or(Error::NotFound)?;
        let current = self.read_value(&mut inner, &entry)?;
        let value = parse_counter(&current)?;
        let updated = value.wrapping_add(delta);
        let new_value = updated.to_string().into_bytes();
        self.append(&mut inner, key, Some(&new_value))?;
        Ok(updated)
    }

    fn range(
        &self,
        prefix: &[u8],
        limit: Limit,
        from: Option<&[u8]>,
        direction: Direction,
    ) -> Result<BTreeMap<Vec<u8>, Vec<u8>>> {
        let mut inner = self.inner.lock().unwrap();
        let take = match limit {
            Limit::Unlimited => usize::MAX,
            Limit::Bounded(n) => n,
        };
        let start = from.unwrap_or(prefix).to_vec();

        let matching: Vec<(Vec<u8>, KeydirEntry)> = match direction {
            Direction::Forward => inner
                .keydir
                .range(start..)
                .filter(|(k, _)| k.starts_with(prefix))
                .map(|(k, e)| {
                    (
                        k.clone(),
                        KeydirEntry {
                            value_offset: e.value_offset,
                            value_len: e.value_len,
                        },
                    )
                })
                .take(take)
                .collect(),
            Direction::Reverse => inner
                .keydir
                .range(..=start)
                .rev()
                .filter(|(k, _)| k.starts_with(prefix))
                .map(|(k, e)| {
                    (
                        k.clone(),
                        KeydirEntry {
                            value_offset: e.value_offset,
                            value_len: e.value_len,
                        },
                    )
                })
                .take(take)
                .collect(),
        };

        let mut out = BTreeMap::new();
        for (key, entry) in matching {
            let value = self.read_value(&mut inner, &entry)?;
            out.insert(key, value);
        }
        Ok(out)
    }

    fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.writer.set_len(0).map_err(Error::Network)?;
        inner
            .writer
            .seek(SeekFrom::Start(0))
            .map_err(Error::Network)?;
        inner.keydir.clear();
        inner.log_len = 0;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let inner = self.inner.lock().unwrap();
        inner.writer.sync_all().map_err(Error::Network)
    }

    fn stats(&self) -> String {
        let inner = self.inner.lock().unwrap();
        format!(
            "engine=value-log path={} keys={} log_len={}",
            self.path,
            inner.keydir.len(),
            inner.log_len
        )
    }

    fn db_path(&self) -> &str {
        &self.path
    }
}
