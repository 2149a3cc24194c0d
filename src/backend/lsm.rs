//! True LSM-tree backend, built on `rocksdb`.
//!
//! Writes land in rocksdb's memtable and WAL and are merged into sorted
//! on-disk SSTables by background compaction; this is the engine choice for
//! write-heavy workloads where the B+tree-with-buckets backend's in-place
//! updates would thrash.

use super::{parse_counter, Backend, Direction, Limit};
use crate::error::{Error, Result};
use rocksdb::{IteratorMode, Options, DB};
use std::collections::BTreeMap;
use std::sync::Mutex;

pub struct LsmBackend {
    db: DB,
    path: String,
    // Serializes read-modify-write sequences (add/replace/incr) since rocksdb
    // gives us atomic single-key puts but not compare-and-swap.
    write_lock: Mutex<()>,
}

impl LsmBackend {
    pub fn open(path: &str) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(LsmBackend {
            db,
            path: path.to_string(),
            write_lock: Mutex::new(()),
        })
    }
}

impl Backend for LsmBackend {
    fn set(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap();
        let created = self.db.get(key)?.is_none();
        self.db.put(key, value)?;
        Ok(created)
    }

    fn add(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap();
        if self.db.get(key)?.is_some() {
            return Err(Error::AlreadyExists);
        }
        self.db.put(key, value)?;
        Ok(true)
    }

    fn replace(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap();
        if self.db.get(key)?.is_none() {
            return Err(Error::NotFound);
        }
        self.db.put(key, value)?;
        Ok(false)
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    fn delete(&self, key: &[u8], only_if_exists: bool) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap();
        let existed = self.db.get(key)?.is_some();
        if existed {
            self.db.delete(key)?;
            Ok(true)
        } else {
            let _ = only_if_exists;
            Ok(false)
        }
    }

    fn incr(&self, key: &[u8], delta: i64) -> Result<i64> {
        let _guard = self.write_lock.lock().unwrap();
        let current = self.db.get(key)?.ok_or(Error::NotFound)?;
        let value = parse_counter(&current)?;
        let updated = value.wrapping_add(delta);
        self.db.put(key, updated.to_string().into_bytes())?;
        Ok(updated)
    }

    fn range(
        &self,
        prefix: &[u8],
        limit: Limit,
        from: Option<&[u8]>,
        direction: Direction,
    ) -> Result<BTreeMap<Vec<u8>, Vec<u8>>> {
        let take = match limit {
            Limit::Unlimited => usize::MAX,
            Limit::Bounded(n) => n,
        };
        let start = from.unwrap_or(prefix).to_vec();
        let mode = match direction {
            Direction::Forward => IteratorMode::From(&start, rocksdb::Direction::Forward),
            Direction::Reverse => IteratorMode::From(&start, rocksdb::Direction::Reverse),
        };

        let mut out = BTreeMap::new();
        for item in self.db.iterator(mode) {
            if out.len() >= take {
                break;
            }
            let (k, v) = item.map_err(|e| Error::Storage(e.to_string()))?;
            if !k.starts_with(prefix) {
                if direction == Direction::Forward {
                    break;
                } else {
                    continue;
                }
            }
            out.insert(k.to_vec(), v.to_vec());
        }
        Ok(out)
    }

    fn flush(&self) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        let keys: Vec<Vec<u8>> = self
            .db
            .iterator(IteratorMode::Start)
            .filter_map(|r| r.ok())
            .map(|(k, _)| k.to_vec())
            .collect();
        for key in keys {
            self.db.delete(key)?;
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.db.flush().map_err(|e| Error::Storage(e.to_string()))
    }

    fn stats(&self) -> String {
        let estimate = self
            .db
            .property_value("rocksdb.estimate-num-keys")
            .ok()
            .flatten()
            .unwrap_or_else(|| "unknown".to_string());
        format!("engine=rocksdb path={} estimate-num-keys={}", self.path, estimate)
    }

    fn db_path(&self) -> &str {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::contract_tests;

    fn open_temp() -> (tempfile::TempDir, LsmBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = LsmBackend::open(dir.path().to_str().unwrap()).unwrap();
        (dir, backend)
    }

    #[test]
    fn round_trip() {
        let (_dir, backend) = open_temp();
        contract_tests::round_trip(&backend);
    }

    #[test]
    fn add_replace_duality() {
        let (_dir, backend) = open_temp();
        contract_tests::add_replace_duality(&backend);
    }

    #[test]
    fn counter_law() {
        let (_dir, backend) = open_temp();
        contract_tests::counter_law(&backend);
    }

    #[test]
    fn incr_on_missing_key_is_not_found() {
        let (_dir, backend) = open_temp();
        contract_tests::incr_on_missing_key_is_not_found(&backend);
    }

    #[test]
    fn incr_on_non_numeric_value_is_not_numeric() {
        let (_dir, backend) = open_temp();
        contract_tests::incr_on_non_numeric_value_is_not_numeric(&backend);
    }

    #[test]
    fn delete_reports_presence() {
        let (_dir, backend) = open_temp();
        contract_tests::delete_reports_presence(&backend);
    }

    #[test]
    fn flush_empties_namespace() {
        let (_dir, backend) = open_temp();
        contract_tests::flush_empties_namespace(&backend);
    }

    #[test]
    fn set_reports_creation_vs_overwrite() {
        let (_dir, backend) = open_temp();
        contract_tests::set_reports_creation_vs_overwrite(&backend);
    }

    #[test]
    fn range_is_ordered_and_prefix_scoped() {
        let (_dir, backend) = open_temp();
        backend.set(b"k:1", b"a").unwrap();
        backend.set(b"k:2", b"b").unwrap();
        backend.set(b"z:1", b"c").unwrap();
        let results = backend
            .range(b"k:", Limit::Unlimited, None, Direction::Forward)
            .unwrap();
        assert_eq!(results.len(), 2);
    }
}
