//! B+tree-with-buckets backend, built on `sled`.
//!
//! Each namespace ("bucket") is a `sled::Tree`, sled's own equivalent of a
//! named B+tree, so `flush` only has to drop and recreate one tree instead of
//! scanning the whole database. A [`CountingBloomFilter`] sits in front of
//! every tree so `get`/`replace`/`incr` misses on a cold key can skip the
//! tree lookup entirely; the filter is rebuilt by scanning existing keys when
//! the bucket is opened, since sled does not persist it for us.

use super::{parse_counter, Backend, Direction, Limit};
use crate::bloom::CountingBloomFilter;
use crate::error::{Error, Result};
use std::collections::BTreeMap;

const DEFAULT_BUCKET: &str = "default";

pub struct BTreeBucketBackend {
    db: sled::Db,
    tree: parking_lot::RwLock<sled::Tree>,
    filter: parking_lot::RwLock<CountingBloomFilter>,
    path: String,
    bloom_capacity: usize,
    bloom_fp_rate: f64,
}

impl BTreeBucketBackend {
    pub fn open(path: &str, bloom_capacity: usize, bloom_fp_rate: f64) -> Result<Self> {
        let db = sled::open(path)?;
        let tree = db.open_tree(DEFAULT_BUCKET)?;
        let filter = CountingBloomFilter::new(bloom_capacity, bloom_fp_rate);
        for item in tree.iter() {
            let (key, _) = item?;
            filter.add(&key);
        }
        Ok(BTreeBucketBackend {
            db,
            tree: parking_lot::RwLock::new(tree),
            filter: parking_lot::RwLock::new(filter),
            path: path.to_string(),
            bloom_capacity,
            bloom_fp_rate,
        })
    }

    fn rebuild_filter(&self, tree: &sled::Tree) -> Result<()> {
        let fresh = CountingBloomFilter::new(self.bloom_capacity, self.bloom_fp_rate);
        for item in tree.iter() {
            let (key, _) = item?;
            fresh.add(&key);
        }
        *self.filter.write() = fresh;
        Ok(())
    }
}

impl Backend for BTreeBucketBackend {
    fn set(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        let tree = self.tree.write();
        let created = tree.insert(key, value)?.is_none();
        self.filter.read().add(key);
        Ok(created)
    }

    fn add(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        let tree = self.tree.write();
        if tree.get(key)?.is_some() {
            return Err(Error::AlreadyExists);
        }
        tree.insert(key, value)?;
        self.filter.read().add(key);
        Ok(true)
    }

    fn replace(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        let tree = self.tree.write();
        if tree.get(key)?.is_none() {
            return Err(Error::NotFound);
        }
        tree.insert(key, value)?;
        Ok(false)
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if !self.filter.read().test(key) {
            return Ok(None);
        }
        let tree = self.tree.read();
        Ok(tree.get(key)?.map(|v| v.to_vec()))
    }

    fn delete(&self, key: &[u8], only_if_exists: bool) -> Result<bool> {
        let tree = self.tree.read();
        let removed = tree.remove(key)?;
        if removed.is_some() {
            self.filter.read().remove(key);
            Ok(true)
        } else if only_if_exists {
            Ok(false)
        } else {
            Ok(false)
        }
    }

    fn incr(&self, key: &[u8], delta: i64) -> Result<i64> {
        let tree = self.tree.read();
        let current = tree.get(key)?.ok_or(Error::NotFound)?;
        let value = parse_counter(&current)?;
        let updated = value.wrapping_add(delta);
        tree.insert(key, updated.to_string().into_bytes())?;
        Ok(updated)
    }

    fn range(
        &self,
        prefix: &[u8],
        limit: Limit,
        from: Option<&[u8]>,
        direction: Direction,
    ) -> Result<BTreeMap<Vec<u8>, Vec<u8>>> {
        let tree = self.tree.read();
        let mut out = BTreeMap::new();
        let start = from.unwrap_or(prefix).to_vec();
        let take = match limit {
            Limit::Unlimited => usize::MAX,
            Limit::Bounded(n) => n,
        };

        let push = |out: &mut BTreeMap<Vec<u8>, Vec<u8>>, k: sled::IVec, v: sled::IVec| {
            if k.starts_with(prefix) {
                out.insert(k.to_vec(), v.to_vec());
            }
        };

        match direction {
            Direction::Forward => {
                for item in tree.range(start..) {
                    let (k, v) = item?;
                    if out.len() >= take {
                        break;
                    }
                    push(&mut out, k, v);
                }
            }
            Direction::Reverse => {
                for item in tree.range(..=start).rev() {
                    let (k, v) = item?;
                    if out.len() >= take {
                        break;
                    }
                    push(&mut out, k, v);
                }
            }
        }
        Ok(out)
    }

    fn flush(&self) -> Result<()> {
        let new_tree = {
            let mut tree = self.tree.write();
            self.db.drop_tree(tree.name())?;
            let fresh = self.db.open_tree(DEFAULT_BUCKET)?;
            *tree = fresh.clone();
            fresh
        };
        self.rebuild_filter(&new_tree)?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn stats(&self) -> String {
        let tree = self.tree.read();
        format!(
            "engine=sled path={} len={} size_on_disk={}",
            self.path,
            tree.len(),
            self.db.size_on_disk().unwrap_or(0)
        )
    }

    fn db_path(&self) -> &str {
        &self.path
    }
}
