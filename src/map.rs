//! A sorted map that keeps recent inserts in memory and everything else in a
//! memory-mapped file.
//!
//! New entries land in a bounded in-memory skiplist. Once it holds
//! `max_items_in_memory` entries, the buffer is merged with the sorted on-disk
//! sequence into a fresh file (`<path>.tmp`), which then replaces the old file
//! by rename. Lookups consult the buffer first and fall back to a binary
//! search over the on-disk sequence.
//!
//! Compared to a fully in-memory ordered map, the per-entry bookkeeping cost is
//! paid only for the buffered entries; the on-disk part is paged in and out by
//! the OS as memory pressure dictates.
//!
//! Merges are not fsynced: an OS crash or power loss can leave the file
//! corrupted.

use std::{cmp::Ordering, fmt::Debug, fs, path::Path};

use crossbeam_skiplist::SkipMap;
use log::Level;

use crate::{
    error::{ensure_contract, StoreError, StoreResult},
    logging::{geostore_log, LogContext},
    option::MapOptions,
    record::FixedRecord,
    vector::{Iter, PersistentVector},
};

/// Key-unique associative container split between memory and disk.
pub struct SerializableMap<K, V>
where
    K: FixedRecord + Ord + Copy + Debug + Send + 'static,
    V: FixedRecord + Copy + Send + 'static,
{
    options: MapOptions,
    in_memory: SkipMap<K, V>,
    on_disk: PersistentVector<(K, V)>,
    merges: u64,
    log_ctx: LogContext,
}

impl<K, V> SerializableMap<K, V>
where
    K: FixedRecord + Ord + Copy + Debug + Send + 'static,
    V: FixedRecord + Copy + Send + 'static,
{
    /// Open (or create) the map described by `options`.
    pub fn open(options: impl Into<MapOptions>) -> StoreResult<Self> {
        let options = options.into();
        let on_disk = PersistentVector::open(
            options.vector_options(options.path.clone(), options.clear_contents),
        )?;
        let log_ctx = LogContext::for_file(&options.path);
        Ok(Self {
            options,
            in_memory: SkipMap::new(),
            on_disk,
            merges: 0,
            log_ctx,
        })
    }

    /// Insert a key that is not yet present.
    ///
    /// Merges the in-memory buffer to disk before returning once it is full.
    pub fn insert(&mut self, key: K, value: V) -> StoreResult<()> {
        ensure_contract!(
            !self.contains_key(&key)?,
            "key {key:?} already present in {}",
            self.path().display()
        );
        self.in_memory.insert(key, value);
        if self.in_memory.len() >= self.options.max_items_in_memory {
            self.merge()?;
        }
        Ok(())
    }

    /// Replace the value of a key that is already present.
    pub fn update(&mut self, key: K, value: V) -> StoreResult<()> {
        if self.in_memory.contains_key(&key) {
            self.in_memory.insert(key, value);
            return Ok(());
        }
        let Some(index) = self.on_disk_position(&key)? else {
            return Err(StoreError::ContractViolation(format!(
                "key {key:?} not present in {}",
                self.path().display()
            )));
        };
        self.on_disk.set(index, (key, value))
    }

    /// Value stored for `key`.
    pub fn get(&self, key: &K) -> StoreResult<Option<V>> {
        if let Some(entry) = self.in_memory.get(key) {
            return Ok(Some(*entry.value()));
        }
        match self.on_disk_position(key)? {
            Some(index) => Ok(Some(self.on_disk.get(index)?.1)),
            None => Ok(None),
        }
    }

    /// Whether `key` is present in memory or on disk.
    pub fn contains_key(&self, key: &K) -> StoreResult<bool> {
        if self.in_memory.contains_key(key) {
            return Ok(true);
        }
        Ok(self.on_disk_position(key)?.is_some())
    }

    /// Total number of entries.
    pub fn len(&self) -> u64 {
        self.in_memory.len() as u64 + self.on_disk.len()
    }

    /// Whether the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries waiting in the in-memory buffer.
    pub fn in_memory_len(&self) -> usize {
        self.in_memory.len()
    }

    /// Number of merges performed since the map was opened.
    pub fn merge_count(&self) -> u64 {
        self.merges
    }

    /// File holding the on-disk sequence.
    pub fn path(&self) -> &Path {
        &self.options.path
    }

    /// Entries already merged to disk, in key order.
    pub fn iter_on_disk(&self) -> Iter<'_, (K, V)> {
        self.on_disk.iter()
    }

    /// Merge the in-memory buffer into the on-disk sequence.
    ///
    /// Both inputs are sorted and key-disjoint, so a single linear pass
    /// produces the sorted union. An empty buffer leaves the file untouched.
    pub fn merge(&mut self) -> StoreResult<()> {
        if self.in_memory.is_empty() {
            return Ok(());
        }
        let tmp_path = self.options.tmp_path();
        let mut merged =
            PersistentVector::open(self.options.vector_options(tmp_path.clone(), true))?;

        let mut disk = self.on_disk.iter().peekable();
        for entry in self.in_memory.iter() {
            let key = *entry.key();
            while let Some(&(disk_key, disk_value)) = disk.peek() {
                match disk_key.cmp(&key) {
                    Ordering::Less => {
                        merged.push((disk_key, disk_value))?;
                        disk.next();
                    }
                    Ordering::Equal => {
                        return Err(StoreError::DataCorruption(format!(
                            "key {key:?} found both in memory and in {}",
                            self.options.path.display()
                        )));
                    }
                    Ordering::Greater => break,
                }
            }
            merged.push((key, *entry.value()))?;
        }
        for record in disk {
            merged.push(record)?;
        }

        // The renamed file keeps its open handle, so `merged` stays valid.
        fs::rename(&tmp_path, &self.options.path).map_err(|e| StoreError::io(&tmp_path, e))?;
        geostore_log!(
            Level::Debug,
            ctx: self.log_ctx,
            "map_merge",
            "in_memory={} on_disk={} merged={}",
            self.in_memory.len(),
            self.on_disk.len(),
            merged.len()
        );
        self.on_disk = merged;
        self.in_memory.clear();
        self.merges += 1;
        Ok(())
    }

    /// Merge everything to disk and close the map.
    pub fn close(mut self) -> StoreResult<()> {
        self.merge()
    }

    fn on_disk_position(&self, key: &K) -> StoreResult<Option<u64>> {
        let len = self.on_disk.len();
        if len == 0 {
            return Ok(None);
        }
        let key_at = |index: u64| self.on_disk.get(index).map(|(k, _)| k);

        let (mut lo, mut hi) = (0, len - 1);
        if *key < key_at(lo)? || *key > key_at(hi)? {
            return Ok(None);
        }
        while lo + 1 < hi {
            let mid = lo + (hi - lo) / 2;
            match key_at(mid)?.cmp(key) {
                Ordering::Equal => return Ok(Some(mid)),
                Ordering::Less => lo = mid,
                Ordering::Greater => hi = mid,
            }
        }
        if key_at(lo)? == *key {
            Ok(Some(lo))
        } else if key_at(hi)? == *key {
            Ok(Some(hi))
        } else {
            Ok(None)
        }
    }
}

impl<K, V> SerializableMap<K, V>
where
    K: FixedRecord + Ord + Copy + Debug + Send + 'static,
    V: FixedRecord + Ord + Copy + Default + Send + 'static,
{
    /// Largest value in the map, or `V::default()` when it is empty.
    ///
    /// Scans every entry; used to find the next free ID after a restart.
    pub fn highest_value(&self) -> V {
        let in_memory = self.in_memory.iter().map(|entry| *entry.value());
        let on_disk = self.on_disk.iter().map(|(_, value)| value);
        in_memory.chain(on_disk).fold(V::default(), V::max)
    }
}

impl<K, V> Drop for SerializableMap<K, V>
where
    K: FixedRecord + Ord + Copy + Debug + Send + 'static,
    V: FixedRecord + Copy + Send + 'static,
{
    fn drop(&mut self) {
        if let Err(err) = self.merge() {
            geostore_log!(
                Level::Error,
                ctx: self.log_ctx,
                "map_final_merge_failed",
                "pending={} error={}",
                self.in_memory.len(),
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn open_map(dir: &tempfile::TempDir, cap: usize) -> SerializableMap<u64, u64> {
        SerializableMap::open(
            MapOptions::from(dir.path().join("map.idx"))
                .max_items_in_memory(cap)
                .page_size(64),
        )
        .expect("open map")
    }

    #[test]
    fn second_insert_triggers_merge() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut map = open_map(&dir, 2);

        map.insert(3, 30).expect("insert");
        assert_eq!(map.merge_count(), 0);
        map.insert(1, 10).expect("insert");
        assert_eq!(map.merge_count(), 1);
        assert_eq!(map.in_memory_len(), 0);
        map.insert(2, 20).expect("insert");
        assert_eq!(map.merge_count(), 1);
        assert_eq!(map.in_memory_len(), 1);

        map.merge().expect("final merge");
        let on_disk: Vec<_> = map.iter_on_disk().collect();
        assert_eq!(on_disk, vec![(1, 10), (2, 20), (3, 30)]);
        assert_eq!(map.highest_value(), 30);
        assert!(!dir.path().join("map.idx.tmp").exists());
    }

    #[test]
    fn duplicate_keys_are_rejected_in_memory_and_on_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut map = open_map(&dir, 2);
        map.insert(5, 50).expect("insert");
        let err = map.insert(5, 51).expect_err("buffered duplicate");
        assert_eq!(err.kind(), ErrorKind::ContractViolation);

        map.insert(6, 60).expect("insert");
        assert_eq!(map.in_memory_len(), 0);
        assert!(map.insert(6, 61).is_err());
        assert_eq!(map.get(&6).expect("get"), Some(60));
    }

    #[test]
    fn lookups_cover_both_parts_and_bounds() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut map = open_map(&dir, 4);
        for key in [10u64, 20, 30, 40] {
            map.insert(key, key + 1).expect("insert");
        }
        map.insert(25, 26).expect("insert");

        for key in [10u64, 20, 25, 30, 40] {
            assert_eq!(map.get(&key).expect("get"), Some(key + 1));
            assert!(map.contains_key(&key).expect("contains"));
        }
        for key in [0u64, 15, 35, 41, u64::MAX] {
            assert_eq!(map.get(&key).expect("get"), None);
        }
        assert_eq!(map.len(), 5);
    }

    #[test]
    fn update_rewrites_values_in_place() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut map = open_map(&dir, 2);
        map.insert(1, 1).expect("insert");
        map.insert(2, 2).expect("insert");
        map.insert(3, 3).expect("insert");

        map.update(1, 100).expect("on-disk update");
        map.update(3, 300).expect("in-memory update");
        assert_eq!(map.get(&1).expect("get"), Some(100));
        assert_eq!(map.get(&3).expect("get"), Some(300));
        assert!(map.update(9, 9).is_err());
    }

    #[test]
    fn empty_map_highest_value_is_default() {
        let dir = tempfile::tempdir().expect("temp dir");
        let map = open_map(&dir, 2);
        assert!(map.is_empty());
        assert_eq!(map.highest_value(), 0);
    }

    #[test]
    fn drop_merges_and_reopen_restores() {
        let dir = tempfile::tempdir().expect("temp dir");
        {
            let mut map = open_map(&dir, 100);
            map.insert(7, 70).expect("insert");
            map.insert(4, 40).expect("insert");
        }
        let map = open_map(&dir, 100);
        assert_eq!(map.in_memory_len(), 0);
        assert_eq!(map.iter_on_disk().collect::<Vec<_>>(), vec![(4, 40), (7, 70)]);
        assert_eq!(map.highest_value(), 70);
        map.close().expect("close");

        let cleared = SerializableMap::<u64, u64>::open(
            MapOptions::from(dir.path().join("map.idx")).clear_contents(true),
        )
        .expect("open cleared");
        assert!(cleared.is_empty());
    }
}
