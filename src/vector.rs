//! A vector of fixed-width records backed by a memory-mapped file.
//!
//! On-disk layout: `[len: u64][record; len]`, followed by unused capacity up
//! to the end of the file. The content survives the process, so reopening a
//! file without truncation restores every record.

use std::{marker::PhantomData, path::Path, slice::ChunksExact};

use crate::{
    arena::{MappedArena, WORD_SIZE},
    error::{ensure_contract, ensure_intact, StoreError, StoreResult},
    option::VectorOptions,
    record::FixedRecord,
};

const HEADER_SIZE: u64 = WORD_SIZE;

/// Dense, index-addressable sequence of records living in one arena.
#[derive(Debug)]
pub struct PersistentVector<T> {
    arena: MappedArena,
    len: u64,
    _marker: PhantomData<T>,
}

impl<T> PersistentVector<T>
where
    T: FixedRecord,
{
    /// Open (or create) the vector described by `options`.
    pub fn open(options: impl Into<VectorOptions>) -> StoreResult<Self> {
        let options = options.into();
        ensure_contract!(T::SIZE > 0, "zero-sized records cannot be persisted");

        let mut arena = MappedArena::open(&options.path, options.page_size, options.truncate)?;
        if arena.len() < HEADER_SIZE {
            arena.ensure_len(HEADER_SIZE)?;
            arena.write_u64(0, 0)?;
        }
        let len = arena.read_u64(0)?;
        let vector = Self {
            arena,
            len,
            _marker: PhantomData,
        };
        ensure_intact!(
            len <= vector.capacity(),
            "{} claims {len} records but only has room for {}",
            vector.path().display(),
            vector.capacity()
        );
        Ok(vector)
    }

    /// Number of records.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the vector holds no records.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of records that fit without growing the backing file.
    pub fn capacity(&self) -> u64 {
        (self.arena.len() - HEADER_SIZE) / T::SIZE as u64
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        self.arena.path()
    }

    /// Append a record, growing the backing file if it is full.
    pub fn push(&mut self, value: T) -> StoreResult<()> {
        let index = self.len;
        self.reserve_records(index + 1)?;
        self.encode_at(index, &value);
        self.set_len(index + 1);
        Ok(())
    }

    /// Remove and return the last record.
    pub fn pop(&mut self) -> Option<T> {
        let last = self.last()?;
        self.set_len(self.len - 1);
        Some(last)
    }

    /// Record at `index`.
    pub fn get(&self, index: u64) -> StoreResult<T> {
        self.check_index(index)?;
        Ok(self.decode_at(index))
    }

    /// Overwrite the record at `index`.
    pub fn set(&mut self, index: u64, value: T) -> StoreResult<()> {
        self.check_index(index)?;
        self.encode_at(index, &value);
        Ok(())
    }

    /// First record, if any.
    pub fn first(&self) -> Option<T> {
        (!self.is_empty()).then(|| self.decode_at(0))
    }

    /// Last record, if any.
    pub fn last(&self) -> Option<T> {
        (!self.is_empty()).then(|| self.decode_at(self.len - 1))
    }

    /// Drop every record. The backing file keeps its size.
    pub fn clear(&mut self) {
        self.set_len(0);
    }

    /// Iterate over the records in index order.
    ///
    /// The iterator borrows the vector, so no record can be added while it is alive.
    pub fn iter(&self) -> Iter<'_, T> {
        let start = HEADER_SIZE as usize;
        let end = start + self.len as usize * T::SIZE;
        Iter {
            chunks: self.arena.bytes()[start..end].chunks_exact(T::SIZE),
            _marker: PhantomData,
        }
    }

    /// Ask the OS to write dirty pages back.
    pub fn flush(&self) -> StoreResult<()> {
        self.arena.flush()
    }

    fn check_index(&self, index: u64) -> StoreResult<()> {
        ensure_contract!(
            index < self.len,
            "index {index} out of bounds for {} with {} records",
            self.path().display(),
            self.len
        );
        Ok(())
    }

    fn reserve_records(&mut self, records: u64) -> StoreResult<()> {
        let bytes = (T::SIZE as u64)
            .checked_mul(records)
            .and_then(|bytes| bytes.checked_add(HEADER_SIZE));
        let Some(bytes) = bytes else {
            return Err(StoreError::ContractViolation(format!(
                "{records} records overflow the address space"
            )));
        };
        self.arena.ensure_len(bytes)
    }

    fn record_range(index: u64) -> std::ops::Range<usize> {
        let start = HEADER_SIZE as usize + index as usize * T::SIZE;
        start..start + T::SIZE
    }

    fn decode_at(&self, index: u64) -> T {
        T::decode(&self.arena.bytes()[Self::record_range(index)])
    }

    fn encode_at(&mut self, index: u64, value: &T) {
        value.encode(&mut self.arena.bytes_mut()[Self::record_range(index)]);
    }

    fn set_len(&mut self, len: u64) {
        self.arena.bytes_mut()[..HEADER_SIZE as usize].copy_from_slice(&len.to_le_bytes());
        self.len = len;
    }
}

/// Iterator over the records of a [`PersistentVector`].
pub struct Iter<'a, T> {
    chunks: ChunksExact<'a, u8>,
    _marker: PhantomData<T>,
}

impl<T> Iterator for Iter<'_, T>
where
    T: FixedRecord,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.chunks.next().map(T::decode)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl<T> DoubleEndedIterator for Iter<'_, T>
where
    T: FixedRecord,
{
    fn next_back(&mut self) -> Option<T> {
        self.chunks.next_back().map(T::decode)
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> where T: FixedRecord {}

impl<T> PersistentVector<T>
where
    T: FixedRecord + Default,
{
    /// Truncate to `len` records, or extend with default records.
    ///
    /// Shrinking never touches the backing allocation.
    pub fn resize(&mut self, len: u64) -> StoreResult<()> {
        if len > self.len {
            self.reserve_records(len)?;
            for index in self.len..len {
                self.encode_at(index, &T::default());
            }
        }
        self.set_len(len);
        Ok(())
    }
}
