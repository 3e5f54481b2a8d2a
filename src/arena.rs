//! Growable memory-mapped byte arena backed by a single file.
//!
//! The arena owns the file and its mapping. Growing extends the file and maps
//! it again, which may move the mapping, so every accessor borrows the arena: slices obtained from
//! [`MappedArena::bytes`] cannot be held across [`MappedArena::ensure_len`].
//! Components that need to refer to arena contents across calls store integer
//! offsets and resolve them again on each access.

use std::{
    fs::{File, OpenOptions},
    io,
    ops::Range,
    path::{Path, PathBuf},
};

use log::Level;
use memmap2::{MmapMut, MmapOptions};

use crate::{
    error::{ensure_contract, ensure_intact, StoreError, StoreResult},
    logging::{geostore_log, LogContext},
};

/// Size of one arena word in bytes.
pub const WORD_SIZE: u64 = 8;

/// A file-backed byte region that can be queried for its length and grown.
#[derive(Debug)]
pub struct MappedArena {
    file: File,
    path: PathBuf,
    map: Option<MmapMut>,
    len: u64,
    page_size: u64,
    log_ctx: LogContext,
}

impl MappedArena {
    /// Open or create `path`, optionally discarding its previous content.
    ///
    /// Existing files must have a length that is a multiple of [`WORD_SIZE`].
    pub fn open(path: impl AsRef<Path>, page_size: u64, truncate: bool) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        ensure_contract!(
            page_size > 0 && page_size % WORD_SIZE == 0,
            "page size {page_size} is not a positive multiple of {WORD_SIZE}"
        );

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(truncate)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;
        let len = file
            .metadata()
            .map_err(|e| StoreError::io(&path, e))?
            .len();
        ensure_intact!(
            len % WORD_SIZE == 0,
            "{} has size {len}, which is not a multiple of {WORD_SIZE}",
            path.display()
        );

        let map = map_file(&file, &path, len)?;
        let log_ctx = LogContext::for_file(&path);
        geostore_log!(
            Level::Debug,
            ctx: log_ctx,
            "arena_open",
            "len={} truncate={}",
            len,
            truncate
        );
        Ok(Self {
            file,
            path,
            map,
            len,
            page_size,
            log_ctx,
        })
    }

    /// Current length of the backing file in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the backing file is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current length in whole words.
    pub fn len_words(&self) -> u64 {
        self.len / WORD_SIZE
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Make sure at least `required` bytes are mapped.
    ///
    /// Grows the file to the next page boundary past `required` plus ~10%
    /// headroom. Existing bytes keep their content; new bytes read as zero.
    pub fn ensure_len(&mut self, required: u64) -> StoreResult<()> {
        if self.len >= required {
            return Ok(());
        }
        let new_len = grown_len(required, self.page_size).ok_or_else(|| {
            StoreError::exhausted(
                &self.path,
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("cannot grow to {required} bytes"),
                ),
            )
        })?;

        // Extending the file leaves the current mapping valid. It is replaced
        // only once the larger one exists, so a failed growth keeps `len` and
        // `map` in agreement.
        self.file
            .set_len(new_len)
            .map_err(|e| StoreError::exhausted(&self.path, e))?;
        self.map = map_file(&self.file, &self.path, new_len)?;

        geostore_log!(
            Level::Debug,
            ctx: self.log_ctx,
            "arena_grow",
            "old_len={} new_len={} required={}",
            self.len,
            new_len,
            required
        );
        self.len = new_len;
        Ok(())
    }

    /// The mapped bytes.
    pub fn bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    /// The mapped bytes, writable.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.map.as_deref_mut().unwrap_or(&mut [])
    }

    /// Read the little-endian word at word offset `word`.
    pub fn read_u64(&self, word: u64) -> StoreResult<u64> {
        let range = self.word_range(word, 1)?;
        let mut buf = [0u8; WORD_SIZE as usize];
        buf.copy_from_slice(&self.bytes()[range]);
        Ok(u64::from_le_bytes(buf))
    }

    /// Write `value` as a little-endian word at word offset `word`.
    pub fn write_u64(&mut self, word: u64, value: u64) -> StoreResult<()> {
        let range = self.word_range(word, 1)?;
        self.bytes_mut()[range].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Copy `count` words starting at `src` to `dst`. Ranges may overlap.
    pub fn copy_words(&mut self, src: u64, dst: u64, count: u64) -> StoreResult<()> {
        let from = self.word_range(src, count)?;
        let to = self.word_range(dst, count)?;
        self.bytes_mut().copy_within(from, to.start);
        Ok(())
    }

    /// Ask the OS to write dirty pages back. Gives no durability guarantee.
    pub fn flush(&self) -> StoreResult<()> {
        if let Some(map) = &self.map {
            map.flush().map_err(|e| StoreError::io(&self.path, e))?;
        }
        Ok(())
    }

    fn word_range(&self, word: u64, count: u64) -> StoreResult<Range<usize>> {
        let end = word
            .checked_add(count)
            .filter(|end| *end <= self.len_words());
        let Some(end) = end else {
            return Err(StoreError::DataCorruption(format!(
                "words {word}..{word}+{count} lie outside {} ({} words)",
                self.path.display(),
                self.len_words()
            )));
        };
        Ok((word * WORD_SIZE) as usize..(end * WORD_SIZE) as usize)
    }
}

/// File length needed to hold `required` bytes, with ~10% headroom, rounded up
/// to a whole number of pages.
fn grown_len(required: u64, page_size: u64) -> Option<u64> {
    let padded = required.checked_mul(11)? / 10;
    (padded / page_size).checked_add(1)?.checked_mul(page_size)
}

fn map_file(file: &File, path: &Path, len: u64) -> StoreResult<Option<MmapMut>> {
    if len == 0 {
        return Ok(None);
    }
    let len = usize::try_from(len).map_err(|_| {
        StoreError::exhausted(
            path,
            io::Error::new(io::ErrorKind::OutOfMemory, "file larger than address space"),
        )
    })?;
    // SAFETY: the file is opened read-write and this process owns it
    // exclusively for the arena's lifetime, so no other party truncates it
    // underneath the mapping.
    let map = unsafe { MmapOptions::new().len(len).map_mut(file) }
        .map_err(|e| StoreError::exhausted(path, e))?;
    Ok(Some(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn growth_rounds_to_pages_with_headroom() {
        assert_eq!(grown_len(8, 4096), Some(4096));
        assert_eq!(grown_len(4096, 4096), Some(8192));
        assert_eq!(grown_len(10_000, 4096), Some(12288));
        assert_eq!(grown_len(u64::MAX, 4096), None);
    }

    #[test]
    fn grow_preserves_content_and_zero_fills() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut arena = MappedArena::open(dir.path().join("a.bin"), 64, false).expect("open");
        assert!(arena.is_empty());
        assert!(arena.bytes().is_empty());

        arena.ensure_len(16).expect("grow");
        arena.write_u64(0, 0xdead_beef).expect("write");
        arena.write_u64(1, 7).expect("write");
        let before = arena.len();

        arena.ensure_len(before * 4).expect("grow again");
        assert!(arena.len() >= before * 4);
        assert_eq!(arena.len() % 64, 0);
        assert_eq!(arena.read_u64(0).expect("read"), 0xdead_beef);
        assert_eq!(arena.read_u64(1).expect("read"), 7);
        assert_eq!(arena.read_u64(arena.len_words() - 1).expect("read"), 0);
    }

    #[test]
    fn ensure_len_is_noop_when_large_enough() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut arena = MappedArena::open(dir.path().join("a.bin"), 4096, false).expect("open");
        arena.ensure_len(100).expect("grow");
        let len = arena.len();
        arena.ensure_len(len).expect("noop");
        assert_eq!(arena.len(), len);
    }

    #[test]
    fn reopen_keeps_content_unless_truncated() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("a.bin");
        {
            let mut arena = MappedArena::open(&path, 4096, false).expect("open");
            arena.ensure_len(8).expect("grow");
            arena.write_u64(0, 42).expect("write");
        }
        let arena = MappedArena::open(&path, 4096, false).expect("reopen");
        assert_eq!(arena.len(), 4096);
        assert_eq!(arena.read_u64(0).expect("read"), 42);
        drop(arena);

        let arena = MappedArena::open(&path, 4096, true).expect("truncate");
        assert!(arena.is_empty());
    }

    #[test]
    fn misaligned_file_is_corruption() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("a.bin");
        std::fs::write(&path, [1u8, 2, 3]).expect("write file");
        let err = MappedArena::open(&path, 4096, false).expect_err("3 bytes is misaligned");
        assert_eq!(err.kind(), ErrorKind::DataCorruption);
    }

    #[test]
    fn out_of_range_words_are_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut arena = MappedArena::open(dir.path().join("a.bin"), 64, false).expect("open");
        arena.ensure_len(8).expect("grow");
        let words = arena.len_words();
        assert!(arena.read_u64(words).is_err());
        assert!(arena.write_u64(words, 1).is_err());
        assert!(arena.copy_words(0, words - 1, 2).is_err());
        assert!(arena.read_u64(u64::MAX).is_err());
    }

    #[test]
    fn failed_growth_keeps_the_old_mapping() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut arena = MappedArena::open(dir.path().join("a.bin"), 64, false).expect("open");
        arena.ensure_len(16).expect("grow");
        arena.write_u64(1, 99).expect("write");
        let len = arena.len();

        // Far beyond any file size limit and any address space.
        let err = arena.ensure_len(1 << 59).expect_err("growth must fail");
        assert_eq!(err.kind(), ErrorKind::ResourceExhaustion);

        assert_eq!(arena.len(), len);
        assert_eq!(arena.bytes().len() as u64, len);
        assert_eq!(arena.read_u64(1).expect("read after failed growth"), 99);
        arena.write_u64(0, 5).expect("write after failed growth");
        arena.ensure_len(len * 2).expect("later growth still works");
        assert_eq!(arena.read_u64(0).expect("read"), 5);
    }

    #[test]
    fn invalid_page_size_is_contract_violation() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = MappedArena::open(dir.path().join("a.bin"), 12, false).expect_err("12 % 8 != 0");
        assert_eq!(err.kind(), ErrorKind::ContractViolation);
    }
}
