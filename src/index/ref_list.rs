//! Growable reference lists stored in the auxiliary arena.
//!
//! Layout at word offset `o`:
//! `[num_entries: u64][max_num_entries: u64][entry: u64; max_num_entries]`.
//! A list is only ever addressed by its offset; every access goes through the
//! arena again, so a list stays valid across arena growth.

use crate::{
    arena::MappedArena,
    error::{ensure_contract, ensure_intact, StoreResult},
    index::slot::Reference,
};

const HEADER_WORDS: u64 = 2;

/// Result of [`RefList::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AddOutcome {
    Added,
    AlreadyPresent,
    /// The list is full; it must hold at least `required` entries before retrying.
    Full { required: u64 },
}

#[derive(Debug)]
pub(crate) struct RefList {
    offset: u64,
}

impl RefList {
    /// Number of arena words a list of `capacity` entries occupies.
    pub(crate) fn words_for(capacity: u64) -> u64 {
        capacity + HEADER_WORDS
    }

    /// Address the existing list at `offset`, validating its header.
    pub(crate) fn at(arena: &MappedArena, offset: u64) -> StoreResult<Self> {
        ensure_intact!(offset != 0, "reference list offset 0 is reserved");
        let list = Self { offset };
        let num_entries = list.num_entries(arena)?;
        let max_num_entries = list.max_num_entries(arena)?;
        ensure_intact!(
            num_entries <= max_num_entries,
            "reference list at {offset} holds {num_entries} entries but has room for {max_num_entries}"
        );
        let end = offset.checked_add(Self::words_for(max_num_entries));
        ensure_intact!(
            end.is_some_and(|end| end <= arena.len_words()),
            "reference list at {offset} with {max_num_entries} entries exceeds the arena"
        );
        Ok(list)
    }

    /// Write an empty header for a list of `capacity` entries at `offset`.
    ///
    /// The caller must already have reserved the words.
    pub(crate) fn initialize(
        arena: &mut MappedArena,
        offset: u64,
        capacity: u64,
    ) -> StoreResult<Self> {
        arena.write_u64(offset, 0)?;
        arena.write_u64(offset + 1, capacity)?;
        Ok(Self { offset })
    }

    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    pub(crate) fn num_entries(&self, arena: &MappedArena) -> StoreResult<u64> {
        arena.read_u64(self.offset)
    }

    pub(crate) fn max_num_entries(&self, arena: &MappedArena) -> StoreResult<u64> {
        arena.read_u64(self.offset + 1)
    }

    pub(crate) fn entries(&self, arena: &MappedArena) -> StoreResult<Vec<Reference>> {
        let num_entries = self.num_entries(arena)?;
        (0..num_entries)
            .map(|i| arena.read_u64(self.entry_word(i)).map(Reference::decode))
            .collect()
    }

    /// Append `reference` unless it is already present or the list is full.
    pub(crate) fn add(
        &self,
        arena: &mut MappedArena,
        reference: Reference,
    ) -> StoreResult<AddOutcome> {
        let encoded = reference.encode();
        let num_entries = self.num_entries(arena)?;
        for i in 0..num_entries {
            if arena.read_u64(self.entry_word(i))? == encoded {
                return Ok(AddOutcome::AlreadyPresent);
            }
        }
        if num_entries == self.max_num_entries(arena)? {
            return Ok(AddOutcome::Full {
                required: num_entries + 1,
            });
        }
        arena.write_u64(self.entry_word(num_entries), encoded)?;
        arena.write_u64(self.offset, num_entries + 1)?;
        Ok(AddOutcome::Added)
    }

    /// Move the list to `new_offset` with room for `new_capacity` entries.
    ///
    /// The old header is zeroed in place; its words are never reused.
    pub(crate) fn resize(
        &mut self,
        arena: &mut MappedArena,
        new_offset: u64,
        new_capacity: u64,
    ) -> StoreResult<()> {
        let num_entries = self.num_entries(arena)?;
        ensure_contract!(
            new_capacity >= num_entries,
            "reference list at {} holds {num_entries} entries, cannot shrink to {new_capacity}",
            self.offset
        );
        arena.write_u64(new_offset, num_entries)?;
        arena.write_u64(new_offset + 1, new_capacity)?;
        arena.copy_words(
            self.entry_word(0),
            new_offset + HEADER_WORDS,
            num_entries,
        )?;
        arena.write_u64(self.offset, 0)?;
        self.offset = new_offset;
        Ok(())
    }

    fn entry_word(&self, index: u64) -> u64 {
        self.offset + HEADER_WORDS + index
    }
}
