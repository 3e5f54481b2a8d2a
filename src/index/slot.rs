//! Bit-level encoding of primary slots and reference-list entries.
//!
//! Both use the high bit of a 64-bit word as a tag. Decoding happens at the
//! arena boundary; the rest of the index works on [`Slot`] and [`Reference`].

/// High bit of a slot or list entry.
pub(crate) const TAG_BIT: u64 = 1 << 63;

/// Exclusive upper bound for way and relation IDs.
pub const MAX_REFERENCE_ID: u64 = 1 << 31;

/// Decoded content of one primary slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// No way or relation references the entity.
    Empty,
    /// Exactly one way references the entity; stored without a list.
    InlineWayRef(u64),
    /// References live in the list starting at this word offset of the aux arena.
    ListBacked(u64),
}

impl Slot {
    pub(crate) fn decode(word: u64) -> Self {
        if word == 0 {
            Slot::Empty
        } else if word & TAG_BIT != 0 {
            Slot::InlineWayRef(word & !TAG_BIT)
        } else {
            Slot::ListBacked(word)
        }
    }

    pub(crate) fn encode(self) -> u64 {
        match self {
            Slot::Empty => 0,
            Slot::InlineWayRef(way_id) => way_id | TAG_BIT,
            Slot::ListBacked(offset) => {
                debug_assert!(offset != 0 && offset & TAG_BIT == 0);
                offset
            }
        }
    }
}

/// One entry of a reference list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Reference {
    /// The entity is referenced by this way.
    Way(u64),
    /// The entity is a member of this relation.
    Relation(u64),
}

impl Reference {
    /// ID of the referencing way or relation.
    pub fn id(self) -> u64 {
        match self {
            Reference::Way(id) | Reference::Relation(id) => id,
        }
    }

    pub(crate) fn decode(word: u64) -> Self {
        if word & TAG_BIT != 0 {
            Reference::Way(word & !TAG_BIT)
        } else {
            Reference::Relation(word)
        }
    }

    pub(crate) fn encode(self) -> u64 {
        match self {
            Reference::Way(id) => id | TAG_BIT,
            Reference::Relation(id) => id,
        }
    }
}
