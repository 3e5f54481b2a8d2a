//! The [`ReverseIndex`] itself: slot transitions, list allocation in the aux
//! arena and reference queries.

use log::Level;

use crate::{
    arena::{MappedArena, WORD_SIZE},
    error::{ensure_contract, StoreError, StoreResult},
    index::{
        ref_list::{AddOutcome, RefList},
        slot::{Reference, Slot, MAX_REFERENCE_ID},
    },
    logging::{geostore_log, LogContext},
    option::ReverseIndexOptions,
};

/// Capacity of a freshly allocated reference list.
const INITIAL_LIST_CAPACITY: u64 = 2;

/// Word 0 of the aux arena is never allocated, so offset 0 always means "empty".
const FIRST_LIST_OFFSET: u64 = 1;

/// Maps entity IDs to the ways and relations that reference them.
///
/// Slot state per entity moves only forward:
/// `Empty -> InlineWayRef -> ListBacked`. Relation references are never
/// stored inline. Reference lists live in an append-only aux arena; a list
/// that outgrows its capacity is copied to a new location 1.5x its required
/// size and the old words are abandoned.
#[derive(Debug)]
pub struct ReverseIndex {
    index: MappedArena,
    aux: MappedArena,
    next_list_offset: u64,
    log_ctx: LogContext,
}

impl ReverseIndex {
    /// Open (or create) the index files described by `options`.
    ///
    /// Without clearing, the end of the used aux space cannot be known exactly
    /// because file sizes are rounded to pages. New lists are therefore placed
    /// after the end of the existing file, which never overlaps live data but
    /// may leave a gap.
    pub fn open(options: impl Into<ReverseIndexOptions>) -> StoreResult<Self> {
        let options = options.into();
        let index = MappedArena::open(
            &options.index_path,
            options.page_size,
            options.clear_contents,
        )?;
        let aux = MappedArena::open(&options.aux_path, options.page_size, options.clear_contents)?;
        let next_list_offset = aux.len_words().max(FIRST_LIST_OFFSET);
        let log_ctx = LogContext::for_file(&options.index_path);
        geostore_log!(
            Level::Debug,
            ctx: log_ctx,
            "reverse_index_open",
            "slots={} next_list_offset={}",
            index.len_words(),
            next_list_offset
        );
        Ok(Self {
            index,
            aux,
            next_list_offset,
            log_ctx,
        })
    }

    /// Record that way `way_id` references entity `target_id`.
    pub fn add_reference_from_way(&mut self, target_id: u64, way_id: u64) -> StoreResult<()> {
        check_reference_id("way", way_id)?;
        self.ensure_slot(target_id)?;

        let list = match self.slot(target_id)? {
            Slot::Empty => {
                return self.set_slot(target_id, Slot::InlineWayRef(way_id));
            }
            Slot::InlineWayRef(existing) if existing == way_id => return Ok(()),
            Slot::InlineWayRef(existing) => {
                let list = self.allocate_list(INITIAL_LIST_CAPACITY)?;
                self.add_to_fresh_list(&list, Reference::Way(existing))?;
                self.set_slot(target_id, Slot::ListBacked(list.offset()))?;
                geostore_log!(
                    Level::Trace,
                    ctx: self.log_ctx,
                    "ref_list_promote",
                    "target={} offset={}",
                    target_id,
                    list.offset()
                );
                list
            }
            Slot::ListBacked(offset) => RefList::at(&self.aux, offset)?,
        };
        self.append(target_id, list, Reference::Way(way_id))
    }

    /// Record that relation `relation_id` has entity `target_id` as a member.
    pub fn add_reference_from_relation(
        &mut self,
        target_id: u64,
        relation_id: u64,
    ) -> StoreResult<()> {
        check_reference_id("relation", relation_id)?;
        self.ensure_slot(target_id)?;

        let list = match self.slot(target_id)? {
            Slot::Empty => {
                let list = self.allocate_list(INITIAL_LIST_CAPACITY)?;
                self.set_slot(target_id, Slot::ListBacked(list.offset()))?;
                list
            }
            Slot::InlineWayRef(existing) => {
                let list = self.allocate_list(INITIAL_LIST_CAPACITY)?;
                self.add_to_fresh_list(&list, Reference::Way(existing))?;
                self.set_slot(target_id, Slot::ListBacked(list.offset()))?;
                list
            }
            Slot::ListBacked(offset) => RefList::at(&self.aux, offset)?,
        };
        self.append(target_id, list, Reference::Relation(relation_id))
    }

    /// Whether any way or relation references `id`.
    pub fn is_referenced(&self, id: u64) -> StoreResult<bool> {
        match self.slot(id)? {
            Slot::Empty => Ok(false),
            Slot::InlineWayRef(_) => Ok(true),
            Slot::ListBacked(offset) => {
                let list = RefList::at(&self.aux, offset)?;
                Ok(list.num_entries(&self.aux)? > 0)
            }
        }
    }

    /// Every way and relation referencing `id`, in insertion order.
    pub fn references(&self, id: u64) -> StoreResult<Vec<Reference>> {
        match self.slot(id)? {
            Slot::Empty => Ok(Vec::new()),
            Slot::InlineWayRef(way_id) => Ok(vec![Reference::Way(way_id)]),
            Slot::ListBacked(offset) => RefList::at(&self.aux, offset)?.entries(&self.aux),
        }
    }

    /// Decoded primary slot for `id`. IDs past the end of the array are empty.
    pub fn slot(&self, id: u64) -> StoreResult<Slot> {
        if id >= self.index.len_words() {
            return Ok(Slot::Empty);
        }
        self.index.read_u64(id).map(Slot::decode)
    }

    /// Capacity of the reference list behind `id`, if it has one.
    pub fn ref_list_capacity(&self, id: u64) -> StoreResult<Option<u64>> {
        match self.slot(id)? {
            Slot::ListBacked(offset) => {
                let list = RefList::at(&self.aux, offset)?;
                Ok(Some(list.max_num_entries(&self.aux)?))
            }
            _ => Ok(None),
        }
    }

    /// Word offset at which the next reference list will be allocated.
    pub fn aux_high_water_mark(&self) -> u64 {
        self.next_list_offset
    }

    /// Number of entity IDs the primary array can currently address.
    pub fn slot_count(&self) -> u64 {
        self.index.len_words()
    }

    /// Ask the OS to write dirty pages of both files back.
    pub fn flush(&self) -> StoreResult<()> {
        self.index.flush()?;
        self.aux.flush()
    }

    fn ensure_slot(&mut self, id: u64) -> StoreResult<()> {
        let bytes = id
            .checked_add(1)
            .and_then(|slots| slots.checked_mul(WORD_SIZE));
        let Some(bytes) = bytes else {
            return Err(StoreError::ContractViolation(format!(
                "entity ID {id} cannot be indexed"
            )));
        };
        self.index.ensure_len(bytes)
    }

    fn set_slot(&mut self, id: u64, slot: Slot) -> StoreResult<()> {
        self.index.write_u64(id, slot.encode())
    }

    /// Append `reference` to `list`, migrating the list if it is full.
    fn append(
        &mut self,
        target_id: u64,
        mut list: RefList,
        reference: Reference,
    ) -> StoreResult<()> {
        let AddOutcome::Full { required } = list.add(&mut self.aux, reference)? else {
            return Ok(());
        };
        self.grow_list(&mut list, required)?;
        self.set_slot(target_id, Slot::ListBacked(list.offset()))?;
        self.add_to_fresh_list(&list, reference)
    }

    fn add_to_fresh_list(&mut self, list: &RefList, reference: Reference) -> StoreResult<()> {
        match list.add(&mut self.aux, reference)? {
            AddOutcome::Added => Ok(()),
            outcome => Err(StoreError::DataCorruption(format!(
                "reference list at {} rejected {reference:?}: {outcome:?}",
                list.offset()
            ))),
        }
    }

    fn grow_list(&mut self, list: &mut RefList, min_entries: u64) -> StoreResult<()> {
        let capacity = list.max_num_entries(&self.aux)?;
        ensure_contract!(
            min_entries > capacity,
            "reference list at {} already holds {capacity} entries, cannot shrink to {min_entries}",
            list.offset()
        );
        let new_capacity = min_entries * 3 / 2;
        let old_offset = list.offset();
        let new_offset = self.reserve(new_capacity)?;
        list.resize(&mut self.aux, new_offset, new_capacity)?;
        geostore_log!(
            Level::Trace,
            ctx: self.log_ctx,
            "ref_list_migrate",
            "old_offset={} new_offset={} capacity={}",
            old_offset,
            new_offset,
            new_capacity
        );
        Ok(())
    }

    fn allocate_list(&mut self, capacity: u64) -> StoreResult<RefList> {
        let offset = self.reserve(capacity)?;
        RefList::initialize(&mut self.aux, offset, capacity)
    }

    /// Reserve words for a list of `capacity` entries at the end of the aux arena.
    fn reserve(&mut self, capacity: u64) -> StoreResult<u64> {
        let offset = self.next_list_offset;
        let end = offset.checked_add(RefList::words_for(capacity));
        let bytes = end.and_then(|end| end.checked_mul(WORD_SIZE));
        let (Some(end), Some(bytes)) = (end, bytes) else {
            return Err(StoreError::exhausted(
                self.aux.path(),
                std::io::Error::new(
                    std::io::ErrorKind::OutOfMemory,
                    "reference list arena exhausted",
                ),
            ));
        };
        self.aux.ensure_len(bytes)?;
        self.next_list_offset = end;
        Ok(offset)
    }
}

fn check_reference_id(kind: &str, id: u64) -> StoreResult<()> {
    ensure_contract!(
        id < MAX_REFERENCE_ID,
        "{kind} ID {id} is not below 2^31 and cannot be indexed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn open_index(dir: &tempfile::TempDir, clear: bool) -> ReverseIndex {
        ReverseIndex::open(
            ReverseIndexOptions::from_base(dir.path().join("nodeReverse"))
                .clear_contents(clear)
                .page_size(64),
        )
        .expect("open index")
    }

    #[test]
    fn single_way_reference_stays_inline() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut index = open_index(&dir, true);
        let mark = index.aux_high_water_mark();

        index.add_reference_from_way(100, 7).expect("add");
        assert!(index.is_referenced(100).expect("query"));
        assert_eq!(index.slot(100).expect("slot"), Slot::InlineWayRef(7));
        assert_eq!(index.aux_high_water_mark(), mark);
        assert!(!index.is_referenced(99).expect("query"));
    }

    #[test]
    fn second_way_reference_promotes_to_list() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut index = open_index(&dir, true);
        index.add_reference_from_way(100, 7).expect("add");
        let mark = index.aux_high_water_mark();

        index.add_reference_from_way(100, 8).expect("add");
        assert_eq!(
            index.references(100).expect("refs"),
            vec![Reference::Way(7), Reference::Way(8)]
        );
        assert_eq!(index.ref_list_capacity(100).expect("capacity"), Some(2));
        assert_eq!(
            index.aux_high_water_mark(),
            mark + RefList::words_for(INITIAL_LIST_CAPACITY)
        );
    }

    #[test]
    fn relation_reference_forces_list() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut index = open_index(&dir, true);
        index.add_reference_from_way(200, 7).expect("add");
        index.add_reference_from_relation(200, 50).expect("add");
        assert_eq!(
            index.references(200).expect("refs"),
            vec![Reference::Way(7), Reference::Relation(50)]
        );

        index.add_reference_from_relation(300, 51).expect("add");
        assert!(matches!(index.slot(300).expect("slot"), Slot::ListBacked(_)));
        assert_eq!(
            index.references(300).expect("refs"),
            vec![Reference::Relation(51)]
        );
    }

    #[test]
    fn duplicates_are_suppressed() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut index = open_index(&dir, true);
        index.add_reference_from_way(100, 7).expect("add");
        index.add_reference_from_way(100, 7).expect("add");
        assert_eq!(index.references(100).expect("refs"), vec![Reference::Way(7)]);

        index.add_reference_from_way(100, 8).expect("add");
        index.add_reference_from_way(100, 7).expect("add");
        index.add_reference_from_relation(100, 9).expect("add");
        index.add_reference_from_relation(100, 9).expect("add");
        assert_eq!(
            index.references(100).expect("refs"),
            vec![Reference::Way(7), Reference::Way(8), Reference::Relation(9)]
        );
    }

    #[test]
    fn reference_ids_must_fit_in_31_bits() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut index = open_index(&dir, true);
        let err = index
            .add_reference_from_way(1, MAX_REFERENCE_ID)
            .expect_err("2^31 is too large");
        assert_eq!(err.kind(), ErrorKind::ContractViolation);
        assert!(index.add_reference_from_relation(1, MAX_REFERENCE_ID).is_err());
        assert!(!index.is_referenced(1).expect("query"));

        index
            .add_reference_from_way(1, MAX_REFERENCE_ID - 1)
            .expect("2^31 - 1 fits");
        assert_eq!(
            index.references(1).expect("refs"),
            vec![Reference::Way(MAX_REFERENCE_ID - 1)]
        );
    }

    #[test]
    fn fresh_index_has_no_references() {
        let dir = tempfile::tempdir().expect("temp dir");
        let index = open_index(&dir, true);
        assert!(!index.is_referenced(999).expect("query"));
        assert!(index.references(999).expect("refs").is_empty());
        assert_eq!(index.aux_high_water_mark(), FIRST_LIST_OFFSET);
    }

    #[test]
    fn growth_keeps_every_entry() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut index = open_index(&dir, true);
        index.add_reference_from_way(5, 1).expect("add");
        index.add_reference_from_way(5, 2).expect("add");
        let old_offset = match index.slot(5).expect("slot") {
            Slot::ListBacked(offset) => offset,
            other => panic!("expected a list, got {other:?}"),
        };

        index.add_reference_from_relation(5, 3).expect("add");
        assert_eq!(index.ref_list_capacity(5).expect("capacity"), Some(4));
        let new_offset = match index.slot(5).expect("slot") {
            Slot::ListBacked(offset) => offset,
            other => panic!("expected a list, got {other:?}"),
        };
        assert!(new_offset > old_offset);
        assert_eq!(index.aux.read_u64(old_offset).expect("old header"), 0);

        for way in 10..40 {
            index.add_reference_from_way(5, way).expect("add");
        }
        let refs = index.references(5).expect("refs");
        assert_eq!(refs.len(), 33);
        assert!(refs.contains(&Reference::Way(1)));
        assert!(refs.contains(&Reference::Relation(3)));
        assert!(refs.contains(&Reference::Way(39)));
    }

    #[test]
    fn reopen_keeps_references_and_allocates_past_file_end() {
        let dir = tempfile::tempdir().expect("temp dir");
        {
            let mut index = open_index(&dir, true);
            index.add_reference_from_way(1, 10).expect("add");
            index.add_reference_from_way(1, 11).expect("add");
            index.add_reference_from_relation(2, 12).expect("add");
        }
        let mut index = open_index(&dir, false);
        let aux_words = index.aux.len_words();
        assert_eq!(index.aux_high_water_mark(), aux_words);
        assert_eq!(
            index.references(1).expect("refs"),
            vec![Reference::Way(10), Reference::Way(11)]
        );

        index.add_reference_from_relation(3, 13).expect("add");
        match index.slot(3).expect("slot") {
            Slot::ListBacked(offset) => assert!(offset >= aux_words),
            other => panic!("expected a list, got {other:?}"),
        }
        assert_eq!(index.references(2).expect("refs"), vec![Reference::Relation(12)]);
    }

    #[test]
    fn dangling_list_offset_is_corruption() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut index = open_index(&dir, true);
        index.add_reference_from_way(4, 1).expect("add");
        index.set_slot(4, Slot::ListBacked(1 << 40)).expect("overwrite slot");
        let err = index.is_referenced(4).expect_err("offset outside arena");
        assert_eq!(err.kind(), ErrorKind::DataCorruption);
    }
}
