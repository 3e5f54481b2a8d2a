//! Dense renumbering of node, way and relation IDs.
//!
//! Each entity kind gets its own [`SerializableMap`] from original ID to
//! remapped ID. New IDs are handed out consecutively starting after the
//! highest ID already stored, so an interrupted job resumes numbering where
//! it stopped.

use std::fs;

use log::Level;

use crate::{
    error::{StoreError, StoreResult},
    ingest::{MemberKind, RelationRecord, WayRecord},
    logging::geostore_log,
    map::SerializableMap,
    option::RemapOptions,
};

/// File holding the node ID mapping.
pub const NODE_MAP_FILE: &str = "mapNodes.idx";
/// File holding the way ID mapping.
pub const WAY_MAP_FILE: &str = "mapWays.idx";
/// File holding the relation ID mapping.
pub const RELATION_MAP_FILE: &str = "mapRelations.idx";

/// Number of IDs assigned so far, per entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemappedCounts {
    /// Highest node ID handed out.
    pub nodes: u64,
    /// Highest way ID handed out.
    pub ways: u64,
    /// Highest relation ID handed out.
    pub relations: u64,
}

struct IdTable {
    map: SerializableMap<u64, u64>,
    highest: u64,
}

impl IdTable {
    fn open(options: &RemapOptions, file_name: &str) -> StoreResult<Self> {
        let map = SerializableMap::open(options.map_options(file_name))?;
        let highest = map.highest_value();
        Ok(Self { map, highest })
    }

    fn remap(&mut self, id: u64) -> StoreResult<u64> {
        if let Some(remapped) = self.map.get(&id)? {
            return Ok(remapped);
        }
        self.highest += 1;
        self.map.insert(id, self.highest)?;
        Ok(self.highest)
    }
}

/// Assigns dense, persistent replacement IDs to nodes, ways and relations.
pub struct IdRemapper {
    nodes: IdTable,
    ways: IdTable,
    relations: IdTable,
}

impl IdRemapper {
    /// Open the three mappings under the configured directory, creating it if needed.
    pub fn open(options: impl Into<RemapOptions>) -> StoreResult<Self> {
        let options = options.into();
        fs::create_dir_all(&options.directory)
            .map_err(|e| StoreError::io(&options.directory, e))?;
        let remapper = Self {
            nodes: IdTable::open(&options, NODE_MAP_FILE)?,
            ways: IdTable::open(&options, WAY_MAP_FILE)?,
            relations: IdTable::open(&options, RELATION_MAP_FILE)?,
        };
        let counts = remapper.remapped_counts();
        geostore_log!(
            Level::Debug,
            "id_remapper_open",
            "nodes={} ways={} relations={}",
            counts.nodes,
            counts.ways,
            counts.relations
        );
        Ok(remapper)
    }

    /// Remapped ID of node `id`, assigning a new one on first sight.
    pub fn remap_node(&mut self, id: u64) -> StoreResult<u64> {
        self.nodes.remap(id)
    }

    /// Remapped ID of way `id`, assigning a new one on first sight.
    pub fn remap_way_id(&mut self, id: u64) -> StoreResult<u64> {
        self.ways.remap(id)
    }

    /// Remapped ID of relation `id`, assigning a new one on first sight.
    pub fn remap_relation_id(&mut self, id: u64) -> StoreResult<u64> {
        self.relations.remap(id)
    }

    /// Rewrite the way's ID and node references in place.
    pub fn remap_way(&mut self, way: &mut WayRecord) -> StoreResult<()> {
        way.id = self.ways.remap(way.id)?;
        for node_id in &mut way.node_refs {
            *node_id = self.nodes.remap(*node_id)?;
        }
        Ok(())
    }

    /// Rewrite the relation's ID and member references in place.
    pub fn remap_relation(&mut self, relation: &mut RelationRecord) -> StoreResult<()> {
        relation.id = self.relations.remap(relation.id)?;
        for member in &mut relation.members {
            let table = match member.kind {
                MemberKind::Node => &mut self.nodes,
                MemberKind::Way => &mut self.ways,
                MemberKind::Relation => &mut self.relations,
            };
            member.id = table.remap(member.id)?;
        }
        Ok(())
    }

    /// Highest ID handed out so far for each entity kind.
    pub fn remapped_counts(&self) -> RemappedCounts {
        RemappedCounts {
            nodes: self.nodes.highest,
            ways: self.ways.highest,
            relations: self.relations.highest,
        }
    }

    /// Merge all three mappings to disk.
    pub fn close(self) -> StoreResult<()> {
        let counts = self.remapped_counts();
        self.nodes.map.close()?;
        self.ways.map.close()?;
        self.relations.map.close()?;
        geostore_log!(
            Level::Info,
            "id_remapper_closed",
            "nodes={} ways={} relations={}",
            counts.nodes,
            counts.ways,
            counts.relations
        );
        Ok(())
    }
}
