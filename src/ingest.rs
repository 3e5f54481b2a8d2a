//! Feeding way and relation records into node, way and relation reverse indices.
//!
//! An entity-stream producer yields ways (with their ordered node references)
//! and relations (with typed members). The [`ReferenceIndexer`] records, for
//! every referenced entity, which ways and relations point at it, so a later
//! filtering pass can ask whether an entity is referenced at all.

use std::fs;

use log::Level;

use crate::{
    error::{StoreError, StoreResult},
    index::ReverseIndex,
    logging::geostore_log,
    option::IndexerOptions,
};

/// Base name of the index over referenced nodes.
pub const NODE_INDEX_BASE: &str = "nodeReverse";
/// Base name of the index over referenced ways.
pub const WAY_INDEX_BASE: &str = "wayReverse";
/// Base name of the index over referenced relations.
pub const RELATION_INDEX_BASE: &str = "relationReverse";

/// A way and the nodes it passes through, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WayRecord {
    /// Way ID.
    pub id: u64,
    /// Referenced node IDs.
    pub node_refs: Vec<u64>,
}

/// Kind of entity a relation member refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// A node member.
    Node,
    /// A way member.
    Way,
    /// A nested relation member.
    Relation,
}

/// One member of a relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// What the member refers to.
    pub kind: MemberKind,
    /// ID of the referenced entity.
    pub id: u64,
    /// Role of the member within the relation.
    pub role: String,
}

/// A relation and its members, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationRecord {
    /// Relation ID.
    pub id: u64,
    /// Members of the relation.
    pub members: Vec<Member>,
}

/// Builds the node, way and relation reverse indices from an entity stream.
#[derive(Debug)]
pub struct ReferenceIndexer {
    nodes: ReverseIndex,
    ways: ReverseIndex,
    relations: ReverseIndex,
    ways_indexed: u64,
    relations_indexed: u64,
}

impl ReferenceIndexer {
    /// Open the three indices under the configured directory, creating it if needed.
    pub fn open(options: impl Into<IndexerOptions>) -> StoreResult<Self> {
        let options = options.into();
        fs::create_dir_all(&options.directory)
            .map_err(|e| StoreError::io(&options.directory, e))?;
        Ok(Self {
            nodes: ReverseIndex::open(options.index_options(NODE_INDEX_BASE))?,
            ways: ReverseIndex::open(options.index_options(WAY_INDEX_BASE))?,
            relations: ReverseIndex::open(options.index_options(RELATION_INDEX_BASE))?,
            ways_indexed: 0,
            relations_indexed: 0,
        })
    }

    /// Record the way as a referrer of each of its nodes.
    pub fn index_way(&mut self, way: &WayRecord) -> StoreResult<()> {
        for &node_id in &way.node_refs {
            self.nodes.add_reference_from_way(node_id, way.id)?;
        }
        self.ways_indexed += 1;
        Ok(())
    }

    /// Record the relation as a referrer of each of its members.
    pub fn index_relation(&mut self, relation: &RelationRecord) -> StoreResult<()> {
        for member in &relation.members {
            let index = match member.kind {
                MemberKind::Node => &mut self.nodes,
                MemberKind::Way => &mut self.ways,
                MemberKind::Relation => &mut self.relations,
            };
            index.add_reference_from_relation(member.id, relation.id)?;
        }
        self.relations_indexed += 1;
        Ok(())
    }

    /// Reverse index over referenced nodes.
    pub fn nodes(&self) -> &ReverseIndex {
        &self.nodes
    }

    /// Reverse index over referenced ways.
    pub fn ways(&self) -> &ReverseIndex {
        &self.ways
    }

    /// Reverse index over referenced relations.
    pub fn relations(&self) -> &ReverseIndex {
        &self.relations
    }

    /// Flush all three indices.
    pub fn finish(self) -> StoreResult<()> {
        geostore_log!(
            Level::Info,
            "reference_index_finished",
            "ways={} relations={}",
            self.ways_indexed,
            self.relations_indexed
        );
        self.nodes.flush()?;
        self.ways.flush()?;
        self.relations.flush()
    }
}
