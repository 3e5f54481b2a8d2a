#![deny(missing_docs)]
//! Out-of-core storage for planet-scale geographic datasets.
//!
//! Node, way and relation data sets are far larger than memory. This crate
//! provides the storage layer later processing passes build on:
//!
//! - [`arena::MappedArena`]: a growable memory-mapped file.
//! - [`vector::PersistentVector`]: fixed-width records in one arena.
//! - [`map::SerializableMap`]: a sorted map split between a bounded in-memory buffer and a sorted
//!   on-disk sequence.
//! - [`index::ReverseIndex`]: which ways and relations reference an entity.
//!
//! On top of those, [`ingest::ReferenceIndexer`] builds reverse indices from
//! way/relation records and [`remap::IdRemapper`] assigns dense IDs.
//!
//! All components are single-threaded and assume exclusive ownership of
//! their backing files. Every error is fatal; see [`error`].

mod logging;

/// Growable memory-mapped byte arena.
pub mod arena;

/// Fatal error taxonomy.
pub mod error;

/// Inverted reference index.
pub mod index;

/// Way/relation record ingestion into reverse indices.
pub mod ingest;

/// Hybrid in-memory/on-disk sorted map.
pub mod map;

/// Per-component configuration.
pub mod option;

/// Fixed-width record encoding.
pub mod record;

/// Dense ID remapping.
pub mod remap;

/// Memory-mapped record vector.
pub mod vector;

pub use crate::{
    error::{ErrorKind, StoreError, StoreResult},
    index::{Reference, ReverseIndex, Slot},
    map::SerializableMap,
    option::{IndexerOptions, MapOptions, RemapOptions, ReverseIndexOptions, VectorOptions},
    vector::PersistentVector,
};
