//! Inverted index from entity IDs to the ways and relations referencing them.
//!
//! Two files back a [`ReverseIndex`]: a dense primary array with one 64-bit
//! [`Slot`] per entity ID, and an auxiliary arena holding variable-length
//! reference lists for entities referenced more than once (or by a relation).

mod ref_list;
mod reverse;
mod slot;

pub use reverse::ReverseIndex;
pub use slot::{Reference, Slot, MAX_REFERENCE_ID};
