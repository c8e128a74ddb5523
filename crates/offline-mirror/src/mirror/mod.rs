//! Local mirror of a server-held collection.
//!
//! - [`memory`]: [`MemoryCollection`], the in-memory reactive collection.
//! - [`keys`]: [`TrackedKeys`], ids present in the durable store.
//! - [`collection`]: [`MirrorCollection`], write-through persistence,
//!   ledger bookkeeping and rehydration on top of the two.

pub mod collection;
pub mod keys;
pub mod memory;

pub use collection::MirrorCollection;
pub use keys::TrackedKeys;
pub use memory::{MemoryCollection, UpdateOptions, Updated};
