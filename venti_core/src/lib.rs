//! Core venti types and traits.
//!
//! Everything in a venti store is addressed by the SHA-1 of its contents.
//! This crate defines the wire-stable building blocks shared by the client,
//! the archive layer and the tools:
//!
//! - Content fingerprints ([`Score`])
//! - Depth-encoded block types and their on-disk translation ([`BlockType`])
//! - The 40-byte block-tree descriptor ([`Entry`]) and the 300-byte named
//!   root record ([`Root`])
//! - Zero truncation/extension for canonical block boundaries
//!
//! On top of those it provides the block-tree codec: [`SourceWriter`] splits
//! an arbitrary byte stream into a Merkle tree of data and pointer blocks
//! behind a [`BlockWrite`] store, and [`SourceReader`] streams the bytes
//! back out of a [`BlockRead`] store.
//!
//! These layouts are used directly on the wire and in stored blocks;
//! changes to them are protocol changes.

pub mod block;
pub mod entry;
pub mod error;
pub mod int;
pub mod root;
pub mod score;
pub mod source;
pub mod store;
pub mod zero;

#[cfg(feature = "testutil")]
pub mod testutil;

// --- Core Public Surface ---

pub use block::BlockType;
pub use entry::{ENTRY_SIZE, Entry};
pub use error::CoreError;
pub use root::{ROOT_SIZE, Root};
pub use score::{SCORE_SIZE, Score};
pub use source::{
    DEFAULT_DATA_SIZE, DEFAULT_POINTER_SIZE, SourceError, SourceReader, SourceWriter,
};
pub use store::{BlockRead, BlockResult, BlockWrite};
