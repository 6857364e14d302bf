//! The block-tree codec: streams in and out of a venti store.
//!
//! A *source* is a logical byte stream stored as a Merkle tree: leaves are
//! data blocks of up to `dsize` bytes, interior levels are pointer blocks
//! of concatenated scores up to `psize` bytes, and a single [`Entry`]
//! names the root.
//!
//! [`Entry`]: crate::Entry

mod reader;
mod writer;

pub use reader::SourceReader;
pub use writer::SourceWriter;

use crate::score::SCORE_SIZE;

/// Default size of venti data blocks.
pub const DEFAULT_DATA_SIZE: u32 = 8 * 1024;

/// Default size of venti pointer blocks.
pub const DEFAULT_POINTER_SIZE: u32 = DEFAULT_DATA_SIZE - DEFAULT_DATA_SIZE % SCORE_SIZE as u32;

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("block store: {0}")]
    Block(anyhow::Error),
    #[error(transparent)]
    Core(#[from] crate::error::CoreError),
    #[error("source tree exceeds the maximum pointer depth")]
    TooDeep,
    #[error("source stage panicked")]
    StagePanic,
}
