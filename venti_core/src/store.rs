use async_trait::async_trait;
use bytes::Bytes;

use crate::block::BlockType;
use crate::score::Score;

pub type BlockResult<T, E = anyhow::Error> = std::result::Result<T, E>;

/// Read access to a block store.
#[async_trait]
pub trait BlockRead: Send + Sync + 'static {
    /// Reads the block with the given score and type, returning at most
    /// `max` bytes. The zero score yields an empty buffer without I/O.
    async fn read_block(&self, score: Score, t: BlockType, max: usize) -> BlockResult<Bytes>;
}

/// Write access to a block store.
#[async_trait]
pub trait BlockWrite: Send + Sync + 'static {
    /// Writes `data` as a block of the given type and returns its score.
    /// Empty data yields the zero score without I/O.
    async fn write_block(&self, t: BlockType, data: Bytes) -> BlockResult<Score>;
}
