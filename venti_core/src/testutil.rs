//! Test utilities: an in-memory block store.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;

use crate::block::BlockType;
use crate::score::Score;
use crate::store::{BlockRead, BlockResult, BlockWrite};

/// A score-addressed map of blocks, for tests and as a reference-server
/// backend. Types are not checked; venti addresses are content-only.
#[derive(Debug, Default)]
pub struct MemStore {
    blocks: Mutex<HashMap<Score, Bytes>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct blocks stored.
    pub fn len(&self) -> usize {
        self.blocks.lock().expect("store lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlockRead for MemStore {
    async fn read_block(&self, score: Score, _t: BlockType, max: usize) -> BlockResult<Bytes> {
        if score.is_zero() {
            return Ok(Bytes::new());
        }
        let blocks = self.blocks.lock().expect("store lock");
        let block = blocks
            .get(&score)
            .ok_or_else(|| anyhow!("unknown score {score}"))?;
        let n = block.len().min(max);
        Ok(block.slice(..n))
    }
}

#[async_trait]
impl BlockWrite for MemStore {
    async fn write_block(&self, _t: BlockType, data: Bytes) -> BlockResult<Score> {
        if data.is_empty() {
            return Ok(Score::ZERO);
        }
        let score = Score::fingerprint(&data);
        self.blocks.lock().expect("store lock").insert(score, data);
        Ok(score)
    }
}
