use std::collections::VecDeque;
use std::sync::Arc;

use bytes::{Buf, Bytes};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::entry::{Entry, fanout};
use crate::error::CoreError;
use crate::score::{SCORE_SIZE, Score};
use crate::source::SourceError;
use crate::store::BlockRead;
use crate::zero::zero_extend;

/// Streams the bytes of a source back out of a block store.
///
/// The tree is walked depth first, left to right, one block buffered at a
/// time. `Entry.size` is authoritative: expanding a pointer score always
/// yields `psize/20` children (stored scores padded with zero scores), a
/// leaf yields `min(dsize, bytes left)` zero-extended bytes, and the
/// stream ends exactly at `size` bytes. Zero-truncated blocks therefore
/// read back as written. Seeking is not supported.
pub struct SourceReader {
    br: Arc<dyn BlockRead>,
    entry: Entry,
    remaining: u64,
    // queues[d] holds the scores not yet visited at depth d
    queues: Vec<VecDeque<Score>>,
    buf: Bytes,
}

impl SourceReader {
    pub fn new(br: Arc<dyn BlockRead>, entry: Entry) -> Result<Self, SourceError> {
        if entry.dsize == 0 {
            return Err(CoreError::BadSize(0).into());
        }
        if entry.depth() > 0 && (entry.psize as usize) < SCORE_SIZE {
            return Err(CoreError::BadSize(entry.psize as u64).into());
        }
        let top = entry.depth() as usize;
        let mut queues = vec![VecDeque::new(); top + 1];
        queues[top].push_back(entry.score);
        Ok(SourceReader {
            br,
            entry,
            remaining: entry.size,
            queues,
            buf: Bytes::new(),
        })
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Bytes not yet produced.
    pub fn remaining(&self) -> u64 {
        self.remaining + self.buf.len() as u64
    }

    /// The next logical data block: exactly `min(dsize, bytes left)`
    /// bytes, or `None` at end of stream.
    pub async fn next_block(&mut self) -> Result<Option<Bytes>, SourceError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let want = (self.entry.dsize as u64).min(self.remaining) as usize;
        let score = self.next_leaf_score().await?;
        let mut block = if score.is_zero() {
            Vec::new()
        } else {
            self.br
                .read_block(score, self.entry.base_type(), self.entry.dsize as usize)
                .await
                .map_err(SourceError::Block)?
                .to_vec()
        };
        block.truncate(want);
        zero_extend(self.entry.base_type(), &mut block, want);
        self.remaining -= want as u64;
        Ok(Some(block.into()))
    }

    /// Copies up to `dst.len()` bytes into `dst`; 0 means end of stream.
    pub async fn read(&mut self, dst: &mut [u8]) -> Result<usize, SourceError> {
        if dst.is_empty() {
            return Ok(0);
        }
        if self.buf.is_empty() {
            match self.next_block().await? {
                Some(block) => self.buf = block,
                None => return Ok(0),
            }
        }
        let n = dst.len().min(self.buf.len());
        dst[..n].copy_from_slice(&self.buf[..n]);
        self.buf.advance(n);
        Ok(n)
    }

    /// Drains the stream into `w`, returning the bytes written.
    pub async fn write_to<W>(&mut self, w: &mut W) -> Result<u64, SourceError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut written = 0u64;
        loop {
            if self.buf.is_empty() {
                match self.next_block().await? {
                    Some(block) => self.buf = block,
                    None => return Ok(written),
                }
            }
            w.write_all(&self.buf)
                .await
                .map_err(|e| SourceError::Block(e.into()))?;
            written += self.buf.len() as u64;
            self.buf = Bytes::new();
        }
    }

    /// Collects the whole stream into memory.
    pub async fn read_to_vec(&mut self) -> Result<Vec<u8>, SourceError> {
        let mut out = Vec::with_capacity(self.remaining() as usize);
        out.extend_from_slice(&self.buf);
        self.buf = Bytes::new();
        while let Some(block) = self.next_block().await? {
            out.extend_from_slice(&block);
        }
        Ok(out)
    }

    async fn next_leaf_score(&mut self) -> Result<Score, SourceError> {
        let top = self.entry.depth() as usize;
        let mut d = 0;
        while d <= top && self.queues[d].is_empty() {
            d += 1;
        }
        if d > top {
            // the stored tree ran out before `size`: the tail is zeros
            return Ok(Score::ZERO);
        }
        while d > 0 {
            let score = self.queues[d].pop_front().expect("queue checked nonempty");
            self.expand(score, d).await?;
            d -= 1;
        }
        Ok(self.queues[0]
            .pop_front()
            .expect("expanding fills the child queue"))
    }

    /// Replace a pointer score with its children. Absent trailing children
    /// are zero subtrees, so the queue is padded to the full fan-out.
    async fn expand(&mut self, score: Score, depth: usize) -> Result<(), SourceError> {
        let t = self.entry.base_type() + depth as u8;
        let block = if score.is_zero() {
            Bytes::new()
        } else {
            self.br
                .read_block(score, t, self.entry.psize as usize)
                .await
                .map_err(SourceError::Block)?
        };

        let q = &mut self.queues[depth - 1];
        for chunk in block.chunks_exact(SCORE_SIZE) {
            let s = Score::from_slice(chunk).expect("chunk is score sized");
            q.push_back(s);
        }
        let n = fanout(self.entry.psize);
        while q.len() < n {
            q.push_back(Score::ZERO);
        }
        Ok(())
    }
}
