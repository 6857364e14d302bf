use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::block::{BlockType, MAX_DEPTH};
use crate::entry::{ENTRY_ACTIVE, ENTRY_SIZE, Entry};
use crate::error::CoreError;
use crate::score::{SCORE_SIZE, Score};
use crate::source::SourceError;
use crate::store::BlockWrite;
use crate::zero::zero_truncate;

/// Writes a byte stream into a venti store as a block tree and emits the
/// [`Entry`] naming its root.
///
/// Data blocks are written from the caller's task. Each pointer level runs
/// as its own batcher task, connected by single-producer channels of
/// capacity one: order is preserved and at most one pointer block per
/// level is in flight. A level is spawned the first time the level below
/// produces a second score, so a single-block stream stays at depth zero.
///
/// [`flush`](SourceWriter::flush) is the only barrier: it terminates the
/// pipeline, surfaces any stage error, and leaves the writer clean for
/// reuse.
pub struct SourceWriter {
    bw: Arc<dyn BlockWrite>,
    base: BlockType,
    psize: u32,
    dsize: u32,
    size: u64,
    leaf: Vec<u8>,
    state: Option<WriteState>,
}

struct WriteState {
    emitter: Emitter,
    root_rx: oneshot::Receiver<(u8, Score)>,
}

impl SourceWriter {
    /// `base` must be a depth-zero data or dir type; `psize` must hold at
    /// least one packed entry. Pointer blocks are batched in score-sized
    /// units, so any slop below a multiple of [`SCORE_SIZE`] is unused.
    pub fn new(
        bw: Arc<dyn BlockWrite>,
        base: BlockType,
        psize: u32,
        dsize: u32,
    ) -> Result<Self, CoreError> {
        if base != BlockType::DATA && base != BlockType::DIR {
            return Err(CoreError::BadSourceType(base));
        }
        if dsize == 0 {
            return Err(CoreError::BadSize(0));
        }
        if (psize as usize) < ENTRY_SIZE {
            return Err(CoreError::BadSize(psize as u64));
        }
        Ok(SourceWriter {
            bw,
            base,
            psize,
            dsize,
            size: 0,
            leaf: Vec::new(),
            state: None,
        })
    }

    /// Total bytes accepted since the last flush.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Appends `data` to the stream. Leaves are cut at `dsize` boundaries
    /// regardless of how the input is chunked.
    pub async fn write(&mut self, mut data: &[u8]) -> Result<(), SourceError> {
        let dsize = self.dsize as usize;
        self.size += data.len() as u64;

        while !data.is_empty() {
            if self.leaf.is_empty() && data.len() >= dsize {
                self.write_leaf_block(&data[..dsize]).await?;
                data = &data[dsize..];
                continue;
            }
            let take = (dsize - self.leaf.len()).min(data.len());
            self.leaf.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.leaf.len() == dsize {
                let leaf = std::mem::take(&mut self.leaf);
                self.write_leaf_block(&leaf).await?;
            }
        }
        Ok(())
    }

    /// Drains `r` into the stream, returning the number of bytes copied.
    pub async fn read_from<R>(&mut self, r: &mut R) -> Result<u64, SourceError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut buf = vec![0u8; self.dsize as usize];
        let mut copied = 0u64;
        loop {
            let n = r
                .read(&mut buf)
                .await
                .map_err(|e| SourceError::Block(e.into()))?;
            if n == 0 {
                return Ok(copied);
            }
            self.write(&buf[..n]).await?;
            copied += n as u64;
        }
    }

    /// Finishes the stream: flushes the partial leaf, closes every stage
    /// and returns the entry for the tree root. Any block-write failure
    /// inside the pipeline surfaces here. The writer is reusable
    /// afterwards.
    pub async fn flush(&mut self) -> Result<Entry, SourceError> {
        if !self.leaf.is_empty() {
            let leaf = std::mem::take(&mut self.leaf);
            self.write_leaf_block(&leaf).await?;
        }

        let size = self.size;
        self.size = 0;

        let (depth, score) = match self.state.take() {
            // nothing was written: the canonical empty source
            None => (0, Score::ZERO),
            Some(state) => {
                state.emitter.finish().await?;
                state.root_rx.await.unwrap_or((0, Score::ZERO))
            }
        };

        Ok(Entry {
            generation: 0,
            psize: self.psize,
            dsize: self.dsize,
            kind: self.base + depth,
            flags: ENTRY_ACTIVE,
            size,
            score,
        })
    }

    async fn write_leaf_block(&mut self, block: &[u8]) -> Result<(), SourceError> {
        let score = write_truncated(&self.bw, self.base, block).await?;
        if self.state.is_none() {
            let (root_tx, root_rx) = oneshot::channel();
            self.state = Some(WriteState {
                emitter: Emitter {
                    depth: 0,
                    bw: self.bw.clone(),
                    base: self.base,
                    psize: self.psize,
                    parent: None,
                    pending: None,
                    root_tx: Some(root_tx),
                },
                root_rx,
            });
        }
        let state = self.state.as_mut().expect("state initialized above");
        state.emitter.emit(score).await
    }
}

/// One pointer-batching stage: its input channel and join handle.
struct Stage {
    tx: mpsc::Sender<Score>,
    handle: JoinHandle<Result<(), SourceError>>,
}

/// Routes the scores produced at one level to the level above, spawning
/// that level on the second score. Whichever level never needed a parent
/// owns the root channel and delivers the final score through it.
struct Emitter {
    depth: u8,
    bw: Arc<dyn BlockWrite>,
    base: BlockType,
    psize: u32,
    parent: Option<Stage>,
    pending: Option<Score>,
    root_tx: Option<oneshot::Sender<(u8, Score)>>,
}

impl Emitter {
    async fn emit(&mut self, score: Score) -> Result<(), SourceError> {
        if let Some(stage) = &self.parent {
            if stage.tx.send(score).await.is_ok() {
                return Ok(());
            }
            // the stage bailed out; join it for the real error
            let stage = self.parent.take().expect("parent checked above");
            return Err(join_stage(stage.handle.await).err().unwrap_or(SourceError::StagePanic));
        }

        match self.pending.take() {
            None => {
                self.pending = Some(score);
                Ok(())
            }
            Some(first) => {
                // a second score arrived: this level needs a parent
                if self.depth >= MAX_DEPTH {
                    return Err(SourceError::TooDeep);
                }
                let stage = spawn_stage(
                    self.depth + 1,
                    self.bw.clone(),
                    self.base,
                    self.psize,
                    self.root_tx.take().expect("root channel moves up with the top stage"),
                );
                if stage.tx.send(first).await.is_err() || stage.tx.send(score).await.is_err() {
                    return Err(join_stage(stage.handle.await)
                        .err()
                        .unwrap_or(SourceError::StagePanic));
                }
                self.parent = Some(stage);
                Ok(())
            }
        }
    }

    async fn finish(mut self) -> Result<(), SourceError> {
        match self.parent.take() {
            Some(stage) => {
                drop(stage.tx);
                join_stage(stage.handle.await)
            }
            None => {
                if let (Some(score), Some(tx)) = (self.pending.take(), self.root_tx.take()) {
                    let _ = tx.send((self.depth, score));
                }
                Ok(())
            }
        }
    }
}

fn spawn_stage(
    depth: u8,
    bw: Arc<dyn BlockWrite>,
    base: BlockType,
    psize: u32,
    root_tx: oneshot::Sender<(u8, Score)>,
) -> Stage {
    let (tx, mut rx) = mpsc::channel::<Score>(1);
    let t = base + depth;
    // scores are batched whole; slop below a score boundary stays unused
    let full = (psize as usize / SCORE_SIZE) * SCORE_SIZE;

    let handle = tokio::spawn(async move {
        let mut em = Emitter {
            depth,
            bw: bw.clone(),
            base,
            psize,
            parent: None,
            pending: None,
            root_tx: Some(root_tx),
        };
        let mut block = BytesMut::with_capacity(full);

        while let Some(score) = rx.recv().await {
            block.extend_from_slice(score.as_bytes());
            if block.len() >= full {
                let s = write_truncated(&bw, t, &block).await?;
                block.clear();
                em.emit(s).await?;
            }
        }
        if !block.is_empty() {
            let s = write_truncated(&bw, t, &block).await?;
            em.emit(s).await?;
        }
        em.finish().await
    });

    Stage { tx, handle }
}

async fn write_truncated(
    bw: &Arc<dyn BlockWrite>,
    t: BlockType,
    block: &[u8],
) -> Result<Score, SourceError> {
    let truncated = zero_truncate(t, block);
    if truncated.is_empty() {
        return Ok(Score::ZERO);
    }
    bw.write_block(t, Bytes::copy_from_slice(truncated))
        .await
        .map_err(SourceError::Block)
}

fn join_stage(
    res: Result<Result<(), SourceError>, tokio::task::JoinError>,
) -> Result<(), SourceError> {
    match res {
        Ok(r) => r,
        Err(_) => Err(SourceError::StagePanic),
    }
}
