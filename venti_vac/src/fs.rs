//! Archive roots: the 3-entry directory block and the named root record
//! that tie a whole tree to one score.

use std::sync::Arc;

use bytes::Bytes;

use venti_core::entry::ENTRY_ACTIVE;
use venti_core::{
    BlockRead, BlockType, BlockWrite, ENTRY_SIZE, Entry, ROOT_SIZE, Root, Score, SourceReader,
};

use crate::direntry::VAC_DIR_VERSION;
use crate::error::VacError;
use crate::file::File;
use crate::meta::{BYTES_PER_ENTRY, MetaBlock, MetaEntry};

/// Writes the root of the archive: a meta block holding the directory's
/// own metadata, the 120-byte block of the three top entries, and the
/// 300-byte root record. Returns the root score to hand to the user.
pub async fn write_root(bw: Arc<dyn BlockWrite>, dir: &File) -> Result<Score, VacError> {
    let msource = dir.msource.ok_or(VacError::NotDir)?;
    let dsize = dir.source.dsize;
    let psize = dir.source.psize;

    // the directory's own metadata, packed alone into one meta block
    let mut mb = MetaBlock::new(dsize as usize, dsize as usize / BYTES_PER_ENTRY);
    let n = dir.meta.packed_size(VAC_DIR_VERSION);
    let offset = mb.alloc(n)?;
    let me = MetaEntry { offset, size: n };
    mb.store(me, &dir.meta.pack(VAC_DIR_VERSION)?)?;
    mb.insert(0, me)?;
    let mscore = bw
        .write_block(BlockType::DATA, Bytes::copy_from_slice(mb.pack()))
        .await
        .map_err(VacError::Block)?;

    let mentry = Entry {
        generation: 0,
        psize,
        dsize,
        kind: BlockType::DATA,
        flags: ENTRY_ACTIVE,
        size: dsize as u64,
        score: mscore,
    };

    let mut buf = Vec::with_capacity(3 * ENTRY_SIZE);
    buf.extend_from_slice(&dir.source.pack()?);
    buf.extend_from_slice(&msource.pack()?);
    buf.extend_from_slice(&mentry.pack()?);
    let score = bw
        .write_block(BlockType::DIR, buf.into())
        .await
        .map_err(VacError::Block)?;

    let root = Root {
        name: "vac".to_string(),
        kind: "vac".to_string(),
        score,
        block_size: dsize,
        prev: Score::ZERO,
    };
    bw.write_block(BlockType::ROOT, Bytes::copy_from_slice(&root.pack()?))
        .await
        .map_err(VacError::Block)
}

/// Reconstructs the top-level directory from a parsed root record.
pub async fn read_root(br: Arc<dyn BlockRead>, root: &Root) -> Result<File, VacError> {
    let buf = br
        .read_block(root.score, BlockType::DIR, 3 * ENTRY_SIZE)
        .await
        .map_err(VacError::Block)?;
    if buf.len() != 3 * ENTRY_SIZE {
        return Err(VacError::CorruptMeta("bad root directory block size"));
    }

    let source = Entry::unpack(&buf[..ENTRY_SIZE])?;
    let msource = Entry::unpack(&buf[ENTRY_SIZE..2 * ENTRY_SIZE])?;
    let rmeta = Entry::unpack(&buf[2 * ENTRY_SIZE..])?;

    let mut r = SourceReader::new(br, rmeta)?;
    let metabuf = r.read_to_vec().await?;
    let mb = MetaBlock::unpack(&metabuf)?;
    let meta = mb.dir_entry_at(0)?;

    Ok(File {
        meta,
        source,
        msource: Some(msource),
    })
}

/// Fetches and parses the root block at `score`, then opens the archive's
/// top-level directory.
pub async fn open_root(br: Arc<dyn BlockRead>, score: Score) -> Result<(Root, File), VacError> {
    let buf = br
        .read_block(score, BlockType::ROOT, ROOT_SIZE)
        .await
        .map_err(VacError::Block)?;
    let root = Root::unpack(&buf)?;
    let file = read_root(br.clone(), &root).await?;
    Ok((root, file))
}
