use std::sync::Arc;

use tokio::io::AsyncRead;

use venti_core::{
    BlockRead, BlockType, BlockWrite, ENTRY_SIZE, Entry, SCORE_SIZE, SourceReader, SourceWriter,
};

use crate::direntry::DirEntry;
use crate::error::VacError;
use crate::meta::MetaBlock;

/// A file or directory in a vac archive: its metadata plus the entry of
/// its content source, and for directories the entry of the source that
/// holds the children's metadata.
#[derive(Debug, Clone)]
pub struct File {
    pub meta: DirEntry,
    pub source: Entry,
    pub msource: Option<Entry>,
}

impl File {
    /// Archives `r` as a regular file with blocks of `bsize` bytes.
    pub async fn create<R>(
        bw: Arc<dyn BlockWrite>,
        r: &mut R,
        meta: DirEntry,
        bsize: u32,
    ) -> Result<File, VacError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let psize = bsize / SCORE_SIZE as u32 * SCORE_SIZE as u32;
        let mut w = SourceWriter::new(bw, BlockType::DATA, psize, bsize)?;
        w.read_from(r).await?;
        let source = w.flush().await?;
        Ok(File {
            meta,
            source,
            msource: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.meta.elem
    }

    pub fn is_dir(&self) -> bool {
        self.meta.is_dir()
    }

    /// Streams this file's content.
    pub fn reader(&self, br: Arc<dyn BlockRead>) -> Result<SourceReader, VacError> {
        SourceReader::new(br, self.source).map_err(Into::into)
    }

    /// Resolves a child of this directory from its scanned metadata: the
    /// child's data entry lives at slot `de.entry` of the entry source,
    /// and for directories its metadata entry at slot `de.mentry`.
    pub async fn walk(&self, br: Arc<dyn BlockRead>, de: &DirEntry) -> Result<File, VacError> {
        if self.msource.is_none() {
            return Err(VacError::NotDir);
        }

        // directory sources are small; read the packed entries whole
        let mut sr = SourceReader::new(br.clone(), self.source)?;
        let buf = sr.read_to_vec().await?;

        let source = entry_at(&buf, de.entry)?;
        let mut f = File {
            meta: de.clone(),
            source,
            msource: None,
        };
        if source.is_dir() {
            f.msource = Some(entry_at(&buf, de.mentry)?);
        }
        Ok(f)
    }

    /// Searches this directory's metadata for one element.
    pub async fn dir_lookup(
        &self,
        br: Arc<dyn BlockRead>,
        elem: &str,
    ) -> Result<DirEntry, VacError> {
        let msource = self.msource.ok_or(VacError::NotDir)?;
        let mut r = SourceReader::new(br, msource)?;
        loop {
            match r.next_block().await? {
                None => return Err(VacError::EntryNotFound),
                Some(block) if block.is_empty() => continue,
                Some(block) => {
                    let mb = MetaBlock::unpack(&block)?;
                    if let (Some(me), _) = mb.search(elem)? {
                        return mb.dir_entry(me);
                    }
                }
            }
        }
    }
}

fn entry_at(buf: &[u8], slot: u32) -> Result<Entry, VacError> {
    let off = slot as usize * ENTRY_SIZE;
    if off + ENTRY_SIZE > buf.len() {
        return Err(VacError::EntryNotFound);
    }
    Ok(Entry::unpack(&buf[off..off + ENTRY_SIZE])?)
}
