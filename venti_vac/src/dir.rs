use std::collections::BTreeSet;
use std::sync::Arc;

use venti_core::{BlockRead, BlockType, BlockWrite, SCORE_SIZE, SourceReader, SourceWriter};

use crate::direntry::{DirEntry, VAC_DIR_VERSION};
use crate::error::VacError;
use crate::file::File;
use crate::meta::{BYTES_PER_ENTRY, MetaBlock, MetaEntry};

/// Builds a directory as two parallel sources: a dir-typed source of the
/// children's packed entries and a data-typed source of their metadata
/// packed into meta blocks.
///
/// A child's entry slot is recorded in its metadata; for a child
/// directory the metadata source entry goes into the very next slot, the
/// arrangement the v8 record format implies.
pub struct DirWriter {
    dsize: usize,
    source: SourceWriter,
    msource: SourceWriter,
    mb: MetaBlock,
    nentry: u32,
    names: BTreeSet<String>,
}

impl DirWriter {
    pub fn new(bw: Arc<dyn BlockWrite>, bsize: u32) -> Result<DirWriter, VacError> {
        let psize = bsize / SCORE_SIZE as u32 * SCORE_SIZE as u32;
        let source = SourceWriter::new(bw.clone(), BlockType::DIR, psize, bsize)?;
        let msource = SourceWriter::new(bw, BlockType::DATA, psize, bsize)?;
        Ok(DirWriter {
            dsize: bsize as usize,
            source,
            msource,
            mb: new_meta_block(bsize as usize),
            nentry: 0,
            names: BTreeSet::new(),
        })
    }

    /// Adds a finished child to the directory.
    pub async fn add(&mut self, f: &File) -> Result<(), VacError> {
        if self.names.contains(&f.meta.elem) {
            return Err(VacError::AlreadyExists(f.meta.elem.clone()));
        }

        let mut meta = f.meta.clone();
        meta.entry = self.nentry;
        self.source.write(&f.source.pack()?).await?;
        self.nentry += 1;
        if let Some(msource) = &f.msource {
            meta.mentry = self.nentry;
            self.source.write(&msource.pack()?).await?;
            self.nentry += 1;
        }

        let n = meta.packed_size(VAC_DIR_VERSION);
        if self.mb.full(n) {
            self.flush_meta().await?;
        }
        let offset = match self.mb.alloc(n) {
            Ok(offset) => offset,
            Err(VacError::NoSpace) => {
                // the record alone outgrew the ceiling check; retry fresh
                self.flush_meta().await?;
                self.mb.alloc(n)?
            }
            Err(e) => return Err(e),
        };

        let me = MetaEntry { offset, size: n };
        self.mb.store(me, &meta.pack(VAC_DIR_VERSION)?)?;
        let (found, i) = self.mb.search(&meta.elem)?;
        debug_assert!(found.is_none(), "name set missed a duplicate");
        self.mb.insert(i, me)?;
        self.names.insert(meta.elem);
        Ok(())
    }

    /// Number of children added so far.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Flushes the pending meta block and both sources, returning the
    /// finished directory with `meta` as its own metadata.
    pub async fn close(mut self, meta: DirEntry) -> Result<File, VacError> {
        self.flush_meta().await?;
        let source = self.source.flush().await?;
        let msource = self.msource.flush().await?;
        Ok(File {
            meta,
            source,
            msource: Some(msource),
        })
    }

    async fn flush_meta(&mut self) -> Result<(), VacError> {
        if self.mb.n_index() == 0 {
            return Ok(());
        }
        // full blocks on the wire; trailing zeros compress away anyway
        let block = self.mb.pack().to_vec();
        self.msource.write(&block).await?;
        self.mb = new_meta_block(self.dsize);
        Ok(())
    }
}

fn new_meta_block(dsize: usize) -> MetaBlock {
    MetaBlock::new(dsize, dsize / BYTES_PER_ENTRY)
}

/// Iterates a directory's children in on-disk (sorted) order.
pub struct DirScanner {
    reader: SourceReader,
    mb: Option<MetaBlock>,
    i: usize,
}

impl DirScanner {
    pub fn new(br: Arc<dyn BlockRead>, f: &File) -> Result<DirScanner, VacError> {
        let msource = f.msource.ok_or(VacError::NotDir)?;
        Ok(DirScanner {
            reader: SourceReader::new(br, msource)?,
            mb: None,
            i: 0,
        })
    }

    /// The next child, or `None` after the last one.
    pub async fn next(&mut self) -> Result<Option<DirEntry>, VacError> {
        loop {
            if let Some(mb) = &self.mb {
                if self.i < mb.n_index() {
                    let de = mb.dir_entry_at(self.i)?;
                    self.i += 1;
                    return Ok(Some(de));
                }
                self.mb = None;
                self.i = 0;
            }
            match self.reader.next_block().await? {
                None => return Ok(None),
                Some(block) if block.is_empty() => continue,
                Some(block) => self.mb = Some(MetaBlock::unpack(&block)?),
            }
        }
    }
}
