use bytes::BufMut;

use crate::error::VacError;

/// Every packed record begins with this magic.
pub const DIR_MAGIC: u32 = 0x1c4d_9072;

/// The version written by vac archives.
pub const VAC_DIR_VERSION: u16 = 8;
/// The version written by fossil; readable here.
pub const FOSSIL_DIR_VERSION: u16 = 9;

/// Directory bit in [`DirEntry::mode`].
pub const MODE_DIR: u32 = 1 << 15;

// optional section tags
const SECTION_PLAN9: u8 = 1;
const SECTION_QID_SPACE: u8 = 3;

const CORRUPT: fn(&'static str) -> VacError = VacError::CorruptMeta;

/// Per-file metadata as stored in a meta block.
///
/// `entry` (and `mentry` for directories) index the parent directory's
/// entry source; the byte size of the content lives in the referenced
/// entry rather than here. Three on-disk versions share a common prefix:
/// v7 carries a replacement score (skipped on read), v8 is what vac
/// writes, v9 adds explicit generation and mentry fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirEntry {
    pub elem: String,
    pub entry: u32,
    pub generation: u32,
    pub mentry: u32,
    pub mgen: u32,
    pub qid: u64,
    pub uid: String,
    pub gid: String,
    pub mid: String,
    pub mtime: u32,
    pub mcount: u32,
    pub ctime: u32,
    pub atime: u32,
    pub mode: u32,
    pub plan9: Option<Plan9>,
    pub qid_space: Option<QidSpace>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan9 {
    pub path: u64,
    pub version: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QidSpace {
    pub offset: u64,
    pub max: u64,
}

impl DirEntry {
    pub fn is_dir(&self) -> bool {
        self.mode & MODE_DIR != 0
    }

    /// Exact size of [`pack`](DirEntry::pack)'s output, computable without
    /// serializing; drives meta block allocation.
    pub fn packed_size(&self, version: u16) -> usize {
        let mut n = 4 // magic
            + 2 // version
            + 2 + self.elem.len()
            + 4 // entry
            + 8 // qid
            + 2 + self.uid.len()
            + 2 + self.gid.len()
            + 2 + self.mid.len()
            + 5 * 4; // mtime, mcount, ctime, atime, mode
        if version >= FOSSIL_DIR_VERSION {
            n += 3 * 4; // gen, mentry, mgen
        }
        if version < FOSSIL_DIR_VERSION && self.plan9.is_some() {
            n += 3 + 12;
        }
        if self.qid_space.is_some() {
            n += 3 + 16;
        }
        n
    }

    pub fn pack(&self, version: u16) -> Result<Vec<u8>, VacError> {
        if version != VAC_DIR_VERSION && version != FOSSIL_DIR_VERSION {
            return Err(VacError::BadDirVersion(version));
        }

        let mut buf = Vec::with_capacity(self.packed_size(version));
        buf.put_u32(DIR_MAGIC);
        buf.put_u16(version);
        put_string(&mut buf, &self.elem)?;
        buf.put_u32(self.entry);
        if version >= FOSSIL_DIR_VERSION {
            buf.put_u32(self.generation);
            buf.put_u32(self.mentry);
            buf.put_u32(self.mgen);
        }
        buf.put_u64(self.qid);
        put_string(&mut buf, &self.uid)?;
        put_string(&mut buf, &self.gid)?;
        put_string(&mut buf, &self.mid)?;
        buf.put_u32(self.mtime);
        buf.put_u32(self.mcount);
        buf.put_u32(self.ctime);
        buf.put_u32(self.atime);
        buf.put_u32(self.mode);

        // optional sections: u8 tag, u16 length, payload.
        // plan9 is reserved from v9 on.
        if version < FOSSIL_DIR_VERSION
            && let Some(p9) = &self.plan9
        {
            buf.put_u8(SECTION_PLAN9);
            buf.put_u16(12);
            buf.put_u64(p9.path);
            buf.put_u32(p9.version);
        }
        if let Some(qs) = &self.qid_space {
            buf.put_u8(SECTION_QID_SPACE);
            buf.put_u16(16);
            buf.put_u64(qs.offset);
            buf.put_u64(qs.max);
        }

        debug_assert_eq!(buf.len(), self.packed_size(version));
        Ok(buf)
    }

    pub fn unpack(buf: &[u8]) -> Result<DirEntry, VacError> {
        let mut r = Dec(buf);

        if r.u32()? != DIR_MAGIC {
            return Err(CORRUPT("bad dir entry magic"));
        }
        let version = r.u16()?;
        if !(7..=9).contains(&version) {
            return Err(CORRUPT("bad dir entry version"));
        }

        let mut de = DirEntry {
            elem: r.string()?,
            entry: r.u32()?,
            ..DirEntry::default()
        };

        if version < 9 {
            // mentry is implied: the metadata entry follows the data entry
            de.mentry = de.entry + 1;
        } else {
            de.generation = r.u32()?;
            de.mentry = r.u32()?;
            de.mgen = r.u32()?;
        }

        de.qid = r.u64()?;
        if version == 7 {
            // v7 carried a 20-byte replacement score here
            r.take(20)?;
        }

        de.uid = r.string()?;
        de.gid = r.string()?;
        de.mid = r.string()?;
        de.mtime = r.u32()?;
        de.mcount = r.u32()?;
        de.ctime = r.u32()?;
        de.atime = r.u32()?;
        de.mode = r.u32()?;

        while !r.is_empty() {
            let tag = r.u8()?;
            let n = r.u16()? as usize;
            let mut section = Dec(r.take(n)?);
            match tag {
                SECTION_PLAN9 if version < 9 => {
                    if de.plan9.is_some() || n != 12 {
                        return Err(CORRUPT("bad plan9 section"));
                    }
                    let p9 = Plan9 {
                        path: section.u64()?,
                        version: section.u32()?,
                    };
                    if de.mcount == 0 {
                        de.mcount = p9.version;
                    }
                    de.plan9 = Some(p9);
                }
                SECTION_QID_SPACE => {
                    if de.qid_space.is_some() || n != 16 {
                        return Err(CORRUPT("bad qid space section"));
                    }
                    de.qid_space = Some(QidSpace {
                        offset: section.u64()?,
                        max: section.u64()?,
                    });
                }
                // NT, gen, reserved and future sections: skipped by length
                _ => {}
            }
        }

        Ok(de)
    }
}

fn put_string(buf: &mut Vec<u8>, s: &str) -> Result<(), VacError> {
    if s.len() > u16::MAX as usize {
        return Err(CORRUPT("string field too long"));
    }
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
    Ok(())
}

/// Checked big-endian reader over a packed record.
struct Dec<'a>(&'a [u8]);

impl<'a> Dec<'a> {
    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], VacError> {
        if self.0.len() < n {
            return Err(CORRUPT("truncated dir entry"));
        }
        let (head, tail) = self.0.split_at(n);
        self.0 = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, VacError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, VacError> {
        let p = self.take(2)?;
        Ok(u16::from_be_bytes([p[0], p[1]]))
    }

    fn u32(&mut self) -> Result<u32, VacError> {
        let p = self.take(4)?;
        Ok(u32::from_be_bytes([p[0], p[1], p[2], p[3]]))
    }

    fn u64(&mut self) -> Result<u64, VacError> {
        let p = self.take(8)?;
        Ok(u64::from_be_bytes([
            p[0], p[1], p[2], p[3], p[4], p[5], p[6], p[7],
        ]))
    }

    fn string(&mut self) -> Result<String, VacError> {
        let n = self.u16()? as usize;
        let bytes = self.take(n)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CORRUPT("name is not utf-8"))
    }
}
