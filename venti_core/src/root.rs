use crate::error::CoreError;
use crate::int::{big_to_int, check_block_size, int_to_big};
use crate::score::Score;

/// Size of a packed [`Root`] in bytes.
pub const ROOT_SIZE: usize = 300;

const ROOT_VERSION: u16 = 2;
// bit 15 of the version: the block size field uses the big encoding
const ROOT_VERSION_BIG: u16 = 1 << 15;

const NAME_SIZE: usize = 128;

/// The 300-byte self-describing record stored at the root of an archive.
/// `name` and `kind` are NUL-terminated within 128-byte fields; `prev`
/// links to an earlier root, or is the zero score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root {
    pub name: String,
    pub kind: String,
    pub score: Score,
    pub block_size: u32,
    pub prev: Score,
}

impl Root {
    pub fn pack(&self) -> Result<[u8; ROOT_SIZE], CoreError> {
        let mut version = ROOT_VERSION;
        let mut bshort = self.block_size as u16;
        if self.block_size >= u16::MAX as u32 {
            version |= ROOT_VERSION_BIG;
            bshort = int_to_big(self.block_size as u64)?;
        }

        let mut buf = [0u8; ROOT_SIZE];
        buf[0..2].copy_from_slice(&version.to_be_bytes());
        pack_name(&mut buf[2..2 + NAME_SIZE], &self.name)?;
        pack_name(&mut buf[130..130 + NAME_SIZE], &self.kind)?;
        buf[258..278].copy_from_slice(self.score.as_bytes());
        buf[278..280].copy_from_slice(&bshort.to_be_bytes());
        buf[280..300].copy_from_slice(self.prev.as_bytes());
        Ok(buf)
    }

    pub fn unpack(buf: &[u8]) -> Result<Root, CoreError> {
        if buf.len() != ROOT_SIZE {
            return Err(CoreError::BadRootSize(buf.len()));
        }

        let version = u16::from_be_bytes([buf[0], buf[1]]);
        if version & !ROOT_VERSION_BIG != ROOT_VERSION {
            return Err(CoreError::BadRootVersion(version));
        }

        let name = unpack_name(&buf[2..2 + NAME_SIZE]);
        let kind = unpack_name(&buf[130..130 + NAME_SIZE]);
        let score = Score::from_slice(&buf[258..278]).expect("slice is score sized");
        let bshort = u16::from_be_bytes([buf[278], buf[279]]);
        let block_size = if version & ROOT_VERSION_BIG != 0 {
            big_to_int(bshort)
        } else {
            bshort as u64
        };
        check_block_size(block_size)?;
        let prev = Score::from_slice(&buf[280..300]).expect("slice is score sized");

        Ok(Root {
            name,
            kind,
            score,
            block_size: block_size as u32,
            prev,
        })
    }
}

fn pack_name(dst: &mut [u8], s: &str) -> Result<(), CoreError> {
    // leave room for the terminating NUL
    if s.len() >= NAME_SIZE {
        return Err(CoreError::NameTooLong(s.len()));
    }
    dst[..s.len()].copy_from_slice(s.as_bytes());
    Ok(())
}

fn unpack_name(src: &[u8]) -> String {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    String::from_utf8_lossy(&src[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_roundtrip() {
        let r = Root {
            name: "foo".to_string(),
            kind: "bar".to_string(),
            score: Score::ZERO,
            block_size: 256,
            prev: Score::ZERO,
        };
        let buf = r.pack().unwrap();
        assert_eq!(Root::unpack(&buf).unwrap(), r);
    }

    #[test]
    fn pack_roundtrip_big_block_size() {
        let r = Root {
            name: "vac".to_string(),
            kind: "vac".to_string(),
            score: Score::fingerprint(b"dir"),
            block_size: 1 << 16,
            prev: Score::fingerprint(b"prev"),
        };
        let buf = r.pack().unwrap();
        let version = u16::from_be_bytes([buf[0], buf[1]]);
        assert_ne!(version & ROOT_VERSION_BIG, 0);
        assert_eq!(Root::unpack(&buf).unwrap(), r);
    }

    #[test]
    fn unpack_rejects_bad_input() {
        let r = Root {
            name: "foo".to_string(),
            kind: "bar".to_string(),
            score: Score::ZERO,
            block_size: 1024,
            prev: Score::ZERO,
        };
        let mut buf = r.pack().unwrap();

        assert!(matches!(
            Root::unpack(&buf[..200]),
            Err(CoreError::BadRootSize(200))
        ));

        buf[0] = 0xff;
        assert!(matches!(
            Root::unpack(&buf),
            Err(CoreError::BadRootVersion(_))
        ));
    }

    #[test]
    fn pack_rejects_long_name() {
        let r = Root {
            name: "x".repeat(NAME_SIZE),
            kind: "vac".to_string(),
            score: Score::ZERO,
            block_size: 1024,
            prev: Score::ZERO,
        };
        assert!(matches!(r.pack(), Err(CoreError::NameTooLong(_))));
    }
}
