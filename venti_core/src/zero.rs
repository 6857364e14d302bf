use crate::block::BlockType;
use crate::root::ROOT_SIZE;
use crate::score::{SCORE_SIZE, Score};

/// Return the slice of `buf` that excludes trailing zeros, or trailing
/// zero scores for pointer blocks. Root blocks are clipped to exactly
/// [`ROOT_SIZE`] bytes. Blocks are truncated like this before every write
/// so that fingerprints are canonical.
pub fn zero_truncate(t: BlockType, buf: &[u8]) -> &[u8] {
    if t.is_pointer() {
        // ignore slop at the end of the block
        let mut i = (buf.len() / SCORE_SIZE) * SCORE_SIZE;
        while i >= SCORE_SIZE {
            match Score::from_slice(&buf[i - SCORE_SIZE..i]) {
                Some(s) if s.is_zero() => i -= SCORE_SIZE,
                _ => break,
            }
        }
        &buf[..i]
    } else if t == BlockType::ROOT {
        if buf.len() < ROOT_SIZE {
            buf
        } else {
            &buf[..ROOT_SIZE]
        }
    } else {
        let mut i = buf.len();
        while i > 0 && buf[i - 1] == 0 {
            i -= 1;
        }
        &buf[..i]
    }
}

/// Pad `buf` from its current length up to `newsize` bytes: with zero
/// scores at score-aligned positions for pointer blocks, with zero bytes
/// otherwise. The inverse of [`zero_truncate`].
pub fn zero_extend(t: BlockType, buf: &mut Vec<u8>, newsize: usize) {
    let size = buf.len();
    if size >= newsize {
        return;
    }
    buf.resize(newsize, 0);
    if t.is_pointer() {
        let start = (size / SCORE_SIZE) * SCORE_SIZE;
        let end = (newsize / SCORE_SIZE) * SCORE_SIZE;
        let mut i = start;
        while i + SCORE_SIZE <= end {
            buf[i..i + SCORE_SIZE].copy_from_slice(Score::ZERO.as_bytes());
            i += SCORE_SIZE;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_data() {
        assert_eq!(zero_truncate(BlockType::DATA, b"abc\0\0\0"), b"abc");
        assert_eq!(zero_truncate(BlockType::DATA, b"\0\0\0"), b"");
        assert_eq!(zero_truncate(BlockType::DATA, b"abc"), b"abc");
    }

    #[test]
    fn truncate_pointer() {
        let a = Score::fingerprint(b"a");
        let mut buf = Vec::new();
        buf.extend_from_slice(a.as_bytes());
        buf.extend_from_slice(Score::ZERO.as_bytes());
        buf.extend_from_slice(Score::ZERO.as_bytes());
        let t = BlockType::DATA + 1;
        assert_eq!(zero_truncate(t, &buf), a.as_bytes());

        // a zero score before a live one is kept
        let mut buf = Vec::new();
        buf.extend_from_slice(Score::ZERO.as_bytes());
        buf.extend_from_slice(a.as_bytes());
        assert_eq!(zero_truncate(t, &buf).len(), 2 * SCORE_SIZE);
    }

    #[test]
    fn truncate_root_clips() {
        let buf = vec![1u8; ROOT_SIZE + 12];
        assert_eq!(zero_truncate(BlockType::ROOT, &buf).len(), ROOT_SIZE);
        let short = vec![1u8; 10];
        assert_eq!(zero_truncate(BlockType::ROOT, &short).len(), 10);
    }

    #[test]
    fn extend_restores_truncated_pointer_block() {
        let a = Score::fingerprint(b"a");
        let mut full = Vec::new();
        full.extend_from_slice(a.as_bytes());
        full.extend_from_slice(Score::ZERO.as_bytes());
        full.extend_from_slice(Score::ZERO.as_bytes());

        let t = BlockType::DIR + 1;
        let mut buf = zero_truncate(t, &full).to_vec();
        zero_extend(t, &mut buf, full.len());
        assert_eq!(buf, full);
    }

    #[test]
    fn extend_data() {
        let mut buf = b"xy".to_vec();
        zero_extend(BlockType::DATA, &mut buf, 5);
        assert_eq!(buf, b"xy\0\0\0");
    }
}
