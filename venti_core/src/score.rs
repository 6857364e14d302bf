use std::fmt;
use std::str::FromStr;

use sha1::{Digest, Sha1};

/// Size of a [`Score`] in bytes.
pub const SCORE_SIZE: usize = 20;

#[derive(thiserror::Error, Debug)]
pub enum ParseScoreError {
    #[error("invalid score length: expected 40 hex digits, got {0}")]
    InvalidLength(usize),
    #[error("invalid score: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// A 20-byte SHA-1 fingerprint, the address of a block in a venti store.
///
/// The score of the empty input ([`Score::ZERO`]) is a sentinel for "no
/// block": it is never transmitted in a write and reads of it yield zero
/// bytes.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Score([u8; SCORE_SIZE]);

impl Score {
    /// SHA-1 of the empty input, the well-known zero score.
    pub const ZERO: Score = Score([
        0xda, 0x39, 0xa3, 0xee, 0x5e, 0x6b, 0x4b, 0x0d, 0x32, 0x55, 0xbf, 0xef, 0x95, 0x60, 0x18,
        0x90, 0xaf, 0xd8, 0x07, 0x09,
    ]);

    /// Calculate the fingerprint of the given bytes.
    pub fn fingerprint(data: impl AsRef<[u8]>) -> Self {
        Score(Sha1::digest(data.as_ref()).into())
    }

    pub const fn from_bytes(bytes: [u8; SCORE_SIZE]) -> Self {
        Score(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SCORE_SIZE] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Score::ZERO
    }

    /// Parse 40 hex digits (either case).
    pub fn parse(s: &str) -> Result<Self, ParseScoreError> {
        if s.len() != 2 * SCORE_SIZE {
            return Err(ParseScoreError::InvalidLength(s.len()));
        }
        let mut bytes = [0u8; SCORE_SIZE];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Score(bytes))
    }

    /// Read a score out of a block slice, e.g. the `i`th child of a
    /// pointer block.
    pub fn from_slice(buf: &[u8]) -> Option<Self> {
        let bytes: [u8; SCORE_SIZE] = buf.get(..SCORE_SIZE)?.try_into().ok()?;
        Some(Score(bytes))
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Score({self})")
    }
}

impl FromStr for Score {
    type Err = ParseScoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Score::parse(s)
    }
}

impl AsRef<[u8]> for Score {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_score_is_empty_fingerprint() {
        assert_eq!(Score::fingerprint(b""), Score::ZERO);
        assert!(Score::ZERO.is_zero());
        assert!(!Score::fingerprint(b"foobar").is_zero());
    }

    #[test]
    fn parse_roundtrip() {
        let s = Score::fingerprint(b"the quick brown fox");
        let parsed = Score::parse(&s.to_string()).unwrap();
        assert_eq!(parsed, s);

        // either case is accepted
        let upper = s.to_string().to_uppercase();
        assert_eq!(Score::parse(&upper).unwrap(), s);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(matches!(
            Score::parse("da39a3ee"),
            Err(ParseScoreError::InvalidLength(8))
        ));
        assert!(matches!(
            Score::parse("zz39a3ee5e6b4b0d3255bfef95601890afd80709"),
            Err(ParseScoreError::InvalidHex(_))
        ));
    }
}
