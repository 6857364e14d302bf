//! The newline-terminated version exchange that precedes all frames:
//! `venti-<versions>-<id>\n` in both directions, where `<versions>` is a
//! colon-separated list.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const SUPPORTED_VERSIONS: &[&str] = &["02"];

// a version line is tiny; anything longer is not a venti peer
const MAX_LINE: usize = 256;

pub fn version_line(id: &str) -> String {
    format!("venti-{}-{id}\n", SUPPORTED_VERSIONS.join(":"))
}

pub async fn write_version_line<W>(w: &mut W, id: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    w.write_all(version_line(id).as_bytes()).await?;
    w.flush().await
}

/// Reads one line byte-by-byte so nothing past the newline is consumed;
/// frames follow immediately on the same stream.
pub async fn read_version_line<R>(r: &mut R) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        r.read_exact(&mut byte).await?;
        if byte[0] == b'\n' {
            return Ok(String::from_utf8_lossy(&line).into_owned());
        }
        line.push(byte[0]);
        if line.len() > MAX_LINE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "version line too long",
            ));
        }
    }
}

/// Parses the peer's versions out of its line. The trailing id field may
/// itself contain dashes, so only the first two are separators.
pub fn parse_version_line(line: &str) -> Result<Vec<&str>, String> {
    let mut parts = line.trim_end().splitn(3, '-');
    let (proto, versions) = match (parts.next(), parts.next(), parts.next()) {
        (Some(proto), Some(versions), Some(_id)) => (proto, versions),
        _ => return Err(format!("bad version string: {line:?}")),
    };
    if proto != "venti" {
        return Err(format!("bad version string: {line:?}"));
    }
    let versions: Vec<&str> = versions.split(':').filter(|v| !v.is_empty()).collect();
    if versions.is_empty() {
        return Err(format!("bad version string: {line:?}"));
    }
    Ok(versions)
}

/// Picks the first of the peer's versions that we also support.
pub fn select_version(peer: &[&str]) -> Option<&'static str> {
    for &v in peer {
        for &s in SUPPORTED_VERSIONS {
            if s == v {
                return Some(s);
            }
        }
    }
    None
}
