use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use tracing::info;

use venti_client::Client;
use venti_core::Score;
use venti_vac::{DirEntry, DirWriter, File, MODE_DIR, write_root};

#[derive(Parser)]
#[command(version, about = "archive file trees into a venti store", long_about = None)]
struct Cli {
    /// blocksize that data will be broken into: N, Nk, Nm or Ng,
    /// between 512 and 52k
    #[arg(short, long, value_name = "SIZE", default_value = "8k")]
    blocksize: String,

    /// venti server address
    #[arg(short, long, value_name = "ADDR", default_value = "127.0.0.1:17034")]
    address: String,

    /// -v prints file names as they are added
    #[command(flatten)]
    verbosity: Verbosity<WarnLevel>,

    /// files and directories to archive
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    let bsize = parse_size(&cli.blocksize).context("bad blocksize")?;
    if !(512..=52 * 1024).contains(&bsize) {
        bail!("blocksize must be between 512 and 52k");
    }
    let bsize = bsize as u32;

    let client = Arc::new(
        Client::dial(&cli.address)
            .await
            .with_context(|| format!("dial venti at {}", cli.address))?,
    );

    let score = tokio::select! {
        res = vac_paths(client.clone(), &cli.paths, bsize) => res?,
        _ = tokio::signal::ctrl_c() => {
            let _ = client.close().await;
            bail!("interrupted");
        }
    };

    client.sync().await.context("sync venti")?;
    let _ = client.close().await;

    println!("vac:{score}");
    Ok(())
}

/// Archives every path into one root directory and returns its score.
async fn vac_paths(client: Arc<Client>, paths: &[PathBuf], bsize: u32) -> anyhow::Result<Score> {
    let mut files = Vec::new();
    for path in paths {
        files.push(vac_path(client.clone(), path, bsize).await?);
    }

    let mut w = DirWriter::new(client.clone(), bsize)?;
    for f in &files {
        w.add(f)
            .await
            .with_context(|| format!("add {:?} to the archive root", f.name()))?;
    }
    let meta = DirEntry {
        elem: "/".to_string(),
        uid: "vac".to_string(),
        gid: "vac".to_string(),
        mode: 0o777 | MODE_DIR,
        ..DirEntry::default()
    };
    let dir = w.close(meta).await?;

    Ok(write_root(client, &dir).await?)
}

async fn vac_path(client: Arc<Client>, path: &Path, bsize: u32) -> anyhow::Result<File> {
    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("stat {}", path.display()))?;
    info!("{}", path.display());

    if meta.is_dir() {
        vac_dir(client, path, &meta, bsize).await
    } else {
        let mut f = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("open {}", path.display()))?;
        let de = dir_entry_from(path, &meta);
        Ok(File::create(client, &mut f, de, bsize).await?)
    }
}

async fn vac_dir(
    client: Arc<Client>,
    path: &Path,
    meta: &std::fs::Metadata,
    bsize: u32,
) -> anyhow::Result<File> {
    let mut w = DirWriter::new(client.clone(), bsize)?;

    // fix the archive order so scans come back fully sorted
    let mut names = Vec::new();
    let mut rd = tokio::fs::read_dir(path)
        .await
        .with_context(|| format!("read dir {}", path.display()))?;
    while let Some(ent) = rd.next_entry().await? {
        names.push(ent.file_name());
    }
    names.sort();

    for name in names {
        let child = path.join(&name);
        let f = Box::pin(vac_path(client.clone(), &child, bsize)).await?;
        w.add(&f)
            .await
            .with_context(|| format!("add {}", child.display()))?;
    }

    Ok(w.close(dir_entry_from(path, meta)).await?)
}

#[cfg(unix)]
fn dir_entry_from(path: &Path, meta: &std::fs::Metadata) -> DirEntry {
    use std::os::unix::fs::MetadataExt;

    let elem = match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => "/".to_string(),
    };
    let mut mode = meta.mode() & 0o777;
    if meta.is_dir() {
        mode |= MODE_DIR;
    }
    DirEntry {
        elem,
        qid: meta.ino(),
        uid: meta.uid().to_string(),
        gid: meta.gid().to_string(),
        mtime: clamp_time(meta.mtime()),
        ctime: clamp_time(meta.ctime()),
        atime: clamp_time(meta.atime()),
        mode,
        ..DirEntry::default()
    }
}

#[cfg(unix)]
fn clamp_time(t: i64) -> u32 {
    t.clamp(0, u32::MAX as i64) as u32
}

/// Parses `N`, `Nk`, `Nm` or `Ng`.
fn parse_size(s: &str) -> anyhow::Result<u64> {
    if s.is_empty() {
        bail!("empty size");
    }
    let (digits, mul) = match s.as_bytes()[s.len() - 1] {
        b'k' | b'K' => (&s[..s.len() - 1], 1024),
        b'm' | b'M' => (&s[..s.len() - 1], 1024 * 1024),
        b'g' | b'G' => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1),
    };
    let n: u64 = digits.parse().with_context(|| format!("bad size {s:?}"))?;
    Ok(n * mul)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_size_suffixes() {
        assert_eq!(parse_size("512").unwrap(), 512);
        assert_eq!(parse_size("8k").unwrap(), 8192);
        assert_eq!(parse_size("8K").unwrap(), 8192);
        assert_eq!(parse_size("2m").unwrap(), 2 * 1024 * 1024);
        assert_eq!(parse_size("1g").unwrap(), 1 << 30);
        assert!(parse_size("").is_err());
        assert!(parse_size("k").is_err());
        assert!(parse_size("12q").is_err());
    }
}
