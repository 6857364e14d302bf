use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use tokio::io::AsyncWriteExt;
use tracing::info;

use venti_client::Client;
use venti_core::Score;
use venti_vac::{DirScanner, File, open_root};

#[derive(Parser)]
#[command(version, about = "extract a vac archive into the current directory", long_about = None)]
struct Cli {
    /// root score: 40 hex digits, with or without a vac: prefix
    score: String,

    /// venti server address
    #[arg(short, long, value_name = "ADDR", default_value = "127.0.0.1:17034")]
    address: String,

    /// -v prints file names as they are extracted
    #[command(flatten)]
    verbosity: Verbosity<WarnLevel>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    let score: Score = cli
        .score
        .strip_prefix("vac:")
        .unwrap_or(&cli.score)
        .parse()
        .context("bad score")?;

    let client = Arc::new(
        Client::dial(&cli.address)
            .await
            .with_context(|| format!("dial venti at {}", cli.address))?,
    );

    let (_root, top) = open_root(client.clone(), score)
        .await
        .context("open vac root")?;

    let res = tokio::select! {
        res = extract(client.clone(), &top, Path::new(".")) => res,
        _ = tokio::signal::ctrl_c() => Err(anyhow::anyhow!("interrupted")),
    };

    let _ = client.close().await;
    res
}

async fn extract(client: Arc<Client>, dir: &File, dest: &Path) -> anyhow::Result<()> {
    let mut scanner = DirScanner::new(client.clone(), dir)?;
    while let Some(de) = scanner.next().await? {
        check_elem(&de.elem)?;
        let target = dest.join(&de.elem);
        let child = dir
            .walk(client.clone(), &de)
            .await
            .with_context(|| format!("walk to {}", target.display()))?;
        info!("{}", target.display());

        if child.is_dir() {
            tokio::fs::create_dir_all(&target)
                .await
                .with_context(|| format!("mkdir {}", target.display()))?;
            Box::pin(extract(client.clone(), &child, &target)).await?;
        } else {
            let mut out = tokio::fs::File::create(&target)
                .await
                .with_context(|| format!("create {}", target.display()))?;
            child
                .reader(client.clone())?
                .write_to(&mut out)
                .await
                .with_context(|| format!("extract {}", target.display()))?;
            out.flush().await?;
        }
    }
    Ok(())
}

/// Element names come from the archive; never let one escape the
/// extraction directory.
fn check_elem(elem: &str) -> anyhow::Result<()> {
    if elem.is_empty() || elem == "." || elem == ".." || elem.contains('/') || elem.contains('\0') {
        bail!("bad path element {elem:?}");
    }
    Ok(())
}
