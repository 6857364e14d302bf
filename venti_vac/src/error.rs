use venti_core::{CoreError, SourceError};

#[derive(thiserror::Error, Debug)]
pub enum VacError {
    #[error("corrupt meta data: {0}")]
    CorruptMeta(&'static str),
    #[error("no space in meta block")]
    NoSpace,
    #[error("entry not found")]
    EntryNotFound,
    #[error("directory already contains {0:?}")]
    AlreadyExists(String),
    #[error("not a directory")]
    NotDir,
    #[error("unsupported dir entry version {0}")]
    BadDirVersion(u16),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("block store: {0}")]
    Block(anyhow::Error),
}
