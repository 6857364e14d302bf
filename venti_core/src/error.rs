use crate::block::BlockType;

/// Errors from packing and unpacking the fixed wire layouts.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("invalid block size {0:#x}")]
    BadSize(u64),
    #[error("short buffer: {0} < {1} bytes")]
    ShortBuffer(usize, usize),
    #[error("unknown root version {0:#x}")]
    BadRootVersion(u16),
    #[error("bad root block length {0}")]
    BadRootSize(usize),
    #[error("root field too long: {0} bytes")]
    NameTooLong(usize),
    #[error("bad source block type {0}")]
    BadSourceType(BlockType),
}
