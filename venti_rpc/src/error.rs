/// Transport-level errors. A [`Server`](RpcError::Server) reply leaves
/// the connection usable; framing and I/O errors are fatal to it.
#[derive(thiserror::Error, Debug)]
pub enum RpcError {
    #[error("server error: {0}")]
    Server(String),
    #[error("bad frame: {0}")]
    BadFraming(String),
    #[error("message too large: {0} bytes")]
    Oversized(usize),
    #[error("connection closed")]
    ConnectionClosed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
