use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::BufReader;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use venti_core::{BlockRead, BlockResult, BlockType, BlockWrite, Score};
use venti_rpc::{RpcClient, RpcError};

use crate::handshake;
use crate::proto::{
    GoodbyeRequest, HelloRequest, PingRequest, ReadRequest, SyncRequest, WriteRequest,
};

/// Default venti TCP port.
pub const VENTI_PORT: u16 = 17034;

const CLIENT_ID: &str = "venti-rs";
const DEFAULT_UID: &str = "anonymous";

/// Largest block the u16 count/length fields can carry.
const MAX_BLOCK: usize = u16::MAX as usize;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("version handshake failed: {0}")]
    BadVersion(String),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("buffer exceeds protocol limit: {0} bytes")]
    OversizedBuffer(usize),
    #[error("server returned wrong score: got {got}, want {want}")]
    ScoreMismatch { got: Score, want: Score },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A connection to a venti server.
///
/// Cheap to share behind an `Arc`; all operations take `&self` and may
/// run concurrently. Apply deadlines with `tokio::time::timeout` around
/// individual calls.
pub struct Client {
    rpc: RpcClient,
    version: &'static str,
    sid: String,
}

impl Client {
    /// Connects, negotiates the protocol version and performs the hello
    /// exchange.
    pub async fn dial(addr: impl ToSocketAddrs) -> Result<Client, ClientError> {
        let mut stream = TcpStream::connect(addr).await?;

        handshake::write_version_line(&mut stream, CLIENT_ID).await?;
        let line = handshake::read_version_line(&mut stream).await?;
        let peer = handshake::parse_version_line(&line).map_err(ClientError::BadVersion)?;
        let version = handshake::select_version(&peer)
            .ok_or_else(|| ClientError::BadVersion("no common version".to_string()))?;
        debug!(version, "negotiated venti protocol version");

        let (read, write) = stream.into_split();
        let rpc = RpcClient::new(BufReader::new(read), write);

        let hello = HelloRequest {
            version: version.to_string(),
            uid: DEFAULT_UID.to_string(),
            strength: 0,
            crypto: Bytes::new(),
            codec: Bytes::new(),
        };
        let reply = match rpc.call(&hello).await {
            Ok(reply) => reply,
            Err(e) => {
                rpc.shutdown();
                return Err(e.into());
            }
        };
        debug!(sid = %reply.sid, "venti session established");

        Ok(Client {
            rpc,
            version,
            sid: reply.sid,
        })
    }

    /// The negotiated protocol version.
    pub fn version(&self) -> &str {
        self.version
    }

    /// The session id the server returned from hello.
    pub fn sid(&self) -> &str {
        &self.sid
    }

    pub async fn ping(&self) -> Result<(), ClientError> {
        match self.rpc.call(&PingRequest).await {
            Ok(()) => Ok(()),
            // the plan9 venti server answers pings with an error reply;
            // treat that as a pong
            Err(RpcError::Server(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn sync(&self) -> Result<(), ClientError> {
        self.rpc.call(&SyncRequest).await?;
        Ok(())
    }

    /// Reads the block with the given score and type, returning at most
    /// `max` bytes. The zero score yields an empty buffer without a call.
    pub async fn read_block(
        &self,
        score: Score,
        t: BlockType,
        max: usize,
    ) -> Result<Bytes, ClientError> {
        if score.is_zero() {
            return Ok(Bytes::new());
        }
        if max > MAX_BLOCK {
            return Err(ClientError::OversizedBuffer(max));
        }
        let reply = self
            .rpc
            .call(&ReadRequest {
                score,
                kind: t.on_disk(),
                count: max as u16,
            })
            .await?;
        if reply.data.len() > max {
            return Err(RpcError::BadFraming(format!(
                "read returned {} bytes, asked for {max}",
                reply.data.len()
            ))
            .into());
        }
        Ok(reply.data)
    }

    /// Writes `data` as a block of the given type and returns its score,
    /// verified against the local fingerprint. Empty data yields the zero
    /// score without a call.
    pub async fn write_block(&self, t: BlockType, data: Bytes) -> Result<Score, ClientError> {
        if data.is_empty() {
            return Ok(Score::ZERO);
        }
        if data.len() > MAX_BLOCK {
            return Err(ClientError::OversizedBuffer(data.len()));
        }
        let want = Score::fingerprint(&data);
        let reply = self
            .rpc
            .call(&WriteRequest {
                kind: t.on_disk(),
                data,
            })
            .await?;
        if reply.score != want {
            return Err(ClientError::ScoreMismatch {
                got: reply.score,
                want,
            });
        }
        Ok(reply.score)
    }

    /// Says goodbye and tears the connection down. The server closes the
    /// socket without replying, so the goodbye is fire-and-forget.
    pub async fn close(&self) -> Result<(), ClientError> {
        debug!("closing venti connection");
        let res = self.rpc.send_noreply(&GoodbyeRequest).await;
        self.rpc.shutdown();
        res.map_err(Into::into)
    }
}

#[async_trait]
impl BlockRead for Client {
    async fn read_block(&self, score: Score, t: BlockType, max: usize) -> BlockResult<Bytes> {
        Client::read_block(self, score, t, max).await.map_err(Into::into)
    }
}

#[async_trait]
impl BlockWrite for Client {
    async fn write_block(&self, t: BlockType, data: Bytes) -> BlockResult<Score> {
        Client::write_block(self, t, data).await.map_err(Into::into)
    }
}
