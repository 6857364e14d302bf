use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};

use venti_core::{BlockRead, BlockType, BlockWrite};
use venti_rpc::codec::put_string;
use venti_rpc::{Decode, Frame, FrameCodec, RPC_ERROR, RpcError};

use crate::handshake;
use crate::proto::{
    HelloRequest, HelloResponse, ReadRequest, RPC_GOODBYE, RPC_HELLO, RPC_PING, RPC_READ,
    RPC_SYNC, RPC_WRITE, WriteRequest, WriteResponse,
};

const SERVER_ID: &str = "venti-rs";

/// A reference venti server over any block store.
///
/// One task per connection; requests are answered in order. Replies use
/// the request funcId plus one, failures the dedicated error funcId, and
/// goodbye closes the socket without a reply.
pub struct Server<B> {
    backend: Arc<B>,
}

impl<B> Clone for Server<B> {
    fn clone(&self) -> Self {
        Server {
            backend: self.backend.clone(),
        }
    }
}

impl<B: BlockRead + BlockWrite> Server<B> {
    pub fn new(backend: B) -> Self {
        Server {
            backend: Arc::new(backend),
        }
    }

    pub fn with_backend(backend: Arc<B>) -> Self {
        Server { backend }
    }

    /// Serves connections on `listener` until it fails.
    pub async fn listen(self, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("accept: {e}");
                    continue;
                }
            };
            debug!(%peer, "venti connection accepted");
            let backend = self.backend.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_conn(backend, stream).await {
                    debug!("serve: {e}");
                }
            });
        }
    }
}

async fn serve_conn<B>(backend: Arc<B>, mut stream: TcpStream) -> Result<(), RpcError>
where
    B: BlockRead + BlockWrite,
{
    let line = handshake::read_version_line(&mut stream).await?;
    // a bad greeting is not a venti client; the version choice itself is
    // the client's to make
    handshake::parse_version_line(&line).map_err(RpcError::BadFraming)?;
    handshake::write_version_line(&mut stream, SERVER_ID).await?;

    let (read, write) = stream.into_split();
    let mut reader = FramedRead::new(BufReader::new(read), FrameCodec);
    let mut writer = FramedWrite::new(write, FrameCodec);

    while let Some(frame) = reader.next().await {
        let frame = frame?;
        debug!(func = frame.func, tag = frame.tag, "request");
        match handle(&backend, frame).await? {
            Some(reply) => writer.send(reply).await?,
            // goodbye: close the socket without replying
            None => return Ok(()),
        }
    }
    Ok(())
}

async fn handle<B>(backend: &Arc<B>, frame: Frame) -> Result<Option<Frame>, RpcError>
where
    B: BlockRead + BlockWrite,
{
    let func = frame.func;
    let tag = frame.tag;

    let result: Result<Bytes, String> = match func {
        RPC_PING | RPC_SYNC => Ok(Bytes::new()),
        RPC_HELLO => hello(frame.payload),
        RPC_GOODBYE => return Ok(None),
        RPC_READ => read(backend, frame.payload).await,
        RPC_WRITE => write(backend, frame.payload).await,
        other => Err(format!("unknown rpc {other}")),
    };

    let reply = match result {
        Ok(payload) => Frame {
            func: func + 1,
            tag,
            payload,
        },
        Err(msg) => {
            let mut payload = BytesMut::new();
            put_string(&mut payload, &msg)?;
            Frame {
                func: RPC_ERROR,
                tag,
                payload: payload.freeze(),
            }
        }
    };
    Ok(Some(reply))
}

fn hello(payload: Bytes) -> Result<Bytes, String> {
    let _req = HelloRequest::decode(payload).map_err(|e| e.to_string())?;
    let mut buf = BytesMut::new();
    HelloResponse {
        sid: SERVER_ID.to_string(),
        rcrypto: 0,
        rcodec: 0,
    }
    .encode(&mut buf)
    .map_err(|e| e.to_string())?;
    Ok(buf.freeze())
}

async fn read<B: BlockRead>(backend: &Arc<B>, payload: Bytes) -> Result<Bytes, String> {
    let req = ReadRequest::decode(payload).map_err(|e| e.to_string())?;
    let t = BlockType::from_on_disk(req.kind).ok_or_else(|| format!("bad type {}", req.kind))?;
    backend
        .read_block(req.score, t, req.count as usize)
        .await
        .map_err(|e| e.to_string())
}

async fn write<B: BlockWrite>(backend: &Arc<B>, payload: Bytes) -> Result<Bytes, String> {
    let req = WriteRequest::decode(payload).map_err(|e| e.to_string())?;
    let t = BlockType::from_on_disk(req.kind).ok_or_else(|| format!("bad type {}", req.kind))?;
    let score = backend
        .write_block(t, req.data)
        .await
        .map_err(|e| e.to_string())?;
    let mut buf = BytesMut::new();
    WriteResponse { score }
        .encode(&mut buf)
        .map_err(|e| e.to_string())?;
    Ok(buf.freeze())
}
