use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::codec::{Call, Decode, Frame, FrameCodec, RPC_ERROR, get_string};
use crate::error::RpcError;

/// Size of the tag pool. Tag values 0..255 identify outstanding calls;
/// a call blocks while all are in use.
const NTAG: usize = 255;

type WriteSink = FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, FrameCodec>;

/// A multiplexed RPC connection.
///
/// Any number of tasks may issue [`call`](RpcClient::call)s concurrently;
/// sends are serialized by a write lock and a single background reader
/// dispatches replies by tag. Each call registers itself before its frame
/// goes out, so every reply finds its caller; a reply for a tag nobody
/// registered is a protocol violation and kills the connection.
///
/// Dropping a call future abandons it: the tag stays reserved until the
/// late reply (or connection close) arrives, at which point the reader
/// discards the reply and recycles the tag. Connection errors fail all
/// present and future calls with [`RpcError::ConnectionClosed`].
pub struct RpcClient {
    inner: Arc<Inner>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    writer: tokio::sync::Mutex<WriteSink>,
    tag_rx: tokio::sync::Mutex<mpsc::Receiver<u8>>,
    tag_tx: mpsc::Sender<u8>,
    pending: Mutex<HashMap<u8, oneshot::Sender<Frame>>>,
    closed: OnceLock<String>,
}

impl RpcClient {
    /// Takes ownership of both halves of an established connection and
    /// starts the reader task.
    pub fn new<R, W>(read: R, write: W) -> RpcClient
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (tag_tx, tag_rx) = mpsc::channel(NTAG);
        for tag in 0..NTAG as u8 {
            tag_tx.try_send(tag).expect("tag pool sized for all tags");
        }

        let inner = Arc::new(Inner {
            writer: tokio::sync::Mutex::new(FramedWrite::new(
                Box::new(write) as Box<dyn AsyncWrite + Send + Unpin>,
                FrameCodec,
            )),
            tag_rx: tokio::sync::Mutex::new(tag_rx),
            tag_tx,
            pending: Mutex::new(HashMap::new()),
            closed: OnceLock::new(),
        });

        let reader = tokio::spawn(reader_loop(
            inner.clone(),
            FramedRead::new(read, FrameCodec),
        ));

        RpcClient {
            inner,
            reader: Mutex::new(Some(reader)),
        }
    }

    /// Issues `req` and waits for its reply.
    pub async fn call<C: Call>(&self, req: &C) -> Result<C::Reply, RpcError> {
        let mut payload = BytesMut::new();
        req.encode(&mut payload)?;

        self.check_open()?;
        let tag = self.acquire_tag().await?;

        let (done_tx, done_rx) = oneshot::channel();
        self.inner
            .pending
            .lock()
            .expect("pending lock")
            .insert(tag, done_tx);

        if let Err(e) = self
            .send_frame(Frame {
                func: C::FUNC,
                tag,
                payload: payload.freeze(),
            })
            .await
        {
            // the frame never went out; nothing can answer this tag
            self.inner.pending.lock().expect("pending lock").remove(&tag);
            self.inner.release_tag(tag);
            self.inner.mark_closed(&format!("send: {e}"));
            return Err(e);
        }

        let frame = match done_rx.await {
            Ok(frame) => frame,
            Err(_) => return Err(RpcError::ConnectionClosed),
        };

        if frame.func == RPC_ERROR {
            let mut payload = frame.payload;
            return Err(RpcError::Server(get_string(&mut payload)?));
        }
        if frame.func != C::FUNC + 1 {
            let msg = format!("response func {} for request func {}", frame.func, C::FUNC);
            self.inner.mark_closed(&msg);
            self.abort_reader();
            return Err(RpcError::BadFraming(msg));
        }
        C::Reply::decode(frame.payload)
    }

    /// Sends `req` without expecting any reply (venti's goodbye). The tag
    /// is recycled immediately.
    pub async fn send_noreply<C: Call>(&self, req: &C) -> Result<(), RpcError> {
        let mut payload = BytesMut::new();
        req.encode(&mut payload)?;

        self.check_open()?;
        let tag = self.acquire_tag().await?;
        let res = self
            .send_frame(Frame {
                func: C::FUNC,
                tag,
                payload: payload.freeze(),
            })
            .await;
        self.inner.release_tag(tag);
        res
    }

    /// Tears the connection down; all in-flight calls fail.
    pub fn shutdown(&self) {
        self.abort_reader();
        self.inner.mark_closed("client shut down");
    }

    fn abort_reader(&self) {
        if let Some(handle) = self.reader.lock().expect("reader lock").take() {
            handle.abort();
        }
    }

    fn check_open(&self) -> Result<(), RpcError> {
        match self.inner.closed.get() {
            Some(_) => Err(RpcError::ConnectionClosed),
            None => Ok(()),
        }
    }

    async fn acquire_tag(&self) -> Result<u8, RpcError> {
        let tag = {
            let mut rx = self.inner.tag_rx.lock().await;
            rx.recv().await.ok_or(RpcError::ConnectionClosed)?
        };
        // the connection may have died while we waited
        if self.check_open().is_err() {
            self.inner.release_tag(tag);
            return Err(RpcError::ConnectionClosed);
        }
        Ok(tag)
    }

    async fn send_frame(&self, frame: Frame) -> Result<(), RpcError> {
        let mut writer = self.inner.writer.lock().await;
        writer.send(frame).await
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    fn release_tag(&self, tag: u8) {
        // capacity covers every tag, so this cannot fail while the pool lives
        let _ = self.tag_tx.try_send(tag);
    }

    fn mark_closed(&self, msg: &str) {
        let _ = self.closed.set(msg.to_string());
        // fail everyone waiting: dropping the senders wakes the callers,
        // and recycling the tags wakes anyone blocked on the pool
        let drained: Vec<(u8, oneshot::Sender<Frame>)> = {
            let mut pending = self.pending.lock().expect("pending lock");
            pending.drain().collect()
        };
        for (tag, _sender) in drained {
            self.release_tag(tag);
        }
    }
}

async fn reader_loop<R>(inner: Arc<Inner>, mut frames: FramedRead<R, FrameCodec>)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    loop {
        match frames.next().await {
            Some(Ok(frame)) => {
                let tag = frame.tag;
                let sender = inner.pending.lock().expect("pending lock").remove(&tag);
                match sender {
                    Some(tx) => {
                        // an abandoned caller just drops the reply
                        let _ = tx.send(frame);
                        inner.release_tag(tag);
                    }
                    None => {
                        tracing::warn!(tag, func = frame.func, "reply for unregistered tag");
                        inner.mark_closed("reply for unregistered tag");
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                tracing::debug!("rpc reader: {e}");
                inner.mark_closed(&e.to_string());
                return;
            }
            None => {
                inner.mark_closed("peer closed the connection");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{Buf, BufMut, Bytes};

    struct Echo {
        n: u32,
    }

    #[derive(Debug)]
    struct EchoReply {
        n: u32,
    }

    impl Call for Echo {
        const FUNC: u8 = 12;
        type Reply = EchoReply;

        fn encode(&self, buf: &mut BytesMut) -> Result<(), RpcError> {
            buf.put_u32(self.n);
            Ok(())
        }
    }

    impl Decode for EchoReply {
        fn decode(mut payload: Bytes) -> Result<Self, RpcError> {
            crate::codec::need(&payload, 4)?;
            Ok(EchoReply {
                n: payload.get_u32(),
            })
        }
    }

    /// A loopback peer that answers func+1 with the same payload, or an
    /// error reply for odd values.
    async fn serve_echo(stream: tokio::io::DuplexStream) {
        let (r, w) = tokio::io::split(stream);
        let mut reader = FramedRead::new(r, FrameCodec);
        let mut writer = FramedWrite::new(w, FrameCodec);
        while let Some(Ok(frame)) = reader.next().await {
            let mut p = frame.payload.clone();
            let n = p.get_u32();
            let reply = if n % 2 == 1 {
                let mut payload = BytesMut::new();
                crate::codec::put_string(&mut payload, "odd").unwrap();
                Frame {
                    func: RPC_ERROR,
                    tag: frame.tag,
                    payload: payload.freeze(),
                }
            } else {
                Frame {
                    func: frame.func + 1,
                    tag: frame.tag,
                    payload: frame.payload,
                }
            };
            if writer.send(reply).await.is_err() {
                return;
            }
        }
    }

    #[tokio::test]
    async fn concurrent_calls_keep_their_tags_straight() {
        let (a, b) = tokio::io::duplex(4096);
        tokio::spawn(serve_echo(b));
        let (r, w) = tokio::io::split(a);
        let client = Arc::new(RpcClient::new(r, w));

        let mut tasks = Vec::new();
        for i in 0..16u32 {
            let client = client.clone();
            tasks.push(tokio::spawn(async move {
                for j in 0..50u32 {
                    let n = (i * 100 + j) * 2;
                    let reply = client.call(&Echo { n }).await.expect("call");
                    assert_eq!(reply.n, n);
                }
            }));
        }
        for t in tasks {
            t.await.expect("task");
        }
    }

    #[tokio::test]
    async fn server_error_reply_surfaces_and_keeps_the_connection() {
        let (a, b) = tokio::io::duplex(4096);
        tokio::spawn(serve_echo(b));
        let (r, w) = tokio::io::split(a);
        let client = RpcClient::new(r, w);

        match client.call(&Echo { n: 3 }).await {
            Err(RpcError::Server(msg)) => assert_eq!(msg, "odd"),
            other => panic!("unexpected: {other:?}"),
        }
        // the connection is still usable
        let reply = client.call(&Echo { n: 4 }).await.expect("call");
        assert_eq!(reply.n, 4);
    }

    #[tokio::test]
    async fn peer_close_fails_in_flight_calls() {
        let (a, b) = tokio::io::duplex(4096);
        let (r, w) = tokio::io::split(a);
        let client = RpcClient::new(r, w);

        let call = tokio::spawn(async move { client.call(&Echo { n: 2 }).await });
        drop(b);
        match call.await.expect("task") {
            // closed while waiting, or the send itself hit the dead pipe
            Err(RpcError::ConnectionClosed) | Err(RpcError::Io(_)) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }
}
