//! The venti-02 message set, hand-packed against the closed field-shape
//! set of the wire codec. Requests implement [`Call`] for the client and
//! [`Decode`] for the server; responses implement [`Decode`] for the
//! client and encode for the server.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use venti_core::{SCORE_SIZE, Score};
use venti_rpc::codec::{get_small, get_string, need, put_small, put_string};
use venti_rpc::{Call, Decode, RpcError};

pub const RPC_PING: u8 = 2;
pub const RPC_HELLO: u8 = 4;
pub const RPC_GOODBYE: u8 = 6;
// auth funcs exist in the protocol but strength 0 never issues them
#[allow(dead_code)]
pub const RPC_AUTH0: u8 = 8;
#[allow(dead_code)]
pub const RPC_AUTH1: u8 = 10;
pub const RPC_READ: u8 = 12;
pub const RPC_WRITE: u8 = 14;
pub const RPC_SYNC: u8 = 16;

fn get_score(buf: &mut Bytes) -> Result<Score, RpcError> {
    need(buf, SCORE_SIZE)?;
    let bytes = buf.split_to(SCORE_SIZE);
    Ok(Score::from_slice(&bytes).expect("slice is score sized"))
}

#[derive(Debug, Clone)]
pub struct HelloRequest {
    pub version: String,
    pub uid: String,
    pub strength: u8,
    pub crypto: Bytes,
    pub codec: Bytes,
}

impl Call for HelloRequest {
    const FUNC: u8 = RPC_HELLO;
    type Reply = HelloResponse;

    fn encode(&self, buf: &mut BytesMut) -> Result<(), RpcError> {
        put_string(buf, &self.version)?;
        put_string(buf, &self.uid)?;
        buf.put_u8(self.strength);
        put_small(buf, &self.crypto)?;
        put_small(buf, &self.codec)
    }
}

impl Decode for HelloRequest {
    fn decode(mut payload: Bytes) -> Result<Self, RpcError> {
        let version = get_string(&mut payload)?;
        let uid = get_string(&mut payload)?;
        need(&payload, 1)?;
        let strength = payload.get_u8();
        let crypto = get_small(&mut payload)?;
        let codec = get_small(&mut payload)?;
        Ok(HelloRequest {
            version,
            uid,
            strength,
            crypto,
            codec,
        })
    }
}

#[derive(Debug, Clone)]
pub struct HelloResponse {
    pub sid: String,
    pub rcrypto: u8,
    pub rcodec: u8,
}

impl HelloResponse {
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), RpcError> {
        put_string(buf, &self.sid)?;
        buf.put_u8(self.rcrypto);
        buf.put_u8(self.rcodec);
        Ok(())
    }
}

impl Decode for HelloResponse {
    fn decode(mut payload: Bytes) -> Result<Self, RpcError> {
        let sid = get_string(&mut payload)?;
        need(&payload, 2)?;
        Ok(HelloResponse {
            sid,
            rcrypto: payload.get_u8(),
            rcodec: payload.get_u8(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PingRequest;

impl Call for PingRequest {
    const FUNC: u8 = RPC_PING;
    type Reply = ();

    fn encode(&self, _buf: &mut BytesMut) -> Result<(), RpcError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SyncRequest;

impl Call for SyncRequest {
    const FUNC: u8 = RPC_SYNC;
    type Reply = ();

    fn encode(&self, _buf: &mut BytesMut) -> Result<(), RpcError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GoodbyeRequest;

impl Call for GoodbyeRequest {
    const FUNC: u8 = RPC_GOODBYE;
    // the server closes the socket instead of replying
    type Reply = ();

    fn encode(&self, _buf: &mut BytesMut) -> Result<(), RpcError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub score: Score,
    pub kind: u8,
    pub count: u16,
}

impl Call for ReadRequest {
    const FUNC: u8 = RPC_READ;
    type Reply = ReadResponse;

    fn encode(&self, buf: &mut BytesMut) -> Result<(), RpcError> {
        buf.put_slice(self.score.as_bytes());
        buf.put_u8(self.kind);
        buf.put_u8(0); // pad
        buf.put_u16(self.count);
        Ok(())
    }
}

impl Decode for ReadRequest {
    fn decode(mut payload: Bytes) -> Result<Self, RpcError> {
        let score = get_score(&mut payload)?;
        need(&payload, 4)?;
        let kind = payload.get_u8();
        let _pad = payload.get_u8();
        let count = payload.get_u16();
        Ok(ReadRequest { score, kind, count })
    }
}

#[derive(Debug, Clone)]
pub struct ReadResponse {
    pub data: Bytes,
}

impl ReadResponse {
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), RpcError> {
        buf.put_slice(&self.data);
        Ok(())
    }
}

impl Decode for ReadResponse {
    fn decode(payload: Bytes) -> Result<Self, RpcError> {
        // trailing field: the rest of the message is the block
        Ok(ReadResponse { data: payload })
    }
}

#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub kind: u8,
    pub data: Bytes,
}

impl Call for WriteRequest {
    const FUNC: u8 = RPC_WRITE;
    type Reply = WriteResponse;

    fn encode(&self, buf: &mut BytesMut) -> Result<(), RpcError> {
        buf.put_u8(self.kind);
        buf.put_slice(&[0u8; 3]); // pad
        buf.put_slice(&self.data);
        Ok(())
    }
}

impl Decode for WriteRequest {
    fn decode(mut payload: Bytes) -> Result<Self, RpcError> {
        need(&payload, 4)?;
        let kind = payload.get_u8();
        payload.advance(3);
        Ok(WriteRequest {
            kind,
            data: payload,
        })
    }
}

#[derive(Debug, Clone)]
pub struct WriteResponse {
    pub score: Score,
}

impl WriteResponse {
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), RpcError> {
        buf.put_slice(self.score.as_bytes());
        Ok(())
    }
}

impl Decode for WriteResponse {
    fn decode(mut payload: Bytes) -> Result<Self, RpcError> {
        Ok(WriteResponse {
            score: get_score(&mut payload)?,
        })
    }
}
