use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::RpcError;

/// funcId of the dedicated error reply; its payload is a single string.
pub const RPC_ERROR: u8 = 1;

/// One wire frame: `u16 length | u8 funcId | u8 tag | payload`, where the
/// length counts everything after itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub func: u8,
    pub tag: u8,
    pub payload: Bytes,
}

/// A request message: its funcId, how to encode its payload, and the
/// reply type it pairs with. The reply funcId is always `FUNC + 1`.
pub trait Call {
    const FUNC: u8;
    type Reply: Decode;

    fn encode(&self, buf: &mut BytesMut) -> Result<(), RpcError>;
}

/// A decodable message payload.
pub trait Decode: Sized {
    fn decode(payload: Bytes) -> Result<Self, RpcError>;
}

impl Decode for () {
    fn decode(_payload: Bytes) -> Result<Self, RpcError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = RpcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, RpcError> {
        if src.len() < 2 {
            return Ok(None);
        }
        let length = u16::from_be_bytes([src[0], src[1]]) as usize;
        if length < 2 {
            return Err(RpcError::BadFraming(format!("frame length {length}")));
        }
        if src.len() < 2 + length {
            src.reserve(2 + length - src.len());
            return Ok(None);
        }
        src.advance(2);
        let func = src.get_u8();
        let tag = src.get_u8();
        let payload = src.split_to(length - 2).freeze();
        Ok(Some(Frame { func, tag, payload }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = RpcError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), RpcError> {
        let length = frame.payload.len() + 2;
        if length > u16::MAX as usize {
            return Err(RpcError::Oversized(frame.payload.len()));
        }
        dst.reserve(2 + length);
        dst.put_u16(length as u16);
        dst.put_u8(frame.func);
        dst.put_u8(frame.tag);
        dst.put_slice(&frame.payload);
        Ok(())
    }
}

// --- field helpers ---
//
// The venti field shapes are closed: fixed-width big-endian integers,
// fixed byte arrays, u16-length strings, u8-length "small" strings and a
// single trailing byte slice per message. Integers and byte arrays go
// through `Buf`/`BufMut` directly; the checked helpers below cover the
// rest.

pub fn need(buf: &Bytes, n: usize) -> Result<(), RpcError> {
    if buf.len() < n {
        return Err(RpcError::BadFraming(format!(
            "short payload: {} < {n}",
            buf.len()
        )));
    }
    Ok(())
}

/// `u16 length` + bytes.
pub fn put_string(buf: &mut BytesMut, s: &str) -> Result<(), RpcError> {
    if s.len() > u16::MAX as usize {
        return Err(RpcError::Oversized(s.len()));
    }
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
    Ok(())
}

pub fn get_string(buf: &mut Bytes) -> Result<String, RpcError> {
    need(buf, 2)?;
    let n = buf.get_u16() as usize;
    need(buf, n)?;
    let bytes = buf.split_to(n);
    String::from_utf8(bytes.to_vec())
        .map_err(|_| RpcError::BadFraming("string field is not utf-8".to_string()))
}

/// `u8 length` + bytes.
pub fn put_small(buf: &mut BytesMut, s: &[u8]) -> Result<(), RpcError> {
    if s.len() > u8::MAX as usize {
        return Err(RpcError::Oversized(s.len()));
    }
    buf.put_u8(s.len() as u8);
    buf.put_slice(s);
    Ok(())
}

pub fn get_small(buf: &mut Bytes) -> Result<Bytes, RpcError> {
    need(buf, 1)?;
    let n = buf.get_u8() as usize;
    need(buf, n)?;
    Ok(buf.split_to(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_roundtrip() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "venti-rs").unwrap();
        put_small(&mut buf, b"xy").unwrap();
        let mut bytes = buf.freeze();
        assert_eq!(get_string(&mut bytes).unwrap(), "venti-rs");
        assert_eq!(get_small(&mut bytes).unwrap(), Bytes::from_static(b"xy"));
        assert!(bytes.is_empty());
    }

    #[test]
    fn get_string_rejects_short_payload() {
        let mut bytes = Bytes::from_static(&[0x00, 0x09, b'a']);
        assert!(matches!(
            get_string(&mut bytes),
            Err(RpcError::BadFraming(_))
        ));
    }

    #[test]
    fn frame_roundtrip() {
        let frame = Frame {
            func: 12,
            tag: 7,
            payload: Bytes::from_static(b"hello"),
        };
        let mut codec = FrameCodec;
        let mut wire = BytesMut::new();
        codec.encode(frame.clone(), &mut wire).unwrap();
        assert_eq!(wire.len(), 2 + 2 + 5);
        assert_eq!(&wire[..2], &[0, 7]);

        let decoded = codec.decode(&mut wire).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert!(wire.is_empty());
    }

    #[test]
    fn decode_waits_for_a_full_frame() {
        let mut codec = FrameCodec;
        let mut wire = BytesMut::new();
        codec
            .encode(
                Frame {
                    func: 2,
                    tag: 0,
                    payload: Bytes::from_static(b"abcd"),
                },
                &mut wire,
            )
            .unwrap();

        let mut partial = BytesMut::from(&wire[..4]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&wire[4..]);
        assert!(codec.decode(&mut partial).unwrap().is_some());
    }

    #[test]
    fn decode_rejects_undersized_length() {
        let mut codec = FrameCodec;
        let mut wire = BytesMut::from(&[0u8, 1, 42][..]);
        assert!(codec.decode(&mut wire).is_err());
    }
}
