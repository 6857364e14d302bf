//! The venti RPC transport.
//!
//! A single stream carries interleaved requests and responses as frames of
//! `u16 length | u8 funcId | u8 tag | payload`. The 8-bit tag multiplexes
//! up to 255 outstanding calls; the response funcId is the request's plus
//! one, except the dedicated error reply (funcId 1) which carries a
//! message string.
//!
//! [`RpcClient`] is the multi-producer side: any number of tasks issue
//! calls while one background reader demultiplexes replies by tag.

pub mod client;
pub mod codec;
mod error;

pub use client::RpcClient;
pub use codec::{Call, Decode, Frame, FrameCodec, RPC_ERROR};
pub use error::RpcError;
