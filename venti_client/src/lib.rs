//! Venti block store client and reference server.
//!
//! [`Client::dial`] opens a TCP connection, negotiates the protocol
//! version and performs the hello exchange; the resulting client offers
//! read, write, sync and ping over a multiplexed transport, and
//! implements [`BlockRead`]/[`BlockWrite`] for the block-tree and archive
//! layers.
//!
//! [`Server`] is a small reference implementation over any
//! `BlockRead + BlockWrite` backend, mainly for tests and local use.
//!
//! [`BlockRead`]: venti_core::BlockRead
//! [`BlockWrite`]: venti_core::BlockWrite

pub mod client;
mod handshake;
mod proto;
pub mod server;

pub use client::{Client, ClientError, VENTI_PORT};
pub use server::Server;
