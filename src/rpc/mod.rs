//! RPC module - wire protocol between consumer proxies and the hub

pub mod codec;
pub mod frames;

pub use frames::{CallError, CallId, CallOutcome, ClientFrame, Procedure, ServerFrame, StreamId};
