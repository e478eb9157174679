//! RPC transport: frame codec, method table and the duplex / single-shot
//! carrier adapters.

pub mod carrier;
pub mod codec;
mod dispatch;

pub use carrier::{serve_duplex, single_shot};
pub use codec::{CallFrame, ResponseFrame, RpcError};
pub use dispatch::{RpcDispatcher, PROTOCOL_VERSION};
