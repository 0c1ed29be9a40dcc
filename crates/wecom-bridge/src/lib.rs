//! Bridge between a WeCom application and the Tencent Cloud LKE chat API.
//!
//! The callback endpoint verifies and decrypts WeCom messages; text messages
//! are forwarded as LKE queries and each chunk of the streamed answer is
//! delivered back to the sender as its own markdown message.

pub mod bridge;
pub mod config;
pub mod crypto;
pub mod delivery;
pub mod observability;
pub mod replay;
pub mod server;
pub mod wecom;

#[cfg(test)]
mod testing;

pub use bridge::{Bridge, BridgeError, InboundMessage, TEXT_ONLY_NOTICE};
pub use crypto::{CryptoError, MsgCrypt};
pub use delivery::{ChunkSink, StdoutSink, WecomSink};
pub use observability::init_observability;
pub use server::CallbackState;
pub use wecom::{WecomClient, WecomConfig, WecomError};
