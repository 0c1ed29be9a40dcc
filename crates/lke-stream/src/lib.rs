//! Streaming decoder for the Tencent Cloud LKE chat API.
//!
//! A query is posted once; its `text/event-stream` answer is framed into
//! events, decoded into typed [`Event`]s and segmented into an ordered
//! sequence of non-empty [`Chunk`]s, each sized to be forwarded as one
//! message to a chat platform.
//!
//! ```no_run
//! use lke_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let client = LkeClient::from_env()?;
//! let mut chunks = client.send_query("visitor-1", "你好")?;
//! while let Some(chunk) = chunks.next_chunk().await {
//!     println!("{chunk}");
//! }
//! # Ok(())
//! # }
//! ```

/// Output unit type.
pub mod chunk;
/// Query client entry point.
pub mod client;
/// Client configuration.
pub mod config;
/// Error types.
pub mod errors;
/// Wire payloads and event decoding.
pub mod event;
/// Line splitting and event framing.
pub mod framer;
/// Common imports for typical usage.
pub mod prelude;
/// Outbound request body.
pub mod query;
/// Citation marker rewriting.
pub mod references;
/// Per-event segmentation state machine.
pub mod segmenter;
/// Per-query session record.
pub mod session;
/// Chunk stream handle and decoding task.
pub mod stream;
/// Transport abstraction and HTTP implementation.
pub mod transport;

pub use chunk::Chunk;
pub use client::LkeClient;
pub use config::{DEFAULT_SSE_URL, LkeClientConfig};
pub use errors::{ClientError, StreamError};
pub use event::{Event, Reference};
pub use framer::{EventFramer, RawEvent};
pub use query::QueryRequest;
pub use references::ReferenceResolver;
pub use session::StreamSession;
pub use stream::{AbortHandle, ChunkStream, decode_body, decode_chunks};
pub use transport::{ByteStream, HttpTransport, StreamTransport};
