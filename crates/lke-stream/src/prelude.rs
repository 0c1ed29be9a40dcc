//! Common imports for typical client usage.
pub use crate::{
    AbortHandle, Chunk, ChunkStream, ClientError, LkeClient, LkeClientConfig, QueryRequest,
    StreamError,
};
