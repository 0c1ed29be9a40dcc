use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::StreamExt as _;
use futures::stream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::chunk::Chunk;
use crate::framer::EventFramer;
use crate::query::QueryRequest;
use crate::segmenter;
use crate::session::StreamSession;
use crate::transport::{ByteStream, StreamTransport};

/// Handle used to stop a running query stream.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// The decoding task stops at its next suspension point and drops the
    /// connection; the consumer then observes the end of the stream.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Ordered, single-consumer sequence of chunks for one query.
///
/// Chunks become available as soon as the paragraph or event producing them
/// has been decoded. Dropping the handle stops the producer and releases the
/// underlying connection.
pub struct ChunkStream {
    session_id: String,
    rx: mpsc::Receiver<Chunk>,
    abort_handle: AbortHandle,
}

impl ChunkStream {
    /// Spawns the decoding task for `query` on the current Tokio runtime.
    pub(crate) fn spawn(
        transport: Arc<dyn StreamTransport>,
        query: QueryRequest,
        capacity: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        let (abort_tx, abort_rx) = watch::channel(false);
        let session_id = query.session_id.clone();
        tokio::spawn(chunk_task(transport, query, tx, abort_rx));
        Self {
            session_id,
            rx,
            abort_handle: AbortHandle { tx: abort_tx },
        }
    }

    /// Returns the backend session id of this query.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns a handle that can cancel the query.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for the next chunk; `None` once the stream is exhausted.
    pub async fn next_chunk(&mut self) -> Option<Chunk> {
        self.rx.recv().await
    }

    /// Drains the stream into a vector.
    pub async fn collect(mut self) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        while let Some(chunk) = self.rx.recv().await {
            chunks.push(chunk);
        }
        chunks
    }
}

impl futures::Stream for ChunkStream {
    type Item = Chunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Chunk>> {
        self.rx.poll_recv(cx)
    }
}

async fn chunk_task(
    transport: Arc<dyn StreamTransport>,
    query: QueryRequest,
    tx: mpsc::Sender<Chunk>,
    mut abort_rx: watch::Receiver<bool>,
) {
    let session_id = query.session_id.clone();
    let opened = tokio::select! {
        opened = transport.open(&query) => opened,
        _ = tx.closed() => {
            debug!(session_id = %session_id, "consumer dropped before stream opened");
            return;
        }
    };
    let bytes = match opened {
        Ok(bytes) => bytes,
        Err(err) => {
            error!(session_id = %session_id, error = %err, "connect to server failed");
            return;
        }
    };

    let mut chunks = Box::pin(decode_chunks(session_id.clone(), bytes));
    loop {
        tokio::select! {
            changed = abort_rx.changed() => {
                match changed {
                    Ok(()) if *abort_rx.borrow() => {
                        info!(session_id = %session_id, "query stream aborted");
                        return;
                    }
                    Ok(()) => {}
                    Err(_) => {
                        debug!(session_id = %session_id, "abort handles dropped, stopping");
                        return;
                    }
                }
            }
            _ = tx.closed() => {
                debug!(session_id = %session_id, "consumer dropped, stopping");
                return;
            }
            next = chunks.next() => {
                let Some(chunk) = next else {
                    debug!(session_id = %session_id, "query stream exhausted");
                    return;
                };
                if tx.send(chunk).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Lazily turns a response body into chunks, one pass, in emission order.
///
/// A read failure is logged and treated like the end of the body, so the
/// text accumulated so far is still flushed.
pub fn decode_chunks(
    session_id: impl Into<String>,
    bytes: ByteStream,
) -> impl futures::Stream<Item = Chunk> + Send {
    struct State {
        bytes: ByteStream,
        framer: EventFramer,
        session: Option<StreamSession>,
        pending: VecDeque<Chunk>,
    }

    stream::unfold(
        State {
            bytes,
            framer: EventFramer::default(),
            session: Some(StreamSession::new(session_id)),
            pending: VecDeque::new(),
        },
        |mut state| async move {
            loop {
                if let Some(chunk) = state.pending.pop_front() {
                    return Some((chunk, state));
                }
                if state.session.is_none() {
                    return None;
                }

                match state.bytes.next().await {
                    Some(Ok(body)) => {
                        let events = state.framer.push_chunk(&body);
                        if let Some(session) = state.session.as_mut() {
                            for raw in events {
                                state.pending.extend(segmenter::dispatch(session, &raw));
                            }
                        }
                    }
                    end => {
                        if let Some(Err(err)) = end {
                            warn!(error = %err, "event stream read failed, flushing what was received");
                        }
                        if let Some(mut session) = state.session.take() {
                            if let Some(raw) = state.framer.finish() {
                                state.pending.extend(segmenter::dispatch(&mut session, &raw));
                            }
                            state.pending.extend(segmenter::finish(session));
                        }
                    }
                }
            }
        },
    )
}

/// Decodes a complete, already received event-stream body.
pub fn decode_body(session_id: impl Into<String>, body: &[u8]) -> Vec<Chunk> {
    let mut session = StreamSession::new(session_id);
    let mut framer = EventFramer::default();
    let mut chunks = Vec::new();
    for raw in framer.push_chunk(body) {
        chunks.extend(segmenter::dispatch(&mut session, &raw));
    }
    if let Some(raw) = framer.finish() {
        chunks.extend(segmenter::dispatch(&mut session, &raw));
    }
    chunks.extend(segmenter::finish(session));
    chunks
}
