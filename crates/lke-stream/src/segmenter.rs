//! Event-driven segmentation of reasoning and reply text into chunks.
//!
//! Every function takes the session record by exclusive reference (or by
//! value at end of stream); nothing here is shared between queries.

use tracing::{debug, error, info, warn};

use crate::chunk::Chunk;
use crate::errors::StreamError;
use crate::event::{
    Event, ReferencePayload, ReplyPayload, ThoughtPayload, TokenStatPayload, UpstreamError,
    decode_event,
};
use crate::framer::RawEvent;
use crate::session::{PARAGRAPH_BREAK, StreamSession};

const STATUS_PROCESSING: &str = "processing";
const STATUS_SUCCESS: &str = "success";

/// Decodes a framed payload and routes it to its handler.
///
/// Undecodable payloads are logged and dropped.
pub fn dispatch(session: &mut StreamSession, raw: &RawEvent) -> Vec<Chunk> {
    match decode_event(raw) {
        Ok(event) => {
            debug!(session_id = %session.session_id(), event_type = %event.type_name(), "event dispatched");
            step(session, event)
        }
        Err(err) => {
            error!(session_id = %session.session_id(), error = %err, "dropping undecodable event");
            Vec::new()
        }
    }
}

/// Applies one event to the session and returns the chunks it completes.
pub fn step(session: &mut StreamSession, event: Event) -> Vec<Chunk> {
    match event {
        Event::Error(err) => on_error(session, err),
        Event::Reference(payload) => on_reference(session, payload),
        Event::Thought(payload) => on_thought(session, payload),
        Event::Reply(payload) => on_reply(session, payload),
        Event::TokenStat(payload) => on_token_stat(session, payload),
        Event::Unsupported { event_type, data } => {
            warn!(session_id = %session.session_id(), event_type = %event_type, data = %data, "unsupported event");
            Vec::new()
        }
    }
}

/// Flushes everything still held by the session once the stream is exhausted.
pub fn finish(mut session: StreamSession) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    session.prepare_elapsed_note();
    if session.has_unflushed_reasoning() {
        chunks.extend(flush_reasoning(&mut session, true));
    }
    let remainder = session.take_reply_remainder();
    let text = session.references().format(remainder.trim());
    let out = match session.take_pending_note() {
        Some(note) if text.is_empty() => note,
        Some(note) => format!("{note}{PARAGRAPH_BREAK}{text}"),
        None => text,
    };
    chunks.extend(Chunk::new(out));
    debug!(session_id = %session.session_id(), chunks = chunks.len(), "session finished");
    chunks
}

fn on_error(session: &mut StreamSession, payload: UpstreamError) -> Vec<Chunk> {
    let err = StreamError::from(payload);
    error!(session_id = %session.session_id(), error = %err, "error from server");
    let detail = match &err {
        StreamError::Upstream { code, message } if message.trim().is_empty() => {
            format!("错误码 {code}")
        }
        other => other.message().trim().to_string(),
    };
    Chunk::new(format!("调用大模型知识引擎出错：{detail}"))
        .into_iter()
        .collect()
}

fn on_reference(session: &mut StreamSession, payload: ReferencePayload) -> Vec<Chunk> {
    debug!(session_id = %session.session_id(), count = payload.references.len(), "references received");
    session.references_mut().extend(payload.references);
    Vec::new()
}

fn on_thought(session: &mut StreamSession, payload: ThoughtPayload) -> Vec<Chunk> {
    let Some(procedure) = payload.procedures.into_iter().next() else {
        return Vec::new();
    };
    session.update_reasoning(
        procedure.debugging.content,
        procedure.elapsed,
        &procedure.title,
    );
    if !session.reasoning().ends_with(PARAGRAPH_BREAK) {
        return Vec::new();
    }
    flush_reasoning(session, false).into_iter().collect()
}

fn on_reply(session: &mut StreamSession, payload: ReplyPayload) -> Vec<Chunk> {
    if payload.is_from_self {
        info!(session_id = %session.session_id(), trace_id = %payload.trace_id, content = %payload.content, "input echo received");
        return Vec::new();
    }

    let mut chunks = Vec::new();
    session.prepare_elapsed_note();
    if session.has_unflushed_reasoning() {
        chunks.extend(flush_reasoning(session, true));
    }

    if payload.is_final {
        info!(session_id = %session.session_id(), trace_id = %payload.trace_id, record_id = %payload.record_id, payload = ?payload, "final reply received");
    }
    session.update_reply(payload.content);

    while let Some(paragraph) = session.next_paragraph() {
        let text = session.references().format(paragraph.trim());
        if text.is_empty() {
            continue;
        }
        let out = match session.take_pending_note() {
            Some(note) => format!("{note}{PARAGRAPH_BREAK}{text}"),
            None => text,
        };
        chunks.extend(Chunk::new(out));
    }
    chunks
}

fn on_token_stat(session: &mut StreamSession, payload: TokenStatPayload) -> Vec<Chunk> {
    match payload.status_summary.trim() {
        STATUS_PROCESSING => {
            let Some(last) = payload.procedures.last() else {
                return Vec::new();
            };
            let mut title = payload.status_summary_title.trim();
            if title.is_empty() {
                title = last.title.trim();
            }
            if !session.record_notice(title) {
                return Vec::new();
            }
            Chunk::new(format!("> {title}，请稍等..."))
                .into_iter()
                .collect()
        }
        STATUS_SUCCESS => {
            info!(session_id = %session.session_id(), trace_id = %payload.trace_id, payload = ?payload, "token stat success");
            Vec::new()
        }
        other => {
            debug!(session_id = %session.session_id(), status = %other, "token stat ignored");
            Vec::new()
        }
    }
}

/// Emits the reasoning text not flushed yet under a quoted procedure header.
///
/// With `attach_note`, a pending elapsed note is appended to the chunk and
/// consumed; it stays pending when there is nothing to emit.
fn flush_reasoning(session: &mut StreamSession, attach_note: bool) -> Option<Chunk> {
    let delta = session.take_reasoning_delta();
    let delta = session.references().format(&delta);
    if delta.is_empty() {
        return None;
    }
    let mut out = format!("> {}...\n> \n> {delta}", session.procedure_name());
    if attach_note && let Some(note) = session.take_pending_note() {
        out.push('\n');
        out.push_str(&note);
    }
    Chunk::new(out)
}
