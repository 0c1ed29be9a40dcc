use tracing::{info, warn};

use crate::references::ReferenceResolver;

/// Marks a completed segment of streamed text.
pub const PARAGRAPH_BREAK: &str = "\n\n";

const STATUS_WORDS: [&str; 5] = ["已完成", "进行中", "中", "completed", "in progress"];

/// Per-query decoding state.
///
/// Owned by exactly one query task and handed to the segmenter for every
/// event. Flushed text is tracked as consumed-length offsets into the
/// accumulated reply and reasoning texts; both offsets only move forward and
/// never exceed the text they index.
#[derive(Clone, Debug, Default)]
pub struct StreamSession {
    session_id: String,
    reply: String,
    reply_flushed: usize,
    reasoning: String,
    reasoning_flushed: usize,
    procedure_name: String,
    elapsed_ms: f64,
    elapsed_sent: bool,
    pending_note: Option<String>,
    last_notice: String,
    references: ReferenceResolver,
}

impl StreamSession {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn reply(&self) -> &str {
        &self.reply
    }

    /// Byte offset where not-yet-emitted reply text starts.
    pub fn reply_flushed(&self) -> usize {
        self.reply_flushed
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Byte length of the reasoning prefix already emitted.
    pub fn reasoning_flushed(&self) -> usize {
        self.reasoning_flushed
    }

    pub fn procedure_name(&self) -> &str {
        &self.procedure_name
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    pub fn elapsed_sent(&self) -> bool {
        self.elapsed_sent
    }

    pub fn last_notice(&self) -> &str {
        &self.last_notice
    }

    pub fn references(&self) -> &ReferenceResolver {
        &self.references
    }

    pub(crate) fn references_mut(&mut self) -> &mut ReferenceResolver {
        &mut self.references
    }

    /// Records the latest reasoning state of the current procedure.
    ///
    /// Text that does not continue the emitted prefix belongs to a new
    /// procedure or a restarted draft; it replaces the old text and is
    /// emitted from its start.
    pub(crate) fn update_reasoning(&mut self, text: String, elapsed_ms: f64, name: &str) {
        self.elapsed_ms = elapsed_ms;
        self.procedure_name = name.trim().to_string();
        if !continues_prefix(&text, &self.reasoning, self.reasoning_flushed) {
            info!(
                session_id = %self.session_id,
                procedure = %self.procedure_name,
                flushed = self.reasoning_flushed,
                "reasoning text restarted"
            );
            self.reasoning_flushed = 0;
        }
        self.reasoning = text;
    }

    pub(crate) fn has_unflushed_reasoning(&self) -> bool {
        self.reasoning.len() > self.reasoning_flushed
    }

    /// Takes the trimmed reasoning text not emitted yet and marks it consumed.
    pub(crate) fn take_reasoning_delta(&mut self) -> String {
        let delta = self
            .reasoning
            .get(self.reasoning_flushed..)
            .unwrap_or_default()
            .trim()
            .to_string();
        self.reasoning_flushed = self.reasoning.len();
        delta
    }

    /// Replaces the running reply text with the full text received so far.
    ///
    /// A text that does not continue the emitted prefix restarts the
    /// boundary, so it is segmented from its start.
    pub(crate) fn update_reply(&mut self, content: String) {
        if !continues_prefix(&content, &self.reply, self.reply_flushed) {
            warn!(
                session_id = %self.session_id,
                flushed = self.reply_flushed,
                received = content.len(),
                "reply text does not continue the emitted prefix, restarting"
            );
            self.reply_flushed = 0;
        }
        self.reply = content;
    }

    /// Takes the next completed paragraph after the emitted boundary.
    pub(crate) fn next_paragraph(&mut self) -> Option<String> {
        let rest = self.reply.get(self.reply_flushed..)?;
        let idx = rest.find(PARAGRAPH_BREAK)?;
        let paragraph = rest[..idx].to_string();
        self.reply_flushed += idx + PARAGRAPH_BREAK.len();
        Some(paragraph)
    }

    /// Takes all reply text after the emitted boundary.
    pub(crate) fn take_reply_remainder(&mut self) -> String {
        let rest = self
            .reply
            .get(self.reply_flushed..)
            .unwrap_or_default()
            .to_string();
        self.reply_flushed = self.reply.len();
        rest
    }

    /// Builds the one-shot elapsed-time note and parks it as pending.
    ///
    /// Does nothing once the note was produced or while no time was reported.
    pub(crate) fn prepare_elapsed_note(&mut self) {
        if self.elapsed_sent || self.elapsed_ms <= 0.0 {
            return;
        }
        let name = strip_status_words(&self.procedure_name);
        self.pending_note = Some(format!(
            "> <font color=\"comment\">{name}共用时{:.3}秒</font>",
            self.elapsed_ms / 1000.0
        ));
        self.elapsed_sent = true;
    }

    pub(crate) fn take_pending_note(&mut self) -> Option<String> {
        self.pending_note.take()
    }

    /// Records a progress notice title; returns `true` when it is new.
    pub(crate) fn record_notice(&mut self, title: &str) -> bool {
        if title.is_empty() || title == self.last_notice {
            return false;
        }
        self.last_notice = title.to_string();
        true
    }
}

/// Whether `text` starts with the first `flushed` bytes of `previous`.
fn continues_prefix(text: &str, previous: &str, flushed: usize) -> bool {
    previous
        .get(..flushed)
        .is_some_and(|prefix| text.starts_with(prefix))
}

/// Removes trailing transient status words such as `中` or `已完成`.
pub fn strip_status_words(name: &str) -> String {
    let mut name = name.trim();
    loop {
        let before = name.len();
        for word in STATUS_WORDS {
            if let Some(rest) = name.strip_suffix(word) {
                name = rest.trim_end();
            }
        }
        if name.len() == before {
            break;
        }
    }
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraphs_advance_boundary_monotonically() {
        let mut session = StreamSession::new("s");
        session.update_reply("第一段\n\n第二段\n\n第三".into());
        assert_eq!(session.next_paragraph().as_deref(), Some("第一段"));
        let first = session.reply_flushed();
        assert_eq!(session.next_paragraph().as_deref(), Some("第二段"));
        assert!(session.reply_flushed() > first);
        assert_eq!(session.next_paragraph(), None);
        assert_eq!(session.take_reply_remainder(), "第三");
        assert_eq!(session.reply_flushed(), session.reply().len());
    }

    #[test]
    fn unrelated_reply_restarts_boundary() {
        let mut session = StreamSession::new("s");
        session.update_reply("abc\n\ndef".into());
        assert_eq!(session.next_paragraph().as_deref(), Some("abc"));
        session.update_reply("xyz\n\n".into());
        assert_eq!(session.reply_flushed(), 0);
        assert_eq!(session.next_paragraph().as_deref(), Some("xyz"));
    }

    #[test]
    fn new_procedure_reasoning_is_taken_whole() {
        let mut session = StreamSession::new("s");
        session.update_reasoning("甲x\n\n".into(), 10.0, "检索中");
        assert_eq!(session.take_reasoning_delta(), "甲x");
        // Same length in bytes would otherwise slice into the new text.
        session.update_reasoning("第二个过程的思考\n\n".into(), 20.0, "思考中");
        assert_eq!(session.reasoning_flushed(), 0);
        assert_eq!(session.take_reasoning_delta(), "第二个过程的思考");
    }

    #[test]
    fn shorter_reasoning_draft_is_not_dropped() {
        let mut session = StreamSession::new("s");
        session.update_reasoning("甲乙\n\n".into(), 10.0, "检索中");
        session.take_reasoning_delta();
        session.update_reasoning("丙\n\n".into(), 20.0, "思考中");
        assert!(session.has_unflushed_reasoning());
        assert_eq!(session.take_reasoning_delta(), "丙");
    }

    #[test]
    fn reasoning_delta_slices_from_consumed_offset() {
        let mut session = StreamSession::new("s");
        session.update_reasoning("重复\n\n".into(), 10.0, "思考中");
        assert_eq!(session.take_reasoning_delta(), "重复");
        // The same words recurring later must still be emitted.
        session.update_reasoning("重复\n\n重复\n\n".into(), 20.0, "思考中");
        assert!(session.has_unflushed_reasoning());
        assert_eq!(session.take_reasoning_delta(), "重复");
        assert!(!session.has_unflushed_reasoning());
    }

    #[test]
    fn elapsed_note_is_prepared_once() {
        let mut session = StreamSession::new("s");
        session.update_reasoning("x".into(), 1500.0, "思考已完成");
        session.prepare_elapsed_note();
        assert!(session.elapsed_sent());
        let note = session.take_pending_note().expect("note");
        assert_eq!(note, "> <font color=\"comment\">思考共用时1.500秒</font>");
        session.prepare_elapsed_note();
        assert!(session.take_pending_note().is_none());
    }

    #[test]
    fn no_note_without_elapsed_time() {
        let mut session = StreamSession::new("s");
        session.prepare_elapsed_note();
        assert!(!session.elapsed_sent());
        assert!(session.take_pending_note().is_none());
    }

    #[test]
    fn strips_status_words() {
        assert_eq!(strip_status_words("思考中"), "思考");
        assert_eq!(strip_status_words(" 深度思考已完成 "), "深度思考");
        assert_eq!(strip_status_words("Thinking in progress"), "Thinking");
        assert_eq!(strip_status_words("中文检索"), "中文检索");
    }

    #[test]
    fn notices_are_deduplicated() {
        let mut session = StreamSession::new("s");
        assert!(session.record_notice("检索知识库"));
        assert!(!session.record_notice("检索知识库"));
        assert!(!session.record_notice(""));
        assert!(session.record_notice("生成回复"));
        assert_eq!(session.last_notice(), "生成回复");
    }
}
