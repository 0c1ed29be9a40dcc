use tracing::debug;

/// One `data:` payload together with the type declared by the preceding
/// `event:` line of the same event, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub declared_type: Option<String>,
    pub data: String,
}

/// Incremental line splitter and event framer for `text/event-stream` bodies.
///
/// Bytes may arrive split anywhere, including inside a line or inside a
/// multi-byte character; only complete lines are interpreted.
#[derive(Debug, Default)]
pub struct EventFramer {
    buf: Vec<u8>,
    declared_type: Option<String>,
    event_lines: Vec<String>,
}

impl EventFramer {
    /// Feeds raw body bytes and returns the payloads completed by them.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<RawEvent> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(idx) = self.buf.iter().position(|b| *b == b'\n') {
            let line_bytes: Vec<u8> = self.buf.drain(..=idx).collect();
            let line = String::from_utf8_lossy(&line_bytes[..idx]);
            if let Some(event) = self.push_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Interprets a trailing line left without a terminating newline.
    pub fn finish(&mut self) -> Option<RawEvent> {
        let event = if self.buf.is_empty() {
            None
        } else {
            let rest = std::mem::take(&mut self.buf);
            let line = String::from_utf8_lossy(&rest).into_owned();
            self.push_line(&line)
        };
        self.end_event();
        event
    }

    /// Interprets one complete line.
    pub fn push_line(&mut self, line: &str) -> Option<RawEvent> {
        let line = line.trim();
        if line.is_empty() {
            self.end_event();
            return None;
        }
        self.event_lines.push(line.to_string());
        if line.starts_with(':') {
            return None;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            self.declared_type = Some(rest.trim().to_string()).filter(|t| !t.is_empty());
            return None;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            return Some(RawEvent {
                declared_type: self.declared_type.clone(),
                data: rest.trim().to_string(),
            });
        }
        None
    }

    fn end_event(&mut self) {
        if !self.event_lines.is_empty() {
            debug!(event = %self.event_lines.join("\n"), "event framed");
            self.event_lines.clear();
        }
        self.declared_type = None;
    }
}
