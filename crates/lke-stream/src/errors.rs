/// Per-event and per-connection failures observed while decoding a stream.
///
/// None of these end a session with an error: they are logged where they
/// occur, and `Upstream` is additionally surfaced to the user as a chunk.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Connection or HTTP-level failure talking to the backend.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        status_code: Option<u16>,
    },
    /// A `data:` payload could not be decoded into an event.
    #[error("malformed event: {message}")]
    MalformedEvent { message: String, data: String },
    /// The declared `event:` type disagrees with the payload's own `type`.
    #[error("event type mismatch: declared {declared}, payload {actual}")]
    TypeMismatch { declared: String, actual: String },
    /// The backend reported an error event.
    #[error("upstream error {code}: {message}")]
    Upstream { code: String, message: String },
}

impl StreamError {
    /// Creates a transport-level error.
    pub fn transport(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self::Transport {
            message: message.into(),
            status_code,
        }
    }

    /// Creates a malformed-event error carrying the offending payload.
    pub fn malformed(message: impl Into<String>, data: impl Into<String>) -> Self {
        Self::MalformedEvent {
            message: message.into(),
            data: data.into(),
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Transport { message, .. }
            | Self::MalformedEvent { message, .. }
            | Self::Upstream { message, .. } => message,
            Self::TypeMismatch { actual, .. } => actual,
        }
    }
}

/// Errors returned before a query stream is established.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid query input.
    #[error("validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_error_displays_code_and_message() {
        let err = StreamError::Upstream {
            code: "1001".into(),
            message: "quota exceeded".into(),
        };
        assert_eq!(err.to_string(), "upstream error 1001: quota exceeded");
        assert_eq!(err.message(), "quota exceeded");
    }

    #[test]
    fn transport_error_keeps_status() {
        let err = StreamError::transport("bad gateway", Some(502));
        assert!(matches!(
            err,
            StreamError::Transport {
                status_code: Some(502),
                ..
            }
        ));
    }
}
