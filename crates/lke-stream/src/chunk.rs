use std::fmt;

/// One non-empty unit of output text, forwarded downstream as a single message.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Chunk(String);

impl Chunk {
    /// Creates a chunk, or `None` when the text is blank.
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            None
        } else {
            Some(Self(text))
        }
    }

    /// Returns the chunk text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the chunk and returns its text.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Chunk {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
