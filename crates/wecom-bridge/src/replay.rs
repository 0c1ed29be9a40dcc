use std::path::Path;

use anyhow::Context as _;
use lke_stream::{Chunk, decode_body};
use tracing::info;

/// Decodes a captured event-stream body from disk into chunks.
pub async fn replay_file(path: &Path) -> anyhow::Result<Vec<Chunk>> {
    let body = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let session_id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("replay");
    let chunks = decode_body(session_id, &body);
    info!(file = %path.display(), chunks = chunks.len(), "replay decoded");
    Ok(chunks)
}
