//! Output capping for captured child streams.
//!
//! Truncation is silent: callers receive at most the cap, with no marker
//! appended.

use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 64 * 1024;

/// Read `reader` to EOF, retaining only the first `limit` bytes.
///
/// The remainder is still consumed so a child writing more than the cap
/// never blocks on a full pipe.
pub async fn drain_capped<R>(mut reader: R, limit: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut kept = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(kept.len());
        kept.extend_from_slice(&chunk[..n.min(room)]);
    }
    Ok(kept)
}

/// Truncate raw bytes to at most `limit`.
fn cap_bytes(mut bytes: Vec<u8>, limit: usize) -> Vec<u8> {
    bytes.truncate(limit);
    bytes
}

/// Convert captured bytes into a response string no longer than `limit` bytes.
///
/// Invalid UTF-8 becomes U+FFFD, which can grow the text; the cut then moves
/// back to the nearest character boundary so the cap still holds.
pub fn capped_string(bytes: Vec<u8>, limit: usize) -> String {
    let bytes = cap_bytes(bytes, limit);
    let mut text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    };
    if text.len() > limit {
        let mut cut = limit;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}
