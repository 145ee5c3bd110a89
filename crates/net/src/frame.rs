//! Newline-delimited frame encoding/decoding
//!
//! Wire format: one UTF-8 line per frame, terminated by `\n`.
//! A trailing `\r` is tolerated and blank lines are skipped.
//! Maximum frame size: 64KB (sanity limit)

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Maximum allowed frame size (64KB)
const MAX_FRAME_SIZE: usize = 64 * 1024;

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Read the next non-empty line from a stream
///
/// Returns `Ok(None)` once the peer has closed the stream.
pub async fn read_frame<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<String>> {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = (&mut *reader)
            .take(MAX_FRAME_SIZE as u64 + 1)
            .read_until(b'\n', &mut buf)
            .await?;
        if read == 0 {
            return Ok(None);
        }

        if buf.len() > MAX_FRAME_SIZE && buf.last() != Some(&b'\n') {
            // Drop the rest of the line so the next read starts on a fresh frame
            skip_line(reader).await?;
            return Err(Error::Protocol(format!(
                "Frame too large: more than {} bytes",
                MAX_FRAME_SIZE
            )));
        }

        let line = String::from_utf8(std::mem::take(&mut buf))
            .map_err(|e| Error::Protocol(format!("Invalid UTF-8: {}", e)))?;
        let trimmed = line.trim_end_matches(LINE_ENDINGS);
        if trimmed.is_empty() {
            continue;
        }

        return Ok(Some(trimmed.to_string()));
    }
}

/// Discard input up to and including the next newline
async fn skip_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<()> {
    loop {
        let (consumed, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(());
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (available.len(), false),
            }
        };
        reader.consume(consumed);
        if done {
            return Ok(());
        }
    }
}

/// Write one frame followed by a newline
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &str) -> Result<()> {
    if frame.len() > MAX_FRAME_SIZE {
        return Err(Error::Protocol(format!(
            "Frame too large: {} bytes (max {})",
            frame.len(),
            MAX_FRAME_SIZE
        )));
    }

    let mut encoded = Vec::with_capacity(frame.len() + 1);
    encoded.extend_from_slice(frame.as_bytes());
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;

    // Flush to ensure delivery
    writer.flush().await?;

    Ok(())
}
