//! Newline-delimited framing.
//!
//! Every frame is the payload bytes followed by a single `\n`. JSON
//! encoders never emit raw newlines, so one line is always one message,
//! regardless of how TCP coalesces or splits the underlying writes.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::TransportError;

/// Default upper bound for a single frame, excluding the terminator.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// Reads the next non-empty frame.
///
/// Returns `Ok(None)` at end of stream. Bytes left after the last
/// newline when the peer closes are returned as a final frame.
///
/// # Errors
/// [`TransportError::FrameTooLarge`] when a line exceeds `max_len`; the
/// rest of that line is skipped first so the caller may keep reading.
/// [`TransportError::ReceiveFailed`] on any I/O failure.
pub async fn read_frame<R>(
    reader: &mut R,
    max_len: usize,
) -> Result<Option<Vec<u8>>, TransportError>
where
    R: AsyncBufRead + Unpin,
{
    let mut frame = Vec::new();
    loop {
        frame.clear();
        // One byte of headroom so a line of exactly `max_len` bytes can
        // still carry its terminator.
        let limit = max_len as u64 + 1;
        let read = (&mut *reader)
            .take(limit)
            .read_until(b'\n', &mut frame)
            .await
            .map_err(TransportError::ReceiveFailed)?;
        if read == 0 {
            return Ok(None);
        }

        let terminated = frame.last() == Some(&b'\n');
        if !terminated && frame.len() > max_len {
            discard_line(reader).await?;
            return Err(TransportError::FrameTooLarge { max: max_len });
        }

        trim_line_ending(&mut frame);
        if frame.is_empty() {
            continue;
        }
        return Ok(Some(frame));
    }
}

/// Writes `data` as one frame and flushes.
///
/// # Errors
/// [`TransportError::SendFailed`] if `data` contains a newline (it would
/// split into two frames on the other side) or the write fails.
pub async fn write_frame<W>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    if data.contains(&b'\n') {
        return Err(TransportError::SendFailed(io::Error::new(
            io::ErrorKind::InvalidInput,
            "frame payload contains a newline",
        )));
    }

    let mut frame = Vec::with_capacity(data.len() + 1);
    frame.extend_from_slice(data);
    frame.push(b'\n');
    writer
        .write_all(&frame)
        .await
        .map_err(TransportError::SendFailed)?;
    writer.flush().await.map_err(TransportError::SendFailed)
}

/// Consumes input up to and including the next newline (or end of stream).
async fn discard_line<R>(reader: &mut R) -> Result<(), TransportError>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let buf = reader
            .fill_buf()
            .await
            .map_err(TransportError::ReceiveFailed)?;
        if buf.is_empty() {
            return Ok(());
        }
        match buf.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(());
            }
            None => {
                let len = buf.len();
                reader.consume(len);
            }
        }
    }
}

fn trim_line_ending(frame: &mut Vec<u8>) {
    while matches!(frame.last(), Some(b'\n' | b'\r')) {
        frame.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn test_write_then_read_single_frame() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = BufReader::new(reader);

        write_frame(&mut writer, br#"{"type":"chat"}"#)
            .await
            .expect("write frame");
        let frame = read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN)
            .await
            .expect("read frame")
            .expect("frame present");

        assert_eq!(frame, br#"{"type":"chat"}"#);
    }

    #[tokio::test]
    async fn test_coalesced_writes_split_into_frames() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = BufReader::new(reader);

        // Three frames delivered by one write, as TCP is free to do.
        writer.write_all(b"first\nsecond\r\n\nthird\n").await.unwrap();
        drop(writer);

        let mut frames = Vec::new();
        while let Some(frame) = read_frame(&mut reader, 64).await.unwrap() {
            frames.push(frame);
        }
        assert_eq!(
            frames,
            vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_unterminated_tail_is_final_frame() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = BufReader::new(reader);

        writer.write_all(b"tail-without-newline").await.unwrap();
        drop(writer);

        let frame = read_frame(&mut reader, 64).await.unwrap();
        assert_eq!(frame.as_deref(), Some(&b"tail-without-newline"[..]));
        assert!(read_frame(&mut reader, 64).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_is_skipped() {
        let (mut writer, reader) = tokio::io::duplex(4096);
        let mut reader = BufReader::new(reader);

        let long = vec![b'x'; 100];
        writer.write_all(&long).await.unwrap();
        writer.write_all(b"\nok\n").await.unwrap();
        drop(writer);

        let err = read_frame(&mut reader, 16).await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { max: 16 }));
        assert!(err.is_recoverable());

        let next = read_frame(&mut reader, 16).await.unwrap();
        assert_eq!(next.as_deref(), Some(&b"ok"[..]));
    }

    #[tokio::test]
    async fn test_frame_of_exactly_max_len_is_accepted() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = BufReader::new(reader);

        writer.write_all(b"12345678\n").await.unwrap();
        let frame = read_frame(&mut reader, 8).await.unwrap();
        assert_eq!(frame.as_deref(), Some(&b"12345678"[..]));
    }

    #[tokio::test]
    async fn test_write_rejects_embedded_newline() {
        let (mut writer, _reader) = tokio::io::duplex(64);
        let err = write_frame(&mut writer, b"a\nb").await.unwrap_err();
        assert!(matches!(err, TransportError::SendFailed(_)));
    }
}
