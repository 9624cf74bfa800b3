//! Collection of demultiplexed container output into contiguous buffers.

use crate::runtime::OutputChunk;
use crate::{ErrContext, Result};

use futures::{Stream, StreamExt};

/// Reads demultiplexed frames until end-of-stream, appending each frame's
/// payload to one contiguous buffer. Any mid-stream read error is fatal.
///
/// This is the only way stdout is consumed from an attached container.
pub async fn read_frames<S>(stream: S) -> Result<Vec<u8>>
where
    S: Stream<Item = Result<OutputChunk>>,
{
    futures::pin_mut!(stream);

    let mut buf = Vec::new();
    while let Some(frame) = stream.next().await {
        let frame = frame.context("failed to read frame from container stream")?;
        buf.extend_from_slice(frame.payload());
    }

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn concatenates_frame_payloads() {
        let frames = stream::iter(vec![
            Ok(OutputChunk::StdOut(b"hello ".to_vec())),
            Ok(OutputChunk::StdOut(b"wor".to_vec())),
            Ok(OutputChunk::StdOut(b"ld".to_vec())),
        ]);

        let buf = read_frames(frames).await.unwrap();
        assert_eq!(buf, b"hello world");
    }

    #[tokio::test]
    async fn empty_stream_yields_empty_buffer() {
        let frames = stream::iter(Vec::<Result<OutputChunk>>::new());
        assert!(read_frames(frames).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mid_stream_error_is_fatal() {
        let frames = stream::iter(vec![
            Ok(OutputChunk::StdOut(b"partial".to_vec())),
            err!("connection reset"),
        ]);

        let err = read_frames(frames).await.unwrap_err();
        assert!(format!("{:?}", err).contains("connection reset"));
    }
}
