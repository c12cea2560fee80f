//! Buffer-sized chunking for stream responses.

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Accumulates response bytes and writes them out one full buffer at a time.
///
/// Bodies larger than the session buffer (long listings, WHO tables) are
/// therefore sent as several writes, each no larger than `chunk_size`.
pub struct ChunkedWriter<'a, W> {
    inner: &'a mut W,
    buf: Vec<u8>,
    chunk_size: usize,
    written: usize,
    chunks: usize,
}

impl<'a, W: AsyncWrite + Unpin> ChunkedWriter<'a, W> {
    pub fn new(inner: &'a mut W, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            inner,
            buf: Vec::with_capacity(chunk_size),
            chunk_size,
            written: 0,
            chunks: 0,
        }
    }

    /// Queues `bytes`, writing every chunk that fills up along the way.
    pub async fn push(&mut self, mut bytes: &[u8]) -> std::io::Result<()> {
        while !bytes.is_empty() {
            let room = self.chunk_size - self.buf.len();
            let (head, tail) = bytes.split_at(room.min(bytes.len()));
            self.buf.extend_from_slice(head);
            bytes = tail;

            if self.buf.len() == self.chunk_size {
                self.flush_chunk().await?;
            }
        }
        Ok(())
    }

    pub async fn push_str(&mut self, text: &str) -> std::io::Result<()> {
        self.push(text.as_bytes()).await
    }

    /// Writes whatever is still buffered and flushes the underlying writer.
    ///
    /// Returns the total number of bytes written through this writer.
    pub async fn finish(mut self) -> std::io::Result<usize> {
        if !self.buf.is_empty() {
            self.flush_chunk().await?;
        }
        self.inner.flush().await?;
        tracing::trace!(bytes = self.written, chunks = self.chunks, "response written");
        Ok(self.written)
    }

    async fn flush_chunk(&mut self) -> std::io::Result<()> {
        self.inner.write_all(&self.buf).await?;
        self.written += self.buf.len();
        self.chunks += 1;
        self.buf.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Records the size of every write it receives.
    #[derive(Default)]
    struct RecordingWriter {
        data: Vec<u8>,
        writes: Vec<usize>,
    }

    impl AsyncWrite for RecordingWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            self.data.extend_from_slice(buf);
            self.writes.push(buf.len());
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_small_body_is_one_write() {
        let mut sink = RecordingWriter::default();
        let mut writer = ChunkedWriter::new(&mut sink, 1024);
        writer.push_str("200 OK\r\n").await.unwrap();
        writer.push_str("LENGTH: 0\r\n\r\n").await.unwrap();
        let total = writer.finish().await.unwrap();

        assert_eq!(total, 21);
        assert_eq!(sink.writes, vec![21]);
    }

    #[tokio::test]
    async fn test_large_body_is_split_into_chunks() {
        let mut sink = RecordingWriter::default();
        let body: String = (0..100).map(|i| format!("line-{:04}\r\n", i)).collect();

        let mut writer = ChunkedWriter::new(&mut sink, 64);
        writer.push_str(&body).await.unwrap();
        let total = writer.finish().await.unwrap();

        assert_eq!(total, body.len());
        assert_eq!(sink.data, body.as_bytes());
        assert!(sink.writes.iter().all(|len| *len <= 64));
        assert_eq!(sink.writes.len(), body.len().div_ceil(64));
    }

    #[tokio::test]
    async fn test_exact_multiple_leaves_nothing_behind() {
        let mut sink = RecordingWriter::default();
        let mut writer = ChunkedWriter::new(&mut sink, 4);
        writer.push(b"abcdefgh").await.unwrap();
        assert_eq!(writer.finish().await.unwrap(), 8);
        assert_eq!(sink.writes, vec![4, 4]);
    }
}
