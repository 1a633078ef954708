//! Random-access adapters over sequential object streams
//!
//! SFTP reads and writes carry explicit offsets and clients are free to
//! pipeline them out of order. Object stores only offer sequential streams.
//! Both adapters bridge the gap by buffering in memory.
//!
//! Neither adapter is safe for concurrent use; callers serialize access,
//! which the SFTP session does by holding each open handle exclusively.

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncReadExt;

use crate::error::{Error, Result};
use crate::storage::{ObjectReader, ObjectWriter};

/// Random-access reader over one sequential object stream.
///
/// Bytes drained from the backend accumulate in memory and are served from
/// there on every later request, so each byte is fetched exactly once.
pub struct ReadAtBuffer {
    reader: Option<ObjectReader>,
    buffer: BytesMut,
    chunk_size: usize,
    eof: bool,
    closed: bool,
}

impl ReadAtBuffer {
    /// Wrap a sequential reader, pulling `chunk_size` bytes per backend read
    pub fn new(reader: ObjectReader, chunk_size: usize) -> Self {
        Self {
            reader: Some(reader),
            buffer: BytesMut::new(),
            chunk_size: chunk_size.max(1),
            eof: false,
            closed: false,
        }
    }

    /// Read up to `len` bytes at `offset`.
    ///
    /// Returns fewer bytes than requested only at the end of the object and
    /// fails with [`Error::EndOfData`] when `offset` is at or past the end.
    pub async fn read_at(&mut self, offset: u64, len: usize) -> Result<Bytes> {
        if self.closed {
            return Err(Error::Closed);
        }

        let end = offset.saturating_add(len as u64);
        while (self.buffer.len() as u64) < end && !self.eof {
            self.fill().await?;
        }

        let available = self.buffer.len() as u64;
        if offset >= available {
            return Err(Error::EndOfData);
        }

        let start = offset as usize;
        let stop = end.min(available) as usize;
        Ok(Bytes::copy_from_slice(&self.buffer[start..stop]))
    }

    /// Number of bytes drained from the backend so far
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the underlying stream has been read to its end
    pub fn is_complete(&self) -> bool {
        self.eof
    }

    /// Drop the backend stream and release the buffer
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        self.closed = true;
        self.reader = None;
        self.buffer = BytesMut::new();
        Ok(())
    }

    async fn fill(&mut self) -> Result<()> {
        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => {
                self.eof = true;
                return Ok(());
            }
        };

        // read_buf only ever appends bytes it has read, so a dropped
        // future leaves the buffer consistent
        self.buffer.reserve(self.chunk_size);
        let n = reader.read_buf(&mut self.buffer).await?;

        if n == 0 {
            self.eof = true;
            self.reader = None;
        }
        Ok(())
    }
}

/// Largest object a client may assemble, the S3 single-object limit
pub const MAX_OBJECT_SIZE: u64 = 5 * 1024 * 1024 * 1024 * 1024;

/// Random-access writer over one sequential object upload.
///
/// Writes land in an in-memory accumulator that starts at the flushed
/// watermark. Bytes further than `window` below the highest written offset
/// are treated as final and streamed to the backend; a later write that
/// reaches below the watermark fails with [`Error::OffsetFlushed`]. Closing
/// flushes the rest and commits the object.
pub struct WriteAtBuffer {
    writer: Option<Box<dyn ObjectWriter>>,
    buffer: BytesMut,
    flushed: u64,
    window: usize,
}

impl WriteAtBuffer {
    /// Wrap a sequential writer, seeding the object with `initial`
    pub fn new(writer: Box<dyn ObjectWriter>, initial: &[u8], window: usize) -> Self {
        Self {
            writer: Some(writer),
            buffer: BytesMut::from(initial),
            flushed: 0,
            window: window.max(1),
        }
    }

    /// Write `data` at `offset`, zero-filling any gap past the current end
    pub async fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<usize> {
        if self.writer.is_none() {
            return Err(Error::Closed);
        }
        if data.is_empty() {
            return Ok(0);
        }
        if offset < self.flushed {
            return Err(Error::OffsetFlushed {
                offset,
                flushed: self.flushed,
            });
        }

        let end = offset
            .checked_add(data.len() as u64)
            .filter(|end| *end <= MAX_OBJECT_SIZE)
            .ok_or(Error::InvalidOffset(offset))?;

        // Everything more than a window below `end` is final once this write
        // lands. Settle it before touching the buffer so a far offset never
        // materializes its gap in memory.
        let settled = end.saturating_sub(self.window as u64).min(offset);
        if settled > self.flushed {
            self.settle(settled).await?;
        }

        let start = (offset - self.flushed) as usize;
        let end = start + data.len();
        if self.buffer.len() < end {
            self.buffer.resize(end, 0);
        }
        self.buffer[start..end].copy_from_slice(data);

        if self.buffer.len() > self.window {
            let settled = self.buffer.len() - self.window;
            self.flush(settled).await?;
        }

        Ok(data.len())
    }

    /// Total object size so far, flushed and buffered
    pub fn size(&self) -> u64 {
        self.flushed + self.buffer.len() as u64
    }

    /// Offset below which bytes have been handed to the backend
    pub fn flushed(&self) -> u64 {
        self.flushed
    }

    /// Flush the remaining bytes and commit the object.
    ///
    /// May be called once; later calls fail with [`Error::Closed`].
    pub async fn close(&mut self) -> Result<()> {
        let mut writer = self.writer.take().ok_or(Error::Closed)?;
        let rest = std::mem::take(&mut self.buffer).freeze();
        if !rest.is_empty() {
            self.flushed += rest.len() as u64;
            writer.write(rest).await?;
        }
        writer.close().await
    }

    /// Hand everything below `target` to the backend, buffered bytes first
    /// and then zeros for any gap past the buffer, one window at a time
    async fn settle(&mut self, target: u64) -> Result<()> {
        let buffered = (target - self.flushed).min(self.buffer.len() as u64) as usize;
        if buffered > 0 {
            self.flush(buffered).await?;
        }

        while self.flushed < target {
            let len = (target - self.flushed).min(self.window as u64) as usize;
            let writer = self.writer.as_mut().ok_or(Error::Closed)?;
            writer.write(Bytes::from(vec![0u8; len])).await?;
            self.flushed += len as u64;
        }
        Ok(())
    }

    async fn flush(&mut self, len: usize) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(Error::Closed)?;
        let chunk = self.buffer.split_to(len).freeze();
        self.flushed += chunk.len() as u64;
        writer.write(chunk).await
    }
}
