//! Byte-oriented wrappers over the frame layer.
//!
//! [`StreamWriter`] packs application bytes into full frames and pads the
//! last one on flush; [`StreamReader`] hands frame payloads back as a plain
//! byte stream.

use crate::domain::FrameError;
use crate::incoming::IncomingEncryptionLayer;
use crate::outgoing::OutgoingEncryptionLayer;
use tokio::io::{AsyncRead, AsyncWrite};

pub struct StreamWriter<W> {
    layer: OutgoingEncryptionLayer<W>,
    pending: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> StreamWriter<W> {
    pub fn new(layer: OutgoingEncryptionLayer<W>) -> Self {
        let capacity = layer.max_payload_length();
        Self {
            layer,
            pending: Vec::with_capacity(capacity),
        }
    }

    /// Payload bytes that can still be written, buffered bytes included.
    pub fn remaining_capacity(&self) -> u64 {
        self.layer
            .remaining_capacity()
            .saturating_sub(self.pending.len() as u64)
    }

    pub async fn write(&mut self, mut data: &[u8]) -> Result<(), FrameError> {
        let max = self.layer.max_payload_length();
        while !data.is_empty() {
            let take = (max - self.pending.len()).min(data.len());
            self.pending.extend_from_slice(&data[..take]);
            data = &data[take..];
            // A full frame is only sent once more data follows it, so the
            // last frame can still be marked final on close.
            if self.pending.len() == max && !data.is_empty() {
                self.layer.write_frame(&self.pending, false).await?;
                self.pending.clear();
            }
        }
        Ok(())
    }

    /// Send buffered bytes as a padded non-final frame and flush the transport.
    pub async fn flush(&mut self) -> Result<(), FrameError> {
        if !self.pending.is_empty() {
            self.layer.write_frame(&self.pending, false).await?;
            self.pending.clear();
        }
        self.layer.flush().await
    }

    /// Send the final frame and shut the transport writer down. A stream
    /// that never carried data stays completely silent.
    pub async fn close(mut self) -> Result<W, FrameError> {
        if !self.pending.is_empty() || self.layer.frames_written() > 0 {
            self.layer.write_frame(&self.pending, true).await?;
            self.pending.clear();
        }
        self.layer.close().await
    }
}

pub struct StreamReader<R> {
    layer: IncomingEncryptionLayer<R>,
    frame: Vec<u8>,
    offset: usize,
    length: usize,
}

impl<R: AsyncRead + Unpin> StreamReader<R> {
    pub fn new(layer: IncomingEncryptionLayer<R>, max_payload_length: usize) -> Self {
        Self {
            layer,
            frame: vec![0u8; max_payload_length],
            offset: 0,
            length: 0,
        }
    }

    /// Read up to `out.len()` bytes; `Ok(0)` marks the end of the stream.
    pub async fn read(&mut self, out: &mut [u8]) -> Result<usize, FrameError> {
        while self.offset == self.length {
            match self.layer.read_frame(&mut self.frame).await? {
                None => return Ok(0),
                Some(length) => {
                    self.offset = 0;
                    self.length = length;
                }
            }
        }
        let n = (self.length - self.offset).min(out.len());
        out[..n].copy_from_slice(&self.frame[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }

    pub async fn read_to_end(&mut self) -> Result<Vec<u8>, FrameError> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 512];
        loop {
            let n = self.read(&mut chunk).await?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }
}
