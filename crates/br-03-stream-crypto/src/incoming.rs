//! Incoming half of the frame encryption layer.

use crate::domain::{
    frame_aad, frame_iv, FrameError, FrameHeader, HEADER_LENGTH, MAX_FRAMES,
};
use shared_crypto::{FrameCipher, MAC_LENGTH};
use shared_types::{SecretKey, Tag, TAG_LENGTH};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

/// Read the plaintext tag that precedes an initiator's first frame.
pub async fn read_tag<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Tag, FrameError> {
    let mut tag = [0u8; TAG_LENGTH];
    match reader.read_exact(&mut tag).await {
        Ok(_) => Ok(tag),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(FrameError::Truncated),
        Err(e) => Err(e.into()),
    }
}

/// Decrypts frames from a transport reader. The tag, if any, must already
/// have been consumed (see [`read_tag`]).
pub struct IncomingEncryptionLayer<R> {
    reader: R,
    cipher: FrameCipher,
    frame_length: usize,
    frame_number: u64,
    finished: bool,
}

impl<R: AsyncRead + Unpin> IncomingEncryptionLayer<R> {
    pub fn new(reader: R, frame_key: &SecretKey, frame_length: usize) -> Self {
        Self {
            reader,
            cipher: FrameCipher::new(frame_key),
            frame_length,
            frame_number: 0,
            finished: false,
        }
    }

    /// Has the final frame been read?
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Read and authenticate the next frame, copying its payload into `buf`.
    ///
    /// Returns the payload length, or `None` once the final frame has been
    /// consumed.
    pub async fn read_frame(&mut self, buf: &mut [u8]) -> Result<Option<usize>, FrameError> {
        if self.finished {
            return Ok(None);
        }
        if self.frame_number >= MAX_FRAMES {
            return Err(FrameError::FrameCounterExhausted);
        }
        // Checked above: frame_number < 2^32.
        let frame_number = self.frame_number as u32;

        let mut ciphertext = vec![0u8; self.frame_length];
        let length = self.fill(&mut ciphertext).await?;
        if length == 0 {
            return Err(FrameError::UnexpectedEnd);
        }
        if length < HEADER_LENGTH + MAC_LENGTH {
            return Err(FrameError::Truncated);
        }
        let ciphertext = &ciphertext[..length];

        let aad = frame_aad(frame_number, length - MAC_LENGTH);
        let plaintext = self
            .cipher
            .open(&frame_iv(frame_number), &aad, ciphertext)
            .map_err(|_| FrameError::BadMac)?;

        let header = FrameHeader::decode(&plaintext)?;
        let available = plaintext.len() - HEADER_LENGTH;
        if header.payload_length + header.padding_length != available {
            return Err(FrameError::InvalidHeader {
                payload: header.payload_length,
                padding: header.padding_length,
                available,
            });
        }
        if !header.is_final && length < self.frame_length {
            return Err(FrameError::ShortNonFinalFrame { length });
        }
        let payload_end = HEADER_LENGTH + header.payload_length;
        if plaintext[payload_end..].iter().any(|&b| b != 0) {
            return Err(FrameError::NonZeroPadding);
        }
        if buf.len() < header.payload_length {
            return Err(FrameError::BufferTooSmall {
                needed: header.payload_length,
                available: buf.len(),
            });
        }
        buf[..header.payload_length].copy_from_slice(&plaintext[HEADER_LENGTH..payload_end]);

        self.frame_number += 1;
        self.finished = header.is_final;
        trace!(
            frame = frame_number,
            payload = header.payload_length,
            is_final = header.is_final,
            "Frame read"
        );
        Ok(Some(header.payload_length))
    }

    /// Read until `buf` is full or the stream ends; returns bytes read.
    async fn fill(&mut self, buf: &mut [u8]) -> Result<usize, FrameError> {
        let mut offset = 0;
        while offset < buf.len() {
            let n = self.reader.read(&mut buf[offset..]).await?;
            if n == 0 {
                break;
            }
            offset += n;
        }
        Ok(offset)
    }
}
