//! Outgoing half of the frame encryption layer.

use crate::domain::{
    frame_aad, frame_iv, max_payload_length, FrameError, FrameHeader, HEADER_LENGTH, MAX_FRAMES,
};
use shared_crypto::FrameCipher;
use shared_types::{SecretKey, Tag, TAG_LENGTH};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Encrypts frames onto a transport writer.
///
/// If constructed with a tag, the tag is written in the clear immediately
/// before the first frame. A layer that is closed without ever writing a
/// frame writes nothing at all, tag included.
pub struct OutgoingEncryptionLayer<W> {
    writer: W,
    cipher: FrameCipher,
    tag: Option<Tag>,
    frame_length: usize,
    capacity: u64,
    frame_number: u64,
    finished: bool,
}

impl<W: AsyncWrite + Unpin> OutgoingEncryptionLayer<W> {
    /// `capacity` is the transport's byte budget for this stream, tag included.
    pub fn new(
        writer: W,
        frame_key: &SecretKey,
        tag: Option<Tag>,
        frame_length: usize,
        capacity: u64,
    ) -> Self {
        Self {
            writer,
            cipher: FrameCipher::new(frame_key),
            tag,
            frame_length,
            capacity,
            frame_number: 0,
            finished: false,
        }
    }

    pub fn max_payload_length(&self) -> usize {
        max_payload_length(self.frame_length)
    }

    /// Number of frames written so far.
    pub fn frames_written(&self) -> u64 {
        self.frame_number
    }

    /// Payload bytes that can still be sent in full frames, bounded by the
    /// byte budget (less the tag if it is still pending) and by the frame
    /// numbers left.
    pub fn remaining_capacity(&self) -> u64 {
        if self.finished {
            return 0;
        }
        let mut bytes = self.capacity;
        if self.tag.is_some() {
            bytes = bytes.saturating_sub(TAG_LENGTH as u64);
        }
        let frames = (bytes / self.frame_length as u64).min(MAX_FRAMES - self.frame_number);
        frames * self.max_payload_length() as u64
    }

    /// Encrypt and write one frame.
    ///
    /// Non-final frames are padded with zeroes to the full frame length;
    /// the final frame carries no padding.
    pub async fn write_frame(&mut self, payload: &[u8], is_final: bool) -> Result<(), FrameError> {
        if self.finished {
            return Err(FrameError::AfterFinal);
        }
        let max = self.max_payload_length();
        if payload.len() > max {
            return Err(FrameError::PayloadTooLong {
                length: payload.len(),
                max,
            });
        }
        if self.frame_number >= MAX_FRAMES {
            return Err(FrameError::FrameCounterExhausted);
        }
        // Checked above: frame_number < 2^32.
        let frame_number = self.frame_number as u32;

        let header = FrameHeader {
            payload_length: payload.len(),
            padding_length: if is_final { 0 } else { max - payload.len() },
            is_final,
        };
        let mut plaintext =
            Vec::with_capacity(HEADER_LENGTH + header.payload_length + header.padding_length);
        plaintext.extend_from_slice(&header.encode());
        plaintext.extend_from_slice(payload);
        plaintext.resize(plaintext.len() + header.padding_length, 0);

        let aad = frame_aad(frame_number, plaintext.len());
        let ciphertext = self.cipher.seal(&frame_iv(frame_number), &aad, &plaintext)?;

        let tag_length = if self.tag.is_some() { TAG_LENGTH } else { 0 };
        let needed = (tag_length + ciphertext.len()) as u64;
        if needed > self.capacity {
            return Err(FrameError::CapacityExceeded {
                needed,
                remaining: self.capacity,
            });
        }

        if let Some(tag) = self.tag.take() {
            self.writer.write_all(&tag).await?;
        }
        self.writer.write_all(&ciphertext).await?;

        self.capacity -= needed;
        self.frame_number += 1;
        self.finished = is_final;
        trace!(frame = frame_number, payload = payload.len(), is_final, "Frame written");
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), FrameError> {
        self.writer.flush().await?;
        Ok(())
    }

    /// Finish the stream and shut the writer down.
    ///
    /// Writes an empty final frame if frames were sent but none was final.
    /// If nothing was ever written, the stream stays empty.
    pub async fn close(mut self) -> Result<W, FrameError> {
        if self.frame_number > 0 && !self.finished {
            self.write_frame(&[], true).await?;
        }
        self.writer.flush().await?;
        self.writer.shutdown().await?;
        Ok(self.writer)
    }
}
