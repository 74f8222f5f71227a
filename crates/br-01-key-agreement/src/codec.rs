//! # Record Codec
//!
//! Reads and writes handshake records over a key-agreement connection.
//!
//! Reading a record when a given type is expected:
//!
//! | Received | Result |
//! |----------|--------|
//! | other version | abort, `VersionMismatch` |
//! | `ABORT` | abort, marked as received from the peer |
//! | expected type | payload |
//! | `KEY`/`CONFIRM` (not expected) | abort, `UnexpectedRecord` |
//! | unknown type | skipped |

use crate::connection::KeyAgreementConnection;
use crate::domain::{
    AbortKind, KeyAgreementError, RecordHeader, RecordType, PROTOCOL_VERSION,
    RECORD_HEADER_LENGTH,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Write one record and flush.
pub async fn write_record<W>(
    writer: &mut W,
    record_type: RecordType,
    payload: &[u8],
) -> Result<(), KeyAgreementError>
where
    W: AsyncWrite + Unpin + Send,
{
    let length = u16::try_from(payload.len())
        .map_err(|_| KeyAgreementError::abort(AbortKind::Malformed))?;
    let header = RecordHeader {
        version: PROTOCOL_VERSION,
        record_type: record_type.as_byte(),
        length,
    };
    writer.write_all(&header.encode()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read records until one of type `expected` arrives.
pub async fn read_record<R>(
    reader: &mut R,
    expected: RecordType,
) -> Result<Vec<u8>, KeyAgreementError>
where
    R: AsyncRead + Unpin + Send,
{
    loop {
        let mut header = [0u8; RECORD_HEADER_LENGTH];
        reader.read_exact(&mut header).await?;
        let header = RecordHeader::parse(&header);
        if header.version != PROTOCOL_VERSION {
            debug!(version = header.version, "Peer speaks another protocol version");
            return Err(KeyAgreementError::abort(AbortKind::VersionMismatch));
        }

        let mut payload = vec![0u8; usize::from(header.length)];
        reader.read_exact(&mut payload).await?;

        match RecordType::from_byte(header.record_type) {
            Some(RecordType::Abort) => {
                return Err(KeyAgreementError::Abort {
                    kind: AbortKind::PeerAborted,
                    received: true,
                })
            }
            Some(t) if t == expected => return Ok(payload),
            Some(t) => {
                debug!(expected = ?expected, received = ?t, "Unexpected record");
                return Err(KeyAgreementError::abort(AbortKind::UnexpectedRecord));
            }
            None => {
                debug!(record_type = header.record_type, "Skipping unknown record");
            }
        }
    }
}

/// Typed record exchange over the chosen connection.
#[derive(Debug)]
pub struct HandshakeTransport {
    connection: KeyAgreementConnection,
}

impl HandshakeTransport {
    pub fn new(connection: KeyAgreementConnection) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &KeyAgreementConnection {
        &self.connection
    }

    pub fn into_connection(self) -> KeyAgreementConnection {
        self.connection
    }

    pub async fn send_key(&mut self, key: &[u8]) -> Result<(), KeyAgreementError> {
        write_record(&mut self.connection, RecordType::Key, key).await
    }

    pub async fn receive_key(&mut self) -> Result<Vec<u8>, KeyAgreementError> {
        read_record(&mut self.connection, RecordType::Key).await
    }

    pub async fn send_confirm(&mut self, confirm: &[u8]) -> Result<(), KeyAgreementError> {
        write_record(&mut self.connection, RecordType::Confirm, confirm).await
    }

    pub async fn receive_confirm(&mut self) -> Result<Vec<u8>, KeyAgreementError> {
        read_record(&mut self.connection, RecordType::Confirm).await
    }

    /// Best-effort abort record followed by disposal.
    pub async fn abort(mut self, exception: bool) {
        if let Err(e) = write_record(&mut self.connection, RecordType::Abort, &[]).await {
            warn!(
                connection = self.connection.id(),
                error = %e,
                "Failed to send abort record"
            );
        }
        self.connection.dispose(exception, false).await;
    }
}
