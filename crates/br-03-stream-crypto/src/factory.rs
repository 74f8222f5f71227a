//! Builds encryption layers from a connection context.
//!
//! Keys are named after the role (Alice or Bob) of the party that initiated
//! the connection and the direction of travel, so the two ends of one
//! connection derive the same key for each direction:
//!
//! | Local side | Writes with | Reads with |
//! |------------|-------------|------------|
//! | initiator  | (own role, initiator→responder) + tag | (own role, responder→initiator) |
//! | responder  | (peer role, responder→initiator) | (peer role, initiator→responder) |

use crate::config::FrameConfig;
use crate::domain::{max_payload_length, FrameError};
use crate::incoming::IncomingEncryptionLayer;
use crate::outgoing::OutgoingEncryptionLayer;
use crate::stream::{StreamReader, StreamWriter};
use shared_crypto::{derive_frame_key, derive_tag_key, encode_tag};
use shared_types::ConnectionContext;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct StreamFactory {
    config: FrameConfig,
}

impl StreamFactory {
    pub fn new(config: FrameConfig) -> Result<Self, FrameError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Outgoing layer for `ctx`. Only the initiator prefixes a tag.
    pub fn create_outgoing<W: AsyncWrite + Unpin>(
        &self,
        ctx: &ConnectionContext,
        writer: W,
        we_initiated: bool,
        capacity: u64,
    ) -> Result<OutgoingEncryptionLayer<W>, FrameError> {
        let initiator_alice = if we_initiated { ctx.alice } else { !ctx.alice };
        let connection = u64::from(ctx.connection);
        let frame_key = derive_frame_key(&ctx.secret, connection, initiator_alice, we_initiated)?;
        let tag = if we_initiated {
            let tag_key = derive_tag_key(&ctx.secret, ctx.alice)?;
            Some(encode_tag(&tag_key, connection)?)
        } else {
            None
        };
        debug!(
            contact = %ctx.contact,
            transport = %ctx.transport,
            connection = ctx.connection,
            we_initiated,
            "Creating outgoing stream"
        );
        Ok(OutgoingEncryptionLayer::new(
            writer,
            &frame_key,
            tag,
            self.config.frame_length,
            capacity,
        ))
    }

    /// Incoming layer for `ctx`. On the responder side the caller must have
    /// read the tag already.
    pub fn create_incoming<R: AsyncRead + Unpin>(
        &self,
        ctx: &ConnectionContext,
        reader: R,
        we_initiated: bool,
    ) -> Result<IncomingEncryptionLayer<R>, FrameError> {
        let initiator_alice = if we_initiated { ctx.alice } else { !ctx.alice };
        let frame_key = derive_frame_key(
            &ctx.secret,
            u64::from(ctx.connection),
            initiator_alice,
            !we_initiated,
        )?;
        debug!(
            contact = %ctx.contact,
            transport = %ctx.transport,
            connection = ctx.connection,
            we_initiated,
            "Creating incoming stream"
        );
        Ok(IncomingEncryptionLayer::new(
            reader,
            &frame_key,
            self.config.frame_length,
        ))
    }

    pub fn create_writer<W: AsyncWrite + Unpin>(
        &self,
        ctx: &ConnectionContext,
        writer: W,
        we_initiated: bool,
        capacity: u64,
    ) -> Result<StreamWriter<W>, FrameError> {
        Ok(StreamWriter::new(self.create_outgoing(
            ctx,
            writer,
            we_initiated,
            capacity,
        )?))
    }

    pub fn create_reader<R: AsyncRead + Unpin>(
        &self,
        ctx: &ConnectionContext,
        reader: R,
        we_initiated: bool,
    ) -> Result<StreamReader<R>, FrameError> {
        Ok(StreamReader::new(
            self.create_incoming(ctx, reader, we_initiated)?,
            max_payload_length(self.config.frame_length),
        ))
    }
}
