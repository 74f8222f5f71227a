//! Domain layer: record layout, payload codec, roles and errors. No I/O.

pub mod errors;
pub mod payload_codec;
pub mod record;

pub use errors::{AbortKind, KeyAgreementError, PayloadError};
pub use payload_codec::{
    decode_payload, encode_payload, is_advertisable, Role, BLUETOOTH_TRANSPORT, LAN_TRANSPORT,
};
pub use record::{
    RecordHeader, RecordType, MAX_RECORD_PAYLOAD_LENGTH, PROTOCOL_VERSION, RECORD_HEADER_LENGTH,
};
