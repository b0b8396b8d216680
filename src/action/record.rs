//! Versioned binary records for action state
//!
//! A record is a fixed header (action type, action id, format version)
//! followed by a kind-specific body. Both halves are bincode with the legacy
//! config (fixed-width little-endian integers), so the header can be read and
//! checked before the body is touched.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::ActionType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHeader {
    pub action_type: ActionType,
    pub action_id: Uuid,
    pub version: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Encode error: {0}")]
    Encode(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Record is for {found:?} {found_id}, expected {expected:?} {expected_id}")]
    IdentityMismatch {
        expected: ActionType,
        expected_id: Uuid,
        found: ActionType,
        found_id: Uuid,
    },
    #[error("Unsupported record version {found} (current {current})")]
    VersionMismatch { found: u16, current: u16 },
}

pub fn encode_record<B: Serialize>(header: &RecordHeader, body: &B) -> Result<Vec<u8>, RecordError> {
    let config = bincode::config::legacy();
    let mut bytes = bincode::serde::encode_to_vec(header, config)
        .map_err(|e| RecordError::Encode(e.to_string()))?;
    let body = bincode::serde::encode_to_vec(body, config)
        .map_err(|e| RecordError::Encode(e.to_string()))?;
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// Decode the header; returns it with the number of bytes consumed
pub fn decode_header(bytes: &[u8]) -> Result<(RecordHeader, usize), RecordError> {
    bincode::serde::decode_from_slice(bytes, bincode::config::legacy())
        .map_err(|e| RecordError::Decode(e.to_string()))
}

pub fn decode_body<B: DeserializeOwned>(bytes: &[u8]) -> Result<B, RecordError> {
    bincode::serde::decode_from_slice(bytes, bincode::config::legacy())
        .map(|(body, _)| body)
        .map_err(|e| RecordError::Decode(e.to_string()))
}

/// Check the header against the receiving action and return the body bytes
pub fn open_record<'a>(
    bytes: &'a [u8],
    expected: ActionType,
    expected_id: Uuid,
    current_version: u16,
) -> Result<&'a [u8], RecordError> {
    let (header, consumed) = decode_header(bytes)?;
    if header.action_type != expected || header.action_id != expected_id {
        return Err(RecordError::IdentityMismatch {
            expected,
            expected_id,
            found: header.action_type,
            found_id: header.action_id,
        });
    }
    if header.version != current_version {
        return Err(RecordError::VersionMismatch {
            found: header.version,
            current: current_version,
        });
    }
    Ok(&bytes[consumed..])
}
