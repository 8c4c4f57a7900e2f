//! Binary packet framing for the Protect update stream.
//!
//! Raw (non-zlib) deflate decompression and an oversized-frame
//! rejection guard against a misbehaving or malicious controller.

use std::io::Read;

use flate2::read::DeflateDecoder;
use serde::Deserialize;

use crate::error::{ProtectError, Result};

const PACKET_TYPE_ACTION: u8 = 1;
const PACKET_TYPE_PAYLOAD: u8 = 2;

const FORMAT_JSON: u8 = 1;
const FORMAT_UTF8: u8 = 2;
const FORMAT_DEFLATE_JSON: u8 = 3;

const HEADER_LEN: usize = 8;
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// The parsed action header: `{action, newUpdateId, modelKey, id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionHeader {
    pub action: Action,
    pub new_update_id: String,
    pub model_key: crate::model::ModelKey,
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Add,
    Update,
    Remove,
}

/// A fully decoded application packet: the action header plus the raw
/// payload bytes (already decompressed). The payload is empty for
/// `remove`.
#[derive(Debug, Clone)]
pub struct Packet {
    pub header: ActionHeader,
    pub payload: Vec<u8>,
}

struct FrameHeader {
    packet_type: u8,
    format: u8,
    deflate: bool,
    payload_len: u32,
}

impl FrameHeader {
    fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(ProtectError::Protocol(
                "frame header shorter than 8 bytes".to_string(),
            ));
        }
        let payload_len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Ok(Self {
            packet_type: bytes[0],
            format: bytes[1],
            deflate: bytes[2] == 1,
            payload_len,
        })
    }
}

/// Decodes one application-level packet, which is two framed segments
/// back to back: an action frame (`packet_type == 1`) followed by a
/// payload frame (`packet_type == 2`). Returns the byte offset the next
/// packet starts at, so callers can decode back-to-back packets sharing
/// one WebSocket message if the controller ever batches them.
pub fn decode_packet(data: &[u8]) -> Result<(Packet, usize)> {
    let action_header = FrameHeader::parse(data)?;
    if action_header.packet_type != PACKET_TYPE_ACTION {
        return Err(ProtectError::Protocol(format!(
            "expected action frame (type 1), got type {}",
            action_header.packet_type
        )));
    }
    check_frame_len(action_header.payload_len)?;

    let action_start = HEADER_LEN;
    let action_end = action_start + action_header.payload_len as usize;
    if data.len() < action_end {
        return Err(ProtectError::Protocol(
            "truncated action frame payload".to_string(),
        ));
    }
    let action_bytes = decode_segment(&data[action_start..action_end], &action_header)?;
    let header: ActionHeader = serde_json::from_slice(&action_bytes)?;

    if data.len() < action_end + HEADER_LEN {
        return Err(ProtectError::Protocol(
            "truncated payload frame header".to_string(),
        ));
    }
    let payload_header = FrameHeader::parse(&data[action_end..action_end + HEADER_LEN])?;
    if payload_header.packet_type != PACKET_TYPE_PAYLOAD {
        return Err(ProtectError::Protocol(format!(
            "expected payload frame (type 2), got type {}",
            payload_header.packet_type
        )));
    }
    check_frame_len(payload_header.payload_len)?;

    let payload_start = action_end + HEADER_LEN;
    let payload_end = payload_start + payload_header.payload_len as usize;
    if data.len() < payload_end {
        return Err(ProtectError::Protocol(
            "truncated payload frame payload".to_string(),
        ));
    }
    let payload = if payload_header.payload_len == 0 {
        Vec::new()
    } else {
        decode_segment(&data[payload_start..payload_end], &payload_header)?
    };

    Ok((Packet { header, payload }, payload_end))
}

fn check_frame_len(len: u32) -> Result<()> {
    if len as usize > MAX_FRAME_LEN {
        return Err(ProtectError::Protocol(format!(
            "frame payload {len} bytes exceeds {MAX_FRAME_LEN} byte limit"
        )));
    }
    Ok(())
}

fn decode_segment(bytes: &[u8], header: &FrameHeader) -> Result<Vec<u8>> {
    let raw = if header.deflate || header.format == FORMAT_DEFLATE_JSON {
        let mut decoder = DeflateDecoder::new(bytes);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| ProtectError::Protocol(format!("deflate decode failed: {e}")))?;
        out
    } else {
        bytes.to_vec()
    };

    match header.format {
        FORMAT_JSON | FORMAT_UTF8 | FORMAT_DEFLATE_JSON => Ok(raw),
        other => Err(ProtectError::Protocol(format!(
            "unrecognized payload format {other}"
        ))),
    }
}
