// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Binary packet layout constants (RFC 4253 § 6) and small wire
//! helpers shared by the reassembler, the packetizer and the default
//! handlers.
//!
//! ```text
//! uint32    packet_length   (excludes MAC and the length field itself)
//! byte      padding_length  (>= 4)
//! byte[n1]  payload         (n1 = packet_length - padding_length - 1)
//! byte[n2]  random padding  (n2 = padding_length)
//! byte[m]   mac             (m = negotiated digest length, may be 0)
//! ```

use crate::models::errors::TransportError;

/// Size of the big-endian `packet_length` prefix.
pub const LENGTH_FIELD_LEN: usize = 4;
/// Offset of the first payload byte (length field + padding byte).
pub const PAYLOAD_OFFSET: usize = LENGTH_FIELD_LEN + 1;
/// RFC 4253 § 6: at least four bytes of padding.
pub const MIN_PADDING: usize = 4;
/// Block size assumed before any cipher is negotiated.
pub const DEFAULT_BLOCK_LEN: usize = 8;
/// Hard cap on the declared packet length; anything above aborts the
/// session before further allocation.
pub const MAX_PACKET_LEN: u32 = 256 * 1024;

/// Progress record for the packet currently being reassembled.
///
/// `len` is known once the first block has been decrypted; `msg_type`
/// (and with it `valid`) only once the full packet passed decryption,
/// MAC verification and decompression.
#[derive(Debug, Default, Clone, Copy)]
pub struct IncomingPacket {
    /// Declared `packet_length` (excludes length field and MAC).
    pub len: u32,
    /// First payload byte, meaningful while `valid`.
    pub msg_type: u8,
    /// Input-slice checkpoint where this packet started, for logging.
    pub checkpoint: usize,
    /// Set once `msg_type` has been parsed out of the clear payload.
    pub valid: bool,
}

/// Read a big-endian `uint32`, advancing `off`.
pub fn read_u32(buf: &[u8], off: &mut usize) -> Result<u32, TransportError> {
    let end = off
        .checked_add(4)
        .filter(|&e| e <= buf.len())
        .ok_or(TransportError::Protocol("truncated uint32"))?;
    let v = u32::from_be_bytes(
        buf[*off..end]
            .try_into()
            .map_err(|_| TransportError::Protocol("truncated uint32"))?,
    );
    *off = end;
    Ok(v)
}

/// Read an SSH `string` (u32 length + bytes), advancing `off`.
pub fn read_string<'a>(
    buf: &'a [u8],
    off: &mut usize,
) -> Result<&'a [u8], TransportError> {
    let len = read_u32(buf, off)? as usize;
    let end = off
        .checked_add(len)
        .filter(|&e| e <= buf.len())
        .ok_or(TransportError::Protocol("truncated string"))?;
    let s = &buf[*off..end];
    *off = end;
    Ok(s)
}
