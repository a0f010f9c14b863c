// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Error kinds surfaced by the transport core.
//!
//! Everything except [`TransportError::Again`] is fatal to the session:
//! the reassembler stores the message on the session, flips the session
//! phase to `Error` and refuses further input.  `Again` is the single
//! recoverable condition (not enough bytes / socket not writable) and
//! never leaves the transport entry points as an `Err`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// Declared packet length exceeds the negotiated cap.
    #[error("packet length {got} exceeds maximum {cap}")]
    OversizePacket { got: u32, cap: u32 },

    /// Padding length field inconsistent with the packet length.
    #[error("invalid padding length {padding} for packet length {packet}")]
    InvalidPadding { padding: u8, packet: u32 },

    /// MAC verification failed on an inbound packet.
    #[error("packet integrity check failed")]
    MacFailure,

    /// Cipher refused the buffer (bad alignment, short block).
    #[error("decryption failed: {0}")]
    DecryptFailure(&'static str),

    /// Inflation produced more than the allowed number of bytes.
    #[error("decompressed payload exceeds {maxlen} bytes")]
    DecompressionOverflow { maxlen: usize },

    /// The underlying zlib stream reported an error.
    #[error("compression stream error: {0}")]
    Compression(String),

    /// The incoming filter classified the packet as forbidden in the
    /// current session phase.
    #[error("message type {msg_type} denied in current session phase")]
    FilterDenied { msg_type: u8 },

    /// A protocol field was structurally invalid.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    /// Illegal session phase transition was requested.
    #[error("invalid session phase transition: {0}")]
    PhaseViolation(&'static str),

    /// Transient: not enough input bytes, or the peer socket is not
    /// writable.  Retry later with more data.
    #[error("resource temporarily unavailable")]
    Again,
}

impl TransportError {
    /// All conditions except [`TransportError::Again`] poison the
    /// session.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::Again)
    }
}
