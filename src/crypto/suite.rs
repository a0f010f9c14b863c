// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Negotiated cipher suite: one keyed (cipher, MAC, compression) half
//! per direction.
//!
//! NEWKEYS activates the two halves at different times: the inbound
//! half when the peer's NEWKEYS arrives, the outbound half right after
//! our own NEWKEYS is sent.  A staged suite therefore hands out its
//! halves independently and reports when it is drained.

use crate::crypto::{
    cipher::{CipherKind, ClearCipher, PacketCipher},
    integrity::{MacKind, NoMac, PacketMac},
};

/// Direction of travel, used by counters and the capture sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Keys and policy applied to one direction of the stream.
pub struct DirectionKeys {
    pub cipher: CipherKind,
    pub mac: MacKind,
    /// Payload compression negotiated for this direction.
    pub compression: bool,
}

impl DirectionKeys {
    /// Identity keys for the plaintext phase.
    pub fn cleartext() -> Self {
        Self {
            cipher: CipherKind::Clear(ClearCipher),
            mac: MacKind::None(NoMac),
            compression: false,
        }
    }

    /// Effective block count needed to recover `packet_length`:
    /// the cipher's declared length-field block, falling back to its
    /// regular block size when that is zero.
    #[inline]
    pub fn lenfield_block_len(&self) -> usize {
        match self.cipher.lenfield_block_len() {
            0 => self.cipher.block_len(),
            n => n,
        }
    }

    #[inline]
    pub fn block_len(&self) -> usize {
        self.cipher.block_len()
    }

    #[inline]
    pub fn mac_len(&self) -> usize {
        self.mac.digest_len()
    }
}

impl core::fmt::Debug for DirectionKeys {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DirectionKeys")
            .field("cipher", &self.cipher.name())
            .field("mac", &self.mac.name())
            .field("compression", &self.compression)
            .finish()
    }
}

/// Both halves of a freshly negotiated suite, staged until NEWKEYS.
#[derive(Debug)]
pub struct CipherSuite {
    inbound: Option<DirectionKeys>,
    outbound: Option<DirectionKeys>,
}

impl CipherSuite {
    pub fn new(inbound: DirectionKeys, outbound: DirectionKeys) -> Self {
        Self {
            inbound: Some(inbound),
            outbound: Some(outbound),
        }
    }

    pub fn take_inbound(&mut self) -> Option<DirectionKeys> {
        self.inbound.take()
    }

    pub fn take_outbound(&mut self) -> Option<DirectionKeys> {
        self.outbound.take()
    }

    /// Both halves have been activated.
    pub fn is_drained(&self) -> bool {
        self.inbound.is_none() && self.outbound.is_none()
    }
}
