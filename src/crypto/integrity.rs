// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Packet integrity capability.
//!
//! The MAC is keyed HMAC over `be32(sequence_number) || clear packet
//! bytes` (RFC 4253 § 6.4).  Verification always compares the full
//! digest in constant time.

use enum_dispatch::enum_dispatch;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::models::errors::TransportError;

type HmacSha256 = Hmac<Sha256>;

pub const MAC_NAME_NONE: &str = "none";
pub const MAC_NAME_HMAC_SHA256: &str = "hmac-sha2-256";

#[enum_dispatch]
pub trait PacketMac {
    /// Negotiated algorithm name, for observability.
    fn name(&self) -> &'static str;

    /// Digest length appended to each packet; `0` for no MAC.
    fn digest_len(&self) -> usize;

    /// Compute the tag for an outbound packet into `tag_out`.
    fn sign(
        &self,
        seq: u32,
        clear: &[u8],
        tag_out: &mut [u8],
    ) -> Result<(), TransportError>;

    /// Verify an inbound tag.  Fails with
    /// [`TransportError::MacFailure`].
    fn verify(&self, seq: u32, clear: &[u8], tag: &[u8])
    -> Result<(), TransportError>;
}

/// No integrity protection (plaintext phase).
#[derive(Debug, Default)]
pub struct NoMac;

impl PacketMac for NoMac {
    fn name(&self) -> &'static str {
        MAC_NAME_NONE
    }

    fn digest_len(&self) -> usize {
        0
    }

    fn sign(&self, _: u32, _: &[u8], _: &mut [u8]) -> Result<(), TransportError> {
        Ok(())
    }

    fn verify(&self, _: u32, _: &[u8], tag: &[u8]) -> Result<(), TransportError> {
        if tag.is_empty() {
            Ok(())
        } else {
            Err(TransportError::MacFailure)
        }
    }
}

/// `hmac-sha2-256` (RFC 6668).
pub struct HmacSha256Mac {
    key: [u8; 32],
}

impl HmacSha256Mac {
    pub const KEY_LEN: usize = 32;

    pub fn new_from_slice(key: &[u8]) -> Result<Self, TransportError> {
        let key: [u8; 32] = key
            .try_into()
            .map_err(|_| TransportError::DecryptFailure("bad hmac key length"))?;
        Ok(Self { key })
    }

    fn compute(&self, seq: u32, clear: &[u8]) -> Result<[u8; 32], TransportError> {
        let mut h = HmacSha256::new_from_slice(&self.key)
            .map_err(|_| TransportError::DecryptFailure("bad hmac key length"))?;
        h.update(&seq.to_be_bytes());
        h.update(clear);
        Ok(h.finalize().into_bytes().into())
    }
}

impl PacketMac for HmacSha256Mac {
    fn name(&self) -> &'static str {
        MAC_NAME_HMAC_SHA256
    }

    fn digest_len(&self) -> usize {
        32
    }

    fn sign(
        &self,
        seq: u32,
        clear: &[u8],
        tag_out: &mut [u8],
    ) -> Result<(), TransportError> {
        let tag = self.compute(seq, clear)?;
        tag_out
            .get_mut(..tag.len())
            .ok_or(TransportError::Protocol("mac output buffer too small"))?
            .copy_from_slice(&tag);
        Ok(())
    }

    fn verify(
        &self,
        seq: u32,
        clear: &[u8],
        tag: &[u8],
    ) -> Result<(), TransportError> {
        let expected = self.compute(seq, clear)?;
        if tag.len() == expected.len() && bool::from(expected[..].ct_eq(tag)) {
            Ok(())
        } else {
            Err(TransportError::MacFailure)
        }
    }
}

#[enum_dispatch(PacketMac)]
pub enum MacKind {
    None(NoMac),
    HmacSha256(HmacSha256Mac),
}

impl core::fmt::Debug for MacKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "MacKind({})", self.name())
    }
}
