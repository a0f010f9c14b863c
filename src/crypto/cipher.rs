// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Packet cipher capability.
//!
//! The transport core never touches primitive internals; it consumes
//! the small capability set below.  `lenfield_block_len` exists for
//! schemes where recovering `packet_length` needs fewer (AEAD: 4) or
//! different bytes than a regular block; a value of `0` means "same
//! as [`PacketCipher::block_len`]".
//!
//! Keystream state is sequential: [`PacketCipher::decrypt_length`]
//! consumes exactly one length-field block of keystream, and
//! [`PacketCipher::decrypt`] continues from there.  The reassembler
//! honours this by never re-decrypting the first block.

use aes::cipher::{KeyIvInit, StreamCipher};
use enum_dispatch::enum_dispatch;

use crate::models::{
    errors::TransportError,
    packet::{DEFAULT_BLOCK_LEN, LENGTH_FIELD_LEN},
};

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

pub const CIPHER_NAME_NONE: &str = "none";
pub const CIPHER_NAME_AES256_CTR: &str = "aes256-ctr";

#[enum_dispatch]
pub trait PacketCipher {
    /// Negotiated algorithm name, for observability.
    fn name(&self) -> &'static str;

    /// Regular block size of the cipher.
    fn block_len(&self) -> usize;

    /// Bytes required to recover `packet_length`; `0` falls back to
    /// [`PacketCipher::block_len`].
    fn lenfield_block_len(&self) -> usize;

    /// Encrypt the whole clear packet region in place.
    fn encrypt(&mut self, buf: &mut [u8]) -> Result<(), TransportError>;

    /// Decrypt the tail of a packet whose first length-field block was
    /// already handled by [`PacketCipher::decrypt_length`].
    fn decrypt(&mut self, buf: &mut [u8]) -> Result<(), TransportError>;

    /// Decrypt exactly one length-field block in place and parse the
    /// big-endian `packet_length` out of its first four bytes.
    fn decrypt_length(&mut self, block: &mut [u8]) -> Result<u32, TransportError>;
}

/// Identity cipher used before the first NEWKEYS.
#[derive(Debug, Default)]
pub struct ClearCipher;

impl PacketCipher for ClearCipher {
    fn name(&self) -> &'static str {
        CIPHER_NAME_NONE
    }

    fn block_len(&self) -> usize {
        DEFAULT_BLOCK_LEN
    }

    fn lenfield_block_len(&self) -> usize {
        0
    }

    fn encrypt(&mut self, _buf: &mut [u8]) -> Result<(), TransportError> {
        Ok(())
    }

    fn decrypt(&mut self, _buf: &mut [u8]) -> Result<(), TransportError> {
        Ok(())
    }

    fn decrypt_length(&mut self, block: &mut [u8]) -> Result<u32, TransportError> {
        parse_length(block)
    }
}

/// `aes256-ctr` (RFC 4344).  The counter-mode keystream runs across
/// packet boundaries within one key epoch, so a single context per
/// direction is kept for the lifetime of the keys.  The expanded key
/// schedule is boxed to keep [`CipherKind`] variants pointer-sized.
pub struct Aes256CtrCipher {
    ctx: Box<Aes256Ctr>,
}

impl Aes256CtrCipher {
    pub const IV_LEN: usize = 16;
    pub const KEY_LEN: usize = 32;

    pub fn new_from_slices(key: &[u8], iv: &[u8]) -> Result<Self, TransportError> {
        let ctx = Aes256Ctr::new_from_slices(key, iv)
            .map_err(|_| TransportError::DecryptFailure("bad aes256-ctr key/iv"))?;
        Ok(Self { ctx: Box::new(ctx) })
    }
}

impl PacketCipher for Aes256CtrCipher {
    fn name(&self) -> &'static str {
        CIPHER_NAME_AES256_CTR
    }

    fn block_len(&self) -> usize {
        16
    }

    fn lenfield_block_len(&self) -> usize {
        0
    }

    fn encrypt(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        self.ctx.apply_keystream(buf);
        Ok(())
    }

    fn decrypt(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        self.ctx.apply_keystream(buf);
        Ok(())
    }

    fn decrypt_length(&mut self, block: &mut [u8]) -> Result<u32, TransportError> {
        if block.len() != self.block_len() {
            return Err(TransportError::DecryptFailure("short length block"));
        }
        self.ctx.apply_keystream(block);
        parse_length(block)
    }
}

#[enum_dispatch(PacketCipher)]
pub enum CipherKind {
    Clear(ClearCipher),
    Aes256Ctr(Aes256CtrCipher),
}

impl core::fmt::Debug for CipherKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "CipherKind({})", self.name())
    }
}

fn parse_length(block: &[u8]) -> Result<u32, TransportError> {
    let raw: [u8; LENGTH_FIELD_LEN] = block
        .get(..LENGTH_FIELD_LEN)
        .and_then(|b| b.try_into().ok())
        .ok_or(TransportError::DecryptFailure("short length block"))?;
    Ok(u32::from_be_bytes(raw))
}
