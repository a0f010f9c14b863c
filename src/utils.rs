// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use rand::RngExt;

/// Fill `buf` with cryptographically random padding bytes.
///
/// The thread-local generator is a CSPRNG, which is what RFC 4253 § 6
/// asks of padding once encryption is active.
pub fn fill_random(buf: &mut [u8]) {
    rand::rng().fill(buf);
}
