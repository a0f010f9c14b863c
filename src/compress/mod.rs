// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Streaming payload compression (RFC 4253 § 6.2, `zlib`).
//!
//! One context per direction lives for the rest of the session once
//! created; the dictionary built by earlier packets is required to
//! decode later ones, so contexts are never reset between packets or
//! across a rekey.  Packets are emitted with a partial flush so each
//! one is decodable on its own without terminating the stream.
//!
//! Inflation is bounded by a caller-supplied `maxlen`; the output
//! buffer never reserves past that cap, so a decompression bomb fails
//! before the memory is ever requested.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::models::errors::TransportError;

/// Initial output reservation for either direction.
const CHUNK: usize = 4 * 1024;

/// Outbound streaming context.
pub struct Deflator {
    ctx: Compress,
}

impl Default for Deflator {
    fn default() -> Self {
        Self::new()
    }
}

impl Deflator {
    pub fn new() -> Self {
        Self {
            ctx: Compress::new(Compression::default(), true),
        }
    }

    /// Compress one packet payload, partial-flushing so the peer can
    /// decode it immediately.
    pub fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>, TransportError> {
        let mut out = Vec::with_capacity(input.len() / 2 + 64);
        let mut pos = 0usize;

        loop {
            if out.len() == out.capacity() {
                out.reserve(out.capacity().max(CHUNK));
            }
            let before_in = self.ctx.total_in();
            let status = self
                .ctx
                .compress_vec(&input[pos..], &mut out, FlushCompress::Partial)
                .map_err(|e| TransportError::Compression(e.to_string()))?;
            pos += (self.ctx.total_in() - before_in) as usize;

            match status {
                Status::StreamEnd => break,
                Status::Ok | Status::BufError => {
                    // The flush is complete once all input is consumed
                    // and deflate returned with output space left over.
                    if pos == input.len() && out.len() < out.capacity() {
                        break;
                    }
                },
            }
        }
        Ok(out)
    }
}

/// Inbound streaming context.
pub struct Inflator {
    ctx: Decompress,
}

impl Default for Inflator {
    fn default() -> Self {
        Self::new()
    }
}

impl Inflator {
    pub fn new() -> Self {
        Self {
            ctx: Decompress::new(true),
        }
    }

    /// Inflate one packet payload, refusing to produce more than
    /// `maxlen` bytes.  An exhausted input is the normal terminal
    /// condition; a stalled stream or an over-cap expansion is fatal.
    pub fn decompress(
        &mut self,
        input: &[u8],
        maxlen: usize,
    ) -> Result<Vec<u8>, TransportError> {
        let want = input.len().saturating_mul(2).max(64).min(CHUNK);
        let mut out = Vec::with_capacity(want.min(maxlen));
        let mut pos = 0usize;

        loop {
            if out.len() == out.capacity() {
                if out.capacity() >= maxlen {
                    return Err(TransportError::DecompressionOverflow { maxlen });
                }
                let grow = out.capacity().max(CHUNK).min(maxlen - out.capacity());
                out.reserve_exact(grow);
            }
            let before_in = self.ctx.total_in();
            let before_out = self.ctx.total_out();
            let status = self
                .ctx
                .decompress_vec(&input[pos..], &mut out, FlushDecompress::Sync)
                .map_err(|e| TransportError::Compression(e.to_string()))?;
            pos += (self.ctx.total_in() - before_in) as usize;
            let wrote = (self.ctx.total_out() - before_out) as usize;

            match status {
                Status::StreamEnd => break,
                Status::Ok => {
                    if pos == input.len() && out.len() < out.capacity() {
                        break;
                    }
                },
                Status::BufError => {
                    if pos == input.len() && out.len() < out.capacity() {
                        break;
                    }
                    // No input progress and no output progress with
                    // room available: the stream is stuck.
                    if wrote == 0 && out.len() < out.capacity() {
                        return Err(TransportError::Compression(
                            "inflate stalled mid-packet".into(),
                        ));
                    }
                },
            }
        }

        if out.len() > maxlen {
            return Err(TransportError::DecompressionOverflow { maxlen });
        }
        Ok(out)
    }
}
