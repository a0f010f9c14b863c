// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Inbound packet reassembly.
//!
//! `Session::on_bytes` is the single entry point the byte-stream
//! transport drives.  It may be handed any fragmentation of the wire
//! stream, down to a single byte, and returns how many input bytes it
//! consumed; unconsumed bytes must be presented again once more data
//! is available.
//!
//! Three states:
//! * `Init`: nothing of the next packet is held.  Once one
//!   length-field block is available it is decrypted into the session
//!   buffer, the declared length bounds-checked, and the state moves
//!   on.
//! * `SizeRead`: the declared length is known; wait for the full
//!   remainder (body + MAC), then decrypt, verify, strip padding,
//!   decompress, filter and dispatch.
//! * `Processing`: callbacks for the current packet are running; a
//!   nested call consumes nothing.

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::{
    compress::Inflator,
    crypto::cipher::PacketCipher,
    crypto::integrity::PacketMac,
    crypto::suite::Direction,
    models::{
        errors::TransportError,
        packet::{IncomingPacket, LENGTH_FIELD_LEN, MIN_PADDING, PAYLOAD_OFFSET},
    },
    session::{Session, phases::SessionPhase},
    state_machine::filter::{self, FilterVerdict},
};

/// Reassembly automaton state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadState {
    #[default]
    Init,
    SizeRead,
    Processing,
}

impl Session {
    /// Feed received bytes into the session.  Returns the number of
    /// bytes consumed; zero means "come back with more".  After a
    /// fatal condition the session is poisoned and every further call
    /// is a no-op.
    pub fn on_bytes(&mut self, input: &[u8]) -> Result<usize, TransportError> {
        if self.session_phase() == SessionPhase::Error {
            return Ok(0);
        }
        if self.read_state == ReadState::Processing {
            // A handler is emitting into this session; it must not
            // drive reassembly underneath itself.
            return Ok(0);
        }

        let mut consumed = 0usize;
        loop {
            match self.read_state {
                ReadState::Processing => return Ok(consumed),

                ReadState::Init => {
                    let blen = self.lenfield_block_len_in();
                    if input.len() - consumed < blen {
                        return Ok(consumed);
                    }
                    self.incoming = IncomingPacket {
                        checkpoint: consumed,
                        ..IncomingPacket::default()
                    };
                    self.in_buffer.clear();
                    self.in_buffer
                        .extend_from_slice(&input[consumed..consumed + blen]);

                    let declared = match self.read_declared_length() {
                        Ok(l) => l,
                        Err(e) => return Err(self.fatal(e)),
                    };
                    trace!(declared, "first block read");

                    consumed += blen;
                    self.incoming.len = declared;
                    self.read_state = ReadState::SizeRead;
                },

                ReadState::SizeRead => {
                    let total = LENGTH_FIELD_LEN
                        + self.incoming.len as usize
                        + self.mac_len_in();
                    let need = total - self.in_buffer.len();
                    if input.len() - consumed < need {
                        return Ok(consumed);
                    }
                    self.in_buffer
                        .extend_from_slice(&input[consumed..consumed + need]);
                    consumed += need;

                    if let Err(e) = self.process_packet() {
                        return Err(self.fatal(e));
                    }
                    // A handler may have ended the session (DISCONNECT);
                    // stop consuming the rest of the stream.
                    if self.session_phase() == SessionPhase::Error {
                        return Ok(consumed);
                    }
                },
            }

            if consumed == input.len() {
                return Ok(consumed);
            }
        }
    }

    /// Decrypt the buffered length-field block and bounds-check the
    /// declared packet length.
    fn read_declared_length(&mut self) -> Result<u32, TransportError> {
        let declared = match self.keys_in.as_mut() {
            Some(keys) => keys.cipher.decrypt_length(&mut self.in_buffer[..])?,
            None => {
                let raw: [u8; LENGTH_FIELD_LEN] = self.in_buffer
                    [..LENGTH_FIELD_LEN]
                    .try_into()
                    .map_err(|_| TransportError::Protocol("short length block"))?;
                u32::from_be_bytes(raw)
            },
        };

        if declared > self.max_packet_len() {
            return Err(TransportError::OversizePacket {
                got: declared,
                cap: self.max_packet_len(),
            });
        }
        // Shortest legal packet: padding byte plus minimum padding.
        if (declared as usize) < 1 + MIN_PADDING {
            return Err(TransportError::Protocol("declared packet length too small"));
        }
        // For equal length-field and cipher blocks the encrypted region
        // must be block-aligned.
        let keys = self.keys_in.as_ref();
        let block = keys.map_or(crate::models::packet::DEFAULT_BLOCK_LEN, |k| {
            k.block_len()
        });
        let lenfield = self.lenfield_block_len_in();
        if lenfield == block
            && (LENGTH_FIELD_LEN + declared as usize) % block != 0
        {
            return Err(TransportError::Protocol(
                "packet length not a multiple of the cipher block size",
            ));
        }
        Ok(declared)
    }

    /// The full packet is buffered: decrypt, verify, strip, inflate,
    /// filter, dispatch.  Leaves the automaton back in `Init`.
    fn process_packet(&mut self) -> Result<(), TransportError> {
        let declared = self.incoming.len as usize;
        let clear_len = LENGTH_FIELD_LEN + declared;
        let maclen = self.mac_len_in();
        let already = self.lenfield_block_len_in();
        let seq = self.recv_seq;

        if let Some(keys) = self.keys_in.as_mut() {
            let buf: &mut [u8] = &mut self.in_buffer;
            let (clear, tag) = buf.split_at_mut(clear_len);
            if clear_len > already {
                keys.cipher.decrypt(&mut clear[already..])?;
            }
            keys.mac.verify(seq, clear, &tag[..maclen])?;
        }

        let padding = usize::from(self.in_buffer[LENGTH_FIELD_LEN]);
        if padding < MIN_PADDING || padding + 1 > declared {
            return Err(TransportError::InvalidPadding {
                padding: padding as u8,
                packet: declared as u32,
            });
        }
        let payload_len = declared - padding - 1;

        let raw_payload =
            &self.in_buffer[PAYLOAD_OFFSET..PAYLOAD_OFFSET + payload_len];
        let compressed = self.keys_in.as_ref().is_some_and(|k| k.compression);
        let payload: Bytes = if compressed && payload_len > 0 {
            let maxlen = self.max_packet_len() as usize;
            let inflator = self.inflator.get_or_insert_with(Inflator::new);
            Bytes::from(inflator.decompress(raw_payload, maxlen)?)
        } else {
            Bytes::copy_from_slice(raw_payload)
        };

        // The packet is accepted from here on: the sequence number
        // advances no matter what the dispatcher decides.
        self.recv_seq = self.recv_seq.wrapping_add(1);

        let Some(&msg_type) = payload.first() else {
            return Err(TransportError::Protocol("empty packet payload"));
        };
        self.incoming.msg_type = msg_type;
        self.incoming.valid = true;
        debug!(seq, msg_type, payload_len = payload.len(), "packet accepted");

        self.accounting
            .record_packet(Direction::Inbound, clear_len + maclen, seq, &payload);

        match filter::classify(self, msg_type) {
            FilterVerdict::Denied => {
                warn!(msg_type, phase = ?self.session_phase(), "packet denied by filter");
                return Err(TransportError::FilterDenied { msg_type });
            },
            FilterVerdict::Unknown => {
                debug!(msg_type, "unfiltered type, replying UNIMPLEMENTED");
                self.send_unimplemented(seq)?;
            },
            FilterVerdict::Allowed => {
                let body = payload.slice(1..);
                self.read_state = ReadState::Processing;
                self.in_payload = body.clone();
                let res = self.dispatch_packet(msg_type, &body, seq);
                self.in_payload = Bytes::new();
                res?;
            },
        }

        self.in_buffer.clear();
        self.incoming = IncomingPacket::default();
        self.read_state = ReadState::Init;
        Ok(())
    }
}
