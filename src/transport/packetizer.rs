// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Outbound packet construction: compress, pad, MAC, encrypt, queue.
//!
//! Hosts stage payload bytes with [`Session::stage`] and seal them
//! into one binary packet with [`Session::send_staged`]; the finished
//! wire bytes land in the session's outbound queue for the I/O
//! adapter to drain.  Partial socket writes are the adapter's problem
//! (the queue survives until `consume_out_wire`).

use tracing::{debug, trace};

use crate::{
    compress::Deflator,
    crypto::cipher::PacketCipher,
    crypto::integrity::PacketMac,
    crypto::suite::Direction,
    models::{
        errors::TransportError,
        msg::MessageId,
        packet::{DEFAULT_BLOCK_LEN, LENGTH_FIELD_LEN, MIN_PADDING, PAYLOAD_OFFSET},
    },
    session::Session,
    utils,
};

impl Session {
    /// Append payload bytes to the outbound staging buffer.
    pub fn stage(&mut self, payload: &[u8]) {
        self.out_staging.extend_from_slice(payload);
    }

    /// Seal the staged payload into a binary packet.  Returns the wire
    /// length queued.  The staging buffer is reset whether or not the
    /// call succeeds; failures poison the session.
    pub fn send_staged(&mut self) -> Result<usize, TransportError> {
        match self.seal_staged() {
            Ok(n) => Ok(n),
            Err(e) => Err(self.fatal(e)),
        }
    }

    /// Stage and seal in one step.
    pub fn send_payload(&mut self, payload: &[u8]) -> Result<usize, TransportError> {
        self.stage(payload);
        self.send_staged()
    }

    fn seal_staged(&mut self) -> Result<usize, TransportError> {
        let staged = self.out_staging.split();
        let mut payload: Vec<u8> = staged.to_vec();

        // The capture sink observes clear payloads, pre-compression.
        let captured: Option<Vec<u8>> =
            self.accounting.capture.is_some().then(|| payload.clone());

        let compress = self.keys_out.as_ref().is_some_and(|k| k.compression);
        if compress && !payload.is_empty() {
            let deflator = self.deflator.get_or_insert_with(Deflator::new);
            let before = payload.len();
            payload = deflator.compress(&payload)?;
            trace!(before, after = payload.len(), "payload deflated");
        }

        let (block, lenfield, maclen) = match &self.keys_out {
            Some(k) => (k.block_len(), k.lenfield_block_len(), k.mac_len()),
            None => (DEFAULT_BLOCK_LEN, DEFAULT_BLOCK_LEN, 0),
        };

        // Pad so the encrypted region is block-aligned, with the
        // length field counted only when the cipher encrypts it.
        let effective = PAYLOAD_OFFSET + payload.len();
        let rem = (effective as i64 - lenfield as i64).rem_euclid(block as i64) as usize;
        let mut padding = block - rem;
        if padding < MIN_PADDING {
            padding += block;
        }

        let declared = (1 + payload.len() + padding) as u32;
        if declared > self.max_packet_len() {
            return Err(TransportError::OversizePacket {
                got: declared,
                cap: self.max_packet_len(),
            });
        }

        let clear_len = LENGTH_FIELD_LEN + declared as usize;
        let mut wire = vec![0u8; clear_len + maclen];
        wire[..LENGTH_FIELD_LEN].copy_from_slice(&declared.to_be_bytes());
        wire[LENGTH_FIELD_LEN] = padding as u8;
        wire[PAYLOAD_OFFSET..PAYLOAD_OFFSET + payload.len()]
            .copy_from_slice(&payload);

        // Padding is random once keys are active, zero in plaintext.
        if self.keys_out.is_some() {
            utils::fill_random(&mut wire[PAYLOAD_OFFSET + payload.len()..clear_len]);
        }

        let seq = self.send_seq;
        if let Some(keys) = self.keys_out.as_mut() {
            let (clear, tag) = wire.split_at_mut(clear_len);
            keys.mac.sign(seq, clear, tag)?;
            keys.cipher.encrypt(clear)?;
        }

        self.send_seq = self.send_seq.wrapping_add(1);
        self.accounting.record_packet(
            Direction::Outbound,
            wire.len(),
            seq,
            captured.as_deref().unwrap_or(&payload),
        );
        debug!(
            seq,
            declared,
            padding,
            wire_len = wire.len(),
            "packet queued"
        );

        self.out_wire.extend_from_slice(&wire);
        Ok(wire.len())
    }

    /// Reply to a packet nobody understands: type byte plus the
    /// offending inbound sequence number (RFC 4253 § 11.4).
    pub(crate) fn send_unimplemented(
        &mut self,
        seq: u32,
    ) -> Result<(), TransportError> {
        let mut reply = [0u8; 5];
        reply[0] = MessageId::Unimplemented as u8;
        reply[1..].copy_from_slice(&seq.to_be_bytes());
        self.send_out_of_band(&reply)
    }

    /// Emit SSH_MSG_DISCONNECT with a reason code and description.
    /// Still permitted after a fatal condition so hosts can say
    /// goodbye.
    pub fn send_disconnect(
        &mut self,
        code: u32,
        message: &str,
    ) -> Result<(), TransportError> {
        let mut payload =
            Vec::with_capacity(1 + 4 + 4 + message.len() + 4);
        payload.push(MessageId::Disconnect as u8);
        payload.extend_from_slice(&code.to_be_bytes());
        payload.extend_from_slice(&(message.len() as u32).to_be_bytes());
        payload.extend_from_slice(message.as_bytes());
        payload.extend_from_slice(&0u32.to_be_bytes()); // language tag
        match self.send_out_of_band(&payload) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fatal(e)),
        }
    }

    /// Send a transport-internal packet without disturbing whatever
    /// the host has staged.
    fn send_out_of_band(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let saved = self.out_staging.split();
        self.stage(payload);
        let res = self.seal_staged();
        self.out_staging = saved;
        res.map(|_| ())
    }

    /// The transport became writable again: let every registered
    /// channel know it may write.
    pub fn on_writable(&mut self) {
        self.channels.notify_writable();
    }
}
