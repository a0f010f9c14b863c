// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The long-lived per-connection state shared by the reassembler, the
//! packetizer, the incoming filter and the dispatcher.
//!
//! A session is owned by exactly one execution context at a time; all
//! mutation happens through the transport entry points
//! (`Session::on_bytes`, `Session::send_staged`) and through
//! dispatched handlers.  Nothing here is process-global.

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::{
    compress::{Deflator, Inflator},
    crypto::{
        cipher::PacketCipher,
        suite::{CipherSuite, DirectionKeys},
    },
    handlers::{Dispatcher, HandlerBundle, defaults},
    models::{
        errors::TransportError,
        packet::{DEFAULT_BLOCK_LEN, IncomingPacket, MAX_PACKET_LEN},
    },
    session::{
        channels::ChannelSet,
        counters::{Accounting, CaptureSink, RawCounters, TrafficCounters},
        phases::{
            AuthPhase, AuthServicePhase, GlobalRequestPhase, KexPhase, Role,
            SessionPhase,
        },
    },
    transport::reassembler::ReadState,
};

pub struct Session {
    role: Role,
    phase: SessionPhase,
    kex_phase: KexPhase,
    auth_phase: AuthPhase,
    global_req_phase: GlobalRequestPhase,
    auth_service_phase: AuthServicePhase,

    /// Active inbound keys; `None` until the first NEWKEYS.
    pub(crate) keys_in: Option<DirectionKeys>,
    /// Active outbound keys; `None` until the first NEWKEYS.
    pub(crate) keys_out: Option<DirectionKeys>,
    /// Staged suite from an in-flight (re-)key exchange.
    next_suite: Option<CipherSuite>,

    /// Receive sequence number, wraps at 2^32.
    pub(crate) recv_seq: u32,
    /// Send sequence number, wraps at 2^32.
    pub(crate) send_seq: u32,

    /// Reassembly automaton state.
    pub(crate) read_state: ReadState,
    /// Decrypted-so-far bytes of the packet being reassembled.
    pub(crate) in_buffer: BytesMut,
    /// Progress record for the packet being reassembled.
    pub(crate) incoming: IncomingPacket,
    /// Clear payload of the packet currently being dispatched (after
    /// the type byte).  Valid only during handler execution.
    pub(crate) in_payload: Bytes,

    /// Host-staged outbound payload, consumed by `send_staged`.
    pub(crate) out_staging: BytesMut,
    /// Ready-to-write wire bytes, drained by the I/O adapter.
    pub(crate) out_wire: BytesMut,

    /// Streaming decompression context, lazily created, kept for the
    /// rest of the session.
    pub(crate) inflator: Option<Inflator>,
    /// Streaming compression context, same lifetime rule.
    pub(crate) deflator: Option<Deflator>,

    pub(crate) dispatcher: Dispatcher,
    pub(crate) channels: ChannelSet,
    pub(crate) accounting: Accounting,

    max_packet_len: u32,
    last_error: Option<String>,
}

impl Session {
    pub fn new(role: Role) -> Self {
        let mut dispatcher = Dispatcher::default();
        dispatcher.register(defaults::default_bundle());
        Self {
            role,
            phase: SessionPhase::default(),
            kex_phase: KexPhase::default(),
            auth_phase: AuthPhase::default(),
            global_req_phase: GlobalRequestPhase::default(),
            auth_service_phase: AuthServicePhase::default(),
            keys_in: None,
            keys_out: None,
            next_suite: None,
            recv_seq: 0,
            send_seq: 0,
            read_state: ReadState::Init,
            in_buffer: BytesMut::new(),
            incoming: IncomingPacket::default(),
            in_payload: Bytes::new(),
            out_staging: BytesMut::new(),
            out_wire: BytesMut::new(),
            inflator: None,
            deflator: None,
            dispatcher,
            channels: ChannelSet::default(),
            accounting: Accounting::default(),
            max_packet_len: MAX_PACKET_LEN,
            last_error: None,
        }
    }

    /// Lower the packet cap below the hard maximum.
    pub fn set_max_packet_len(&mut self, cap: u32) {
        self.max_packet_len = cap.min(MAX_PACKET_LEN);
    }

    // --- observability -------------------------------------------------

    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    #[inline]
    pub fn session_phase(&self) -> SessionPhase {
        self.phase
    }

    #[inline]
    pub fn kex_phase(&self) -> KexPhase {
        self.kex_phase
    }

    #[inline]
    pub fn auth_phase(&self) -> AuthPhase {
        self.auth_phase
    }

    #[inline]
    pub fn global_request_phase(&self) -> GlobalRequestPhase {
        self.global_req_phase
    }

    #[inline]
    pub fn auth_service_phase(&self) -> AuthServicePhase {
        self.auth_service_phase
    }

    #[inline]
    pub fn recv_seq(&self) -> u32 {
        self.recv_seq
    }

    #[inline]
    pub fn send_seq(&self) -> u32 {
        self.send_seq
    }

    #[inline]
    pub fn max_packet_len(&self) -> u32 {
        self.max_packet_len
    }

    #[inline]
    pub fn counters(&self) -> RawCounters {
        self.accounting.raw
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Negotiated inbound cipher name, `"none"` while plaintext.
    pub fn cipher_in_name(&self) -> &'static str {
        self.keys_in
            .as_ref()
            .map_or("none", |k| k.cipher.name())
    }

    /// Negotiated outbound cipher name, `"none"` while plaintext.
    pub fn cipher_out_name(&self) -> &'static str {
        self.keys_out
            .as_ref()
            .map_or("none", |k| k.cipher.name())
    }

    /// Clear payload of the packet being dispatched, after the type
    /// byte.  Empty outside handler execution.
    pub fn in_payload(&self) -> &[u8] {
        &self.in_payload
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut ChannelSet {
        &mut self.channels
    }

    // --- phase transitions ---------------------------------------------

    /// Advance the session phase, enforcing the monotonic order with
    /// its single rekey revisit.
    pub fn advance_session_phase(
        &mut self,
        to: SessionPhase,
    ) -> Result<(), TransportError> {
        self.phase.check_advance(to)?;
        debug!(from = ?self.phase, to = ?to, "session phase");
        self.phase = to;
        Ok(())
    }

    pub fn set_kex_phase(&mut self, to: KexPhase) {
        self.kex_phase = to;
    }

    pub fn set_auth_phase(&mut self, to: AuthPhase) {
        self.auth_phase = to;
    }

    pub fn set_global_request_phase(&mut self, to: GlobalRequestPhase) {
        self.global_req_phase = to;
    }

    pub fn set_auth_service_phase(&mut self, to: AuthServicePhase) {
        self.auth_service_phase = to;
    }

    /// Record a fatal condition: store the message, poison the session.
    /// Returns the error back for direct propagation.
    pub(crate) fn fatal(&mut self, err: TransportError) -> TransportError {
        self.poison(err.to_string());
        err
    }

    /// Poison the session with a host-readable message.
    pub(crate) fn poison(&mut self, msg: String) {
        self.last_error = Some(msg);
        self.phase = SessionPhase::Error;
    }

    // --- key management -------------------------------------------------

    /// Stage the suite produced by a finished key exchange; activated
    /// half-by-half on NEWKEYS.
    pub fn install_next_suite(&mut self, suite: CipherSuite) {
        self.next_suite = Some(suite);
    }

    /// Peer's NEWKEYS arrived: switch the inbound direction to the
    /// staged keys.  Sequence numbers are untouched.
    pub fn activate_next_inbound(&mut self) -> Result<(), TransportError> {
        let keys = self
            .next_suite
            .as_mut()
            .and_then(CipherSuite::take_inbound)
            .ok_or(TransportError::Protocol("no staged inbound keys"))?;
        debug!(cipher = keys.cipher.name(), "activating inbound keys");
        self.keys_in = Some(keys);
        self.drop_drained_suite();
        Ok(())
    }

    /// Our NEWKEYS went out: switch the outbound direction.
    pub fn activate_next_outbound(&mut self) -> Result<(), TransportError> {
        let keys = self
            .next_suite
            .as_mut()
            .and_then(CipherSuite::take_outbound)
            .ok_or(TransportError::Protocol("no staged outbound keys"))?;
        debug!(cipher = keys.cipher.name(), "activating outbound keys");
        self.keys_out = Some(keys);
        self.drop_drained_suite();
        Ok(())
    }

    fn drop_drained_suite(&mut self) {
        if self.next_suite.as_ref().is_some_and(CipherSuite::is_drained) {
            self.next_suite = None;
        }
    }

    /// Length-field block size of the inbound direction; 8 while no
    /// cipher is negotiated.
    pub(crate) fn lenfield_block_len_in(&self) -> usize {
        self.keys_in
            .as_ref()
            .map_or(DEFAULT_BLOCK_LEN, DirectionKeys::lenfield_block_len)
    }

    /// Inbound MAC length; 0 while no MAC is negotiated.
    pub(crate) fn mac_len_in(&self) -> usize {
        self.keys_in.as_ref().map_or(0, DirectionKeys::mac_len)
    }

    // --- host hooks ------------------------------------------------------

    pub fn set_traffic_counters(
        &mut self,
        sink: std::sync::Arc<TrafficCounters>,
    ) {
        self.accounting.shared = Some(sink);
    }

    pub fn set_capture_sink(&mut self, sink: CaptureSink) {
        self.accounting.capture = Some(sink);
    }

    /// Append a handler bundle; later bundles shadow earlier ones only
    /// when the earlier ones decline.
    pub fn register_handlers(&mut self, bundle: HandlerBundle) {
        self.dispatcher.register(bundle);
    }

    /// Ready-to-write wire bytes produced by the packetizer.  The I/O
    /// adapter drains this.
    pub fn out_wire(&self) -> &[u8] {
        &self.out_wire
    }

    /// Mark `n` wire bytes as written to the transport.
    pub fn consume_out_wire(&mut self, n: usize) {
        let n = n.min(self.out_wire.len());
        let _ = self.out_wire.split_to(n);
    }
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role)
            .field("phase", &self.phase)
            .field("kex", &self.kex_phase)
            .field("auth", &self.auth_phase)
            .field("recv_seq", &self.recv_seq)
            .field("send_seq", &self.send_seq)
            .field("cipher_in", &self.cipher_in_name())
            .field("cipher_out", &self.cipher_out_name())
            .field("read_state", &self.read_state)
            .finish()
    }
}
