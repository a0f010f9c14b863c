// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Traffic accounting and the optional raw-packet capture hook.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use crate::crypto::suite::Direction;

/// Shared traffic sink a host may attach to one or more sessions.
/// Counts raw wire bytes (including MAC) and accepted/emitted packets.
#[derive(Debug, Default)]
pub struct TrafficCounters {
    pub in_bytes: AtomicU64,
    pub out_bytes: AtomicU64,
    pub in_packets: AtomicU64,
    pub out_packets: AtomicU64,
}

impl TrafficCounters {
    pub fn record(&self, dir: Direction, wire_bytes: usize) {
        match dir {
            Direction::Inbound => {
                self.in_bytes.fetch_add(wire_bytes as u64, Ordering::Relaxed);
                self.in_packets.fetch_add(1, Ordering::Relaxed);
            },
            Direction::Outbound => {
                self.out_bytes.fetch_add(wire_bytes as u64, Ordering::Relaxed);
                self.out_packets.fetch_add(1, Ordering::Relaxed);
            },
        }
    }
}

/// Host-installed observer fed the clear payload of every accepted and
/// emitted packet, with the packet's sequence number.
pub type CaptureSink = Box<dyn FnMut(Direction, u32, &[u8]) + Send>;

/// Session-local raw counters, always maintained.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawCounters {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub packets_in: u64,
    pub packets_out: u64,
}

/// Optional sinks plus the always-on local tallies.
#[derive(Default)]
pub struct Accounting {
    pub raw: RawCounters,
    pub shared: Option<Arc<TrafficCounters>>,
    pub capture: Option<CaptureSink>,
}

impl Accounting {
    pub fn record_packet(
        &mut self,
        dir: Direction,
        wire_bytes: usize,
        seq: u32,
        clear_payload: &[u8],
    ) {
        match dir {
            Direction::Inbound => {
                self.raw.bytes_in += wire_bytes as u64;
                self.raw.packets_in += 1;
            },
            Direction::Outbound => {
                self.raw.bytes_out += wire_bytes as u64;
                self.raw.packets_out += 1;
            },
        }
        if let Some(shared) = &self.shared {
            shared.record(dir, wire_bytes);
        }
        if let Some(capture) = &mut self.capture {
            capture(dir, seq, clear_payload);
        }
    }
}

impl core::fmt::Debug for Accounting {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Accounting")
            .field("raw", &self.raw)
            .field("shared", &self.shared.is_some())
            .field("capture", &self.capture.is_some())
            .finish()
    }
}
