// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Packet dispatch: a priority-ordered list of handler bundles.
//!
//! Each bundle maps a contiguous message-type range onto optional
//! handlers.  Bundles are scanned in registration order and a later
//! bundle only sees a packet the earlier ones declined, so protocol
//! sub-layers (kex drivers, auth methods, the channel layer) shadow
//! the built-in defaults simply by registering after them.
//!
//! Handlers receive the session, the type byte and the clear payload
//! (after the type byte) and must not feed bytes back into the
//! reassembler; the `Processing` reassembly state rejects such
//! reentrant calls.

pub mod defaults;

use tracing::info;

use crate::{models::errors::TransportError, session::Session};

/// What a handler did with the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Packet consumed; stop scanning.
    Used,
    /// Not mine; offer it to the next bundle.
    NotUsed,
}

/// A packet handler.  Captured state plays the role of per-bundle
/// userdata.
pub type Handler =
    Box<dyn FnMut(&mut Session, u8, &[u8]) -> DispatchOutcome + Send>;

/// A contiguous run of message types with one optional handler per
/// type.
pub struct HandlerBundle {
    start: u8,
    handlers: Vec<Option<Handler>>,
}

impl HandlerBundle {
    /// Bundle covering `length` types starting at `start`, all vacant.
    pub fn new(start: u8, length: usize) -> Self {
        let mut handlers = Vec::with_capacity(length);
        handlers.resize_with(length, || None);
        Self { start, handlers }
    }

    /// Install a handler for `msg_type`; panics if outside the range
    /// declared at construction (a registration-time programming
    /// error, not a wire condition).
    pub fn with(mut self, msg_type: u8, handler: Handler) -> Self {
        let idx = msg_type
            .checked_sub(self.start)
            .map(usize::from)
            .filter(|&i| i < self.handlers.len());
        match idx {
            Some(i) => self.handlers[i] = Some(handler),
            None => panic!("message type {msg_type} outside bundle range"),
        }
        self
    }

    fn slot_mut(&mut self, msg_type: u8) -> Option<&mut Handler> {
        let idx = msg_type.checked_sub(self.start).map(usize::from)?;
        self.handlers.get_mut(idx)?.as_mut()
    }
}

impl core::fmt::Debug for HandlerBundle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let filled = self.handlers.iter().filter(|h| h.is_some()).count();
        f.debug_struct("HandlerBundle")
            .field("start", &self.start)
            .field("length", &self.handlers.len())
            .field("filled", &filled)
            .finish()
    }
}

/// Registration-ordered bundle list owned by the session.
#[derive(Debug, Default)]
pub struct Dispatcher {
    pub(crate) bundles: Vec<HandlerBundle>,
}

impl Dispatcher {
    pub fn register(&mut self, bundle: HandlerBundle) {
        self.bundles.push(bundle);
    }
}

impl Session {
    /// Offer a validated packet to the bundles in registration order;
    /// reply UNIMPLEMENTED when nobody claims it.  `seq` is the
    /// receive sequence number the packet was accepted under.
    pub(crate) fn dispatch_packet(
        &mut self,
        msg_type: u8,
        payload: &[u8],
        seq: u32,
    ) -> Result<(), TransportError> {
        // The bundle list is detached while handlers run so they can
        // borrow the session mutably; registrations made by handlers
        // land in the fresh list and are appended afterwards.
        let mut bundles = std::mem::take(&mut self.dispatcher.bundles);

        let mut used = false;
        for bundle in bundles.iter_mut() {
            let Some(handler) = bundle.slot_mut(msg_type) else {
                continue;
            };
            if handler(self, msg_type, payload) == DispatchOutcome::Used {
                used = true;
                break;
            }
        }

        let registered_during = std::mem::take(&mut self.dispatcher.bundles);
        self.dispatcher.bundles = bundles;
        self.dispatcher.bundles.extend(registered_during);

        if !used {
            info!(msg_type, seq, "no handler claimed packet, replying UNIMPLEMENTED");
            self.send_unimplemented(seq)?;
        }
        Ok(())
    }
}
