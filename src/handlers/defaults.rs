// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Built-in transport handlers registered with every new session.
//!
//! The default bundle spans types 1–100; only the transport-generic
//! messages are filled in.  Sub-protocol bundles registered later take
//! over everything else.

use tracing::{debug, info, trace, warn};

use crate::{
    handlers::{DispatchOutcome, Handler, HandlerBundle},
    models::{
        msg::MessageId,
        packet::{read_string, read_u32},
    },
    session::Session,
};

/// The bundle every session starts with.
pub fn default_bundle() -> HandlerBundle {
    HandlerBundle::new(1, 100)
        .with(MessageId::Disconnect as u8, Box::new(on_disconnect) as Handler)
        .with(MessageId::Ignore as u8, Box::new(on_ignore) as Handler)
        .with(
            MessageId::Unimplemented as u8,
            Box::new(on_unimplemented) as Handler,
        )
        .with(MessageId::Debug as u8, Box::new(on_debug) as Handler)
}

/// SSH_MSG_DISCONNECT: `uint32 reason, string description, string
/// language`.  Ends the session.
fn on_disconnect(session: &mut Session, _ty: u8, payload: &[u8]) -> DispatchOutcome {
    let mut off = 0;
    let code = read_u32(payload, &mut off).unwrap_or(0);
    let description = read_string(payload, &mut off)
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .unwrap_or_default();
    warn!(code, description = %description, "peer sent DISCONNECT");
    session.poison(format!("peer disconnected (code {code}): {description}"));
    DispatchOutcome::Used
}

/// SSH_MSG_IGNORE carries arbitrary data and requires no action.
fn on_ignore(_session: &mut Session, _ty: u8, payload: &[u8]) -> DispatchOutcome {
    trace!(len = payload.len(), "IGNORE");
    DispatchOutcome::Used
}

/// SSH_MSG_UNIMPLEMENTED: `uint32 sequence_number` of the packet the
/// peer refused.
fn on_unimplemented(
    _session: &mut Session,
    _ty: u8,
    payload: &[u8],
) -> DispatchOutcome {
    let mut off = 0;
    let seq = read_u32(payload, &mut off).unwrap_or(u32::MAX);
    info!(seq, "peer answered UNIMPLEMENTED");
    DispatchOutcome::Used
}

/// SSH_MSG_DEBUG: `boolean always_display, string message, string
/// language`.
fn on_debug(_session: &mut Session, _ty: u8, payload: &[u8]) -> DispatchOutcome {
    let always_display = payload.first().copied().unwrap_or(0) != 0;
    let mut off = 1;
    let message = read_string(payload, &mut off)
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .unwrap_or_default();
    debug!(always_display, message = %message, "peer DEBUG");
    DispatchOutcome::Used
}
