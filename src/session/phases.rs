// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The closed phase sets controlling which packet types are accepted.
//!
//! The session phase advances monotonically through
//! `INITIAL_KEX → DH → AUTHENTICATING → AUTHENTICATED`, with one
//! permitted backward edge `AUTHENTICATED → DH` for re-keying (and the
//! matching `DH → AUTHENTICATED` return).  `ERROR` is absorbing.

use crate::models::errors::TransportError;

/// Which side of the connection this session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Top-level session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    InitialKex,
    Dh,
    Authenticating,
    Authenticated,
    Error,
}

/// Key-exchange sub-phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KexPhase {
    #[default]
    Init,
    InitSent,
    NewkeysSent,
    Finished,
}

/// Authentication sub-phase (client view of the userauth dialogue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthPhase {
    #[default]
    NoneSent,
    PubkeyOfferSent,
    PubkeyAuthSent,
    PasswordAuthSent,
    KbdintSent,
    Info,
    GssapiRequestSent,
    GssapiToken,
    GssapiMicSent,
    Success,
    Partial,
    Failed,
    Error,
}

/// Outstanding global-request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GlobalRequestPhase {
    #[default]
    None,
    Pending,
    Accepted,
    Denied,
}

/// ssh-userauth service request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthServicePhase {
    #[default]
    None,
    Sent,
    Accepted,
}

impl SessionPhase {
    /// Validate one phase edge.  `Error` is reachable from anywhere
    /// and final; the only backward edge is the rekey revisit.
    pub fn check_advance(self, to: SessionPhase) -> Result<(), TransportError> {
        use SessionPhase::*;
        let ok = matches!(
            (self, to),
            (_, Error)
                | (InitialKex, Dh)
                | (Dh, Authenticating)
                | (Dh, Authenticated)
                | (Authenticating, Authenticated)
                | (Authenticated, Dh)
        );
        if ok {
            Ok(())
        } else {
            Err(TransportError::PhaseViolation(phase_edge_name(self, to)))
        }
    }
}

fn phase_edge_name(from: SessionPhase, to: SessionPhase) -> &'static str {
    // Static message keeps TransportError allocation-free.
    match (from, to) {
        (SessionPhase::Error, _) => "session already failed",
        (_, SessionPhase::InitialKex) => "cannot re-enter initial key exchange",
        (SessionPhase::InitialKex, _) => "key exchange not started",
        (SessionPhase::Dh, _) => "key exchange still in progress",
        _ => "phase order violated",
    }
}
