// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Incoming-packet gate: given the session's phase tuple and a message
//! type, classify the packet before any handler runs.
//!
//! The table is exhaustive over the filtered types; everything else is
//! `Unknown` and gets an `SSH_MSG_UNIMPLEMENTED` reply while the
//! sender's sequence number is still acknowledged.  Role rejection is
//! part of the same table: a message only a server may receive is
//! `Denied` on a client, and vice versa.
//!
//! The DH group-exchange family (32–34) shares numbers with other kex
//! methods; it is admitted only while a key exchange is actually in
//! flight rather than unconditionally.

use crate::{
    models::msg::MessageId,
    session::{
        Session,
        phases::{
            AuthPhase, AuthServicePhase, GlobalRequestPhase, KexPhase, Role,
            SessionPhase,
        },
    },
};

/// Classification of one incoming packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    /// Legal in the current phase; hand to the dispatcher.
    Allowed,
    /// Protocol violation; the session must fail.
    Denied,
    /// Not covered by the table; answer UNIMPLEMENTED and continue.
    Unknown,
}

/// Apply the phase table to one message type.
pub fn classify(session: &Session, msg_type: u8) -> FilterVerdict {
    use FilterVerdict::*;

    let phase = session.session_phase();
    let kex = session.kex_phase();

    let Some(msg) = MessageId::from_u8(msg_type) else {
        return Unknown;
    };

    let allowed = match msg {
        // Transport-generic messages are legal at any point.
        MessageId::Disconnect
        | MessageId::Ignore
        | MessageId::Unimplemented
        | MessageId::Debug => true,

        MessageId::ServiceRequest => {
            session.role() == Role::Server
                && matches!(
                    phase,
                    SessionPhase::Authenticating | SessionPhase::Authenticated
                )
                && kex == KexPhase::Finished
        },

        MessageId::ServiceAccept => {
            matches!(
                phase,
                SessionPhase::Authenticating | SessionPhase::Authenticated
            ) && kex == KexPhase::Finished
                && session.auth_service_phase() == AuthServicePhase::Sent
        },

        MessageId::ExtInfo => {
            phase == SessionPhase::Authenticating && kex == KexPhase::Finished
        },

        MessageId::KexInit => {
            matches!(
                phase,
                SessionPhase::InitialKex | SessionPhase::Authenticated
            ) && matches!(kex, KexPhase::Init | KexPhase::Finished)
        },

        MessageId::NewKeys => {
            phase == SessionPhase::Dh && kex == KexPhase::NewkeysSent
        },

        MessageId::KexDhInit => {
            session.role() == Role::Server
                && phase == SessionPhase::Dh
                && kex == KexPhase::Init
        },

        MessageId::KexDhReply => {
            phase == SessionPhase::Dh && kex == KexPhase::InitSent
        },

        MessageId::KexDhGexInit
        | MessageId::KexDhGexReply
        | MessageId::KexDhGexRequest => {
            phase == SessionPhase::Dh
                && matches!(kex, KexPhase::Init | KexPhase::InitSent)
        },

        MessageId::UserauthRequest => {
            session.role() == Role::Server
                && phase == SessionPhase::Authenticating
                && kex == KexPhase::Finished
        },

        MessageId::UserauthFailure
        | MessageId::UserauthSuccess
        | MessageId::UserauthBanner => {
            session.role() == Role::Client && phase == SessionPhase::Authenticating
        },

        // 60: PK_OK / INFO_REQUEST / GSSAPI_RESPONSE depending on the
        // method in flight.
        MessageId::UserauthPkOk => matches!(
            session.auth_phase(),
            AuthPhase::KbdintSent
                | AuthPhase::PubkeyOfferSent
                | AuthPhase::GssapiRequestSent
        ),

        // 61: INFO_RESPONSE / GSSAPI_TOKEN.
        MessageId::UserauthInfoResponse => matches!(
            session.auth_phase(),
            AuthPhase::Info | AuthPhase::GssapiToken
        ),

        MessageId::GlobalRequest => phase == SessionPhase::Authenticated,

        MessageId::RequestSuccess | MessageId::RequestFailure => {
            phase == SessionPhase::Authenticated
                && session.global_request_phase() == GlobalRequestPhase::Pending
        },

        MessageId::ChannelOpen
        | MessageId::ChannelOpenConfirmation
        | MessageId::ChannelOpenFailure
        | MessageId::ChannelWindowAdjust
        | MessageId::ChannelData
        | MessageId::ChannelExtendedData
        | MessageId::ChannelEof
        | MessageId::ChannelClose
        | MessageId::ChannelRequest
        | MessageId::ChannelSuccess
        | MessageId::ChannelFailure => phase == SessionPhase::Authenticated,
    };

    if allowed { Allowed } else { Denied }
}
