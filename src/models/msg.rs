// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! SSH transport-layer message numbers (RFC 4250 § 4.1.2).
//!
//! Every binary packet carries a one-byte message type as the first
//! payload byte.  The transport core only needs to *classify* types
//! (parsing of message bodies belongs to the registered handlers), so
//! the raw `u8` survives everywhere and [`MessageId`] is the typed view
//! used by the incoming filter and the default handlers.
//!
//! Numbers 30–49 are reused between key-exchange methods; the variants
//! here carry the classic Diffie-Hellman meaning, with the group
//! exchange family on 32–34.  Number 60 and 61 are likewise shared by
//! the authentication sub-protocols (`PK_OK`, `INFO_REQUEST`,
//! `GSSAPI_RESPONSE` all arrive as 60); disambiguation happens via the
//! authentication sub-phase, never via the byte itself.

use core::fmt;

use thiserror::Error;

/// First byte of the range reserved for connection-protocol messages.
pub const CHANNEL_RANGE_START: u8 = 80;
/// Last byte of the range reserved for connection-protocol messages.
pub const CHANNEL_RANGE_END: u8 = 100;

/// Transport, authentication and connection message numbers the core
/// recognises.  Anything else stays a raw `u8` and is answered with
/// `SSH_MSG_UNIMPLEMENTED`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    Disconnect = 1,
    Ignore = 2,
    Unimplemented = 3,
    Debug = 4,
    ServiceRequest = 5,
    ServiceAccept = 6,
    ExtInfo = 7,
    KexInit = 20,
    NewKeys = 21,
    /* 22–29 unassigned */
    KexDhInit = 30,
    KexDhReply = 31,
    KexDhGexInit = 32,
    KexDhGexReply = 33,
    KexDhGexRequest = 34,
    /* 35–49 method-specific */
    UserauthRequest = 50,
    UserauthFailure = 51,
    UserauthSuccess = 52,
    UserauthBanner = 53,
    /// Also `USERAUTH_INFO_REQUEST` and `USERAUTH_GSSAPI_RESPONSE`.
    UserauthPkOk = 60,
    /// Also `USERAUTH_GSSAPI_TOKEN`.
    UserauthInfoResponse = 61,
    GlobalRequest = 80,
    RequestSuccess = 81,
    RequestFailure = 82,
    ChannelOpen = 90,
    ChannelOpenConfirmation = 91,
    ChannelOpenFailure = 92,
    ChannelWindowAdjust = 93,
    ChannelData = 94,
    ChannelExtendedData = 95,
    ChannelEof = 96,
    ChannelClose = 97,
    ChannelRequest = 98,
    ChannelSuccess = 99,
    ChannelFailure = 100,
}

impl MessageId {
    #[inline]
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => Self::Disconnect,
            2 => Self::Ignore,
            3 => Self::Unimplemented,
            4 => Self::Debug,
            5 => Self::ServiceRequest,
            6 => Self::ServiceAccept,
            7 => Self::ExtInfo,
            20 => Self::KexInit,
            21 => Self::NewKeys,
            30 => Self::KexDhInit,
            31 => Self::KexDhReply,
            32 => Self::KexDhGexInit,
            33 => Self::KexDhGexReply,
            34 => Self::KexDhGexRequest,
            50 => Self::UserauthRequest,
            51 => Self::UserauthFailure,
            52 => Self::UserauthSuccess,
            53 => Self::UserauthBanner,
            60 => Self::UserauthPkOk,
            61 => Self::UserauthInfoResponse,
            80 => Self::GlobalRequest,
            81 => Self::RequestSuccess,
            82 => Self::RequestFailure,
            90 => Self::ChannelOpen,
            91 => Self::ChannelOpenConfirmation,
            92 => Self::ChannelOpenFailure,
            93 => Self::ChannelWindowAdjust,
            94 => Self::ChannelData,
            95 => Self::ChannelExtendedData,
            96 => Self::ChannelEof,
            97 => Self::ChannelClose,
            98 => Self::ChannelRequest,
            99 => Self::ChannelSuccess,
            100 => Self::ChannelFailure,
            _ => return None,
        })
    }

    /// Connection-protocol messages (80–100) are only legal once the
    /// session is authenticated.
    #[inline]
    pub fn is_channel_range(v: u8) -> bool {
        (CHANNEL_RANGE_START..=CHANNEL_RANGE_END).contains(&v)
    }
}

/// Returned when a byte does not map to a known message number.
#[derive(Debug, Error)]
#[error("unknown message type: {0}")]
pub struct UnknownMessage(pub u8);

impl TryFrom<u8> for MessageId {
    type Error = UnknownMessage;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::from_u8(byte).ok_or(UnknownMessage(byte))
    }
}

impl From<MessageId> for u8 {
    #[inline]
    fn from(m: MessageId) -> u8 {
        m as u8
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}({})", *self as u8)
    }
}
