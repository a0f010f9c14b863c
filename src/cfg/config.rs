// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{
    cfg::enums::{CompressionMode, YesNo},
    models::packet::MAX_PACKET_LEN,
};

/// Host configuration: transport policy plus runtime parameters that
/// never touch the wire.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct Config {
    /// Packet-layer policy (caps, compression preference).
    #[serde(default)]
    pub transport: TransportConfig,
    /// Implementation/runtime parameters (timeouts, socket options).
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TransportConfig {
    /// Cap on the declared packet length; clamped to the hard maximum.
    #[serde(default = "default_max_packet_len", rename = "MaxPacketLength")]
    pub max_packet_len: u32,

    /// Compression preference offered during negotiation.
    #[serde(default, rename = "Compression")]
    pub compression: CompressionMode,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_packet_len: MAX_PACKET_LEN,
            compression: CompressionMode::default(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RuntimeConfig {
    /// TCP connect timeout, seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Per-read/per-write timeout, seconds.
    #[serde(default = "default_io_timeout")]
    pub io_timeout_secs: u64,

    /// TCP_NODELAY on the connection socket.
    #[serde(default)]
    pub nodelay: YesNo,

    /// Identification string sent before the first binary packet.
    #[serde(default = "default_identification")]
    pub identification: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            io_timeout_secs: default_io_timeout(),
            nodelay: YesNo::Yes,
            identification: default_identification(),
        }
    }
}

fn default_max_packet_len() -> u32 {
    MAX_PACKET_LEN
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_io_timeout() -> u64 {
    60
}

fn default_identification() -> String {
    format!("SSH-2.0-ssh_transport_rs_{}", env!("CARGO_PKG_VERSION"))
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(&path).with_context(|| {
            format!("failed to read config file {:?}", path.as_ref())
        })?;
        let cfg: Config = serde_yaml::from_str(&raw).with_context(|| {
            format!("failed to parse config file {:?}", path.as_ref())
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.transport.max_packet_len >= 16,
            "MaxPacketLength must allow at least one minimal packet"
        );
        ensure!(
            self.transport.max_packet_len <= MAX_PACKET_LEN,
            "MaxPacketLength exceeds the hard cap {MAX_PACKET_LEN}"
        );
        ensure!(
            !self.runtime.identification.is_empty()
                && self.runtime.identification.len() <= 253,
            "identification string must be 1..=253 bytes"
        );
        ensure!(
            self.runtime.identification.starts_with("SSH-2.0-"),
            "identification string must start with SSH-2.0-"
        );
        Ok(())
    }

    #[inline]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.runtime.connect_timeout_secs)
    }

    #[inline]
    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.runtime.io_timeout_secs)
    }
}
