// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Drive the async adapter over an in-memory duplex stream: a raw
//! "client" end speaks to a `TransportConnection` acting as server.

use std::time::Duration;

use anyhow::Result;
use ssh_transport_rs::{
    cfg::config::Config,
    client::TransportConnection,
    session::{
        Session,
        phases::{KexPhase, Role, SessionPhase},
    },
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    time::timeout,
};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn identification_exchange_and_unimplemented_reply() -> Result<()> {
    timeout(Duration::from_secs(10), async {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let (mut client_read, mut client_write) = tokio::io::split(client_io);
        let (server_read, server_write) = tokio::io::split(server_io);

        let cancel = CancellationToken::new();
        let server = TransportConnection::from_split(
            server_read,
            server_write,
            Role::Server,
            Config::default(),
            cancel.clone(),
        );

        // Type 200 is Unknown once authenticated: the server must keep
        // running and answer UNIMPLEMENTED.
        {
            let mut s = server.session.lock().await;
            s.advance_session_phase(SessionPhase::Dh)?;
            s.advance_session_phase(SessionPhase::Authenticating)?;
            s.advance_session_phase(SessionPhase::Authenticated)?;
            s.set_kex_phase(KexPhase::Finished);
        }

        let ident_server = {
            let server = server.clone();
            tokio::spawn(async move { server.exchange_identification().await })
        };

        client_write.write_all(b"SSH-2.0-loopback_probe\r\n").await?;
        let mut line = Vec::new();
        loop {
            let b = client_read.read_u8().await?;
            if b == b'\n' {
                break;
            }
            line.push(b);
        }
        assert!(line.starts_with(b"SSH-2.0-"));

        let peer = ident_server.await??;
        assert_eq!(peer, "SSH-2.0-loopback_probe");

        let run_task = {
            let server = server.clone();
            tokio::spawn(async move { server.run().await })
        };

        // A well-formed plaintext packet of type 200.
        let mut probe = Session::new(Role::Client);
        probe.send_payload(&[200u8])?;
        client_write.write_all(probe.out_wire()).await?;

        // Expect a 16-byte UNIMPLEMENTED packet referencing seq 0.
        let mut reply = [0u8; 16];
        client_read.read_exact(&mut reply).await?;
        assert_eq!(&reply[..4], &12u32.to_be_bytes());
        assert_eq!(reply[5], 3);
        assert_eq!(&reply[6..10], &0u32.to_be_bytes());

        {
            let s = server.session.lock().await;
            assert_eq!(s.session_phase(), SessionPhase::Authenticated);
            assert_eq!(s.recv_seq(), 1);
            assert_eq!(s.send_seq(), 1);
        }

        cancel.cancel();
        let _ = run_task.await?;
        Ok(())
    })
    .await?
}

#[tokio::test]
async fn fatal_packet_tears_the_connection_down() -> Result<()> {
    timeout(Duration::from_secs(10), async {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let (_client_read, mut client_write) = tokio::io::split(client_io);
        let (server_read, server_write) = tokio::io::split(server_io);

        let cancel = CancellationToken::new();
        let server = TransportConnection::from_split(
            server_read,
            server_write,
            Role::Server,
            Config::default(),
            cancel.clone(),
        );

        let run_task = {
            let server = server.clone();
            tokio::spawn(async move { server.run().await })
        };

        // USERAUTH_REQUEST during INITIAL_KEX is a filter violation.
        let mut probe = Session::new(Role::Client);
        probe.send_payload(&[50u8])?;
        client_write.write_all(probe.out_wire()).await?;

        let res = run_task.await?;
        assert!(res.is_err(), "run loop surfaces the fatal condition");
        {
            let s = server.session.lock().await;
            assert_eq!(s.session_phase(), SessionPhase::Error);
            assert!(s.last_error().is_some());
        }
        Ok(())
    })
    .await?
}
