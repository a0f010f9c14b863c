// SPDX-License-Identifier: AGPL-3.0-or-later GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use ssh_transport_rs::{
    crypto::suite::{CipherSuite, DirectionKeys},
    models::errors::TransportError,
    session::{Session, phases::Role},
};

use super::{capture_inbound, seen};

fn compressed_keys() -> DirectionKeys {
    let mut k = DirectionKeys::cleartext();
    k.compression = true;
    k
}

/// Sender compressing outbound, receiver inflating inbound.
fn compressed_pair() -> Result<(Session, Session)> {
    let mut tx = Session::new(Role::Client);
    tx.install_next_suite(CipherSuite::new(
        DirectionKeys::cleartext(),
        compressed_keys(),
    ));
    tx.activate_next_outbound()?;

    let mut rx = Session::new(Role::Server);
    rx.install_next_suite(CipherSuite::new(
        compressed_keys(),
        DirectionKeys::cleartext(),
    ));
    rx.activate_next_inbound()?;
    Ok((tx, rx))
}

#[test]
fn compressed_round_trip_shrinks_the_wire() -> Result<()> {
    let (mut tx, mut rx) = compressed_pair()?;
    let log = seen();
    capture_inbound(&mut rx, log.clone());

    let mut payload = vec![2u8];
    payload.extend_from_slice(&vec![0u8; 10_000]);
    tx.send_payload(&payload)?;
    let wire = tx.out_wire().to_vec();
    assert!(
        wire.len() * 10 < payload.len(),
        "10k of zeroes must deflate by an order of magnitude, got {}",
        wire.len()
    );

    let consumed = rx.on_bytes(&wire)?;
    assert_eq!(consumed, wire.len());
    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].1, payload);
    Ok(())
}

#[test]
fn streaming_contexts_persist_across_packets() -> Result<()> {
    let (mut tx, mut rx) = compressed_pair()?;
    let log = seen();
    capture_inbound(&mut rx, log.clone());

    // Later packets depend on the deflate dictionary built by earlier
    // ones; per-packet contexts would fail to inflate these.
    for i in 0..6u8 {
        let mut payload = vec![2u8];
        payload.extend_from_slice(format!("repetitive payload {i}").as_bytes());
        tx.send_payload(&payload)?;
        let wire = tx.out_wire().to_vec();
        tx.consume_out_wire(usize::MAX);
        rx.on_bytes(&wire)?;
    }

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 6);
    for (i, (_, payload)) in log.iter().enumerate() {
        assert_eq!(payload[1..], *format!("repetitive payload {i}").as_bytes());
    }
    Ok(())
}

#[test]
fn decompression_bomb_is_fatal() -> Result<()> {
    let (mut tx, mut rx) = compressed_pair()?;
    // The receiver only tolerates 4 KiB of inflated payload.
    rx.set_max_packet_len(4096);

    let mut payload = vec![2u8];
    payload.extend_from_slice(&vec![0u8; 64 * 1024]);
    tx.send_payload(&payload)?;
    let wire = tx.out_wire().to_vec();
    assert!(wire.len() < 4096, "bomb travels small");

    let err = rx.on_bytes(&wire).expect_err("inflation must be capped");
    assert!(matches!(
        err,
        TransportError::DecompressionOverflow { maxlen: 4096 }
    ));
    assert_eq!(
        rx.session_phase(),
        ssh_transport_rs::session::phases::SessionPhase::Error
    );
    Ok(())
}

#[test]
fn empty_payload_is_never_deflated() -> Result<()> {
    // An empty staged buffer must not run through the deflater (there
    // is nothing to frame a type byte around either way, but the wire
    // packet itself stays legal).
    let (mut tx, _rx) = compressed_pair()?;
    tx.send_staged()?;
    let wire = tx.out_wire().to_vec();
    let declared = u32::from_be_bytes(wire[..4].try_into()?) as usize;
    let padding = wire[4] as usize;
    assert_eq!(declared, 1 + padding);
    Ok(())
}

#[test]
fn garbage_zlib_stream_is_fatal() -> Result<()> {
    // Receiver expects compressed payloads; hand it a packet whose
    // payload is not a zlib stream.
    let mut plain_tx = Session::new(Role::Client);
    plain_tx.send_payload(&[2u8, 0xde, 0xad])?;
    let wire = plain_tx.out_wire().to_vec();

    let mut rx = Session::new(Role::Server);
    rx.install_next_suite(CipherSuite::new(
        compressed_keys(),
        DirectionKeys::cleartext(),
    ));
    rx.activate_next_inbound()?;

    let err = rx.on_bytes(&wire).expect_err("not a zlib stream");
    assert!(matches!(err, TransportError::Compression(_)));
    Ok(())
}
