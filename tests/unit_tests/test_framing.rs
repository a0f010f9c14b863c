// SPDX-License-Identifier: AGPL-3.0-or-later GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use ssh_transport_rs::{
    models::{errors::TransportError, packet::MAX_PACKET_LEN},
    session::{
        Session,
        phases::{KexPhase, Role, SessionPhase},
    },
};

use super::{capture_inbound, probe_bundle, seen};

/// Feed `wire` in `chunk` sized slices, re-presenting unconsumed bytes
/// the way a socket loop would.
fn feed_fragmented(session: &mut Session, wire: &[u8], chunk: usize) -> Result<()> {
    let mut pending: Vec<u8> = Vec::new();
    for piece in wire.chunks(chunk) {
        pending.extend_from_slice(piece);
        let consumed = session.on_bytes(&pending)?;
        pending.drain(..consumed);
    }
    assert!(pending.is_empty(), "stream fully consumed");
    Ok(())
}

#[test]
fn plaintext_round_trip_minimal_packet() -> Result<()> {
    // Stage a single type byte with no cipher: default block size 8
    // forces packet_length 12 with 10 bytes of padding.
    let mut tx = Session::new(Role::Client);
    let wire_len = tx.send_payload(&[0x05])?;
    assert_eq!(wire_len, 16);

    let wire = tx.out_wire().to_vec();
    assert_eq!(&wire[..4], &12u32.to_be_bytes());
    assert_eq!(wire[4], 10);
    assert_eq!(wire[5], 0x05);
    // Plaintext padding is deterministic zeroes, so the whole frame is.
    assert_eq!(wire, hex::decode("0000000c0a0500000000000000000000")?);

    let mut rx = Session::new(Role::Server);
    rx.advance_session_phase(SessionPhase::Dh)?;
    rx.advance_session_phase(SessionPhase::Authenticating)?;
    rx.set_kex_phase(KexPhase::Finished);
    let log = seen();
    rx.register_handlers(probe_bundle(0x05, log.clone()));

    let consumed = rx.on_bytes(&wire)?;
    assert_eq!(consumed, wire.len());

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].0, 0x05);
    assert!(log[0].1.is_empty(), "no payload beyond the type byte");
    assert_eq!(rx.recv_seq(), 1);
    Ok(())
}

#[test]
fn byte_at_a_time_feed_dispatches_once() -> Result<()> {
    let mut tx = Session::new(Role::Client);
    tx.send_payload(&[0x05])?;
    let wire = tx.out_wire().to_vec();

    let mut rx = Session::new(Role::Server);
    rx.advance_session_phase(SessionPhase::Dh)?;
    rx.advance_session_phase(SessionPhase::Authenticating)?;
    rx.set_kex_phase(KexPhase::Finished);
    let log = seen();
    rx.register_handlers(probe_bundle(0x05, log.clone()));

    feed_fragmented(&mut rx, &wire, 1)?;

    assert_eq!(log.lock().unwrap().len(), 1);
    assert_eq!(rx.recv_seq(), 1);
    Ok(())
}

#[test]
fn fragmentation_does_not_change_dispatch_sequence() -> Result<()> {
    // Same multi-packet stream under several partitions.
    let mut tx = Session::new(Role::Client);
    for i in 0..5u8 {
        let mut payload = vec![2u8];
        payload.extend_from_slice(&[i; 9]);
        tx.send_payload(&payload)?;
    }
    let wire = tx.out_wire().to_vec();

    let mut reference: Option<Vec<(u8, Vec<u8>)>> = None;
    for chunk in [1usize, 3, 7, 16, wire.len()] {
        let mut rx = Session::new(Role::Client);
        let log = seen();
        capture_inbound(&mut rx, log.clone());
        feed_fragmented(&mut rx, &wire, chunk)?;

        let got = log.lock().unwrap().clone();
        assert_eq!(got.len(), 5, "chunk size {chunk}");
        match &reference {
            None => reference = Some(got),
            Some(r) => assert_eq!(r, &got, "chunk size {chunk}"),
        }
    }
    Ok(())
}

#[test]
fn padding_invariant_across_payload_sizes() -> Result<()> {
    for n in 1usize..=40 {
        let mut tx = Session::new(Role::Client);
        tx.send_payload(&vec![2u8; n])?;
        let wire = tx.out_wire().to_vec();

        let declared = u32::from_be_bytes(wire[..4].try_into()?) as usize;
        let padding = wire[4] as usize;
        assert!(padding >= 4, "payload {n}: padding {padding}");
        assert_eq!((4 + declared) % 8, 0, "payload {n}: not block aligned");
        assert_eq!(declared, 1 + n + padding);
        assert_eq!(wire.len(), 4 + declared);
    }
    Ok(())
}

#[test]
fn sequence_numbers_are_consecutive() -> Result<()> {
    let mut tx = Session::new(Role::Client);
    for _ in 0..4 {
        tx.send_payload(&[2u8, 0xaa])?;
    }
    assert_eq!(tx.send_seq(), 4);
    let wire = tx.out_wire().to_vec();

    let mut rx = Session::new(Role::Client);
    let seqs = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    {
        let seqs = seqs.clone();
        rx.set_capture_sink(Box::new(move |dir, seq, _payload| {
            if dir == ssh_transport_rs::crypto::suite::Direction::Inbound {
                seqs.lock().unwrap().push(seq);
            }
        }));
    }
    let consumed = rx.on_bytes(&wire)?;
    assert_eq!(consumed, wire.len());
    assert_eq!(*seqs.lock().unwrap(), vec![0, 1, 2, 3]);
    assert_eq!(rx.recv_seq(), 4);
    Ok(())
}

#[test]
fn oversize_declared_length_is_fatal_before_buffering() {
    let mut rx = Session::new(Role::Client);
    let mut first_block = [0u8; 8];
    first_block[..4].copy_from_slice(&(MAX_PACKET_LEN + 1).to_be_bytes());

    let err = rx.on_bytes(&first_block).expect_err("must be fatal");
    assert!(matches!(err, TransportError::OversizePacket { .. }));
    assert_eq!(rx.session_phase(), SessionPhase::Error);
    assert!(rx.last_error().unwrap().contains("exceeds"));

    // Poisoned sessions ignore further input.
    assert_eq!(rx.on_bytes(&[0u8; 64]).unwrap(), 0);
}

#[test]
fn short_declared_length_is_fatal() {
    let mut rx = Session::new(Role::Client);
    let mut first_block = [0u8; 8];
    first_block[..4].copy_from_slice(&3u32.to_be_bytes());

    let err = rx.on_bytes(&first_block).expect_err("must be fatal");
    assert!(matches!(err, TransportError::Protocol(_)));
    assert_eq!(rx.session_phase(), SessionPhase::Error);
}

#[test]
fn padding_longer_than_packet_is_fatal() -> Result<()> {
    // Hand-build a packet whose padding byte eats the whole packet.
    let declared = 12u32;
    let mut wire = Vec::new();
    wire.extend_from_slice(&declared.to_be_bytes());
    wire.push(200); // padding_length > packet_length - 1
    wire.extend_from_slice(&[0u8; 11]);

    let mut rx = Session::new(Role::Client);
    let err = rx.on_bytes(&wire).expect_err("must be fatal");
    assert!(matches!(err, TransportError::InvalidPadding { .. }));
    assert_eq!(rx.session_phase(), SessionPhase::Error);
    Ok(())
}

#[test]
fn staged_buffer_resets_after_send() -> Result<()> {
    let mut tx = Session::new(Role::Client);
    tx.stage(&[2u8, 1, 2, 3]);
    tx.send_staged()?;
    let first = tx.out_wire().len();

    // Nothing staged: the next packet is the empty-payload frame, not
    // a duplicate of the previous one.
    tx.send_staged()?;
    let second = tx.out_wire().len() - first;
    let wire = tx.out_wire()[first..].to_vec();
    let declared = u32::from_be_bytes(wire[..4].try_into()?) as usize;
    let padding = wire[4] as usize;
    assert_eq!(declared, 1 + padding);
    assert_eq!(second, 4 + declared);
    Ok(())
}
