// SPDX-License-Identifier: AGPL-3.0-or-later GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{Arc, Mutex};

use anyhow::Result;
use ssh_transport_rs::{
    handlers::{DispatchOutcome, Handler, HandlerBundle},
    session::{Session, phases::Role},
};

use super::{authenticated_session, probe_bundle, seen};

#[test]
fn earlier_bundles_take_precedence() -> Result<()> {
    // IGNORE is claimed by the built-in default bundle; a later probe
    // must never see it.
    let mut tx = Session::new(Role::Client);
    tx.send_payload(&[2u8, 0xff])?;
    let wire = tx.out_wire().to_vec();

    let mut rx = Session::new(Role::Client);
    let log = seen();
    rx.register_handlers(probe_bundle(2, log.clone()));
    rx.on_bytes(&wire)?;

    assert!(log.lock().unwrap().is_empty());
    assert_eq!(rx.recv_seq(), 1);
    Ok(())
}

#[test]
fn declined_packets_fall_through_to_later_bundles() -> Result<()> {
    let mut tx = Session::new(Role::Client);
    tx.send_payload(&[90u8, 1, 2, 3])?;
    let wire = tx.out_wire().to_vec();

    let mut rx = authenticated_session(Role::Server);
    let first_called = Arc::new(Mutex::new(0u32));
    {
        let first_called = first_called.clone();
        rx.register_handlers(HandlerBundle::new(90, 1).with(
            90,
            Box::new(move |_s: &mut Session, _ty, _p: &[u8]| {
                *first_called.lock().unwrap() += 1;
                DispatchOutcome::NotUsed
            }) as Handler,
        ));
    }
    let log = seen();
    rx.register_handlers(probe_bundle(90, log.clone()));

    rx.on_bytes(&wire)?;
    assert_eq!(*first_called.lock().unwrap(), 1, "first bundle was offered");
    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1, "second bundle consumed");
    assert_eq!(log[0].1, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn unclaimed_allowed_packet_triggers_unimplemented() -> Result<()> {
    let mut tx = Session::new(Role::Client);
    tx.send_payload(&[90u8])?;
    let wire = tx.out_wire().to_vec();

    // CHANNEL_OPEN is allowed once authenticated, but nothing handles
    // it here.
    let mut rx = authenticated_session(Role::Server);
    rx.on_bytes(&wire)?;

    let reply = rx.out_wire().to_vec();
    assert_eq!(reply[5], 3, "UNIMPLEMENTED reply");
    assert_eq!(&reply[6..10], &0u32.to_be_bytes());
    Ok(())
}

#[test]
fn handlers_may_register_new_bundles() -> Result<()> {
    let mut tx = Session::new(Role::Client);
    tx.send_payload(&[90u8])?;
    tx.send_payload(&[91u8, 9])?;
    let wire = tx.out_wire().to_vec();

    let mut rx = authenticated_session(Role::Server);
    let log = seen();
    {
        let log = log.clone();
        rx.register_handlers(HandlerBundle::new(90, 1).with(
            90,
            Box::new(move |s: &mut Session, _ty, _p: &[u8]| {
                // Open confirmed: install the data-phase bundle.
                s.register_handlers(probe_bundle(91, log.clone()));
                DispatchOutcome::Used
            }) as Handler,
        ));
    }

    rx.on_bytes(&wire)?;
    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].0, 91);
    assert_eq!(log[0].1, vec![9]);
    Ok(())
}

#[test]
fn handlers_cannot_reenter_the_reassembler() -> Result<()> {
    let mut tx = Session::new(Role::Client);
    tx.send_payload(&[90u8])?;
    let packet_one = tx.out_wire().to_vec();
    tx.consume_out_wire(usize::MAX);
    tx.send_payload(&[91u8])?;
    let packet_two = tx.out_wire().to_vec();

    let mut rx = authenticated_session(Role::Server);
    let nested_consumed = Arc::new(Mutex::new(None));
    {
        let nested_consumed = nested_consumed.clone();
        let packet_two = packet_two.clone();
        rx.register_handlers(HandlerBundle::new(90, 1).with(
            90,
            Box::new(move |s: &mut Session, _ty, _p: &[u8]| {
                let r = s.on_bytes(&packet_two);
                *nested_consumed.lock().unwrap() = Some(r.map(|n| n));
                DispatchOutcome::Used
            }) as Handler,
        ));
    }

    rx.on_bytes(&packet_one)?;
    match nested_consumed.lock().unwrap().take() {
        Some(Ok(0)) => {},
        other => panic!("nested feed must consume nothing, got {other:?}"),
    }
    // The session is healthy and processes the second packet when fed
    // from the outside.
    assert_eq!(rx.on_bytes(&packet_two)?, packet_two.len());
    assert_eq!(rx.recv_seq(), 2);
    Ok(())
}

#[test]
fn disconnect_handler_ends_the_session() -> Result<()> {
    // DISCONNECT: code 11, "bye", empty language tag.
    let mut payload = vec![1u8];
    payload.extend_from_slice(&11u32.to_be_bytes());
    payload.extend_from_slice(&3u32.to_be_bytes());
    payload.extend_from_slice(b"bye");
    payload.extend_from_slice(&0u32.to_be_bytes());

    let mut tx = Session::new(Role::Server);
    tx.send_payload(&payload)?;
    let wire = tx.out_wire().to_vec();

    let mut rx = Session::new(Role::Client);
    rx.on_bytes(&wire)?;
    assert_eq!(
        rx.session_phase(),
        ssh_transport_rs::session::phases::SessionPhase::Error
    );
    let msg = rx.last_error().expect("error recorded");
    assert!(msg.contains("11") && msg.contains("bye"), "{msg}");
    Ok(())
}
