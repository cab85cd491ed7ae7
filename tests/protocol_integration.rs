//! Integration tests for the peek/poke protocol against a simulated target
//!
//! - Peek/poke round-trips across the address space
//! - Echo and status failures, and recovery afterwards
//! - Variable-level access driven by a resolved table

mod common;

use common::builders::UnitBuilder;
use common::{assert_float_eq, attached_session};
use destra_rs::protocol::{Fault, HandshakeStep, SessionState, StatusCode, TypeCodec};
use destra_rs::{DestraError, PokeValue, SimulatedDevice, SymbolResolver, TransportSession, Value};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_peek_returns_exactly_size_bytes(address in 0u32..=0xFFF8, size in 1usize..=8) {
        let device = SimulatedDevice::new();
        let mut session = attached_session(&device);
        let data = session.peek(address, size).unwrap();
        prop_assert_eq!(data.len(), size);
    }

    #[test]
    fn prop_poke_then_peek_int(address in 0u32..=0xFFF0, value in any::<i64>(), width in prop::sample::select(vec![1u8, 2, 4])) {
        // Reduce into the width's range so the value always fits
        let bits = width as u32 * 8;
        let value = value.rem_euclid(1i64 << bits);
        let device = SimulatedDevice::new();
        let mut session = attached_session(&device);

        session.poke(address, &PokeValue::int_with_width(value, width)).unwrap();
        let data = session.peek(address, width as usize).unwrap();

        let expected = PokeValue::int_with_width(value, width).encode().unwrap();
        prop_assert_eq!(data, expected);
    }

    #[test]
    fn prop_poke_then_peek_float(address in 0u32..=0xFFF0, value in proptest::num::f32::NORMAL) {
        let device = SimulatedDevice::new();
        let mut session = attached_session(&device);

        session.poke(address, &PokeValue::Float32(value)).unwrap();
        let data = session.peek(address, 4).unwrap();
        prop_assert_eq!(data.clone(), value.to_le_bytes().to_vec());
        prop_assert_eq!(TypeCodec::decode(&data, "float").unwrap(), Value::Float(value as f64));
    }

    #[test]
    fn prop_echo_fault_at_any_step_is_isolated(position in 0usize..6, corrupt in any::<bool>()) {
        let device = SimulatedDevice::new();
        device.load(0x0100, &[0x5A, 0xA5]);
        let mut session = attached_session(&device);

        device.inject(if corrupt { Fault::CorruptEcho(position) } else { Fault::DropEcho(position) });
        let err = session.peek(0x0100, 2).unwrap_err();
        prop_assert!(err.is_protocol_error());
        let is_magic = position < 2;
        let is_handshake_failure = matches!(err, DestraError::HandshakeFailure { .. });
        prop_assert_eq!(is_handshake_failure, is_magic);
        prop_assert_eq!(session.state(), SessionState::Idle);

        // The next, independent call sees a clean link
        prop_assert_eq!(session.peek(0x0100, 2).unwrap(), vec![0x5A, 0xA5]);
    }
}

#[test]
fn test_echo_mismatch_names_step_and_bytes() {
    let device = SimulatedDevice::new();
    let mut session = attached_session(&device);
    device.inject(Fault::CorruptEcho(4));

    match session.peek(0x1234, 1) {
        Err(DestraError::EchoMismatch {
            ctx,
            step,
            expected,
            got,
        }) => {
            assert_eq!(step, HandshakeStep::AddressHigh);
            assert_eq!(expected, 0x12);
            assert_eq!(got, Some(!0x12));
            assert_eq!(ctx.address, 0x1234);
        }
        other => panic!("expected echo mismatch, got {:?}", other),
    }
}

#[test]
fn test_dropped_magic_echo_is_handshake_timeout() {
    let device = SimulatedDevice::new();
    let mut session = attached_session(&device);
    device.inject(Fault::DropEcho(1));

    match session.peek(0x0000, 1) {
        Err(DestraError::HandshakeFailure { step, got, .. }) => {
            assert_eq!(step, HandshakeStep::MagicLow);
            assert_eq!(got, None);
        }
        other => panic!("expected handshake failure, got {:?}", other),
    }
}

#[test]
fn test_address_range_status_carries_no_data() {
    let device = SimulatedDevice::with_memory_size(0x0900);
    let mut session = attached_session(&device);

    let err = session.peek(0x08FF, 2).unwrap_err();
    assert!(matches!(
        err,
        DestraError::DeviceStatus {
            status: StatusCode::AddressRangeError,
            ..
        }
    ));

    // No stray data bytes are left to corrupt the next exchange
    device.load(0x0010, &[7]);
    assert_eq!(session.peek(0x0010, 1).unwrap(), vec![7]);
}

#[test]
fn test_forced_statuses() {
    let device = SimulatedDevice::new();
    let mut session = attached_session(&device);

    for status in [StatusCode::AddressRangeError, StatusCode::SizeError, StatusCode::Unknown(0x7F)] {
        device.inject(Fault::ForceStatus(status));
        match session.peek(0x0100, 1) {
            Err(DestraError::DeviceStatus { status: got, .. }) => assert_eq!(got, status),
            other => panic!("expected {:?}, got {:?}", status, other),
        }
    }
    assert_eq!(session.stats().failed, 3);
}

#[test]
fn test_short_read_and_verify_mismatch() {
    let device = SimulatedDevice::new();
    let mut session = attached_session(&device);

    device.inject(Fault::TruncateData(1));
    assert!(matches!(
        session.peek(0x0100, 4),
        Err(DestraError::ShortRead { received: 1, .. })
    ));

    device.inject(Fault::CorruptReadback);
    match session.poke(0x0100, &PokeValue::int_with_width(0x1234, 2)) {
        Err(DestraError::VerifyMismatch { sent, received, .. }) => {
            assert_eq!(sent, vec![0x34, 0x12]);
            assert_eq!(received, vec![!0x34, 0x12]);
        }
        other => panic!("expected verify mismatch, got {:?}", other),
    }

    device.inject(Fault::CorruptHeader);
    assert!(matches!(
        session.peek(0x0100, 1),
        Err(DestraError::MalformedResponse { .. })
    ));

    assert_eq!(session.peek(0x0100, 2).unwrap(), vec![0x34, 0x12]);
}

#[test]
fn test_out_of_range_requests_never_reach_the_wire() {
    let device = SimulatedDevice::new();
    let mut session = attached_session(&device);

    assert!(matches!(
        session.peek(0x1_0000, 1),
        Err(DestraError::AddressOutOfRange { address: 0x1_0000 })
    ));
    assert!(matches!(
        session.peek(0, 9),
        Err(DestraError::SizeOutOfRange { size: 9 })
    ));
    assert!(matches!(
        session.peek(0, 0),
        Err(DestraError::SizeOutOfRange { size: 0 })
    ));
    assert!(device.handled_requests().is_empty());
}

#[test]
fn test_ready_banner_is_captured() {
    let device = SimulatedDevice::new().with_banner("ECHO_TEST_READY");
    let session = attached_session(&device);
    assert_eq!(session.banner(), Some("ECHO_TEST_READY"));
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn test_disconnect_closes_channel() {
    let device = SimulatedDevice::new();
    let mut session = attached_session(&device);
    session.disconnect();

    assert!(!device.is_open());
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(matches!(session.peek(0, 1), Err(DestraError::NotConnected)));
}

#[test]
fn test_variable_access_through_resolved_table() {
    let mut b = UnitBuilder::new("main.c");
    let int = b.base("int", 2);
    let float = b.base("double", 4);
    let u8_t = b.base("unsigned char", 1);
    let arr = b.array(u8_t, &[4]);
    let s = b.structure("S", 6, &[("a", 0, int), ("b", 2, float)]);
    b.variable("s", s, 0x0200);
    b.variable("buf", arr, 0x0210);
    let table = SymbolResolver::resolve(&b.build()).unwrap();

    let device = SimulatedDevice::new();
    let mut session = attached_session(&device);

    let a = table.get("s.a").unwrap();
    session.poke_variable(a, &Value::Signed(-300)).unwrap();
    assert_eq!(session.peek_variable(a).unwrap(), Value::Signed(-300));

    let b_member = table.get("s.b").unwrap();
    session.poke_variable(b_member, &Value::Float(2.5)).unwrap();
    match session.peek_variable(b_member).unwrap() {
        Value::Float(v) => assert_float_eq(v, 2.5, 1e-6),
        other => panic!("expected float, got {:?}", other),
    }

    device.load(0x0210, &[1, 2, 3, 4]);
    assert_eq!(
        session.peek_variable(table.get("buf").unwrap()).unwrap(),
        Value::Text("01 02 03 04".to_string())
    );
    assert_eq!(
        session.peek_variable(table.get("buf[2]").unwrap()).unwrap(),
        Value::Unsigned(3)
    );

    // Out of range for the variable's tag
    assert!(session.poke_variable(a, &Value::Signed(40_000)).is_err());
}

#[test]
fn test_sample_returns_one_result_per_variable() {
    let mut b = UnitBuilder::new("main.c");
    let u16_t = b.base("uint16_t", 2);
    let big = b.base("long long int", 8);
    let huge = b.array(u16_t, &[8]);
    b.variable("speed", u16_t, 0x0100);
    b.variable("ticks", big, 0x0102);
    b.variable("table", huge, 0x0110);
    let table = SymbolResolver::resolve(&b.build()).unwrap();

    let device = SimulatedDevice::new();
    device.load(0x0100, &[0x10, 0x27]);
    let mut session = attached_session(&device);

    let vars: Vec<_> = ["speed", "ticks", "table"]
        .iter()
        .map(|n| table.get(n).unwrap().clone())
        .collect();
    let results = session.sample(&vars);

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap(), &Value::Unsigned(10_000));
    assert!(matches!(results[1], Err(DestraError::UnknownTypeTag(_))));
    assert!(matches!(results[2], Err(DestraError::SizeOutOfRange { size: 16 })));
}

#[test]
fn test_stats_track_exchanges() {
    let device = SimulatedDevice::new();
    let mut session = attached_session(&device);

    session.peek(0, 4).unwrap();
    session.poke(0, &PokeValue::int(1)).unwrap();
    device.inject(Fault::ForceStatus(StatusCode::SizeError));
    let _ = session.peek(0, 1);

    let stats = session.stats();
    assert_eq!(stats.successful, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.total_bytes, 5);

    session.reset_stats();
    assert_eq!(session.stats().successful, 0);
}

#[test]
fn test_poke_auto_width_on_the_wire() {
    let device = SimulatedDevice::new();
    let mut session = attached_session(&device);

    session.poke(0x0300, &PokeValue::int(300)).unwrap();
    session.poke(0x0310, &PokeValue::int(70_000)).unwrap();

    let sizes: Vec<u8> = device.handled_requests().iter().map(|r| r.size).collect();
    assert_eq!(sizes, vec![2, 4]);
    assert_eq!(device.read_memory(0x0300, 2), vec![0x2C, 0x01]);
    assert_eq!(device.read_memory(0x0310, 4), 70_000u32.to_le_bytes().to_vec());
}

#[test]
fn test_session_is_reusable_after_reattach() {
    let first = SimulatedDevice::new();
    let mut session: TransportSession = attached_session(&first);
    session.peek(0, 1).unwrap();

    let second = SimulatedDevice::new();
    second.load(0x0042, &[0x99]);
    session.attach(Box::new(second.clone())).unwrap();

    assert!(!first.is_open());
    assert_eq!(session.peek(0x0042, 1).unwrap(), vec![0x99]);
}
