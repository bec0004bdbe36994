//! Handshake Tests
//!
//! Tests for the init sequence: version negotiation and catalog
//! population.

use ferrolink::catalog::{CURVE_MAX_BLOCKS, VAR_MAX_SIZE};
use ferrolink::{Client, FerroError, Opcode};

use crate::common::{self, MockTransport};

// =============================================================================
// Version Negotiation Tests
// =============================================================================

#[test]
fn test_handshake_with_legacy_server() {
    let (transport, state) = MockTransport::new();
    common::script_handshake(&state, None, &[], &[], &[], &[]);

    let mut client = Client::new(transport);
    client.init().unwrap();

    assert!(client.is_initialized());
    assert_eq!(client.version().unwrap().as_str(), "1.00.000");
    assert!(client.vars().is_empty());
    assert!(client.groups().is_empty());
    assert!(client.curves().is_empty());
    assert!(client.funcs().is_empty());
}

#[test]
fn test_handshake_with_reported_version() {
    let (transport, state) = MockTransport::new();
    common::script_handshake(&state, Some((2, 10, 5)), &[], &[], &[], &[]);

    let mut client = Client::new(transport);
    client.init().unwrap();

    let version = client.version().unwrap();
    assert_eq!(version.major, 2);
    assert_eq!(version.minor, 10);
    assert_eq!(version.revision, 5);
    assert_eq!(version.as_str(), "2.10.005");
}

#[test]
fn test_version_response_too_short() {
    let (transport, state) = MockTransport::new();
    common::push(&state, Opcode::Version, &[2, 10]);

    let mut client = Client::new(transport);
    let result = client.init();

    assert!(matches!(result, Err(FerroError::Comm(_))));
    assert!(!client.is_initialized());
}

#[test]
fn test_handshake_request_sequence() {
    let (transport, state) = MockTransport::new();
    common::script_handshake(
        &state,
        Some((2, 0, 0)),
        &[0x81],
        &[(0x01, vec![0])],
        &[([0x01, 0x40, 0x00, 0x00, 0x01], Some(vec![0xAA; 16]))],
        &[0x00],
    );

    let mut client = Client::new(transport);
    client.init().unwrap();

    let opcodes: Vec<u8> = common::sent(&state).iter().map(|f| f[0]).collect();
    assert_eq!(
        opcodes,
        vec![
            Opcode::QueryVersion as u8,
            Opcode::VarQueryList as u8,
            Opcode::GroupQueryList as u8,
            Opcode::GroupQuery as u8,
            Opcode::CurveQueryList as u8,
            Opcode::CurveQueryCsum as u8,
            Opcode::FuncQueryList as u8,
        ]
    );
}

// =============================================================================
// Variable List Tests
// =============================================================================

#[test]
fn test_variable_descriptor_decoding() {
    let (transport, state) = MockTransport::new();
    common::script_handshake(&state, Some((2, 0, 0)), &[0x82, 0x04, 0x00], &[], &[], &[]);

    let mut client = Client::new(transport);
    client.init().unwrap();

    let vars = client.vars();
    assert_eq!(vars.len(), 3);

    assert_eq!(vars[0].id, 0);
    assert_eq!(vars[0].size, 2);
    assert!(vars[0].writable);

    assert_eq!(vars[1].id, 1);
    assert_eq!(vars[1].size, 4);
    assert!(!vars[1].writable);

    // A size of zero wraps around to the maximum
    assert_eq!(vars[2].id, 2);
    assert_eq!(vars[2].size, VAR_MAX_SIZE);
    assert!(!vars[2].writable);
}

#[test]
fn test_variable_ids_are_dense() {
    let (transport, state) = MockTransport::new();
    common::script_handshake(&state, Some((2, 0, 0)), &[0x01; 17], &[], &[], &[]);

    let mut client = Client::new(transport);
    client.init().unwrap();

    for (index, var) in client.vars().iter().enumerate() {
        assert_eq!(usize::from(var.id), index);
        assert!(var.size >= 1 && var.size <= VAR_MAX_SIZE);
    }
}

// =============================================================================
// Group List Tests
// =============================================================================

#[test]
fn test_group_population() {
    let (transport, state) = MockTransport::new();
    common::script_handshake(
        &state,
        Some((2, 0, 0)),
        &[0x82, 0x04, 0x81],
        &[(0x83, vec![0, 1, 2]), (0x02, vec![1, 2])],
        &[],
        &[],
    );

    let mut client = Client::new(transport);
    client.init().unwrap();

    let groups = client.groups();
    assert_eq!(groups.len(), 2);

    assert_eq!(groups[0].id, 0);
    assert!(groups[0].writable);
    assert_eq!(groups[0].size, 2 + 4 + 1);
    assert_eq!(groups[0].members().len(), 3);

    assert_eq!(groups[1].id, 1);
    assert!(!groups[1].writable);
    assert_eq!(groups[1].size, 4 + 1);

    // Group sizes are the sum of the live member variable sizes
    for group in groups {
        let sum: usize = group
            .members()
            .iter()
            .map(|&member| client.variable(member).unwrap().size)
            .sum();
        assert_eq!(group.size, sum);
    }
}

#[test]
fn test_group_member_query_failure_clears_groups() {
    let (transport, state) = MockTransport::new();
    common::push(&state, Opcode::Version, &[2, 0, 0]);
    common::push(&state, Opcode::VarList, &[0x81, 0x81]);
    common::push(&state, Opcode::GroupList, &[0x02, 0x02]);
    common::push(&state, Opcode::Group, &[0, 1]);
    common::push(&state, Opcode::ErrInternal, &[]);

    let mut client = Client::new(transport);
    let result = client.init();

    assert!(matches!(result, Err(FerroError::Comm(_))));
    assert!(!client.is_initialized());
    assert!(client.groups().is_empty());
    // The variables list survives; only the half-queried groups are dropped
    assert_eq!(client.vars().len(), 2);
}

#[test]
fn test_group_member_count_mismatch() {
    let (transport, state) = MockTransport::new();
    common::push(&state, Opcode::Version, &[2, 0, 0]);
    common::push(&state, Opcode::VarList, &[0x81, 0x81]);
    common::push(&state, Opcode::GroupList, &[0x03]);
    common::push(&state, Opcode::Group, &[0, 1]);

    let mut client = Client::new(transport);
    let result = client.init();

    assert!(matches!(result, Err(FerroError::Comm(_))));
    assert!(client.groups().is_empty());
}

#[test]
fn test_group_referencing_unknown_variable() {
    let (transport, state) = MockTransport::new();
    common::push(&state, Opcode::Version, &[2, 0, 0]);
    common::push(&state, Opcode::VarList, &[0x81]);
    common::push(&state, Opcode::GroupList, &[0x01]);
    common::push(&state, Opcode::Group, &[7]);

    let mut client = Client::new(transport);
    let result = client.init();

    assert!(matches!(result, Err(FerroError::Comm(_))));
    assert!(client.groups().is_empty());
}

// =============================================================================
// Curve List Tests
// =============================================================================

#[test]
fn test_curve_record_decoding() {
    let (transport, state) = MockTransport::new();
    let csum: Vec<u8> = (0..16).collect();
    common::script_handshake(
        &state,
        Some((2, 0, 0)),
        &[],
        &[],
        &[
            ([0x01, 0x40, 0x00, 0x00, 0x02], Some(csum.clone())),
            ([0x00, 0x00, 0x80, 0x00, 0x00], None),
        ],
        &[],
    );

    let mut client = Client::new(transport);
    client.init().unwrap();

    let curves = client.curves();
    assert_eq!(curves.len(), 2);

    assert_eq!(curves[0].id, 0);
    assert!(curves[0].writable);
    assert_eq!(curves[0].block_size, 0x4000);
    assert_eq!(curves[0].nblocks, 2);
    assert_eq!(curves[0].checksum.as_slice(), csum.as_slice());

    // A block count of zero wraps around to the maximum
    assert_eq!(curves[1].id, 1);
    assert!(!curves[1].writable);
    assert_eq!(curves[1].block_size, 0x0080);
    assert_eq!(curves[1].nblocks, CURVE_MAX_BLOCKS);
}

#[test]
fn test_checksum_fetch_failure_is_not_fatal() {
    let (transport, state) = MockTransport::new();
    common::script_handshake(
        &state,
        Some((2, 0, 0)),
        &[],
        &[],
        &[([0x01, 0x40, 0x00, 0x00, 0x01], None)],
        &[],
    );

    let mut client = Client::new(transport);
    client.init().unwrap();

    assert!(client.is_initialized());
    assert_eq!(client.curves()[0].checksum, [0u8; 16]);
}

#[test]
fn test_malformed_curve_list_is_fatal() {
    let (transport, state) = MockTransport::new();
    common::push(&state, Opcode::Version, &[2, 0, 0]);
    common::push(&state, Opcode::VarList, &[]);
    common::push(&state, Opcode::GroupList, &[]);
    // 7 bytes is not a whole number of 5-byte records
    common::push(&state, Opcode::CurveList, &[0; 7]);

    let mut client = Client::new(transport);
    let result = client.init();

    assert!(matches!(result, Err(FerroError::Comm(_))));
    assert!(!client.is_initialized());
}

// =============================================================================
// Function List Tests
// =============================================================================

#[test]
fn test_function_descriptor_decoding() {
    let (transport, state) = MockTransport::new();
    common::script_handshake(&state, Some((2, 0, 0)), &[], &[], &[], &[0x12, 0x00, 0xFF]);

    let mut client = Client::new(transport);
    client.init().unwrap();

    let funcs = client.funcs();
    assert_eq!(funcs.len(), 3);

    assert_eq!(funcs[0].input_size, 1);
    assert_eq!(funcs[0].output_size, 2);

    assert_eq!(funcs[1].input_size, 0);
    assert_eq!(funcs[1].output_size, 0);

    assert_eq!(funcs[2].input_size, 15);
    assert_eq!(funcs[2].output_size, 15);

    for (index, func) in funcs.iter().enumerate() {
        assert_eq!(usize::from(func.id), index);
        assert!(func.input_size <= 15 && func.output_size <= 15);
    }
}

// =============================================================================
// Failure Propagation Tests
// =============================================================================

#[test]
fn test_unexpected_list_response_fails_init() {
    let (transport, state) = MockTransport::new();
    common::push(&state, Opcode::Version, &[2, 0, 0]);
    common::push(&state, Opcode::Ok, &[]);

    let mut client = Client::new(transport);
    let result = client.init();

    assert!(matches!(result, Err(FerroError::Comm(_))));
    assert!(!client.is_initialized());
}

#[test]
fn test_transport_failure_fails_init() {
    let (transport, state) = MockTransport::new();
    state.borrow_mut().fail_send = true;

    let mut client = Client::new(transport);
    let result = client.init();

    assert!(matches!(result, Err(FerroError::Io(_))));
    assert!(!client.is_initialized());
}

#[test]
fn test_reinit_invalidates_old_handles() {
    let (transport, state) = MockTransport::new();
    common::script_handshake(&state, Some((2, 0, 0)), &[0x81, 0x81], &[], &[], &[]);

    let mut client = Client::new(transport);
    client.init().unwrap();
    let stale = client.var_handle(1).unwrap();

    common::script_handshake(&state, Some((2, 0, 0)), &[0x81, 0x81], &[], &[], &[]);
    client.init().unwrap();

    assert!(client.variable(stale).is_none());
    let result = client.read_var(stale);
    assert!(matches!(result, Err(FerroError::ParamInvalid(_))));
}
