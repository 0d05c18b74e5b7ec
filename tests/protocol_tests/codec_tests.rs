//! Codec Tests
//!
//! Tests for wire message encoding/decoding.

use std::net::Ipv4Addr;

use bytes::BytesMut;
use sanblk::protocol::{
    get_u48, put_u48, sectors_to_bytes,
    DataResponse, DiskInfo, Find, FindResponse, Get, Header, Identify, LengthExponent, Opcode,
    PartitionInfo, Put, PutResponse, Resolve, ResolveResponse, WireMessage, HEADER_LEN,
};
use sanblk::SanError;

// =============================================================================
// Helper Functions
// =============================================================================

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

// =============================================================================
// Header Tests
// =============================================================================

#[test]
fn test_header_layout() {
    let encoded = Get::new(7, LengthExponent::SECTOR).encode(0x1234);

    assert_eq!(encoded[0], Opcode::Get as u8);
    assert_eq!(encoded[1], 9);
    assert_eq!(&encoded[2..4], &[0x12, 0x34]);
}

#[test]
fn test_header_parse() {
    let header = Header::parse(&[0x11, 0x0a, 0x7f, 0xff]).unwrap();

    assert!(header.is(Opcode::GetResponse));
    assert_eq!(header.length_exponent, 10);
    assert_eq!(header.seq, 0x7fff);
}

#[test]
fn test_header_too_short() {
    let result = Header::parse(&[0x11, 0x09, 0x00]);
    assert!(matches!(result, Err(SanError::Truncated { expected: 4, actual: 3 })));
}

#[test]
fn test_unknown_opcode_keeps_raw_value() {
    let header = Header::parse(&[0x42, 0, 0, 1]).unwrap();
    assert_eq!(header.opcode, 0x42);
    assert!(Opcode::from_u8(0x42).is_none());
}

// =============================================================================
// Length Exponent Tests
// =============================================================================

#[test]
fn test_length_exponent_for_valid_sizes() {
    for exponent in 9u8..=15 {
        let le = LengthExponent::for_len(1u64 << exponent).unwrap();
        assert_eq!(le.get(), exponent);
        assert_eq!(le.bytes(), 1usize << exponent);
    }
}

#[test]
fn test_length_exponent_rejects_invalid_sizes() {
    for len in [0u64, 256, 511, 513, 1000, 65536] {
        assert!(matches!(LengthExponent::for_len(len), Err(SanError::InvalidLength(l)) if l == len));
    }
    assert!(matches!(LengthExponent::new(8), Err(SanError::InvalidExponent(8))));
    assert!(matches!(LengthExponent::new(16), Err(SanError::InvalidExponent(16))));
}

// =============================================================================
// Request Tests
// =============================================================================

#[test]
fn test_find_is_header_only() {
    let encoded = Find.encode(3);
    assert_eq!(encoded.len(), HEADER_LEN);

    let (header, _) = Find::decode(&encoded).unwrap();
    assert!(header.is(Opcode::Find));
    assert_eq!(header.seq, 3);
}

#[test]
fn test_identify_length() {
    let encoded = Identify.encode(9);
    assert_eq!(encoded.len(), 28);
    assert_eq!(encoded[0], 0x13);
}

#[test]
fn test_encode_decode_resolve() {
    let resolve = Resolve::new("disk0-part1").unwrap();
    let encoded = resolve.encode(100);
    assert_eq!(encoded.len(), 68);

    let (header, decoded) = Resolve::decode(&encoded).unwrap();
    assert_eq!(header.seq, 100);
    assert_eq!(decoded.id(), "disk0-part1");
}

#[test]
fn test_resolve_identifier_at_limit() {
    let id = "x".repeat(64);
    let encoded = Resolve::new(id.clone()).unwrap().encode(1);
    let (_, decoded) = Resolve::decode(&encoded).unwrap();
    assert_eq!(decoded.id(), id);
}

#[test]
fn test_resolve_identifier_too_long() {
    let result = Resolve::new("x".repeat(65));
    assert!(matches!(result, Err(SanError::IdentifierTooLong(65))));
}

#[test]
fn test_encode_decode_get() {
    let get = Get::new(0x0102_0304, LengthExponent::new(12).unwrap());
    let encoded = get.encode(42);
    assert_eq!(encoded.len(), 28);
    assert_eq!(&encoded[22..26], &[1, 2, 3, 4]);

    let (header, decoded) = Get::decode(&encoded).unwrap();
    assert_eq!(header.length_exponent, 12);
    assert_eq!(decoded.block.sector, 0x0102_0304);
    assert_eq!(decoded.length_exponent.bytes(), 4096);
}

#[test]
fn test_encode_decode_put() {
    let payload = pattern(2048);
    let put = Put::new(77, payload.clone()).unwrap();
    let encoded = put.encode(5);
    assert_eq!(encoded.len(), 28 + 2048);
    assert_eq!(encoded[1], 11);

    let (_, decoded) = Put::decode(&encoded).unwrap();
    assert_eq!(decoded.block.sector, 77);
    assert_eq!(decoded.payload(), &payload[..]);
}

#[test]
fn test_put_rejects_odd_payload() {
    assert!(matches!(Put::new(0, vec![0u8; 1000]), Err(SanError::InvalidLength(1000))));
}

#[test]
fn test_put_truncated_payload() {
    let encoded = Put::new(0, pattern(1024)).unwrap().encode(1);
    let result = Put::decode(&encoded[..600]);
    assert!(matches!(result, Err(SanError::Truncated { .. })));
}

// =============================================================================
// Response Tests
// =============================================================================

#[test]
fn test_encode_decode_find_response() {
    let response = FindResponse { addr: Ipv4Addr::new(10, 0, 0, 7) };
    let encoded = response.encode(8);
    assert_eq!(encoded.len(), 20);
    assert_eq!(&encoded[16..20], &[10, 0, 0, 7]);

    let (_, decoded) = FindResponse::decode(&encoded).unwrap();
    assert_eq!(decoded, response);
}

#[test]
fn test_encode_decode_resolve_response() {
    let response = ResolveResponse { addr: Ipv4Addr::new(192, 168, 1, 50) };
    let encoded = response.encode(8);
    assert_eq!(encoded.len(), 104);
    assert_eq!(&encoded[80..84], &[192, 168, 1, 50]);

    let (_, decoded) = ResolveResponse::decode(&encoded).unwrap();
    assert_eq!(decoded.addr, Ipv4Addr::new(192, 168, 1, 50));
}

#[test]
fn test_encode_decode_disk_info() {
    let info = DiskInfo {
        version: "PSAN 1.2".to_string(),
        label: "rack-a".to_string(),
        total_size: sectors_to_bytes(1_000_000),
        free_size: sectors_to_bytes(250_000),
        partitions: 3,
    };
    let encoded = info.encode(11);
    assert_eq!(encoded.len(), 540);
    assert_eq!(encoded[1], 9);

    let (_, decoded) = DiskInfo::decode(&encoded).unwrap();
    assert_eq!(decoded, info);
}

#[test]
fn test_encode_decode_partition_info() {
    let info = PartitionInfo {
        id: "0123456789abcdef".to_string(),
        label: "data".to_string(),
        size: sectors_to_bytes(2048),
    };
    let encoded = info.encode(12);
    assert_eq!(encoded.len(), 540);

    let (_, decoded) = PartitionInfo::decode(&encoded).unwrap();
    assert_eq!(decoded, info);
}

#[test]
fn test_encode_decode_data_response() {
    let payload = pattern(512);
    let response = DataResponse::new(9, payload.clone()).unwrap();
    let encoded = response.encode(13);
    assert_eq!(encoded.len(), DataResponse::wire_len_for(512));

    let (header, decoded) = DataResponse::decode(&encoded).unwrap();
    assert!(header.is(Opcode::GetResponse));
    assert_eq!(decoded.block.sector, 9);
    assert_eq!(decoded.payload(), &payload[..]);
}

#[test]
fn test_payload_of_requires_exact_length() {
    let encoded = DataResponse::new(0, pattern(512)).unwrap().encode(1);

    assert_eq!(DataResponse::payload_of(&encoded, 512), Some(&encoded[28..]));
    assert!(DataResponse::payload_of(&encoded, 1024).is_none());
    assert!(DataResponse::payload_of(&encoded[..539], 512).is_none());
}

#[test]
fn test_encode_decode_put_response() {
    let response = PutResponse { block: Get::new(4, LengthExponent::SECTOR).block };
    let encoded = response.encode(14);
    assert_eq!(encoded.len(), 28);

    let (_, decoded) = PutResponse::decode(&encoded).unwrap();
    assert_eq!(decoded.block.sector, 4);
}

// =============================================================================
// Decode Error Tests
// =============================================================================

#[test]
fn test_decode_wrong_opcode() {
    let encoded = PutResponse { block: Get::new(0, LengthExponent::SECTOR).block }.encode(1);
    let result = DataResponse::decode(&encoded);

    assert!(matches!(
        result,
        Err(SanError::UnexpectedOpcode { expected: 0x11, found: 0x04 })
    ));
}

#[test]
fn test_decode_truncated_response() {
    let encoded = ResolveResponse { addr: Ipv4Addr::LOCALHOST }.encode(1);
    let result = ResolveResponse::decode(&encoded[..100]);
    assert!(matches!(result, Err(SanError::Truncated { expected: 104, actual: 100 })));
}

// =============================================================================
// Field Helper Tests
// =============================================================================

#[test]
fn test_get_u48() {
    assert_eq!(get_u48(&[0, 0, 0, 0, 2, 0]), 512);
    assert_eq!(get_u48(&[0xff; 6]), 0xffff_ffff_ffff);
}

#[test]
fn test_put_u48() {
    let mut buf = BytesMut::new();
    put_u48(&mut buf, 0x0000_0102_0304_0506);
    assert_eq!(&buf[..], &[1, 2, 3, 4, 5, 6]);
}

#[test]
fn test_sector_conversion() {
    assert_eq!(sectors_to_bytes(1), 512);
    assert_eq!(sectors_to_bytes(get_u48(&[0, 0, 0, 0, 0, 8])), 4096);
}
