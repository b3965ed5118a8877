//! IPv4 header construction and parsing: the shared prelude and postlude of
//! every packet builder in this stack.
//!
//! Builders write into a caller-provided buffer pre-zeroed to
//! [`crate::PACKET_SIZE`] bytes at byte offset 0. No options, no
//! fragmentation: every datagram built here has `IHL=5` and `DF=0`.

use std::net::Ipv4Addr;

use crate::checksum;
use crate::prng;

/// Fixed IPv4 header length used throughout this stack (no options).
pub const HEADER_LEN: usize = 20;

pub const PROTO_ICMP: u8 = 1;
pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;

pub const TTL: u8 = 64;

/// Writes the IPv4 shell (everything except the protocol payload) into
/// `buf[0..20)`: version/IHL, DSCP/ECN=0, total length, a random
/// identification field (RFC 6864: uniqueness not required), flags/fragment
/// offset=0, TTL=64, protocol, source and destination addresses. The header
/// checksum is computed last, over `buf[0..20)`, and written into
/// `buf[10..12)`.
///
/// `total_len` is the full datagram length (header + everything above it)
/// that the caller has already written past byte 20.
pub fn write_shell(buf: &mut [u8], total_len: u16, protocol: u8, src: Ipv4Addr, dst: Ipv4Addr) {
    buf[0] = 0x45; // version 4, IHL 5
    buf[1] = 0x00; // DSCP/ECN
    buf[2..4].copy_from_slice(&total_len.to_be_bytes());
    let ident = prng::random_u16();
    buf[4..6].copy_from_slice(&ident.to_be_bytes());
    buf[6] = 0x00; // flags + top 3 bits of fragment offset: DF=0, no fragmentation
    buf[7] = 0x00;
    buf[8] = TTL;
    buf[9] = protocol;
    buf[10..12].copy_from_slice(&[0, 0]); // checksum placeholder
    buf[12..16].copy_from_slice(&src.octets());
    buf[16..20].copy_from_slice(&dst.octets());

    let sum = checksum::internet_checksum(&buf[0..HEADER_LEN]);
    buf[10..12].copy_from_slice(&sum.to_be_bytes());
}

/// A parsed view over the fixed fields of an IPv4 header already validated
/// (length and checksum) by the SLIP layer.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub total_len: u16,
    pub protocol: u8,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub header_len: usize,
}

/// Parses the fixed IPv4 fields out of `buf`. Does not re-check the
/// checksum or declared length; the SLIP framer already enforces both on
/// anything it hands back.
pub fn parse(buf: &[u8]) -> Option<Header> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    let version = buf[0] >> 4;
    let ihl = (buf[0] & 0x0F) as usize;
    if version != 4 {
        return None;
    }
    let header_len = ihl * 4;
    if header_len < HEADER_LEN || buf.len() < header_len {
        return None;
    }
    Some(Header {
        total_len: u16::from_be_bytes([buf[2], buf[3]]),
        protocol: buf[9],
        src: Ipv4Addr::new(buf[12], buf[13], buf[14], buf[15]),
        dst: Ipv4Addr::new(buf[16], buf[17], buf[18], buf[19]),
        header_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_has_valid_checksum_and_declared_length() {
        let mut buf = [0u8; crate::PACKET_SIZE];
        let src = Ipv4Addr::new(10, 0, 2, 15);
        let dst = Ipv4Addr::new(10, 0, 2, 3);
        write_shell(&mut buf, 56, PROTO_UDP, src, dst);
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), 56);
        assert_eq!(checksum::internet_checksum(&buf[0..HEADER_LEN]), 0);

        let parsed = parse(&buf).unwrap();
        assert_eq!(parsed.total_len, 56);
        assert_eq!(parsed.protocol, PROTO_UDP);
        assert_eq!(parsed.src, src);
        assert_eq!(parsed.dst, dst);
        assert_eq!(parsed.header_len, HEADER_LEN);
    }
}
