//! UDP header construction and parsing, per RFC 768, with the mandatory
//! pseudo-header checksum.
//!
//! The pseudo-header (source IP, destination IP, zero, protocol=17, UDP
//! length) is written into `buf[8..20)` first, checksummed together with
//! the UDP header and payload, and then that same span is overwritten with
//! the real IPv4 middle fields by [`crate::ipv4::write_shell`]. This reuse
//! of the same bytes for two different purposes is deliberate and must not
//! be hidden behind a typed header object.

use std::net::Ipv4Addr;

use crate::checksum;
use crate::ipv4;

pub const HEADER_LEN: usize = 8;

/// Builds a full IPv4+UDP datagram into `buf` (pre-zeroed to
/// [`crate::PACKET_SIZE`]): writes the pseudo-header into `buf[8..20)`, the
/// UDP header at `buf[20..28)`, copies `payload` at `buf[28..)`, computes
/// the UDP checksum over pseudo-header + UDP header + payload (zero-padded
/// to even length), then overwrites `buf[8..20)` with the real IPv4 middle
/// fields and finishes the IPv4 shell. Returns the total datagram length.
pub fn build(
    buf: &mut [u8],
    src: Ipv4Addr,
    src_port: u16,
    dst: Ipv4Addr,
    dst_port: u16,
    payload: &[u8],
) -> usize {
    let udp_len = HEADER_LEN + payload.len();
    let total_len = ipv4::HEADER_LEN + udp_len;

    // Pseudo-header, temporarily occupying buf[8..20).
    buf[8..12].copy_from_slice(&src.octets());
    buf[12..16].copy_from_slice(&dst.octets());
    buf[16] = 0;
    buf[17] = ipv4::PROTO_UDP;
    buf[18..20].copy_from_slice(&(udp_len as u16).to_be_bytes());

    // UDP header.
    let udp_start = ipv4::HEADER_LEN;
    buf[udp_start..udp_start + 2].copy_from_slice(&src_port.to_be_bytes());
    buf[udp_start + 2..udp_start + 4].copy_from_slice(&dst_port.to_be_bytes());
    buf[udp_start + 4..udp_start + 6].copy_from_slice(&(udp_len as u16).to_be_bytes());
    buf[udp_start + 6..udp_start + 8].copy_from_slice(&[0, 0]); // checksum placeholder
    buf[udp_start + HEADER_LEN..udp_start + HEADER_LEN + payload.len()].copy_from_slice(payload);

    // Checksum over pseudo-header (buf[8..20)) ++ udp header ++ payload,
    // zero-padded to even length.
    let padded_odd = udp_len % 2 == 1;
    let span_end = udp_start + udp_len;
    let sum = if padded_odd {
        let mut scratch = Vec::with_capacity(12 + udp_len + 1);
        scratch.extend_from_slice(&buf[8..20]);
        scratch.extend_from_slice(&buf[udp_start..span_end]);
        scratch.push(0);
        checksum::internet_checksum(&scratch)
    } else {
        let mut scratch = Vec::with_capacity(12 + udp_len);
        scratch.extend_from_slice(&buf[8..20]);
        scratch.extend_from_slice(&buf[udp_start..span_end]);
        checksum::internet_checksum(&scratch)
    };
    buf[udp_start + 6..udp_start + 8].copy_from_slice(&sum.to_be_bytes());

    // Overwrite buf[8..20) with the real IPv4 middle fields and finish the shell.
    ipv4::write_shell(buf, total_len as u16, ipv4::PROTO_UDP, src, dst);

    total_len
}

#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub src_port: u16,
    pub dst_port: u16,
    pub length: u16,
}

/// Parses the UDP header at `ip.header_len` and verifies its checksum
/// against the pseudo-header derived from `ip`. `buf` must be the whole
/// IPv4 datagram (as returned by `Slip::slurp`).
pub fn parse(buf: &[u8], ip: &ipv4::Header) -> Option<(Header, bool)> {
    let start = ip.header_len;
    if buf.len() < start + HEADER_LEN {
        return None;
    }
    let header = Header {
        src_port: u16::from_be_bytes([buf[start], buf[start + 1]]),
        dst_port: u16::from_be_bytes([buf[start + 2], buf[start + 3]]),
        length: u16::from_be_bytes([buf[start + 4], buf[start + 5]]),
    };
    let udp_len = header.length as usize;
    if start + udp_len > buf.len() {
        return None;
    }
    let mut pseudo = [0u8; 12];
    pseudo[0..4].copy_from_slice(&ip.src.octets());
    pseudo[4..8].copy_from_slice(&ip.dst.octets());
    pseudo[9] = ipv4::PROTO_UDP;
    pseudo[10..12].copy_from_slice(&header.length.to_be_bytes());

    let mut scratch = Vec::with_capacity(12 + udp_len + 1);
    scratch.extend_from_slice(&pseudo);
    scratch.extend_from_slice(&buf[start..start + udp_len]);
    if udp_len % 2 == 1 {
        scratch.push(0);
    }
    let ok = checksum::internet_checksum(&scratch) == 0;
    Some((header, ok))
}

/// Byte offset of the UDP payload within a datagram whose IPv4 header ends
/// at `ip.header_len`.
pub fn payload_offset(ip: &ipv4::Header) -> usize { ip.header_len + HEADER_LEN }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudo_header_checksum_is_zero_on_build_then_parse() {
        let mut buf = [0u8; crate::PACKET_SIZE];
        let src = Ipv4Addr::new(10, 0, 2, 15);
        let dst = Ipv4Addr::new(10, 0, 2, 3);
        let len = build(&mut buf, src, 4000, dst, 53, b"hello");
        let ip = ipv4::parse(&buf[..len]).unwrap();
        let (udp_header, checksum_ok) = udp::parse(&buf[..len], &ip).unwrap();
        assert!(checksum_ok);
        assert_eq!(udp_header.src_port, 4000);
        assert_eq!(udp_header.dst_port, 53);
    }

    use crate::udp;

    #[test]
    fn odd_payload_pads_for_checksum_but_not_on_wire() {
        let mut buf = [0u8; crate::PACKET_SIZE];
        let len = build(&mut buf, Ipv4Addr::new(1, 2, 3, 4), 1, Ipv4Addr::new(5, 6, 7, 8), 2, b"odd");
        assert_eq!(len, ipv4::HEADER_LEN + HEADER_LEN + 3);
        let ip = ipv4::parse(&buf[..len]).unwrap();
        let (_, ok) = udp::parse(&buf[..len], &ip).unwrap();
        assert!(ok);
    }
}
