//! ICMP echo request/reply, per RFC 792.

use std::net::Ipv4Addr;

use crate::checksum;
use crate::ipv4;

pub const TYPE_ECHO_REQUEST: u8 = 8;
pub const TYPE_ECHO_REPLY: u8 = 0;
pub const CODE: u8 = 0;

/// Fixed identifier used for every echo request this process sends. Not a
/// real PID; a literal constant rather than a process-derived value.
pub const IDENTIFIER: u16 = 0xe6c4;

const HEADER_LEN: usize = 8;
/// Literal "timestamp" field: never interpreted by any peer this stack
/// talks to, so it is left as this fixed dummy value rather than filled
/// with a real clock reading.
const TIMESTAMP: [u8; 8] = [0x67, 0xd7, 0x65, 0x97, 0x00, 0x06, 0x7e, 0x42];
const PAYLOAD_LEN: usize = 48;
const TOTAL_LEN: usize = ipv4::HEADER_LEN + HEADER_LEN + TIMESTAMP.len() + PAYLOAD_LEN;

/// Builds an ICMP echo request with the given sequence number into `buf`
/// (pre-zeroed to [`crate::PACKET_SIZE`]). The payload is the 48-byte
/// sequence `i-28` for `i` in `[36, 84)`, matching the reference
/// implementation; total length is always 84.
pub fn build_echo_request(buf: &mut [u8], src: Ipv4Addr, dst: Ipv4Addr, seq_no: u16) -> usize {
    let start = ipv4::HEADER_LEN;
    buf[start] = TYPE_ECHO_REQUEST;
    buf[start + 1] = CODE;
    buf[start + 2..start + 4].copy_from_slice(&[0, 0]); // checksum placeholder
    buf[start + 4..start + 6].copy_from_slice(&IDENTIFIER.to_be_bytes());
    buf[start + 6..start + 8].copy_from_slice(&seq_no.to_be_bytes());

    let ts_start = start + HEADER_LEN;
    buf[ts_start..ts_start + TIMESTAMP.len()].copy_from_slice(&TIMESTAMP);

    let payload_start = ts_start + TIMESTAMP.len();
    for (i, byte) in buf[payload_start..payload_start + PAYLOAD_LEN].iter_mut().enumerate() {
        *byte = (i as i32 + 36 - 28) as u8;
    }

    let icmp_len = HEADER_LEN + TIMESTAMP.len() + PAYLOAD_LEN;
    let sum = checksum::internet_checksum(&buf[start..start + icmp_len]);
    buf[start + 2..start + 4].copy_from_slice(&sum.to_be_bytes());

    ipv4::write_shell(buf, TOTAL_LEN as u16, ipv4::PROTO_ICMP, src, dst);
    TOTAL_LEN
}

#[derive(Debug, Clone, Copy)]
pub struct EchoReply {
    pub identifier: u16,
    pub seq_no: u16,
}

/// Parses an inbound datagram as an ICMP echo reply, verifying the ICMP
/// checksum (no pseudo-header for ICMP). Returns `None` if the type/code
/// don't match an echo reply or the checksum fails.
pub fn parse_echo_reply(buf: &[u8], ip: &ipv4::Header) -> Option<EchoReply> {
    if ip.protocol != ipv4::PROTO_ICMP {
        return None;
    }
    let start = ip.header_len;
    let icmp_len = ip.total_len as usize - start;
    if buf.len() < start + icmp_len || icmp_len < HEADER_LEN {
        return None;
    }
    if buf[start] != TYPE_ECHO_REPLY || buf[start + 1] != CODE {
        return None;
    }
    if checksum::internet_checksum(&buf[start..start + icmp_len]) != 0 {
        return None;
    }
    Some(EchoReply {
        identifier: u16::from_be_bytes([buf[start + 4], buf[start + 5]]),
        seq_no: u16::from_be_bytes([buf[start + 6], buf[start + 7]]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_request_has_valid_checksum_and_fixed_length() {
        let mut buf = [0u8; crate::PACKET_SIZE];
        let len = build_echo_request(&mut buf, Ipv4Addr::new(10, 0, 2, 15), Ipv4Addr::new(8, 8, 8, 8), 1);
        assert_eq!(len, 84);
        let icmp_start = ipv4::HEADER_LEN;
        let icmp_len = len - icmp_start;
        assert_eq!(checksum::internet_checksum(&buf[icmp_start..icmp_start + icmp_len]), 0);
        assert_eq!(buf[icmp_start + 4..icmp_start + 6], IDENTIFIER.to_be_bytes());
    }

    #[test]
    fn payload_matches_reference_pattern() {
        let mut buf = [0u8; crate::PACKET_SIZE];
        build_echo_request(&mut buf, Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(2, 2, 2, 2), 7);
        let payload_start = ipv4::HEADER_LEN + HEADER_LEN + TIMESTAMP.len();
        assert_eq!(buf[payload_start], 36u8.wrapping_sub(28));
        assert_eq!(buf[payload_start + PAYLOAD_LEN - 1], 83u8.wrapping_sub(28));
    }
}
