//! NTPv3 client: a single query/response over UDP, extracting just the
//! transmit-timestamp seconds field. Formatting as a human-readable time is
//! left to the caller.

use std::net::Ipv4Addr;

use crate::error::{Error, Result};
use crate::ipv4;
use crate::prng;
use crate::slip::Slip;
use crate::udp;

const SERVER_PORT: u16 = 123;
const REQUEST_LEN: usize = 48;
const MIN_RESPONSE_LEN: usize = 20 + 8 + 48;

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch
/// (1970-01-01).
const NTP_UNIX_EPOCH_DELTA: u32 = 2_208_988_800;

#[derive(Debug, Clone, Copy)]
pub struct Response {
    pub stratum: u8,
    pub reference_identifier: [u8; 4],
    /// Transmit timestamp, converted to a Unix epoch second count.
    pub unix_seconds: u32,
}

fn build_request() -> [u8; REQUEST_LEN] {
    let mut req = [0u8; REQUEST_LEN];
    req[0] = 0x1B; // LI=0, VN=3, Mode=3 (client)
    req
}

/// Sends one NTPv3 request to `server:123` and blocks for the reply.
pub fn query(slip: &Slip, our_ip: Ipv4Addr, server: Ipv4Addr) -> Result<Response> {
    let our_port = prng::random_u16();
    let request = build_request();

    let mut send_buf = [0u8; crate::PACKET_SIZE];
    let send_len = udp::build(&mut send_buf, our_ip, our_port, server, SERVER_PORT, &request);
    slip.ship(&send_buf[..send_len])?;

    let mut recv_buf = [0u8; crate::PACKET_SIZE];
    loop {
        let len = slip.slurp(&mut recv_buf)?;
        let frame = &recv_buf[..len];
        let ip = match ipv4::parse(frame) {
            Some(ip) if ip.protocol == ipv4::PROTO_UDP => ip,
            _ => continue,
        };
        let (udp_header, checksum_ok) = match udp::parse(frame, &ip) {
            Some(v) => v,
            None => continue,
        };
        if udp_header.dst_port != our_port {
            continue;
        }
        if !checksum_ok {
            return Err(Error::BadAnswer);
        }
        // Odd-length or truncated responses mean the server is not
        // retransmitting; this is a fatal, not a retryable, condition.
        if len % 2 != 0 || len < MIN_RESPONSE_LEN {
            return Err(Error::AnswerMalformed);
        }
        let payload_start = udp::payload_offset(&ip);
        return parse_response(&frame[payload_start..]);
    }
}

fn parse_response(payload: &[u8]) -> Result<Response> {
    if payload.len() < 48 {
        return Err(Error::AnswerMalformed);
    }
    let stratum = payload[1];
    let reference_identifier = [payload[12], payload[13], payload[14], payload[15]];
    let transmit_seconds = u32::from_be_bytes([payload[40], payload[41], payload[42], payload[43]]);
    Ok(Response {
        stratum,
        reference_identifier,
        unix_seconds: transmit_seconds.wrapping_sub(NTP_UNIX_EPOCH_DELTA),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_48_bytes_with_li_vn_mode_header() {
        let req = build_request();
        assert_eq!(req.len(), 48);
        assert_eq!(req[0], 0x1B);
        assert!(req[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn parses_transmit_timestamp_and_converts_epoch() {
        let mut payload = [0u8; 48];
        payload[1] = 2; // stratum
        payload[12..16].copy_from_slice(b"GPS\0");
        // 2024-01-01T00:00:00Z in NTP seconds.
        let ntp_seconds: u32 = 1_704_067_200u32.wrapping_add(NTP_UNIX_EPOCH_DELTA);
        payload[40..44].copy_from_slice(&ntp_seconds.to_be_bytes());

        let response = parse_response(&payload).unwrap();
        assert_eq!(response.stratum, 2);
        assert_eq!(&response.reference_identifier, b"GPS\0");
        assert_eq!(response.unix_seconds, 1_704_067_200);
    }
}
