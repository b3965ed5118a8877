//! One-shot and periodic ICMP echo driver, sitting on top of
//! [`crate::icmp`]. The demo `ping` tool loops this indefinitely; a library
//! caller can also use it for a single echo.

use std::net::Ipv4Addr;

use crate::error::Result;
use crate::icmp;
use crate::ipv4;
use crate::slip::Slip;

/// Drives one ICMP echo request/reply exchange, managing its own
/// incrementing sequence number across calls.
pub struct Pinger {
    seq_no: u16,
}

#[derive(Debug, Clone, Copy)]
pub struct Reply {
    pub from: Ipv4Addr,
    pub seq_no: u16,
}

impl Pinger {
    pub fn new() -> Self { Pinger { seq_no: 0 } }

    /// Sends one echo request and blocks until a matching reply (by
    /// identifier) arrives. Non-matching frames (other protocols, other
    /// ICMP types, replies to a different identifier) are discarded.
    pub fn ping(&mut self, slip: &Slip, our_ip: Ipv4Addr, dst: Ipv4Addr) -> Result<Reply> {
        let seq_no = self.seq_no;
        self.seq_no = self.seq_no.wrapping_add(1);

        let mut send_buf = [0u8; crate::PACKET_SIZE];
        let len = icmp::build_echo_request(&mut send_buf, our_ip, dst, seq_no);
        slip.ship(&send_buf[..len])?;

        loop {
            let mut recv_buf = [0u8; crate::PACKET_SIZE];
            let recv_len = slip.slurp(&mut recv_buf)?;
            let frame = &recv_buf[..recv_len];
            let ip = match ipv4::parse(frame) {
                Some(ip) => ip,
                None => continue,
            };
            let Some(reply) = icmp::parse_echo_reply(frame, &ip) else { continue };
            if reply.identifier != icmp::IDENTIFIER || reply.seq_no != seq_no {
                continue;
            }
            return Ok(Reply { from: ip.src, seq_no: reply.seq_no });
        }
    }
}

impl Default for Pinger {
    fn default() -> Self { Self::new() }
}
