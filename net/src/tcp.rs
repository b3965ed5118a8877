//! The TCP client: a single-connection, single-in-flight-segment state
//! machine suitable for line-oriented protocols (HTTP/1.x, Gopher, Finger,
//! Whois).
//!
//! Connection state (seqno/ackno/src/dst) lives as a field of
//! [`Connection`], passed explicitly to every operation; the only
//! module-level mutable state anywhere in this crate is the single
//! [`crate::serial::SerialLink`].

use std::net::Ipv4Addr;

use crate::checksum;
use crate::error::{Error, Result};
use crate::ipv4;
use crate::prng;
use crate::seq;
use crate::slip::Slip;

pub const FLAG_FIN: u8 = 0x01;
pub const FLAG_SYN: u8 = 0x02;
pub const FLAG_RST: u8 = 0x04;
pub const FLAG_PSH: u8 = 0x08;
pub const FLAG_ACK: u8 = 0x10;

/// MSS option value advertised on SYN, and the window value carried on
/// every control segment; also the cap on a single `minisock` payload.
pub const MSS_WINDOW: u16 = 256;

const MIN_HEADER_LEN: usize = 20;
const SYN_HEADER_LEN: usize = 24;

/// Per-connection state: everything the reference implementation kept as
/// global 4-byte arrays.
pub struct Connection {
    our_ip: Ipv4Addr,
    src_port: u16,
    dst_ip: Ipv4Addr,
    dst_port: u16,
    seq: [u8; 4],
    ack: [u8; 4],
}

/// Builds the pseudo-header + TCP header (+ options, + payload) span and
/// returns its one's-complement checksum. `tcp_span` is `buf[20..total_len)`.
fn tcp_checksum(src: Ipv4Addr, dst: Ipv4Addr, tcp_span: &[u8]) -> u16 {
    let mut pseudo = [0u8; 12];
    pseudo[0..4].copy_from_slice(&src.octets());
    pseudo[4..8].copy_from_slice(&dst.octets());
    pseudo[9] = ipv4::PROTO_TCP;
    pseudo[10..12].copy_from_slice(&(tcp_span.len() as u16).to_be_bytes());

    let mut scratch = Vec::with_capacity(12 + tcp_span.len() + 1);
    scratch.extend_from_slice(&pseudo);
    scratch.extend_from_slice(tcp_span);
    if tcp_span.len() % 2 == 1 {
        scratch.push(0);
    }
    checksum::internet_checksum(&scratch)
}

/// Builds a control segment (no data): data offset is 5 words normally, 6
/// words when SYN is set (carrying a single MSS option). Window is always
/// [`MSS_WINDOW`], urgent pointer always zero. Total length is 44 with SYN,
/// 40 otherwise.
pub fn build_template(
    buf: &mut [u8],
    src: Ipv4Addr,
    src_port: u16,
    dst: Ipv4Addr,
    dst_port: u16,
    seqno: [u8; 4],
    ackno: [u8; 4],
    flags: u8,
) -> usize {
    let has_syn = flags & FLAG_SYN != 0;
    let header_len = if has_syn { SYN_HEADER_LEN } else { MIN_HEADER_LEN };
    let total_len = ipv4::HEADER_LEN + header_len;
    let start = ipv4::HEADER_LEN;

    buf[start..start + 2].copy_from_slice(&src_port.to_be_bytes());
    buf[start + 2..start + 4].copy_from_slice(&dst_port.to_be_bytes());
    buf[start + 4..start + 8].copy_from_slice(&seqno);
    buf[start + 8..start + 12].copy_from_slice(&ackno);
    let data_offset_words = if has_syn { 6u8 } else { 5u8 };
    buf[start + 12] = data_offset_words << 4;
    buf[start + 13] = flags;
    buf[start + 14..start + 16].copy_from_slice(&MSS_WINDOW.to_be_bytes());
    buf[start + 16..start + 18].copy_from_slice(&[0, 0]); // checksum placeholder
    buf[start + 18..start + 20].copy_from_slice(&[0, 0]); // urgent pointer

    if has_syn {
        // Single MSS option: kind=2, length=4, value=MSS_WINDOW.
        buf[start + 20] = 2;
        buf[start + 21] = 4;
        buf[start + 22..start + 24].copy_from_slice(&MSS_WINDOW.to_be_bytes());
    }

    let sum = tcp_checksum(src, dst, &buf[start..start + header_len]);
    buf[start + 16..start + 18].copy_from_slice(&sum.to_be_bytes());

    ipv4::write_shell(buf, total_len as u16, ipv4::PROTO_TCP, src, dst);
    total_len
}

/// Builds a data segment: always PSH+ACK, data offset 5 words, payload
/// starting at byte 40 and copied as a NUL-terminated string. Fails
/// (returns `None`) if `40 + payload.len() >= PACKET_SIZE`.
pub fn build_data(
    buf: &mut [u8],
    src: Ipv4Addr,
    src_port: u16,
    dst: Ipv4Addr,
    dst_port: u16,
    seqno: [u8; 4],
    ackno: [u8; 4],
    payload: &str,
) -> Option<usize> {
    let payload_start = ipv4::HEADER_LEN + MIN_HEADER_LEN;
    if payload_start + payload.len() >= crate::PACKET_SIZE {
        return None;
    }
    let start = ipv4::HEADER_LEN;
    let total_len = payload_start + payload.len();

    buf[start..start + 2].copy_from_slice(&src_port.to_be_bytes());
    buf[start + 2..start + 4].copy_from_slice(&dst_port.to_be_bytes());
    buf[start + 4..start + 8].copy_from_slice(&seqno);
    buf[start + 8..start + 12].copy_from_slice(&ackno);
    buf[start + 12] = 5 << 4;
    buf[start + 13] = FLAG_PSH | FLAG_ACK;
    buf[start + 14..start + 16].copy_from_slice(&MSS_WINDOW.to_be_bytes());
    buf[start + 16..start + 18].copy_from_slice(&[0, 0]);
    buf[start + 18..start + 20].copy_from_slice(&[0, 0]);
    buf[payload_start..payload_start + payload.len()].copy_from_slice(payload.as_bytes());

    let tcp_len = MIN_HEADER_LEN + payload.len();
    let sum = tcp_checksum(src, dst, &buf[start..start + tcp_len]);
    buf[start + 16..start + 18].copy_from_slice(&sum.to_be_bytes());

    ipv4::write_shell(buf, total_len as u16, ipv4::PROTO_TCP, src, dst);
    Some(total_len)
}

/// A parsed view over an inbound TCP segment.
struct Segment {
    dst_port: u16,
    seq: [u8; 4],
    ack: [u8; 4],
    flags: u8,
    data_offset: usize,
    total_len: usize,
}

fn parse_segment(frame: &[u8], ip: &ipv4::Header) -> Option<Segment> {
    let start = ip.header_len;
    if frame.len() < start + MIN_HEADER_LEN {
        return None;
    }
    let tcp_len = ip.total_len as usize - start;
    if frame.len() < start + tcp_len {
        return None;
    }
    if tcp_checksum(ip.src, ip.dst, &frame[start..start + tcp_len]) != 0 {
        return None;
    }
    let data_offset = ((frame[start + 12] >> 4) as usize) * 4;
    Some(Segment {
        dst_port: u16::from_be_bytes([frame[start + 2], frame[start + 3]]),
        seq: [frame[start + 4], frame[start + 5], frame[start + 6], frame[start + 7]],
        ack: [frame[start + 8], frame[start + 9], frame[start + 10], frame[start + 11]],
        flags: frame[start + 13],
        data_offset,
        total_len: ip.total_len as usize,
    })
}

impl Connection {
    /// Performs the three-way handshake against `dst_ip:dst_port`. Chooses
    /// a random source pseudo-port and initial sequence number.
    pub fn open(slip: &Slip, our_ip: Ipv4Addr, dst_ip: Ipv4Addr, dst_port: u16) -> Result<Connection> {
        let src_port = prng::random_u16();
        let isn = prng::random_u32().to_be_bytes();

        let mut conn = Connection { our_ip, src_port, dst_ip, dst_port, seq: isn, ack: [0; 4] };

        let mut send_buf = [0u8; crate::PACKET_SIZE];
        let len = build_template(
            &mut send_buf,
            conn.our_ip,
            conn.src_port,
            conn.dst_ip,
            conn.dst_port,
            conn.seq,
            [0; 4],
            FLAG_SYN,
        );
        let flags = twiddle(slip, &mut conn, &send_buf[..len], FLAG_SYN | FLAG_ACK, 1)?;
        if flags & FLAG_RST != 0 {
            return Err(Error::ConnectionRefused);
        }

        // `ack` now holds the peer's SYN sequence number (twiddle stored
        // it); bump it by one to account for the peer's SYN.
        seq::add32_be(&mut conn.ack, 1);

        let mut ack_buf = [0u8; crate::PACKET_SIZE];
        let ack_len = build_template(
            &mut ack_buf,
            conn.our_ip,
            conn.src_port,
            conn.dst_ip,
            conn.dst_port,
            conn.seq,
            conn.ack,
            FLAG_ACK,
        );
        slip.ship(&ack_buf[..ack_len])?;

        Ok(conn)
    }

    /// Sends `payload` as a single PSH+ACK data segment and then drives the
    /// receive loop: retransmitting until acknowledged, printing any
    /// in-order data from the peer to standard output, and stopping at the
    /// peer's FIN. A segment whose sequence number does not match our
    /// current `ack` is dropped but still triggers an ACK regeneration with
    /// the unchanged `ack`, causing the peer to re-send.
    pub fn send_and_receive(&mut self, slip: &Slip, payload: Option<&str>) -> Result<()> {
        let mut acked = payload.is_none();
        let mut data_buf = [0u8; crate::PACKET_SIZE];
        let mut data_len = 0usize;
        let old_seq = self.seq;

        if let Some(payload) = payload {
            data_len = build_data(
                &mut data_buf,
                self.our_ip,
                self.src_port,
                self.dst_ip,
                self.dst_port,
                self.seq,
                self.ack,
                payload,
            )
            .ok_or(Error::Nomem)?;
            // Speculatively advance our seqno to the expected post-ack value.
            seq::add32_be(&mut self.seq, payload.len() as u16);
        }

        loop {
            if !acked && data_len > 0 {
                slip.ship(&data_buf[..data_len])?;
            }

            let mut recv_buf = [0u8; crate::PACKET_SIZE];
            let len = slip.slurp(&mut recv_buf)?;
            let frame = &recv_buf[..len];
            let ip = match ipv4::parse(frame) {
                Some(ip) if ip.protocol == ipv4::PROTO_TCP => ip,
                _ => continue,
            };
            let segment = match parse_segment(frame, &ip) {
                Some(s) => s,
                None => continue,
            };
            if segment.dst_port != self.src_port {
                continue;
            }
            if segment.flags & FLAG_RST != 0 {
                return Err(Error::ConnectionReset);
            }

            let is_ack_or_fin = segment.flags & FLAG_ACK != 0 || segment.flags & FLAG_FIN != 0;
            if !acked
                && is_ack_or_fin
                && segment.ack == self.seq
                && segment.ack != old_seq
            {
                acked = true;
            }

            let has_data = segment.data_offset + ip.header_len < segment.total_len;
            if has_data {
                if segment.seq == self.ack {
                    let payload_start = ip.header_len + segment.data_offset;
                    let payload = &frame[payload_start..segment.total_len];
                    use std::io::Write;
                    std::io::stdout().write_all(payload).ok();
                    let data_len = (segment.total_len - payload_start) as u16;
                    seq::add32_be(&mut self.ack, data_len);
                } // else: drop the payload, but still proceed to ACK below.
            }

            if segment.flags & FLAG_FIN != 0 {
                break;
            }

            let mut ack_buf = [0u8; crate::PACKET_SIZE];
            let ack_len = build_template(
                &mut ack_buf,
                self.our_ip,
                self.src_port,
                self.dst_ip,
                self.dst_port,
                self.seq,
                self.ack,
                FLAG_ACK,
            );
            slip.ship(&ack_buf[..ack_len])?;

            if !acked && data_len > 0 {
                data_len = build_data(
                    &mut data_buf,
                    self.our_ip,
                    self.src_port,
                    self.dst_ip,
                    self.dst_port,
                    old_seq,
                    self.ack,
                    payload.unwrap(),
                )
                .ok_or(Error::Nomem)?;
            }
        }
        Ok(())
    }

    /// Closes the connection: FIN+ACK, wait for ACK, wait for the peer's
    /// FIN+ACK, send the final ACK. Any SLIP/timeout error during teardown
    /// is swallowed; the only thing reported is whether the final ACK was
    /// sent.
    pub fn close(&mut self, slip: &Slip) -> bool {
        let mut send_buf = [0u8; crate::PACKET_SIZE];
        let len = build_template(
            &mut send_buf,
            self.our_ip,
            self.src_port,
            self.dst_ip,
            self.dst_port,
            self.seq,
            self.ack,
            FLAG_FIN | FLAG_ACK,
        );
        if twiddle(slip, self, &send_buf[..len], FLAG_ACK, 1).is_err() {
            return false;
        }

        let (frame_len, flags) = match twiddle_capture(slip, self, &[], FLAG_FIN | FLAG_ACK, 0) {
            Ok(v) => v,
            Err(_) => return false,
        };
        let _ = frame_len;
        if flags & FLAG_RST != 0 {
            return false;
        }
        seq::add32_be(&mut self.ack, 1);

        let mut final_buf = [0u8; crate::PACKET_SIZE];
        let final_len = build_template(
            &mut final_buf,
            self.our_ip,
            self.src_port,
            self.dst_ip,
            self.dst_port,
            self.seq,
            self.ack,
            FLAG_ACK,
        );
        slip.ship(&final_buf[..final_len]).is_ok()
    }

    /// Sends an immediate RST, used when the peer anomalously opens a
    /// connection toward us mid-handshake.
    pub fn reset(&self, slip: &Slip) {
        let mut buf = [0u8; crate::PACKET_SIZE];
        let len = build_template(
            &mut buf,
            self.our_ip,
            self.src_port,
            self.dst_ip,
            self.dst_port,
            self.seq,
            self.ack,
            FLAG_RST,
        );
        let _ = slip.ship(&buf[..len]);
    }
}

/// The `tcp_twiddle` workhorse: increments `conn.seq` by `seqno_inc`
/// immediately, then repeatedly sends `segment` and reads a reply until one
/// matches `waitfor_flags`, an RST arrives, or a fatal SLIP error occurs. On
/// success, stores the reply's seqno into `conn.ack` and returns the
/// reply's flag byte.
fn twiddle(slip: &Slip, conn: &mut Connection, segment: &[u8], waitfor_flags: u8, seqno_inc: u16) -> Result<u8> {
    twiddle_capture(slip, conn, segment, waitfor_flags, seqno_inc).map(|(_, flags)| flags)
}

/// As [`twiddle`], but also hands back the total length of the matching
/// frame (useful for teardown, which doesn't need the payload).
fn twiddle_capture(
    slip: &Slip,
    conn: &mut Connection,
    segment: &[u8],
    waitfor_flags: u8,
    seqno_inc: u16,
) -> Result<(usize, u8)> {
    seq::add32_be(&mut conn.seq, seqno_inc);

    loop {
        if !segment.is_empty() {
            slip.ship(segment)?;
        }
        let mut recv_buf = [0u8; crate::PACKET_SIZE];
        let len = slip.slurp(&mut recv_buf)?;
        let frame = &recv_buf[..len];

        // Control segments are always even-length; odd-length frames are
        // rejected without examination.
        if len % 2 != 0 {
            continue;
        }
        let ip = match ipv4::parse(frame) {
            Some(ip) if ip.protocol == ipv4::PROTO_TCP => ip,
            _ => continue,
        };
        let seg = match parse_segment(frame, &ip) {
            Some(s) => s,
            None => continue,
        };
        // RST is checked immediately after the non-TCP reject, ahead of the
        // port and ackno gates below: a bare RST (no ACK, ackno=0) answering
        // our SYN would otherwise fail the ackno-matches-conn.seq gate and
        // be silently retransmitted against forever instead of surfacing as
        // a refusal.
        if seg.flags & FLAG_RST != 0 {
            return Ok((len, seg.flags));
        }
        if seg.dst_port != conn.src_port {
            continue;
        }
        if waitfor_flags & FLAG_ACK != 0 && seg.ack != conn.seq {
            continue;
        }
        let matches = seg.flags == waitfor_flags || seg.flags == (waitfor_flags | FLAG_PSH);
        if waitfor_flags == FLAG_ACK && seg.flags & FLAG_FIN != 0 {
            conn.ack = seg.seq;
            return Ok((len, seg.flags));
        }
        if !matches {
            continue;
        }
        conn.ack = seg.seq;
        return Ok((len, seg.flags));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_lengths_and_window() {
        let mut buf = [0u8; crate::PACKET_SIZE];
        let syn_len = build_template(
            &mut buf,
            Ipv4Addr::new(1, 2, 3, 4),
            1000,
            Ipv4Addr::new(5, 6, 7, 8),
            80,
            [0; 4],
            [0; 4],
            FLAG_SYN,
        );
        assert_eq!(syn_len, 44);
        let tcp_start = ipv4::HEADER_LEN;
        assert_eq!(u16::from_be_bytes([buf[tcp_start + 14], buf[tcp_start + 15]]), MSS_WINDOW);
        assert_eq!(buf[tcp_start + 20], 2); // MSS option kind
        assert_eq!(buf[tcp_start + 21], 4); // MSS option length

        let mut buf2 = [0u8; crate::PACKET_SIZE];
        let ack_len = build_template(
            &mut buf2,
            Ipv4Addr::new(1, 2, 3, 4),
            1000,
            Ipv4Addr::new(5, 6, 7, 8),
            80,
            [0; 4],
            [0; 4],
            FLAG_ACK,
        );
        assert_eq!(ack_len, 40);
    }

    #[test]
    fn checksum_is_zero_over_pseudo_header_and_segment() {
        let mut buf = [0u8; crate::PACKET_SIZE];
        let src = Ipv4Addr::new(10, 0, 2, 15);
        let dst = Ipv4Addr::new(93, 184, 216, 34);
        let len = build_template(&mut buf, src, 4000, dst, 80, [0; 4], [0; 4], FLAG_ACK);
        let ip = ipv4::parse(&buf[..len]).unwrap();
        let tcp_span = &buf[ip.header_len..len];
        assert_eq!(tcp_checksum(src, dst, tcp_span), 0);
    }

    #[test]
    fn data_segment_rejects_oversize_payload() {
        let mut buf = [0u8; crate::PACKET_SIZE];
        let huge = "x".repeat(crate::PACKET_SIZE);
        let result = build_data(
            &mut buf,
            Ipv4Addr::new(1, 1, 1, 1),
            1,
            Ipv4Addr::new(2, 2, 2, 2),
            2,
            [0; 4],
            [0; 4],
            &huge,
        );
        assert!(result.is_none());
    }

    #[test]
    fn data_segment_always_sets_psh_ack() {
        let mut buf = [0u8; crate::PACKET_SIZE];
        let len = build_data(
            &mut buf,
            Ipv4Addr::new(1, 1, 1, 1),
            1000,
            Ipv4Addr::new(2, 2, 2, 2),
            80,
            [0; 4],
            [0; 4],
            "GET / HTTP/1.0\r\n\r\n",
        )
        .unwrap();
        let tcp_start = ipv4::HEADER_LEN;
        assert_eq!(buf[tcp_start + 13], FLAG_PSH | FLAG_ACK);
        assert_eq!(len, tcp_start + MIN_HEADER_LEN + "GET / HTTP/1.0\r\n\r\n".len());
    }
}
