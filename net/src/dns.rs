//! One-shot A-record DNS resolver over UDP.
//!
//! The answer parser assumes the first answer record's NAME is a
//! compressed pointer (`0xC0`); replies whose NAME is written out literally
//! are rejected as `AnswerMalformed` rather than handled by a full name
//! decompressor.

use std::net::Ipv4Addr;

use crate::error::{Error, Result};
use crate::ipv4;
use crate::prng;
use crate::slip::Slip;
use crate::udp;

const SERVER_PORT: u16 = 53;
/// RFC-safe UDP DNS limit: if the built IPv4 datagram would exceed this,
/// the call fails before anything is sent.
const MAX_DATAGRAM_LEN: usize = 511;

/// Builds the question section for `hostname`: each `.`-separated label
/// becomes a length-prefix byte followed by its bytes, terminated by a
/// zero-length label, then `QTYPE=1` (A) and `QCLASS=1` (IN).
fn build_question(hostname: &str) -> Vec<u8> {
    let mut question = Vec::with_capacity(hostname.len() + 6);
    for label in hostname.split('.') {
        question.push(label.len() as u8);
        question.extend_from_slice(label.as_bytes());
    }
    question.push(0);
    question.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]); // QTYPE=A, QCLASS=IN
    question
}

/// Builds a full DNS query message (header + question) for `hostname`,
/// returning the message bytes and the transaction ID chosen for it.
fn build_message(hostname: &str) -> (Vec<u8>, u16) {
    let txid = prng::random_u16();
    let mut msg = Vec::with_capacity(12 + hostname.len() + 6);
    msg.extend_from_slice(&txid.to_be_bytes());
    msg.extend_from_slice(&[0x01, 0x00]); // flags: recursion desired
    msg.extend_from_slice(&[0x00, 0x01]); // QDCOUNT=1
    msg.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00]); // ANCOUNT/NSCOUNT/ARCOUNT=0
    msg.extend_from_slice(&build_question(hostname));
    (msg, txid)
}

/// Validates a hostname's shape: printable ASCII, dot-separated labels, no
/// label over 63 bytes, total length at most 253.
fn validate_hostname(hostname: &str) -> Result<()> {
    if hostname.len() > 253 || !hostname.is_ascii() {
        return Err(Error::AnswerMalformed);
    }
    for label in hostname.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(Error::AnswerMalformed);
        }
    }
    Ok(())
}

/// Resolves a single A record for `hostname` by one-shot UDP query against
/// `server`, using `our_ip` as the source address. Retries are the
/// caller's responsibility.
pub fn resolve(slip: &Slip, our_ip: Ipv4Addr, server: Ipv4Addr, hostname: &str) -> Result<Ipv4Addr> {
    validate_hostname(hostname)?;
    let (message, txid) = build_message(hostname);
    let our_port = prng::random_u16();

    let mut send_buf = [0u8; crate::PACKET_SIZE];
    let send_len = udp::build(&mut send_buf, our_ip, our_port, server, SERVER_PORT, &message);
    if send_len > MAX_DATAGRAM_LEN {
        return Err(Error::QueryTooBig);
    }
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
        let payload_start = udp::payload_offset(&ip);
        if frame.len() < payload_start + 12 {
            continue;
        }
        let reply_txid = u16::from_be_bytes([frame[payload_start], frame[payload_start + 1]]);
        let response_bit = frame[payload_start + 2] & 0x80 != 0;
        if reply_txid != txid || !response_bit {
            continue;
        }
        if !checksum_ok {
            return Err(Error::BadAnswer);
        }
        return parse_answer(&frame[payload_start..]);
    }
}

/// Parses the answer section of a DNS response message `msg` (starting at
/// its own 12-byte header). Scans forward from the end of the question
/// section for the first `0xC0` (compressed name-pointer tag); if the
/// first answer's NAME is not a compressed pointer, returns
/// `AnswerMalformed`.
fn parse_answer(msg: &[u8]) -> Result<Ipv4Addr> {
    let ancount = u16::from_be_bytes([msg[6], msg[7]]) as usize;
    if ancount == 0 {
        return Err(Error::NoAnswers);
    }

    let question_end = question_section_end(&msg[12..]).ok_or(Error::AnswerMalformed)? + 12;
    let pointer_pos = msg[question_end..].iter().position(|&b| b == 0xC0);
    let Some(pointer_pos) = pointer_pos else {
        return Err(Error::AnswerMalformed);
    };
    let mut cursor = question_end + pointer_pos;
    if msg.get(cursor) != Some(&0xC0) {
        return Err(Error::AnswerMalformed);
    }

    for _ in 0..ancount {
        // NAME: either a 2-byte compressed pointer or, conservatively,
        // not a valid pointer, so the literal name is rejected.
        cursor += 2;
        if msg.len() < cursor + 10 {
            return Err(Error::AnswerMalformed);
        }
        let rtype = u16::from_be_bytes([msg[cursor], msg[cursor + 1]]);
        let rclass = u16::from_be_bytes([msg[cursor + 2], msg[cursor + 3]]);
        // TTL occupies msg[cursor+4..cursor+8], intentionally skipped.
        let rdlength = u16::from_be_bytes([msg[cursor + 8], msg[cursor + 9]]) as usize;
        let rdata_start = cursor + 10;
        if msg.len() < rdata_start + rdlength {
            return Err(Error::AnswerMalformed);
        }
        if rtype == 1 && rclass == 1 && rdlength == 4 {
            return Ok(Ipv4Addr::new(
                msg[rdata_start],
                msg[rdata_start + 1],
                msg[rdata_start + 2],
                msg[rdata_start + 3],
            ));
        }
        cursor = rdata_start + rdlength;
    }
    Err(Error::NoAnswers)
}

/// Finds the end of the question section (label bytes + terminating zero +
/// QTYPE/QCLASS), relative to the start of the question.
fn question_section_end(question: &[u8]) -> Option<usize> {
    let mut cursor = 0;
    loop {
        let label_len = *question.get(cursor)? as usize;
        cursor += 1;
        if label_len == 0 {
            break;
        }
        cursor += label_len;
    }
    cursor += 4; // QTYPE + QCLASS
    if cursor > question.len() { None } else { Some(cursor) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_build_matches_reference_layout() {
        let (message, _txid) = build_message("ns.example");
        assert_eq!(
            message[2..12],
            [0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            &message[12..],
            &[
                0x02, b'n', b's', 0x07, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 0x00, 0x00, 0x01,
                0x00, 0x01
            ]
        );

        let mut buf = [0u8; crate::PACKET_SIZE];
        let len = udp::build(
            &mut buf,
            Ipv4Addr::new(10, 0, 2, 15),
            4000,
            Ipv4Addr::new(10, 0, 2, 3),
            53,
            &message,
        );
        assert_eq!(len, 20 + 8 + 12 + 16);
    }

    #[test]
    fn question_bytes_handle_multi_label_hostnames() {
        let (message, _) = build_message("a.bb.ccc");
        assert_eq!(
            &message[12..],
            &[1, b'a', 2, b'b', b'b', 3, b'c', b'c', b'c', 0, 0, 1, 0, 1]
        );
    }

    #[test]
    fn reply_parse_finds_compressed_a_record() {
        let (message, _txid) = build_message("ns.example");
        let mut msg = vec![0u8; 12];
        msg[6..8].copy_from_slice(&1u16.to_be_bytes()); // ANCOUNT=1
        msg.extend_from_slice(&message[12..]); // question section
        msg.extend_from_slice(&[
            0xC0, 0x0C, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x01, 0x2C, 0x00, 0x04, 192, 168, 1, 1,
        ]);
        let addr = parse_answer(&msg).unwrap();
        assert_eq!(addr, Ipv4Addr::new(192, 168, 1, 1));
    }

    #[test]
    fn literal_name_without_pointer_is_malformed() {
        let mut msg = vec![0u8; 12];
        msg[6..8].copy_from_slice(&1u16.to_be_bytes());
        msg.extend_from_slice(&[0, 0, 1, 0, 1]); // empty root question
        // Answer NAME written literally (a single zero-length label) instead
        // of a compressed pointer.
        msg.extend_from_slice(&[0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x01, 0x2C, 0x00, 0x04, 1, 2, 3, 4]);
        assert_eq!(parse_answer(&msg), Err(Error::AnswerMalformed));
    }

    #[test]
    fn no_records_is_no_answers() {
        let mut msg = vec![0u8; 12];
        assert_eq!(parse_answer(&msg), Err(Error::NoAnswers));
    }

    #[test]
    fn hostname_validation_rejects_oversize_labels() {
        let long_label = "a".repeat(64);
        assert!(validate_hostname(&long_label).is_err());
        assert!(validate_hostname("ns.example.com").is_ok());
    }
}
