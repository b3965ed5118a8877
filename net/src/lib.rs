//! A minimal user-space IPv4 stack for hosts with no kernel TCP/IP but a
//! raw serial link: SLIP framing, the Internet checksum, and packet
//! construction/parsing for ICMP echo, UDP/DNS, UDP/NTPv3, and a
//! single-connection TCP client.
//!
//! Every layer above [`serial::SerialLink`] is a set of pure functions over
//! a caller-owned byte buffer; the serial link is the only long-lived,
//! stateful object in the stack.

pub mod checksum;
pub mod dns;
pub mod error;
pub mod icmp;
pub mod ipv4;
pub mod ntp;
pub mod ping;
mod prng;
pub mod serial;
pub mod seq;
pub mod slip;
pub mod tcp;
pub mod udp;

pub use error::{Error, Result};
pub use serial::{SerialConfig, SerialLink};
pub use slip::Slip;

/// Minimum scratch buffer size for any packet this stack builds or parses.
pub const PACKET_SIZE: usize = 1536;

/// Opens the configured serial device and wraps it in a SLIP framer. The
/// returned [`Slip`] is the one handle every protocol layer operates
/// through.
pub fn setup(config: SerialConfig) -> Result<Slip> {
    let link = SerialLink::open(config)?;
    Ok(Slip::new(link))
}
