use std::fmt;

/// Fault codes surfaced by the stack. None of these abort the process; every
/// operation that can fail returns one of these instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The link is down, the serial device errored, or a received frame
    /// failed IP-layer validation (length mismatch, bad IP checksum, bad
    /// escape sequence, buffer overrun).
    SlipFailed,
    /// Scratch buffer allocation failed.
    Nomem,
    /// A DNS question would produce a UDP datagram larger than 511 bytes.
    QueryTooBig,
    /// UDP or TCP checksum mismatch on an otherwise plausible reply.
    BadAnswer,
    /// DNS reply lacks the expected compressed-pointer layout.
    AnswerMalformed,
    /// DNS response contained no A/IN/4-byte record.
    NoAnswers,
    /// TCP SYN was answered with RST.
    ConnectionRefused,
    /// An established TCP connection received RST.
    ConnectionReset,
    /// A wrapped OS-level I/O error (device open/configure failures).
    Io(std::io::ErrorKind),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SlipFailed => write!(f, "SLIP link failed or frame validation failed"),
            Error::Nomem => write!(f, "scratch buffer allocation failed"),
            Error::QueryTooBig => write!(f, "DNS question would exceed the 511-byte UDP limit"),
            Error::BadAnswer => write!(f, "checksum mismatch on reply"),
            Error::AnswerMalformed => write!(f, "DNS reply did not use a compressed name pointer"),
            Error::NoAnswers => write!(f, "DNS response contained no A record"),
            Error::ConnectionRefused => write!(f, "TCP SYN was answered with RST"),
            Error::ConnectionReset => write!(f, "connection reset by peer"),
            Error::Io(kind) => write!(f, "I/O error: {kind:?}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self { Error::Io(e.kind()) }
}

pub type Result<T> = std::result::Result<T, Error>;
