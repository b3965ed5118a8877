//! The serial link adapter: the only OS-dependent module in the stack.
//!
//! Opens a serial device in raw 8N1 mode and exposes blocking byte I/O.
//! Everything above this layer only ever sees bytes.

use std::os::fd::{AsRawFd, OwnedFd, FromRawFd};
use std::time::Duration;

use crate::error::{Error, Result};

/// Compile-time defaults, per spec; both fields may be overridden at
/// runtime by constructing a `SerialConfig` directly.
pub const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD: u32 = 115_200;

#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub device: String,
    pub baud: u32,
    /// Optional upper-bound read timeout. `None` blocks indefinitely,
    /// which is the default.
    pub read_timeout: Option<Duration>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig { device: DEFAULT_DEVICE.to_string(), baud: DEFAULT_BAUD, read_timeout: None }
    }
}

/// A handle to an opened serial device plus its committed baud/framing
/// configuration. At most one is ever alive for a given device; `Drop`
/// closes the descriptor, giving `stop()` semantics for free.
pub struct SerialLink {
    fd: OwnedFd,
    config: SerialConfig,
}

fn baud_to_speed(baud: u32) -> Result<libc::speed_t> {
    let speed = match baud {
        9_600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        _ => return Err(Error::Io(std::io::ErrorKind::InvalidInput)),
    };
    Ok(speed)
}

impl SerialLink {
    /// Opens the configured device in raw mode: 8 data bits, no parity, 1
    /// stop bit, no flow control, no echo, no line discipline processing,
    /// blocking reads of at least 1 byte with no inter-byte timeout, and
    /// both queues flushed. Also seeds the process RNG from the current
    /// wall-clock second, the only place nondeterminism enters the stack
    /// outside packet payloads.
    pub fn open(config: SerialConfig) -> Result<Self> {
        crate::prng::seed_from_wallclock();

        let path = std::ffi::CString::new(config.device.as_str())
            .map_err(|_| Error::Io(std::io::ErrorKind::InvalidInput))?;
        // SAFETY: `path` is a valid NUL-terminated C string for the duration of the call.
        let raw = unsafe { libc::open(path.as_ptr(), libc::O_RDWR | libc::O_NOCTTY | libc::O_NONBLOCK) };
        if raw < 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        // SAFETY: `raw` is a valid, just-opened, uniquely-owned descriptor.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        // Clear the O_NONBLOCK we used only to avoid blocking on open() for
        // devices that wait on DCD; reads below are blocking by termios VMIN/VTIME.
        let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL, 0) };
        unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFL, flags & !libc::O_NONBLOCK) };

        let mut term: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(fd.as_raw_fd(), &mut term) } != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        unsafe { libc::cfmakeraw(&mut term) };
        let speed = baud_to_speed(config.baud)?;
        unsafe {
            libc::cfsetispeed(&mut term, speed);
            libc::cfsetospeed(&mut term, speed);
        }
        term.c_cflag |= libc::CLOCAL | libc::CREAD;
        term.c_cflag &= !(libc::CRTSCTS | libc::PARENB | libc::CSTOPB);
        term.c_cflag |= libc::CS8;
        term.c_lflag &= !(libc::ICANON | libc::ECHO | libc::ECHOE | libc::ISIG);
        term.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);
        term.c_oflag &= !libc::OPOST;
        term.c_cc[libc::VMIN] = 1;
        term.c_cc[libc::VTIME] = 0;

        if unsafe { libc::tcsetattr(fd.as_raw_fd(), libc::TCSANOW, &term) } != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        if unsafe { libc::tcflush(fd.as_raw_fd(), libc::TCIOFLUSH) } != 0 {
            return Err(std::io::Error::last_os_error().into());
        }

        log::info!("serial link open: {} at {} baud", config.device, config.baud);
        Ok(SerialLink { fd, config })
    }

    fn wait_readable(&self) -> Result<()> {
        let Some(timeout) = self.config.read_timeout else { return Ok(()) };
        let mut pfd = libc::pollfd { fd: self.fd.as_raw_fd(), events: libc::POLLIN, revents: 0 };
        let millis = timeout.as_millis().min(i32::MAX as u128) as i32;
        let rc = unsafe { libc::poll(&mut pfd, 1, millis) };
        match rc {
            0 => Err(Error::SlipFailed),
            n if n < 0 => Err(std::io::Error::last_os_error().into()),
            _ => Ok(()),
        }
    }

    /// Blocking read of exactly one octet.
    pub fn read_byte(&self) -> Result<u8> {
        self.wait_readable()?;
        let mut byte = [0u8; 1];
        loop {
            let rc = unsafe {
                libc::read(self.fd.as_raw_fd(), byte.as_mut_ptr() as *mut libc::c_void, 1)
            };
            match rc {
                1 => return Ok(byte[0]),
                0 => return Err(Error::SlipFailed),
                n if n < 0 => {
                    let err = std::io::Error::last_os_error();
                    if err.kind() == std::io::ErrorKind::Interrupted {
                        continue;
                    }
                    return Err(err.into());
                }
                _ => unreachable!("read() of a 1-byte buffer returned an out-of-range count"),
            }
        }
    }

    /// Blocking write of the full buffer; fails if any byte could not be
    /// written.
    pub fn write_bytes(&self, buf: &[u8]) -> Result<()> {
        let mut written = 0usize;
        while written < buf.len() {
            let rc = unsafe {
                libc::write(
                    self.fd.as_raw_fd(),
                    buf[written..].as_ptr() as *const libc::c_void,
                    buf.len() - written,
                )
            };
            match rc {
                n if n < 0 => {
                    let err = std::io::Error::last_os_error();
                    if err.kind() == std::io::ErrorKind::Interrupted {
                        continue;
                    }
                    return Err(err.into());
                }
                n => written += n as usize,
            }
        }
        Ok(())
    }
}

// `OwnedFd`'s `Drop` closes the descriptor; nothing else to release on `stop()`.
