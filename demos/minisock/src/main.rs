use std::net::Ipv4Addr;
use std::process::ExitCode;

use clap::Parser;
use net::tcp::{Connection, MSS_WINDOW};
use net::Error;

/// A single-connection, line-oriented TCP client over a SLIP link
/// (HTTP/1.x, Gopher, Finger, Whois).
#[derive(Parser, Debug)]
#[command(name = "minisock")]
struct Cli {
    /// Skip DNS resolution: `dst_ip` is the final server.
    #[arg(short = 'i')]
    no_resolve: bool,
    /// Don't append CRLF after each supplied string.
    #[arg(short = 'n')]
    no_crlf: bool,
    /// Our own IPv4 address, as assigned on the SLIP link.
    src_ip: Ipv4Addr,
    /// The remote host (or, without `-i`, a recursive resolver).
    dst_ip: Ipv4Addr,
    /// Hostname, port, and any strings to send: `[hostname] <port>
    /// [string]...`. Whether `hostname` is present depends on `-i`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    rest: Vec<String>,
}

fn usage_error(msg: &str) -> ExitCode {
    eprintln!("minisock: {msg}");
    ExitCode::from(1)
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(1);
        }
    };

    let (hostname, port_str, strings): (Option<&str>, &str, &[String]) = if cli.no_resolve {
        match cli.rest.split_first() {
            Some((port, strings)) => (None, port.as_str(), strings),
            None => return usage_error("expected a port number"),
        }
    } else {
        match cli.rest.split_first() {
            Some((hostname, rest)) => match rest.split_first() {
                Some((port, strings)) => (Some(hostname.as_str()), port.as_str(), strings),
                None => return usage_error("expected a port number after the hostname"),
            },
            None => return usage_error("expected a hostname and a port number"),
        }
    };

    let port: u16 = match port_str.parse() {
        Ok(p) => p,
        Err(_) => return usage_error("port must be a 16-bit number"),
    };

    let mut payload = String::new();
    for s in strings {
        payload.push_str(s);
        if !cli.no_crlf {
            payload.push_str("\r\n");
        }
    }
    if payload.len() > MSS_WINDOW as usize {
        return usage_error("concatenated payload exceeds the 256-byte send window");
    }

    let slip = match net::setup(net::SerialConfig::default()) {
        Ok(slip) => slip,
        Err(_) => {
            eprintln!("minisock: could not open the SLIP link");
            return ExitCode::from(3);
        }
    };

    let final_addr = match hostname {
        None => cli.dst_ip,
        Some(hostname) => match net::dns::resolve(&slip, cli.src_ip, cli.dst_ip, hostname) {
            Ok(addr) => addr,
            Err(_) => {
                eprintln!("minisock: could not resolve {hostname}");
                return ExitCode::from(5);
            }
        },
    };

    let mut conn = match Connection::open(&slip, cli.src_ip, final_addr, port) {
        Ok(conn) => conn,
        Err(Error::ConnectionRefused) => {
            eprintln!("minisock: connection refused");
            return ExitCode::from(4);
        }
        Err(_) => {
            eprintln!("minisock: SLIP link failure during connect");
            return ExitCode::from(3);
        }
    };

    let send_payload = if payload.is_empty() { None } else { Some(payload.as_str()) };
    let result = conn.send_and_receive(&slip, send_payload);
    conn.close(&slip);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::ConnectionReset) => {
            eprintln!("minisock: connection reset by peer");
            ExitCode::from(3)
        }
        Err(Error::Nomem) => {
            eprintln!("minisock: allocation failure");
            ExitCode::from(2)
        }
        Err(other) => {
            eprintln!("minisock: {other}");
            ExitCode::from(3)
        }
    }
}
