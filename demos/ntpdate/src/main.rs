use std::net::Ipv4Addr;
use std::process::ExitCode;

use chrono::{TimeZone, Utc};
use clap::Parser;
use net::Error;

/// One-shot NTPv3 query over a SLIP link.
#[derive(Parser, Debug)]
#[command(name = "ntp")]
struct Cli {
    /// Skip DNS resolution: `dst_ip` is the final NTP server.
    #[arg(short = 'i')]
    no_resolve: bool,
    /// Our own IPv4 address, as assigned on the SLIP link.
    src_ip: Ipv4Addr,
    /// The NTP server (or, without `-i`, a recursive resolver).
    dst_ip: Ipv4Addr,
    /// Hostname of the NTP server; required unless `-i` is given.
    hostname: Option<String>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(3);
        }
    };

    let slip = match net::setup(net::SerialConfig::default()) {
        Ok(slip) => slip,
        Err(_) => {
            eprintln!("ntp: could not open the SLIP link");
            return ExitCode::from(4);
        }
    };

    let server = if cli.no_resolve {
        cli.dst_ip
    } else {
        let Some(hostname) = cli.hostname.as_deref() else {
            eprintln!("ntp: a hostname is required unless -i is given");
            return ExitCode::from(3);
        };
        match net::dns::resolve(&slip, cli.src_ip, cli.dst_ip, hostname) {
            Ok(addr) => addr,
            Err(Error::SlipFailed) => {
                eprintln!("ntp: SLIP link failure during resolve");
                return ExitCode::from(4);
            }
            Err(_) => {
                eprintln!("ntp: could not resolve {hostname}");
                return ExitCode::from(3);
            }
        }
    };

    match net::ntp::query(&slip, cli.src_ip, server) {
        Ok(response) => {
            let when = Utc
                .timestamp_opt(response.unix_seconds as i64, 0)
                .single()
                .map(|dt| dt.to_rfc2822())
                .unwrap_or_else(|| "unrepresentable timestamp".to_string());
            println!("stratum: {}", response.stratum);
            println!("refid: {:02x?}", response.reference_identifier);
            println!("time: {when}");
            ExitCode::SUCCESS
        }
        Err(Error::SlipFailed) => {
            eprintln!("ntp: SLIP link failure");
            ExitCode::from(4)
        }
        Err(Error::AnswerMalformed) => {
            eprintln!("ntp: corrupt or truncated response");
            ExitCode::from(5)
        }
        Err(other) => {
            eprintln!("ntp: {other}");
            ExitCode::from(5)
        }
    }
}
