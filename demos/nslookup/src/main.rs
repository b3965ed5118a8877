use std::net::Ipv4Addr;
use std::process::ExitCode;

use clap::Parser;
use net::Error;

/// One-shot DNS A-record lookup over a SLIP link.
#[derive(Parser, Debug)]
#[command(name = "nslookup")]
struct Cli {
    /// Our own IPv4 address, as assigned on the SLIP link.
    src_ip: Ipv4Addr,
    /// A directly reachable recursive resolver.
    resolver_ip: Ipv4Addr,
    /// The hostname to resolve.
    name: String,
}

const MAX_ATTEMPTS: u32 = 3;

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let slip = match net::setup(net::SerialConfig::default()) {
        Ok(slip) => slip,
        Err(_) => {
            eprintln!("nslookup: could not open the SLIP link");
            return ExitCode::from(2);
        }
    };

    let mut attempt = 0;
    loop {
        attempt += 1;
        match net::dns::resolve(&slip, cli.src_ip, cli.resolver_ip, &cli.name) {
            Ok(addr) => {
                println!("{addr}");
                return ExitCode::SUCCESS;
            }
            Err(Error::NoAnswers) | Err(Error::BadAnswer) if attempt < MAX_ATTEMPTS => {
                log::warn!("attempt {attempt} failed, retrying");
                continue;
            }
            Err(Error::NoAnswers) | Err(Error::BadAnswer) => {
                eprintln!("nslookup: {} could not be resolved", cli.name);
                return ExitCode::from(1);
            }
            Err(Error::SlipFailed) => {
                eprintln!("nslookup: SLIP link failure");
                return ExitCode::from(2);
            }
            Err(Error::QueryTooBig) => {
                eprintln!("nslookup: question too big for a single UDP datagram");
                return ExitCode::from(3);
            }
            Err(Error::AnswerMalformed) => {
                eprintln!("nslookup: internal DNS error (malformed answer)");
                return ExitCode::from(4);
            }
            Err(other) => {
                eprintln!("nslookup: unexpected error: {other}");
                return ExitCode::from(5);
            }
        }
    }
}
