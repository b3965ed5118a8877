use std::net::Ipv4Addr;
use std::process::ExitCode;

use clap::Parser;
use net::ping::Pinger;

/// ICMP echo over a SLIP link. Runs until interrupted, printing one line
/// per reply.
#[derive(Parser, Debug)]
#[command(name = "ping")]
struct Cli {
    /// Our own IPv4 address, as assigned on the SLIP link.
    src_ip: Ipv4Addr,
    /// The host to ping.
    dst_ip: Ipv4Addr,
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

    let slip = match net::setup(net::SerialConfig::default()) {
        Ok(slip) => slip,
        Err(_) => {
            eprintln!("ping: could not open the SLIP link");
            return ExitCode::from(3);
        }
    };

    let mut pinger = Pinger::new();
    loop {
        match pinger.ping(&slip, cli.src_ip, cli.dst_ip) {
            Ok(reply) => println!("reply from {}: seq={}", reply.from, reply.seq_no),
            Err(_) => {
                eprintln!("ping: SLIP link failure");
                return ExitCode::from(3);
            }
        }
    }
}
