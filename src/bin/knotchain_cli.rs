// knotchain-cli — thin client for a running knotchaind.
//
// Usage:
//   knotchain-cli createwallet <dir>                  (local, no network)
//   knotchain-cli <daemon-addr> addtx <tx.json>
//   knotchain-cli <daemon-addr> getblock <height>
//   knotchain-cli <daemon-addr> getlhash
//   knotchain-cli <daemon-addr> getbalance <address>
//   knotchain-cli <daemon-addr> wakeup

use colored::*;

use knotchain::crypto::address::encode_address_string;
use knotchain::crypto::derive_address;
use knotchain::net::protocol::{Opcode, Packet};
use knotchain::net::transport;
use knotchain::wallet;

fn print_usage() {
    println!("{}", "  knotchain-cli — node control".bright_yellow().bold());
    println!();
    println!("  {} knotchain-cli createwallet <dir>", "❯".bright_black());
    println!("  {} knotchain-cli <daemon-addr> addtx <tx.json>", "❯".bright_black());
    println!("  {} knotchain-cli <daemon-addr> getblock <height>", "❯".bright_black());
    println!("  {} knotchain-cli <daemon-addr> getlhash", "❯".bright_black());
    println!("  {} knotchain-cli <daemon-addr> getbalance <address>", "❯".bright_black());
    println!("  {} knotchain-cli <daemon-addr> wakeup", "❯".bright_black());
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() >= 3 && args[1] == "createwallet" {
        match wallet::create(&args[2]) {
            Ok((pk, _sk)) => {
                let address = encode_address_string(&derive_address(&pk));
                println!("{}", "NEW WALLET CREATED".bright_green().bold());
                println!("{} {}", "Address:".bright_yellow(), address.bright_white());
                println!("{} {}/wallet.dat", "Saved to:".bright_yellow(), args[2]);
            }
            Err(e) => {
                eprintln!("{} {e}", "error:".bright_red().bold());
                std::process::exit(1);
            }
        }
        return;
    }

    if args.len() < 3 {
        print_usage();
        std::process::exit(1);
    }

    let Ok(addr) = args[1].parse::<std::net::SocketAddr>() else {
        eprintln!("{} {} is not a valid daemon address", "error:".bright_red().bold(), args[1]);
        std::process::exit(1);
    };

    let pkt = match args[2].as_str() {
        "addtx" => {
            let Some(path) = args.get(3) else {
                eprintln!("{} addtx requires a transaction JSON file", "error:".bright_red().bold());
                std::process::exit(1);
            };
            let body = match std::fs::read_to_string(path) {
                Ok(b) => b,
                Err(e) => {
                    eprintln!("{} {e}", "error:".bright_red().bold());
                    std::process::exit(1);
                }
            };
            Packet::new(Opcode::AddTrnsx, body)
        }
        "getblock" => {
            let height = args.get(3).cloned().unwrap_or_default();
            Packet::new(Opcode::GetBlock, height)
        }
        "getlhash" => Packet::new(Opcode::GetLHash, ""),
        "getbalance" => {
            let address = args.get(3).cloned().unwrap_or_default();
            Packet::new(Opcode::GetBlnce, address)
        }
        "wakeup" => Packet::new(Opcode::Wakeup, ""),
        other => {
            eprintln!("{} unknown command {other}", "error:".bright_red().bold());
            print_usage();
            std::process::exit(1);
        }
    };

    match transport::send(addr, &pkt).await {
        Ok(reply) => println!("{}", reply.data),
        Err(e) => {
            eprintln!("{} {e}", "error:".bright_red().bold());
            std::process::exit(1);
        }
    }
}
