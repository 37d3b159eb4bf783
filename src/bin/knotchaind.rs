// knotchaind — the node daemon.
//
// Opens or creates a wallet, opens or initialises the block store
// (genesis is applied automatically by `ChainView::open` when the store
// is empty), starts the peer listener, and runs the mining tick forever.
//
// Flags: `-serve:<host:port>` (required), `-newchain:<path>` xor
// `-loadchain:<path>` (required, mutually exclusive), `-newuser:<dir>`
// xor `-loaduser:<dir>` (required, mutually exclusive), and an optional
// `-loadaddr:<peerlist.json>` holding a JSON array of peer addresses.

use std::path::{Path, PathBuf};

use colored::*;

use knotchain::error::ConfigError;
use knotchain::node::Node;
use knotchain::wallet;

fn banner() {
    println!("{}", " ██╗  ██╗███╗   ██╗ ██████╗ ████████╗ ██████╗██╗  ██╗ █████╗ ██╗███╗   ██╗".bright_cyan());
    println!("{}", " ██║ ██╔╝████╗  ██║██╔═══██╗╚══██╔══╝██╔════╝██║  ██║██╔══██╗██║████╗  ██║".bright_cyan().bold());
    println!("{}", " █████╔╝ ██╔██╗ ██║██║   ██║   ██║   ██║     ███████║███████║██║██╔██╗ ██║".blue().bold());
    println!("{}", " ██╔═██╗ ██║╚██╗██║██║   ██║   ██║   ██║     ██╔══██║██╔══██║██║██║╚██╗██║".blue());
    println!("{}", " ██║  ██╗██║ ╚████║╚██████╔╝   ██║   ╚██████╗██║  ██║██║  ██║██║██║ ╚████║".bright_blue());
    println!("{}", " ╚═╝  ╚═╝╚═╝  ╚═══╝ ╚═════╝    ╚═╝    ╚═════╝╚═╝  ╚═╝╚═╝  ╚═╝╚═╝╚═╝  ╚═══╝".bright_blue());
    println!();
    println!("{}", "                 hybrid PoET+PoW node daemon                 ".bright_green().bold());
    println!();
}

struct Args {
    serve: String,
    chain_dir: PathBuf,
    chain_is_new: bool,
    user_dir: PathBuf,
    user_is_new: bool,
    peer_list: Option<PathBuf>,
}

fn parse_args() -> Result<Args, ConfigError> {
    let mut serve = None;
    let mut newchain = None;
    let mut loadchain = None;
    let mut newuser = None;
    let mut loaduser = None;
    let mut loadaddr = None;

    for arg in std::env::args().skip(1) {
        if let Some(v) = arg.strip_prefix("-serve:") {
            serve = Some(v.to_string());
        } else if let Some(v) = arg.strip_prefix("-newchain:") {
            newchain = Some(PathBuf::from(v));
        } else if let Some(v) = arg.strip_prefix("-loadchain:") {
            loadchain = Some(PathBuf::from(v));
        } else if let Some(v) = arg.strip_prefix("-newuser:") {
            newuser = Some(PathBuf::from(v));
        } else if let Some(v) = arg.strip_prefix("-loaduser:") {
            loaduser = Some(PathBuf::from(v));
        } else if let Some(v) = arg.strip_prefix("-loadaddr:") {
            loadaddr = Some(PathBuf::from(v));
        }
    }

    let serve = serve.ok_or(ConfigError::BadCliCombination)?;

    let (chain_dir, chain_is_new) = match (newchain, loadchain) {
        (Some(path), None) => (path, true),
        (None, Some(path)) => (path, false),
        _ => return Err(ConfigError::BadCliCombination),
    };

    let (user_dir, user_is_new) = match (newuser, loaduser) {
        (Some(path), None) => (path, true),
        (None, Some(path)) => (path, false),
        _ => return Err(ConfigError::BadCliCombination),
    };

    Ok(Args { serve, chain_dir, chain_is_new, user_dir, user_is_new, peer_list: loadaddr })
}

fn load_peers(path: Option<&Path>) -> Result<Vec<std::net::SocketAddr>, ConfigError> {
    let Some(path) = path else { return Ok(Vec::new()) };
    let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingPeerList)?;
    let entries: Vec<String> = serde_json::from_str(&raw).map_err(|_| ConfigError::MissingPeerList)?;
    entries
        .into_iter()
        .map(|s| s.parse().map_err(|_| ConfigError::MissingPeerList))
        .collect()
}

fn run() -> Result<(), ConfigError> {
    env_logger::init();
    banner();

    let args = parse_args()?;

    let chaindata_marker = args.chain_dir.join("chaindata");
    if args.chain_is_new && chaindata_marker.exists() {
        eprintln!("{} -newchain path already contains a chain", "[init]".bright_red().bold());
        return Err(ConfigError::BadCliCombination);
    }
    if !args.chain_is_new && !chaindata_marker.exists() {
        eprintln!("{} -loadchain path has no existing chain", "[init]".bright_red().bold());
        return Err(ConfigError::BadCliCombination);
    }

    let (pk, sk) = if args.user_is_new {
        println!("{} generating a new wallet in {}", "[wallet]".bright_blue().bold(), args.user_dir.display());
        wallet::create(&args.user_dir).map_err(|e| ConfigError::UnreadableWallet(e.to_string()))?
    } else {
        println!("{} loading wallet from {}", "[wallet]".bright_blue().bold(), args.user_dir.display());
        wallet::load(&args.user_dir).map_err(|e| ConfigError::UnreadableWallet(e.to_string()))?
    };
    let address = knotchain::crypto::address::encode_address_string(&knotchain::crypto::derive_address(&pk));
    println!("{} address: {}", "[wallet]".bright_blue().bold(), address.bright_white());

    let peers = load_peers(args.peer_list.as_deref())?;
    println!("{} {} configured peer(s)", "[p2p]".bright_green().bold(), peers.len());

    let bind_addr: std::net::SocketAddr = args
        .serve
        .parse()
        .map_err(|_| ConfigError::BadCliCombination)?;

    let runtime = tokio::runtime::Runtime::new().map_err(|_| ConfigError::BadCliCombination)?;
    runtime.block_on(async move {
        let node = Node::open(args.chain_dir, peers, pk, sk)
            .map_err(|e| ConfigError::UnreadableWallet(e.to_string()))?;

        println!("{} listening on {}", "[p2p]".bright_green().bold(), bind_addr);
        println!();
        println!("{}", "  Usage: knotchain-cli <daemon-addr> <command> [args...]".bright_yellow().bold());
        println!("  {} knotchain-cli 127.0.0.1:9000 getlhash", "❯".bright_black());
        println!("  {} knotchain-cli 127.0.0.1:9000 getbalance <address>", "❯".bright_black());
        println!();

        node.run(bind_addr).await.map_err(|e| ConfigError::UnreadableWallet(e.to_string()))
    })
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {e}", "error:".bright_red().bold());
        std::process::exit(1);
    }
}
