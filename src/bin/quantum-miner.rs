#![forbid(unsafe_code)]
//! Nonce search for QuantumCoin mints
//!
//! Fetch the current template with `GET /api/v1/mint/template/{address}`, then
//! run this tool with the returned tip and difficulty. The printed nonce is
//! what `POST /api/v1/mint` expects.

use std::time::Instant;

use anyhow::{bail, Context};
use clap::Parser;
use log::info;

use quantum_coin::ledger::hashgate;
use quantum_coin::ledger::{Address, Hash256};

#[derive(Parser, Debug)]
#[command(name = "quantum-miner", about = "Search for a proof-of-work nonce for a QuantumCoin mint")]
struct Args {
    /// Current ledger tip (hex); all zeros for the first mint
    #[arg(long, default_value_t = Hash256::ZERO.to_hex())]
    previous_hash: String,

    /// Receiver address; its identity hash is used as the receiver field
    #[arg(long, conflicts_with = "receiver_hash", required_unless_present = "receiver_hash")]
    receiver: Option<String>,

    /// Receiver identity hash (hex), as returned by the template endpoint
    #[arg(long)]
    receiver_hash: Option<String>,

    /// Amount to mint
    #[arg(long)]
    amount: u64,

    /// Ledger difficulty exponent
    #[arg(long, default_value_t = 230)]
    difficulty: u32,

    /// First nonce to try
    #[arg(long, default_value_t = 0)]
    start: u64,

    /// Give up after this many nonces
    #[arg(long, default_value_t = u64::MAX)]
    max_attempts: u64,
}

/// Number of nonces tried from `start` up to and including `nonce`
fn attempts_taken(start: u64, nonce: u64) -> u128 {
    u128::from(nonce.abs_diff(start)) + 1
}

fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let args = Args::parse();

    if args.amount == 0 {
        bail!("amount must be positive");
    }

    let previous_hash: Hash256 = args
        .previous_hash
        .parse()
        .context("invalid --previous-hash")?;

    let receiver = match (&args.receiver, &args.receiver_hash) {
        (Some(address), _) => address
            .parse::<Address>()
            .context("invalid --receiver")?
            .identity_hash(),
        (None, Some(hash)) => hash.parse().context("invalid --receiver-hash")?,
        (None, None) => bail!("either --receiver or --receiver-hash is required"),
    };

    info!(
        "Searching for a nonce below 2^{} from {} (receiver hash {})",
        args.difficulty, args.start, receiver
    );

    let started = Instant::now();
    let found = hashgate::find_nonce(
        &previous_hash,
        &Hash256::ZERO,
        &receiver,
        args.amount,
        args.difficulty,
        args.start,
        args.max_attempts,
    );

    match found {
        Some((nonce, digest)) => {
            info!(
                "Found nonce after {} attempts in {:.2?}",
                attempts_taken(args.start, nonce),
                started.elapsed()
            );
            println!("Nonce : {}", nonce);
            println!("Hash  : {}", digest);
            Ok(())
        }
        None => bail!(
            "no valid nonce within {} attempts from {}",
            args.max_attempts,
            args.start
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempts_taken() {
        assert_eq!(attempts_taken(0, 0), 1);
        assert_eq!(attempts_taken(10, 14), 5);
        assert_eq!(attempts_taken(0, u64::MAX), u128::from(u64::MAX) + 1);
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "quantum-miner",
            "--receiver",
            "alice",
            "--amount",
            "50",
            "--difficulty",
            "248",
        ])
        .unwrap();

        assert_eq!(args.receiver.as_deref(), Some("alice"));
        assert_eq!(args.amount, 50);
        assert_eq!(args.previous_hash, Hash256::ZERO.to_hex());
        assert_eq!(args.max_attempts, u64::MAX);

        assert!(Args::try_parse_from(["quantum-miner", "--amount", "5"]).is_err());
    }
}
