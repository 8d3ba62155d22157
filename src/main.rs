//! Mini-Multisig CLI Application
//!
//! A command-line interface for inspecting M-of-N redeem conditions and inputs.

use clap::{Parser, Subcommand};
use mini_multisig::cli;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "multisig")]
#[command(version = "0.1.0")]
#[command(about = "Threshold multi-signature spending in Rust", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the redeem condition for a key set
    Redeem {
        /// Required signatures
        #[arg(short, long)]
        threshold: u8,

        /// Public key in hex (repeat in redeem order)
        #[arg(short, long = "pubkey", required = true)]
        pubkeys: Vec<String>,

        /// Sort keys by their encoding first
        #[arg(long)]
        sort: bool,
    },

    /// Estimate the size of a fully signed input
    Estimate {
        /// Required signatures
        #[arg(short, long)]
        threshold: u8,

        /// Public key in hex (repeat in redeem order)
        #[arg(short, long = "pubkey", required = true)]
        pubkeys: Vec<String>,

        /// Output is pay-to-script-hash
        #[arg(long)]
        script_hash: bool,
    },

    /// Rehydrate a multisig input from a raw transaction
    Parse {
        /// Raw transaction hex
        #[arg(long)]
        tx: String,

        /// Input to parse
        #[arg(short, long, default_value = "0")]
        index: usize,

        /// Value of the spent output
        #[arg(long)]
        value: u64,

        /// Required signatures
        #[arg(short, long)]
        threshold: u8,

        /// Public key in hex (repeat in redeem order)
        #[arg(short, long = "pubkey", required = true)]
        pubkeys: Vec<String>,

        /// Output is pay-to-script-hash
        #[arg(long)]
        script_hash: bool,

        /// Write the input record to this file
        #[arg(short, long)]
        record: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Redeem {
            threshold,
            pubkeys,
            sort,
        } => {
            cli::cmd_redeem(&pubkeys, threshold, sort)?;
        }

        Commands::Estimate {
            threshold,
            pubkeys,
            script_hash,
        } => {
            cli::cmd_estimate(&pubkeys, threshold, script_hash)?;
        }

        Commands::Parse {
            tx,
            index,
            value,
            threshold,
            pubkeys,
            script_hash,
            record,
        } => {
            cli::cmd_parse(
                &tx,
                index,
                value,
                &pubkeys,
                threshold,
                script_hash,
                record.as_deref(),
            )?;
        }
    }

    Ok(())
}
