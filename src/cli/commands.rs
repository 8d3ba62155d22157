//! CLI commands for multisig spending
//!
//! Implements all command handlers for the CLI interface. The commands only
//! inspect key sets and existing transactions; `parse` can dump the
//! rehydrated input as a JSON record.

use crate::core::script::Script;
use crate::core::transaction::{OutPoint, Transaction};
use crate::crypto::PublicKey;
use crate::multisig::record::{save_record, MultisigInputRecord};
use crate::multisig::{MultisigInput, RedeemCondition, SpentOutput};
use std::path::Path;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Base58Check version byte of mainnet pay-to-script-hash addresses
pub const P2SH_ADDRESS_VERSION: u8 = 0x05;

// =============================================================================
// Argument parsing
// =============================================================================

pub fn parse_public_keys(keys: &[String]) -> CliResult<Vec<PublicKey>> {
    keys.iter()
        .map(|k| PublicKey::from_hex(k.trim()).map_err(Into::into))
        .collect()
}

fn locking_script(redeem: &RedeemCondition, script_hash: bool) -> Script {
    if script_hash {
        redeem.script_hash_locking_script()
    } else {
        redeem.script()
    }
}

fn short(hex: &str) -> &str {
    &hex[..hex.len().min(16)]
}

// =============================================================================
// Commands
// =============================================================================

/// Print the redeem condition for a key set
pub fn cmd_redeem(public_keys: &[String], threshold: u8, sort: bool) -> CliResult<()> {
    let mut public_keys = parse_public_keys(public_keys)?;
    if sort {
        crate::multisig::sort_public_keys(&mut public_keys);
    }
    let redeem = RedeemCondition::new(public_keys, threshold)?;

    println!("🔐 Redeem condition {}", redeem.description());
    println!("   ├─ Script: {}", redeem.script().to_hex());
    println!("   ├─ Length: {} bytes", redeem.serialized_len());
    println!(
        "   ├─ P2SH script: {}",
        redeem.script_hash_locking_script().to_hex()
    );
    println!(
        "   └─ P2SH address: {}",
        redeem.script_hash_address(P2SH_ADDRESS_VERSION)
    );

    println!("\n   Key order:");
    for (i, key) in redeem.public_keys().iter().enumerate() {
        println!("   {}. {}", i + 1, key);
    }

    Ok(())
}

/// Print the size estimate for a fully signed input
pub fn cmd_estimate(public_keys: &[String], threshold: u8, script_hash: bool) -> CliResult<()> {
    let public_keys = parse_public_keys(public_keys)?;
    let redeem = RedeemCondition::new(public_keys.clone(), threshold)?;
    let spent = SpentOutput::new(
        OutPoint::default(),
        locking_script(&redeem, script_hash),
        0,
    );
    let input = MultisigInput::new(spent, public_keys, threshold)?;

    println!("📏 Size estimate for {} ({:?})", redeem.description(), input.spend_kind());
    println!("   ├─ Unlocking script: {} bytes", input.estimate_size());
    println!("   └─ Full input: {} bytes", input.estimate_input_size());

    Ok(())
}

/// Rehydrate an input from a raw transaction's unlocking script.
/// `value` is the amount of the spent output, which the transaction itself
/// does not carry.
pub fn cmd_parse(
    tx_hex: &str,
    index: usize,
    value: u64,
    public_keys: &[String],
    threshold: u8,
    script_hash: bool,
    record_path: Option<&Path>,
) -> CliResult<()> {
    let tx = Transaction::from_hex(tx_hex.trim())?;
    let public_keys = parse_public_keys(public_keys)?;
    let redeem = RedeemCondition::new(public_keys.clone(), threshold)?;

    let outpoint = tx
        .inputs
        .get(index)
        .map(|input| input.previous_output)
        .ok_or_else(|| format!("transaction has no input {}", index))?;
    let spent = SpentOutput::new(outpoint, locking_script(&redeem, script_hash), value);

    let input = MultisigInput::from_unlocking_script(&tx, index, spent, public_keys, threshold)?;
    print_input(index, &input);

    if let Some(path) = record_path {
        let record: MultisigInputRecord = input.to_record();
        save_record(path, &record)?;
        println!("\n💾 Input record written to {:?}", path);
    }

    Ok(())
}

fn print_input(index: usize, input: &MultisigInput) {
    println!(
        "\n   Input {} | {} | {:?} | {} sat | {}/{} signatures",
        index,
        input.redeem_condition().description(),
        input.spend_kind(),
        input.spent_output().value,
        input.count_signatures(),
        input.threshold()
    );
    for (slot, (key, signature)) in input
        .public_keys()
        .iter()
        .zip(input.signatures())
        .enumerate()
    {
        let mark = match signature {
            Some(sig) => format!("signed ({:?})", sig.sighash),
            None => "-".to_string(),
        };
        println!("   └─ {}. {}... {}", slot + 1, short(&key.to_hex()), mark);
    }
}
