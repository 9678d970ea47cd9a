//! Offline auditor CLI.
//!
//! Verifies inclusion proofs, snapshot checksums and replay bundles received
//! out-of-band, and recomputes a root from a list of leaf digests.  Nothing
//! here needs access to the system that produced the artifacts.

use ballot_audit::{
    verify_proof, verify_replay_bundle, verify_snapshot_checksum, Digest, MerkleProof,
    MerkleTree, ReplayBundle, SnapshotChecksum,
};
use serde::de::DeserializeOwned;
use std::{env, fs, path::Path};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn fatal(message: &str) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

fn print_help() {
    println!("Usage: ballot_audit <command> <file>");
    println!("  verify-proof <proof.json>         check an inclusion proof");
    println!("  verify-snapshot <snapshot.json>   recompute a snapshot checksum");
    println!("  verify-replay <bundle.json>       rebuild the root of a replay bundle");
    println!("  root <leaves.txt>                 root over one hex leaf per line");
}

fn read_file(path: &Path) -> String {
    fs::read_to_string(path)
        .unwrap_or_else(|err| fatal(&format!("failed to read {}: {err}", path.display())))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> T {
    serde_json::from_str(&read_file(path))
        .unwrap_or_else(|err| fatal(&format!("failed to parse {}: {err}", path.display())))
}

fn report(ok: bool, what: &str) {
    if ok {
        println!("OK: {what}");
    } else {
        fatal(&format!("FAILED: {what}"));
    }
}

fn cmd_verify_proof(path: &Path) {
    let proof: MerkleProof = read_json(path);
    debug!(depth = proof.depth(), "loaded proof");
    report(
        verify_proof(&proof),
        &format!("leaf {} included under root {}", proof.leaf, proof.root),
    );
}

fn cmd_verify_snapshot(path: &Path) {
    let snapshot: SnapshotChecksum = read_json(path);
    report(
        verify_snapshot_checksum(&snapshot),
        &format!("poll {} checksum {}", snapshot.poll_id, snapshot.checksum),
    );
    println!("merkle root: {}", snapshot.merkle_root);
}

fn cmd_verify_replay(path: &Path) {
    let bundle: ReplayBundle = read_json(path);
    info!(
        poll_id = %bundle.poll_id,
        ballots = bundle.len(),
        methodology = %bundle.methodology,
        "replaying bundle"
    );
    report(
        verify_replay_bundle(&bundle),
        &format!(
            "poll {} ({} ballots) root {}",
            bundle.poll_id,
            bundle.len(),
            bundle.merkle_root
        ),
    );
}

fn cmd_root(path: &Path) {
    let contents = read_file(path);
    let mut leaves = Vec::new();
    for (line_no, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let leaf = Digest::from_hex(line)
            .unwrap_or_else(|err| fatal(&format!("line {}: {err}", line_no + 1)));
        leaves.push(leaf);
    }
    let count = leaves.len();
    let root = MerkleTree::from_leaves(leaves).root();
    println!("leaves: {count}");
    println!("root: {root}");
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let mut args = env::args().skip(1);
    let command = args.next();
    if matches!(command.as_deref(), None | Some("help" | "-h" | "--help")) {
        print_help();
        return;
    }
    let file = args.next().unwrap_or_else(|| {
        print_help();
        std::process::exit(1);
    });
    let path = Path::new(&file);
    match command.as_deref() {
        Some("verify-proof") => cmd_verify_proof(path),
        Some("verify-snapshot") => cmd_verify_snapshot(path),
        Some("verify-replay") => cmd_verify_replay(path),
        Some("root") => cmd_root(path),
        Some(other) => {
            print_help();
            fatal(&format!("unknown command: {other}"));
        }
        None => print_help(),
    }
}
