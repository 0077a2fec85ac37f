//! Key generation tool for the veris state-transition circuit.
//!
//! Generates Groth16 proving and verifying keys.
//!
//! Usage:
//!   cargo run --bin zk-keygen -- generate --output ./zk-keys --levels 140
//!   cargo run --bin zk-keygen -- verify --vk ./zk-keys/state_transition.vk.bin

use clap::{Parser, Subcommand};
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use veris_issuer::zk;

const CIRCUIT_NAME: &str = "state_transition";
const CIRCUIT_VERSION: &str = "1.0.0";

/// Key generation tool for veris identity state transition proofs.
#[derive(Parser)]
#[command(name = "zk-keygen")]
#[command(about = "Generate Groth16 proving and verifying keys for the veris circuit")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate new proving and verifying keys.
    Generate {
        /// Output directory for keys.
        #[arg(short, long, default_value = "./zk-keys")]
        output: PathBuf,

        /// Merkle levels the circuit folds over.
        #[arg(short, long, default_value_t = 140)]
        levels: usize,
    },

    /// Verify that a verifying key file parses, optionally against an
    /// expected hash.
    Verify {
        /// Path to verifying key file.
        #[arg(short, long)]
        vk: PathBuf,

        /// Expected VK hash (hex).
        #[arg(short, long)]
        expected_hash: Option<String>,
    },

    /// Show information about existing keys.
    Info {
        /// Directory containing keys.
        #[arg(short, long, default_value = "./zk-keys")]
        keys_dir: PathBuf,
    },
}

fn vk_hash(vk_bytes: &[u8]) -> String {
    hex::encode(blake3::hash(vk_bytes).as_bytes())
}

fn generate_keys(output_dir: &PathBuf, levels: usize) -> Result<(), Box<dyn std::error::Error>> {
    println!("veris ZK key generator v{}", CIRCUIT_VERSION);
    println!("Circuit: {}", CIRCUIT_NAME);
    println!("Merkle levels: {}", levels);
    println!();
    println!("Running trusted setup (circuit-specific), this may take a while...");

    fs::create_dir_all(output_dir)?;

    let pk_path = output_dir.join(format!("{}.pk.bin", CIRCUIT_NAME));
    let vk_path = output_dir.join(format!("{}.vk.bin", CIRCUIT_NAME));
    zk::setup_keys(levels, &pk_path, &vk_path)?;

    let pk_bytes = fs::read(&pk_path)?;
    let vk_bytes = fs::read(&vk_path)?;
    println!("Proving key: {} ({} bytes)", pk_path.display(), pk_bytes.len());
    println!("Verifying key: {} ({} bytes)", vk_path.display(), vk_bytes.len());

    let hash = vk_hash(&vk_bytes);
    let hash_path = output_dir.join(format!("{}.vk.hash", CIRCUIT_NAME));
    let mut hash_file = File::create(&hash_path)?;
    writeln!(hash_file, "{}", hash)?;
    println!("VK hash: {}", hash);

    let meta_path = output_dir.join(format!("{}.meta.json", CIRCUIT_NAME));
    let metadata = serde_json::json!({
        "circuit": CIRCUIT_NAME,
        "version": CIRCUIT_VERSION,
        "levels": levels,
        "vk_hash": hash,
        "pk_size": pk_bytes.len(),
        "vk_size": vk_bytes.len(),
        "generated_at": chrono::Utc::now().to_rfc3339(),
    });
    let mut meta_file = File::create(&meta_path)?;
    serde_json::to_writer_pretty(&mut meta_file, &metadata)?;
    println!("Metadata: {}", meta_path.display());

    println!();
    println!("Key generation complete. Point the issuer's ZkConf at the");
    println!("two .bin files and use the same --levels value.");
    Ok(())
}

fn verify_key(vk_path: &PathBuf, expected_hash: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying key: {}", vk_path.display());

    let vk_bytes = fs::read(vk_path)?;
    let actual_hash = vk_hash(&vk_bytes);
    println!("VK hash: {}", actual_hash);
    println!("Size: {} bytes", vk_bytes.len());

    let _vk = zk::load_verifying_key(vk_path)?;
    println!("Deserialization: OK");

    if let Some(expected) = expected_hash {
        if actual_hash == expected {
            println!("Hash match: OK");
        } else {
            eprintln!("Hash MISMATCH!");
            eprintln!("  Expected: {}", expected);
            eprintln!("  Actual:   {}", actual_hash);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn show_info(keys_dir: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    println!("veris ZK keys info");
    println!("Directory: {}", keys_dir.display());
    println!();

    let meta_path = keys_dir.join(format!("{}.meta.json", CIRCUIT_NAME));
    if meta_path.exists() {
        let meta_content = fs::read_to_string(&meta_path)?;
        let metadata: serde_json::Value = serde_json::from_str(&meta_content)?;
        println!("State transition circuit:");
        println!("  Version: {}", metadata["version"]);
        println!("  Levels: {}", metadata["levels"]);
        println!("  VK hash: {}", metadata["vk_hash"]);
        println!("  PK size: {} bytes", metadata["pk_size"]);
        println!("  VK size: {} bytes", metadata["vk_size"]);
        println!("  Generated: {}", metadata["generated_at"]);
    } else {
        println!("No keys found. Run 'zk-keygen generate' first.");
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate { output, levels } => generate_keys(&output, levels)?,
        Commands::Verify { vk, expected_hash } => verify_key(&vk, expected_hash)?,
        Commands::Info { keys_dir } => show_info(&keys_dir)?,
    }

    Ok(())
}
