use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use bts_voting::attest::verify_attested_output;
use bts_voting::crypto::providers::ed25519::Ed25519Signer;
use bts_voting::crypto::registry::default_registry;
use bts_voting::crypto::{PublicKeyBytes, SigningSeed, VerificationResult};
use bts_voting::dispatch::Command;
use bts_voting::fs_guard;
use bts_voting::limits::MAX_OUTPUT_LEN;
use bts_voting::{BtsPolicy, TrustedApp};

/// A seed file holds 64 hex chars plus optional whitespace.
const MAX_KEY_FILE_BYTES: u64 = 1024;

/// Attested outputs never exceed the output ceiling; allow a trailing newline.
const MAX_ATTESTED_OUTPUT_BYTES: u64 = MAX_OUTPUT_LEN as u64 + 2;

#[derive(Parser)]
#[command(name = "bts-voting", about = "Bounded peer-prediction trust scoring", version)]
struct Cli {
    /// Policy JSON (defaults apply when omitted)
    #[arg(long, global = true)]
    policy: Option<PathBuf>,

    /// File holding a 32-byte Ed25519 seed as 64 hex chars
    #[arg(long, global = true)]
    signing_key: Option<PathBuf>,

    /// Log filter, e.g. `warn` or `bts_voting=debug`
    #[arg(long, global = true, default_value = "warn")]
    log: String,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Args)]
struct InputArgs {
    /// Inline data, or `-` to read stdin
    #[arg(conflicts_with = "file")]
    input: Option<String>,

    /// Read data from a file
    #[arg(long)]
    file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Score a vote report
    ProcessVote {
        #[command(flatten)]
        input: InputArgs,

        /// Output buffer capacity in bytes, terminator included
        #[arg(long, default_value_t = MAX_OUTPUT_LEN)]
        output_capacity: usize,
    },

    /// Run the label decryption stub
    DecryptLabel {
        #[command(flatten)]
        input: InputArgs,

        /// Output buffer capacity in bytes, terminator included
        #[arg(long, default_value_t = MAX_OUTPUT_LEN)]
        output_capacity: usize,
    },

    /// Print the Ed25519 public key for --signing-key
    Pubkey,

    /// Check an Ed25519-attested output (stdin when no input is given)
    Verify {
        /// Hex-encoded 32-byte public key
        #[arg(long)]
        public_key: String,

        #[command(flatten)]
        input: InputArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log)?;

    let seed = cli.signing_key.as_deref().map(load_seed).transpose()?;

    match cli.cmd {
        Cmd::ProcessVote {
            input,
            output_capacity,
        } => invoke(
            Command::ProcessVotes,
            cli.policy.as_deref(),
            seed.as_ref(),
            &input,
            output_capacity,
        ),
        Cmd::DecryptLabel {
            input,
            output_capacity,
        } => invoke(
            Command::DecryptLabel,
            cli.policy.as_deref(),
            seed.as_ref(),
            &input,
            output_capacity,
        ),
        Cmd::Pubkey => {
            let seed = seed.ok_or_else(|| anyhow!("pubkey requires --signing-key"))?;
            print_pubkey(&Ed25519Signer::from_seed(&seed))
        }
        Cmd::Verify { public_key, input } => verify(&public_key, &input),
    }
}

fn init_tracing(filter: &str) -> Result<()> {
    let filter =
        EnvFilter::try_new(filter).with_context(|| format!("invalid --log filter `{filter}`"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("installing log subscriber: {e}"))
}

fn load_seed(path: &Path) -> Result<SigningSeed> {
    let raw = Zeroizing::new(fs_guard::read_validated(path, MAX_KEY_FILE_BYTES)?);
    let text = std::str::from_utf8(&raw)
        .map_err(|_| anyhow!("signing key {} is not UTF-8 hex", path.display()))?;
    SigningSeed::from_hex(text).with_context(|| format!("signing key {}", path.display()))
}

/// Resolves inline data, `-` (stdin) or `--file`. With neither given,
/// reads stdin when `stdin_by_default` is set.
fn read_input(args: &InputArgs, max_bytes: u64, stdin_by_default: bool) -> Result<Vec<u8>> {
    match (&args.input, &args.file) {
        (Some(s), None) if s == "-" => fs_guard::read_bounded(io::stdin().lock(), max_bytes, "stdin"),
        (Some(s), None) => Ok(s.as_bytes().to_vec()),
        (None, Some(path)) => fs_guard::read_validated(path, max_bytes),
        (None, None) if stdin_by_default => {
            fs_guard::read_bounded(io::stdin().lock(), max_bytes, "stdin")
        }
        (None, None) => Err(anyhow!("no input: pass data, `-` for stdin, or --file PATH")),
        (Some(_), Some(_)) => Err(anyhow!("pass either inline data or --file, not both")),
    }
}

fn invoke(
    command: Command,
    policy_path: Option<&Path>,
    seed: Option<&SigningSeed>,
    input: &InputArgs,
    output_capacity: usize,
) -> Result<()> {
    let policy = BtsPolicy::load(policy_path)?;
    let registry = default_registry(seed);
    let app = TrustedApp::new(&policy, &registry)?;

    // One byte over the limit still reaches the app, which rejects the
    // invocation the same way it would for any other caller.
    let data = read_input(input, policy.limits.max_input_len as u64 + 1, false)?;

    let (output, outcome) = app.invoke_bytes(command as u32, &data, output_capacity);
    if !outcome.code.is_success() {
        return Err(anyhow!("{command:?} failed: {}", outcome.code));
    }

    let mut stdout = io::stdout().lock();
    stdout.write_all(&output).context("write output")?;
    stdout.write_all(b"\n").context("write output")?;
    Ok(())
}

fn print_pubkey(signer: &Ed25519Signer) -> Result<()> {
    let doc = serde_json::json!({
        "algorithm": "ed25519",
        "format": "hex",
        "public_key": signer.public_key().to_hex(),
        "key_id": signer.key_id(),
    });
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

fn verify(public_key_hex: &str, input: &InputArgs) -> Result<()> {
    let public_key = PublicKeyBytes::from_hex(public_key_hex)?;
    let output = read_input(input, MAX_ATTESTED_OUTPUT_BYTES, true)?;
    match verify_attested_output(&output, &public_key)? {
        VerificationResult::Valid => {
            println!("valid");
            Ok(())
        }
        VerificationResult::Invalid { reason } => Err(anyhow!("attestation invalid: {reason}")),
    }
}
