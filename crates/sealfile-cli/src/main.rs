//! sealfile: passphrase-based file encryption CLI
//!
//! Commands:
//!   encrypt <input> [<output>]   - seal a file (whole-file or --stream)
//!   decrypt <input> [<output>]   - open a sealed file (framing auto-detected)
//!   inspect <input>              - show header fields without the passphrase
//!   config show                  - display the active configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::{ExposeSecret, SecretString};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use sealfile_core::config::SealfileConfig;
use sealfile_crypto::format::STREAM_HEADER_LEN;
use sealfile_crypto::{FileCodec, FormatKind, Header, KdfParams, Mode, TAG_SIZE};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "sealfile",
    version,
    about = "Passphrase-based authenticated file encryption",
    long_about = "sealfile: encrypt and decrypt files with Argon2id + ChaCha20-Poly1305"
)]
struct Cli {
    /// Path to sealfile.toml configuration file
    #[arg(long, short = 'c', env = "SEALFILE_CONFIG", default_value = "sealfile.toml")]
    config: PathBuf,

    /// Log level or filter directive (overrides config)
    #[arg(long, env = "SEALFILE_LOG")]
    log: Option<String>,

    /// Log format (overrides config)
    #[arg(long, env = "SEALFILE_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file
    Encrypt {
        /// Plaintext input file
        input: PathBuf,
        /// Encrypted output file (default: <input>.enc)
        output: Option<PathBuf>,
        /// Use chunked streaming mode (overrides config)
        #[arg(long)]
        stream: bool,
        /// Plaintext bytes per chunk in streaming mode (overrides config)
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Decrypt a file produced by `sealfile encrypt`
    Decrypt {
        /// Encrypted input file
        input: PathBuf,
        /// Plaintext output file (default: <input> without .enc, or <input>.dec)
        output: Option<PathBuf>,
    },

    /// Show the header of an encrypted file (no passphrase needed)
    Inspect {
        /// Encrypted input file
        input: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, defaulted) = load_config(&cli.config)?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);

    // Logging is only up now, so the fallback is reported here.
    if defaulted {
        warn!(config = %cli.config.display(), "config file not found, using defaults");
    }

    debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "sealfile starting"
    );

    let preset = passphrase_from_env();
    match &cli.command {
        Commands::Encrypt {
            input,
            output,
            stream,
            chunk_size,
        } => cmd_encrypt(preset, &config, input, output.as_deref(), *stream, *chunk_size),
        Commands::Decrypt { input, output } => {
            cmd_decrypt(preset, &config, input, output.as_deref())
        }
        Commands::Inspect { input } => cmd_inspect(input),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Load the config; the flag is true when the file was absent and defaults apply.
fn load_config(path: &Path) -> Result<(SealfileConfig, bool)> {
    let defaulted = !path.exists();
    let config = SealfileConfig::load(path)
        .with_context(|| format!("loading config {}", path.display()))?;
    Ok((config, defaulted))
}

fn kdf_params(config: &SealfileConfig) -> KdfParams {
    KdfParams {
        mem_cost_kib: config.crypto.argon2_mem_cost_kib,
        time_cost: config.crypto.argon2_time_cost,
        parallelism: config.crypto.argon2_parallelism,
    }
}

/// `SEALFILE_PASSPHRASE`, if set. The passphrase is never taken from argv.
fn passphrase_from_env() -> Option<SecretString> {
    std::env::var("SEALFILE_PASSPHRASE")
        .ok()
        .map(SecretString::from)
}

/// The preset passphrase, else an interactive prompt.
fn read_passphrase(preset: Option<SecretString>, confirm: bool) -> Result<SecretString> {
    if let Some(p) = preset {
        return Ok(p);
    }

    let first = SecretString::from(
        rpassword::prompt_password("Passphrase: ").context("reading passphrase")?,
    );
    if confirm {
        let second = SecretString::from(
            rpassword::prompt_password("Confirm passphrase: ").context("reading passphrase")?,
        );
        if first.expose_secret() != second.expose_secret() {
            anyhow::bail!("passphrases do not match");
        }
    }
    Ok(first)
}

fn default_encrypted_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(".enc");
    PathBuf::from(name)
}

fn default_decrypted_path(input: &Path) -> PathBuf {
    match input.extension().and_then(|e| e.to_str()) {
        Some("enc") => input.with_extension(""),
        _ => {
            let mut name = input.as_os_str().to_owned();
            name.push(".dec");
            PathBuf::from(name)
        }
    }
}

/// Lowercase hex (salts and nonces are printed, never keys)
fn to_hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

// ── `sealfile encrypt` ────────────────────────────────────────────────────────

fn cmd_encrypt(
    preset: Option<SecretString>,
    config: &SealfileConfig,
    input: &Path,
    output: Option<&Path>,
    stream: bool,
    chunk_size: Option<usize>,
) -> Result<()> {
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_encrypted_path(input));

    let mode = if stream || config.crypto.streaming || chunk_size.is_some() {
        Mode::Stream {
            chunk_size: chunk_size.unwrap_or(config.crypto.chunk_size),
        }
    } else {
        Mode::WholeFile
    };
    let params = kdf_params(config);
    params.validate().context("checking Argon2id parameters")?;
    let codec = FileCodec::new(params).with_mode(mode);

    let passphrase = read_passphrase(preset, true)?;
    codec
        .encrypt_file(input, &output, passphrase.expose_secret().as_bytes())
        .with_context(|| format!("encrypting {}", input.display()))?;

    info!(output = %output.display(), "encryption complete");
    println!("Encrypted {} → {}", input.display(), output.display());
    Ok(())
}

// ── `sealfile decrypt` ────────────────────────────────────────────────────────

fn cmd_decrypt(
    preset: Option<SecretString>,
    config: &SealfileConfig,
    input: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_decrypted_path(input));

    let codec = FileCodec::new(kdf_params(config));
    let passphrase = read_passphrase(preset, false)?;
    codec
        .decrypt_file(input, &output, passphrase.expose_secret().as_bytes())
        .with_context(|| format!("decrypting {}", input.display()))?;

    info!(output = %output.display(), "decryption complete");
    println!("Decrypted {} → {}", input.display(), output.display());
    Ok(())
}

// ── `sealfile inspect` ────────────────────────────────────────────────────────

fn cmd_inspect(input: &Path) -> Result<()> {
    let file = std::fs::File::open(input)
        .with_context(|| format!("opening {}", input.display()))?;
    let file_len = file.metadata()?.len();

    let mut head = Vec::with_capacity(STREAM_HEADER_LEN);
    file.take(STREAM_HEADER_LEN as u64)
        .read_to_end(&mut head)
        .with_context(|| format!("reading {}", input.display()))?;
    let header =
        Header::parse(&head).with_context(|| format!("parsing header of {}", input.display()))?;
    let payload = file_len - header.encoded_len() as u64;

    println!("file:        {}", input.display());
    println!("format:      {}", header.kind);
    println!("salt:        {}", to_hex(&header.salt));
    println!("nonce:       {}", to_hex(&header.nonce));
    match (header.kind, header.chunk_size) {
        (FormatKind::Stream, Some(chunk_size)) => {
            println!("chunk size:  {chunk_size}");
            match stream_plaintext_len(payload, chunk_size as u64) {
                Some((chunks, plain)) => {
                    println!("chunks:      {chunks}");
                    println!("plaintext:   {plain} bytes");
                }
                None => println!("plaintext:   unknown (stream is truncated)"),
            }
        }
        _ => match payload.checked_sub(TAG_SIZE as u64) {
            Some(plain) => println!("plaintext:   {plain} bytes"),
            None => println!("plaintext:   unknown (file is truncated)"),
        },
    }
    Ok(())
}

/// Chunk count and plaintext length implied by a stream payload length.
fn stream_plaintext_len(payload: u64, chunk_size: u64) -> Option<(u64, u64)> {
    let unit = chunk_size + TAG_SIZE as u64;
    let full = payload / unit;
    let last = (payload % unit).checked_sub(TAG_SIZE as u64)?;
    Some((full + 1, full * chunk_size + last))
}

// ── `sealfile config show` ────────────────────────────────────────────────────

fn cmd_config_show(config: &SealfileConfig, path: &Path) -> Result<()> {
    println!("# config: {}", path.display());
    print!("{}", config.to_toml()?);
    Ok(())
}
