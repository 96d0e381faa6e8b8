//! txtcert - DNS-01 certificate issuance and renewal
//!
//! This is the main entry point for the txtcert CLI.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use txtcert_core::{AppConfig, ConfigLoader, ConfigOverrides};
use txtcert_tls::{CertStore, Orchestrator, RenewalStore};

#[cfg(target_os = "linux")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// txtcert - Keeps Let's Encrypt (or any ACME CA) certificates fresh via Cloudflare DNS-01
#[derive(Parser)]
#[command(name = "txtcert")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    config: ConfigArgs,

    /// Defaults to `run`
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check and renew certificates every cycle until stopped
    Run,

    /// Run a single cycle; exits non-zero if any domain failed
    Once,

    /// Validate configuration and show renewal status without contacting the CA
    Check,

    /// Show version information
    Version,
}

#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// Configuration file (.toml or .json)
    #[arg(short, long, global = true, env = "TXTCERT_CONFIG")]
    config: Option<PathBuf>,

    /// Cloudflare API token
    #[arg(
        long,
        global = true,
        env = "CLOUDFLARE_KEY",
        alias = "CLOUDFLARE_KEY",
        hide_env_values = true
    )]
    cloudflare_key: Option<String>,

    /// ACME account contact email
    #[arg(long, global = true, env = "ACME_MAIL", alias = "ACME_MAIL")]
    acme_mail: Option<String>,

    /// Comma separated domains, wildcards allowed (`*.example.com`)
    #[arg(long, global = true, env = "DOMAINS", alias = "DOMAINS")]
    domains: Option<String>,

    /// CA preset: letsencrypt, letsencrypt-staging or zerossl
    #[arg(long, global = true, value_name = "PRESET")]
    ca: Option<String>,

    /// Custom ACME directory URL
    #[arg(long, global = true, env = "ACME_DIRECTORY")]
    directory: Option<String>,

    /// External account binding key id
    #[arg(long, global = true, env = "ACME_EAB_KID")]
    eab_kid: Option<String>,

    /// External account binding HMAC key (base64url)
    #[arg(long, global = true, env = "ACME_EAB_HMAC_KEY", hide_env_values = true)]
    eab_hmac_key: Option<String>,

    /// Use the Let's Encrypt staging directory
    #[arg(long, global = true)]
    staging: bool,

    /// Directory holding the renewal state file
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Certificate output directory
    #[arg(long, global = true)]
    cert_dir: Option<PathBuf>,

    /// ACME account directory
    #[arg(long, global = true)]
    account_dir: Option<PathBuf>,
}

impl From<ConfigArgs> for ConfigOverrides {
    fn from(args: ConfigArgs) -> Self {
        ConfigOverrides {
            config_file: args.config,
            cloudflare_token: args.cloudflare_key,
            email: args.acme_mail,
            domains: args.domains,
            ca_preset: args.ca,
            directory_url: args.directory,
            eab_key_id: args.eab_kid,
            eab_hmac_key: args.eab_hmac_key,
            staging: args.staging,
            config_dir: args.config_dir,
            cert_dir: args.cert_dir,
            account_dir: args.account_dir,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise info, or debug with --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    if cli.verbose {
        tracing::debug!("Verbose mode enabled");
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let config = load_config(cli.config)?;
            bootstrap(&config).await?;

            let mut orchestrator = Orchestrator::from_config(&config)?;
            tracing::info!("🚀 txtcert v{} running", txtcert_core::VERSION);
            orchestrator.run().await;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Once => {
            let config = load_config(cli.config)?;
            bootstrap(&config).await?;

            let mut orchestrator = Orchestrator::from_config(&config)?;
            let report = orchestrator.run_cycle().await;
            if report.is_success() {
                Ok(ExitCode::SUCCESS)
            } else {
                tracing::error!("❌ Failed domains: {}", report.failed.join(", "));
                Ok(ExitCode::FAILURE)
            }
        }

        Commands::Check => {
            let config = match load_config(cli.config) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("❌ Configuration Error: {:#}", e);
                    return Ok(ExitCode::FAILURE);
                }
            };
            check(&config).await?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Version => {
            println!("txtcert v{}", txtcert_core::VERSION);
            println!("Built with ❤️ in Rust");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(args: ConfigArgs) -> anyhow::Result<AppConfig> {
    let config = ConfigLoader::resolve(args.into()).context("Invalid configuration")?;
    tracing::debug!("Resolved configuration: {:?}", config);
    Ok(config)
}

/// 📁 Create the state and output directories
async fn bootstrap(config: &AppConfig) -> anyhow::Result<()> {
    let paths = &config.paths;
    for dir in [&paths.config_dir, &paths.cert_dir, &paths.account_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    tracing::info!(
        "📁 State in {}, certificates in {}, accounts in {}",
        paths.config_dir.display(),
        paths.cert_dir.display(),
        paths.account_dir.display()
    );
    Ok(())
}

/// ✅ Print the resolved setup and per-domain renewal status
async fn check(config: &AppConfig) -> anyhow::Result<()> {
    let mut renewals =
        RenewalStore::new(config.paths.renewal_file(), config.schedule.renewal_age_days);
    renewals
        .load()
        .await
        .context("Failed to read renewal state")?;
    let certs = CertStore::new(&config.paths.cert_dir);

    println!("✅ Configuration is valid!");
    println!("🏛️ CA: {} ({})", config.ca.name, config.ca.directory_url);
    println!("📧 Account: {}", config.email);
    println!("📁 Certificates: {}", config.paths.cert_dir.display());

    for domain in &config.domains {
        let renewal = match renewals.next_eligible(domain) {
            Some(next) if !renewals.is_eligible(domain) => {
                format!("renewal after {}", next.to_rfc3339())
            }
            _ => "due".to_string(),
        };

        let expiry = match certs.expiry(domain).await {
            Ok(Some(expiry)) => format!("expires {}", expiry.to_rfc3339()),
            Ok(None) => "no certificate".to_string(),
            Err(e) => format!("unreadable certificate: {}", e),
        };

        println!("  {} - {} ({})", domain, renewal, expiry);
    }

    Ok(())
}
