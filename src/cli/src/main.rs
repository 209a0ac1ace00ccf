//! accessaudit - Access Audit Reconciliation
//!
//! Compares who should have access against who actually does:
//! - `ssh`: expected roster against each host's authorized keys
//! - `status`: roster users across identity and SaaS providers
//! - `offboarding`: departures from closed issues across every provider

use accessaudit::roster::resolve_roster;
use accessaudit::{
    AccountStatusProvider, AuditPlan, Auditor, DepartureExtractor, DepartureWindow,
    ReconciliationReport, RosterInput, SourceOfTruth,
};
use accessaudit_providers::chat::{DEFAULT_CHAT_SECRET, DEFAULT_CHAT_URL};
use accessaudit_providers::device::{DEFAULT_DEVICE_SECRET, DEFAULT_DEVICE_URL};
use accessaudit_providers::directory::{DEFAULT_DIRECTORY_SECRET, DEFAULT_DIRECTORY_URL};
use accessaudit_providers::{
    build_client, ChatProvider, DeviceProvider, DirectoryProvider, GitHubIssueTracker,
    InfrastructureRepoProvider, OpenSshConnector, PasswordManagerProvider,
};
use accessaudit_vault::{CredentialLease, OnePasswordCli, SecretStore};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

mod config;

use config::{AuditToolConfig, PROVIDER_NAMES};

/// Access audit reconciliation CLI
#[derive(Parser)]
#[command(name = "accessaudit")]
#[command(about = "Reconcile SSH and provider access against the expected roster")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "accessaudit.toml", env = "ACCESSAUDIT_CONFIG")]
    config: PathBuf,

    /// 1Password session token used for every vault call
    #[arg(long, env = "OP_SESSION", hide_env_values = true)]
    session: Option<String>,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Diff the roster against every configured SSH host
    Ssh,

    /// Partition roster users at the enabled providers
    Status {
        /// Restrict to these providers (repeatable)
        #[arg(long = "provider", value_name = "NAME")]
        providers: Vec<String>,
    },

    /// Check departures closed inside a window at every enabled provider
    Offboarding {
        /// First day of the window (YYYYMMDD)
        #[arg(long)]
        start: String,

        /// Last day of the window (YYYYMMDD), defaults to today
        #[arg(long)]
        end: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},accessaudit=debug", log_level).into()),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!("accessaudit v{}", env!("CARGO_PKG_VERSION"));

    let config = AuditToolConfig::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);
    config.validate()?;

    // A cancelled run emits no partial report
    let report = tokio::select! {
        result = run(&cli, &config) => result?,
        _ = signal::ctrl_c() => {
            anyhow::bail!("Interrupted (Ctrl+C) before the report was complete");
        }
        _ = shutdown_signal() => {
            anyhow::bail!("Terminated (SIGTERM) before the report was complete");
        }
    };

    emit(&report, cli.output.as_ref())?;

    if !report.is_clean() {
        info!("Run {} found discrepancies", report.run_id);
    }

    Ok(())
}

async fn run(cli: &Cli, config: &AuditToolConfig) -> Result<ReconciliationReport> {
    let auditor = Auditor::new(config.audit_config());
    let vault = Vault::new(config, cli.session.as_deref());

    match &cli.command {
        Command::Ssh => run_ssh(&auditor, config, &vault).await,
        Command::Status { providers } => run_status(&auditor, config, &vault, providers).await,
        Command::Offboarding { start, end } => {
            run_offboarding(&auditor, config, &vault, start, end.as_deref()).await
        }
    }
}

async fn run_ssh(
    auditor: &Auditor,
    config: &AuditToolConfig,
    vault: &Vault,
) -> Result<ReconciliationReport> {
    if config.ssh.hosts.is_empty() {
        anyhow::bail!("No hosts configured under [ssh]");
    }

    let truth = resolve_roster(&config.roster).context("Invalid roster")?;

    let lease = match &config.ssh.key_secret {
        Some(name) => {
            let store = vault.store()?;
            let lease = CredentialLease::acquire(store.as_ref(), name)
                .await
                .with_context(|| format!("Failed to fetch SSH key '{}'", name))?;
            Some(lease)
        }
        None => None,
    };

    let identity = lease.as_ref().map(|lease| lease.path().to_path_buf());
    let connector =
        OpenSshConnector::new(config.ssh_settings(identity)).with_home_root(&config.home_root);

    let plan = AuditPlan::new(RosterInput::Static(truth))
        .with_hosts(&connector, config.ssh.hosts.clone());
    let result = auditor.run(plan).await;

    if let Some(lease) = lease {
        if let Err(e) = lease.release() {
            warn!("Failed to remove SSH key file: {}", e);
        }
    }

    Ok(result?)
}

async fn run_status(
    auditor: &Auditor,
    config: &AuditToolConfig,
    vault: &Vault,
    requested: &[String],
) -> Result<ReconciliationReport> {
    let names = select_providers(config, requested)?;
    let providers = build_providers(config, vault, &names)?;

    let roster = resolve_roster(&config.roster).context("Invalid roster")?;
    let truth = SourceOfTruth::from_subjects(
        roster.users.iter().map(|user| user.qualified(&config.domain)),
    );

    let plan = providers
        .into_iter()
        .fold(AuditPlan::new(RosterInput::Static(truth)), AuditPlan::with_provider);

    Ok(auditor.run(plan).await?)
}

async fn run_offboarding(
    auditor: &Auditor,
    config: &AuditToolConfig,
    vault: &Vault,
    start: &str,
    end: Option<&str>,
) -> Result<ReconciliationReport> {
    let window = DepartureWindow::parse_today(start, end)?;
    let names = select_providers(config, &[])?;
    let providers = build_providers(config, vault, &names)?;

    let offboarding = &config.offboarding;
    let client = build_client(config.http_timeout())?;
    let mut tracker = GitHubIssueTracker::new(
        client,
        &offboarding.repository,
        vault.secret_store()?,
        &offboarding.token_secret,
    )
    .context("Invalid [offboarding] section")?;
    if let Some(base_url) = &offboarding.base_url {
        tracker = tracker.with_base_url(base_url);
    }

    let extractor = DepartureExtractor::new(&config.domain, offboarding.label.clone())?;

    let roster = RosterInput::Departures {
        window,
        tracker: &tracker,
        extractor,
    };
    let plan = providers
        .into_iter()
        .fold(AuditPlan::new(roster), AuditPlan::with_provider);

    Ok(auditor.run(plan).await?)
}

/// Requested providers, or every enabled one when none are named
fn select_providers(config: &AuditToolConfig, requested: &[String]) -> Result<Vec<&'static str>> {
    let enabled = config.enabled_providers();

    if requested.is_empty() {
        if enabled.is_empty() {
            anyhow::bail!("No providers enabled under [providers]");
        }
        return Ok(enabled);
    }

    requested
        .iter()
        .map(|name| {
            let known = PROVIDER_NAMES
                .iter()
                .find(|candidate| **candidate == name.as_str())
                .with_context(|| {
                    format!("Unknown provider '{}' (expected one of {:?})", name, PROVIDER_NAMES)
                })?;
            if !enabled.contains(known) {
                anyhow::bail!("Provider '{}' is not enabled", name);
            }
            Ok(*known)
        })
        .collect()
}

fn build_providers(
    config: &AuditToolConfig,
    vault: &Vault,
    names: &[&str],
) -> Result<Vec<Arc<dyn AccountStatusProvider>>> {
    let client = build_client(config.http_timeout())?;
    let section = &config.providers;
    let mut providers: Vec<Arc<dyn AccountStatusProvider>> = Vec::new();

    for name in names {
        let provider: Arc<dyn AccountStatusProvider> = match *name {
            "directory" => {
                let api = &section.directory;
                Arc::new(
                    DirectoryProvider::new(
                        client.clone(),
                        vault.secret_store()?,
                        api.token_secret.as_deref().unwrap_or(DEFAULT_DIRECTORY_SECRET),
                    )
                    .with_base_url(api.base_url.as_deref().unwrap_or(DEFAULT_DIRECTORY_URL)),
                )
            }
            "chat" => {
                let api = &section.chat;
                Arc::new(
                    ChatProvider::new(
                        client.clone(),
                        vault.secret_store()?,
                        api.token_secret.as_deref().unwrap_or(DEFAULT_CHAT_SECRET),
                    )
                    .with_base_url(api.base_url.as_deref().unwrap_or(DEFAULT_CHAT_URL)),
                )
            }
            "device" => {
                let api = &section.device;
                Arc::new(
                    DeviceProvider::new(
                        client.clone(),
                        vault.secret_store()?,
                        api.token_secret.as_deref().unwrap_or(DEFAULT_DEVICE_SECRET),
                    )
                    .with_base_url(api.base_url.as_deref().unwrap_or(DEFAULT_DEVICE_URL)),
                )
            }
            "password_manager" => Arc::new(PasswordManagerProvider::new(vault.store()?)),
            "infrastructure" => {
                let path = section
                    .infrastructure
                    .path
                    .clone()
                    .context("providers.infrastructure.path is not set")?;
                Arc::new(InfrastructureRepoProvider::new(path))
            }
            other => anyhow::bail!("Unknown provider '{}'", other),
        };
        providers.push(provider);
    }

    Ok(providers)
}

/// Lazily opened 1Password backend; only runs that need a secret require a session
struct Vault {
    program: String,
    session: Option<String>,
}

impl Vault {
    fn new(config: &AuditToolConfig, session: Option<&str>) -> Self {
        Self {
            program: config.vault.program.clone(),
            session: session.map(str::to_string),
        }
    }

    fn store(&self) -> Result<Arc<OnePasswordCli>> {
        let session = self
            .session
            .as_deref()
            .context("A 1Password session is required; pass --session or set OP_SESSION")?;
        let cli = OnePasswordCli::new(session)?.with_program(&self.program);
        Ok(Arc::new(cli))
    }

    fn secret_store(&self) -> Result<Arc<dyn SecretStore>> {
        Ok(self.store()?)
    }
}

fn emit(report: &ReconciliationReport, output: Option<&PathBuf>) -> Result<()> {
    let json = report.to_json().context("Failed to serialize report")?;

    match output {
        Some(path) => {
            std::fs::write(path, json + "\n")
                .with_context(|| format!("Failed to write report to {:?}", path))?;
            info!("Report written to {:?}", path);
        }
        None => println!("{}", json),
    }

    Ok(())
}

/// Cross-platform shutdown signal handling
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    // On non-Unix systems, only Ctrl+C is supported
    std::future::pending::<()>().await
}
