//! macdeploy - automated provisioning for freshly imaged Macs.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use macdeploy_provisioner::{
    device, CommandRunner, Config, DeploymentLog, LocalRunner, LogBuffer, Metadata, Orchestrator,
    Prompter, RunOptions, StdinPrompter,
};
use macdeploy_redaction::Redactor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "macdeploy")]
#[command(author, version, about = "Automated deployment for MacBooks")]
struct Cli {
    /// Show info level output on the console
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Show debug level output on the console
    #[arg(long, global = true)]
    debug: bool,

    /// Deployment configuration
    #[arg(long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    /// Give created accounts admin rights
    #[arg(short, long)]
    admin: bool,

    /// Package to skip (repeatable)
    #[arg(long, value_name = "NAME")]
    exclude: Vec<String>,

    /// Package to add, as name[/marker]* (repeatable)
    #[arg(long, value_name = "NAME[/MARKER]")]
    include: Vec<String>,

    /// Account policy plist used instead of the configured policy
    #[arg(long)]
    plist: Option<PathBuf>,

    /// Remove the deployment files when done
    #[arg(long)]
    remove_files: bool,

    /// Do not upload the log (a FileVault key is still sent)
    #[arg(long)]
    no_send: bool,

    /// Stage packages from disk images in the bundle
    #[arg(long)]
    mount: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Only create the configured accounts
    User {
        /// Give created accounts admin rights
        #[arg(short, long)]
        admin: bool,

        /// Apply the configured password policy to created accounts
        #[arg(long)]
        apply_policy: bool,
    },
}

fn console_filter(cli: &Cli) -> EnvFilter {
    if cli.debug {
        EnvFilter::new("debug")
    } else if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::new("warn")
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging before anything can warn; the buffer gets its
    // file name once the serial tag is known.
    let buffer = LogBuffer::default();
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(console_filter(&cli)),
        )
        .with(buffer.layer())
        .init();

    let mut config = Config::from_file(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    let prompter: Arc<dyn Prompter> = Arc::new(StdinPrompter);
    config
        .admin
        .fill_missing(prompter.as_ref())
        .context("Administrator credentials are required")?;

    let redactor = Redactor::with_secrets(config.secrets());
    let runner: Arc<dyn CommandRunner> = Arc::new(LocalRunner::new(redactor));

    let serial_tag = device::read_serial_tag(runner.as_ref()).await;
    let metadata = Metadata::new(serial_tag.clone());
    let cwd = std::env::current_dir().context("Failed to resolve the working directory")?;
    let log = DeploymentLog::create(&serial_tag, &config.log, &metadata.home, &cwd, buffer);

    info!("Log file: {}", log.path().display());

    if let Err(e) = config.admin.initialize_sudo(runner.as_ref()).await {
        log.write_file().ok();
        bail!("Failed to open a sudo session for {}: {}", config.admin.username, e);
    }

    let (grant_admin, accounts_only) = match &cli.command {
        Some(Commands::User {
            admin,
            apply_policy,
        }) => (*admin || cli.admin, Some(*apply_policy)),
        None => (cli.admin, None),
    };

    let options = RunOptions {
        grant_admin,
        include: cli.include,
        exclude: cli.exclude,
        plist: cli.plist,
        remove_files: cli.remove_files,
        no_send: cli.no_send,
        mount: cli.mount,
    };

    let orchestrator = Orchestrator::new(runner, prompter, config, options, metadata, log)
        .with_working_dir(cwd);

    let result = match accounts_only {
        Some(apply_policy) => orchestrator.run_accounts_only(apply_policy).await,
        None => orchestrator.run().await,
    };

    let failures = result.failures();
    if !failures.is_empty() {
        println!("Steps that failed:");
        for failure in failures {
            println!("  - {}: {:?}", failure.name, failure.outcome);
        }
    }

    Ok(())
}
