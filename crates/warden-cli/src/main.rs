use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use warden_core::WardenConfig;
use warden_engine::Registry;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "warden", version, about = "Cloud resource policy engine")]
struct Cli {
    /// Path to warden.yaml
    #[arg(long, global = true, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate every policy in a file without running it.
    Check {
        /// Policy file (YAML or JSON)
        file: PathBuf,
    },

    /// Run policies against a recorded fixture.
    Run {
        /// Policy file (YAML or JSON)
        file: PathBuf,

        /// Replay fixture serving enumeration results and responses
        #[arg(long)]
        replay: PathBuf,

        /// Stop after filtering; invoke no action
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Only run the named policy
        #[arg(long)]
        policy: Option<String>,

        /// Write the reports here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// List resource types, filter and action keys, or print one schema.
    Schema {
        /// Resource type key (e.g. huaweicloud.ims)
        resource: Option<String>,

        /// Print the schema of this filter
        #[arg(long, conflicts_with = "action", requires = "resource")]
        filter: Option<String>,

        /// Print the schema of this action
        #[arg(long, requires = "resource")]
        action: Option<String>,

        /// Emit JSON instead of text
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<WardenConfig> {
    match path {
        Some(path) => WardenConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(WardenConfig::default()),
    }
}

fn build_registry() -> Result<Registry> {
    let mut registry = Registry::new();
    warden_ims::register(&mut registry).context("Failed to register image resources")?;
    Ok(registry)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let registry = build_registry()?;

    match cli.cmd {
        Command::Check { file } => commands::check::run(&registry, &file)?,

        Command::Run {
            file,
            replay,
            dry_run,
            policy,
            output,
        } => {
            let options = commands::run::RunOptions {
                policy_file: file,
                replay,
                dry_run,
                policy,
                output,
            };
            commands::run::run(&registry, &config, options).await?
        }

        Command::Schema {
            resource,
            filter,
            action,
            json,
        } => commands::schema::run(
            &registry,
            resource.as_deref(),
            filter.as_deref(),
            action.as_deref(),
            json,
        )?,
    }

    Ok(())
}
