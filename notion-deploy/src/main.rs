//! notion-deploy: deploy a directory of YAML definitions into Notion
//!
//! Without `--deploy` nothing is sent: the run goes through the dry-run API,
//! which logs every request it would make.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use notion_client::{DryRunApi, NotionApi, NotionClient};
use notion_deploy::config::DEFAULT_CONFIG_FILE;
use notion_deploy::report::log_summary;
use notion_deploy::{load_document, load_state, DeployConfig, DeployError, DeployReport, Deployer};

/// Placeholder parent used by dry runs when no parent page is configured
const DRY_RUN_PARENT: &str = "dry-run-parent";

#[derive(Parser, Debug)]
#[command(name = "notion-deploy")]
#[command(about = "Deploy YAML-described pages and databases into a Notion workspace")]
struct Args {
    /// Directory holding the YAML files
    #[arg(short, long, visible_alias = "yaml-dir")]
    dir: Option<PathBuf>,

    /// Log the requests that would be made without sending any
    #[arg(long, conflicts_with = "deploy")]
    dry_run: bool,

    /// Actually create pages and databases
    #[arg(long)]
    deploy: bool,

    /// Page under which top-level pages and databases are created
    #[arg(long, env = "NOTION_PARENT_PAGEID")]
    parent_id: Option<String>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to config file (default: notion-deploy.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Checkpoint file
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Write a JSON report here
    #[arg(long)]
    report: Option<PathBuf>,

    /// Ignore an existing checkpoint
    #[arg(long)]
    fresh: bool,

    /// Search by title before creating pages and databases
    #[arg(long)]
    lookup: bool,

    /// Integration token
    #[arg(long, env = "NOTION_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// API version header
    #[arg(long, env = "NOTION_VERSION")]
    notion_version: Option<String>,

    /// API base URL
    #[arg(long, env = "NOTION_API_URL")]
    api_url: Option<String>,
}

fn load_config(args: &Args) -> Result<DeployConfig, DeployError> {
    let mut config = match &args.config {
        Some(path) => DeployConfig::load(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            DeployConfig::load(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => {
            info!("Config file not found, using defaults");
            DeployConfig::default()
        }
    };

    // Apply CLI / environment overrides
    if let Some(dir) = &args.dir {
        config.yaml_dir = dir.clone();
    }
    if let Some(parent_id) = &args.parent_id {
        config.parent_page_id = Some(parent_id.clone());
    }
    if let Some(state_file) = &args.state_file {
        config.state_file = state_file.clone();
    }
    if let Some(report) = &args.report {
        config.report_file = Some(report.clone());
    }
    if let Some(version) = &args.notion_version {
        config.api.notion_version = version.clone();
    }
    if let Some(url) = &args.api_url {
        config.api.base_url = url.clone();
    }
    if args.lookup {
        config.lookup_before_create = true;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Environment from .env first so clap's `env` attributes see it
    let dotenv = dotenvy::dotenv();

    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("notion_deploy={}", level).parse()?)
                .add_directive(format!("notion_client={}", level).parse()?),
        )
        .init();

    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded environment file");
    }

    let config = load_config(&args)?;
    let dry_run = args.dry_run || !args.deploy;

    info!(
        yaml_dir = %config.yaml_dir.display(),
        state_file = %config.state_file.display(),
        dry_run,
        "Starting notion-deploy"
    );

    let parent_id = match (&config.parent_page_id, dry_run) {
        (Some(id), _) => id.clone(),
        (None, true) => {
            warn!("No parent page configured, using a placeholder for the dry run");
            DRY_RUN_PARENT.to_string()
        }
        (None, false) => return Err(DeployError::MissingParent.into()),
    };

    let dry_api = dry_run.then(|| Arc::new(DryRunApi::new()));
    let api: Arc<dyn NotionApi> = match &dry_api {
        Some(dry) => dry.clone() as Arc<dyn NotionApi>,
        None => {
            let token = args.token.as_deref().ok_or(DeployError::MissingToken)?;
            Arc::new(NotionClient::new(config.client_config(token)).map_err(DeployError::from)?)
        }
    };

    let loaded = load_document(&config.yaml_dir, config.unresolved_variables)?;
    info!(
        pages = loaded.document.pages.len(),
        letters = loaded.document.letters.len(),
        databases = loaded.document.databases.len(),
        acceptance = loaded.document.acceptance.len(),
        skipped_files = loaded.skipped.len(),
        "YAML loaded"
    );

    let mut state = load_state(&config.state_file, args.fresh)?;

    // Dry-run IDs are fabricated and must never reach the checkpoint
    let mut deployer = Deployer::new(api, config.clone(), parent_id);
    if !dry_run {
        deployer = deployer.with_checkpoint(&config.state_file);
    }

    let issues = deployer.deploy(&loaded.document, &mut state).await?;
    log_summary(&state, dry_run);

    if let Some(dry) = &dry_api {
        info!(requests = dry.request_count(), "Dry run complete, nothing was sent");
    }

    if let Some(path) = &config.report_file {
        let mut warnings = loaded.warnings.clone();
        warnings.extend(issues.iter().map(ToString::to_string));
        DeployReport::new(&state, dry_run, &loaded.skipped, warnings).write(path)?;
    }

    Ok(())
}
