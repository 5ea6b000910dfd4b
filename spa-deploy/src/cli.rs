//! # spa-deploy CLI interface
//!
//! Command parsing and orchestration only. Planning, injection, execution and invalidation
//! live in `spa-deploy-core`; this module resolves options from flags, environment and the
//! YAML file, wires in the AWS backends, prints the plan and asks for confirmation.
//!
//! ## Subcommands
//! - `deploy`: sync each target's build directory to its bucket and invalidate changed
//!   entry points.
//! - `invalidate`: invalidate the configured CloudFront paths (or everything) on its own.
//! - `inject`: write runtime config files (JSON, YAML, dotenv, HTML) from the `inject:`
//!   entries.
//!
//! Programmatic callers and integration tests use [`run`] with a constructed [`Cli`].

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use dialoguer::Confirm;
use spa_deploy_core::config::DeployConfig;
use spa_deploy_core::deploy::{apply_deploy, prepare_deploy};
use spa_deploy_core::invalidate::{execute_invalidations, standalone_paths};
use spa_deploy_core::plan::render_plan;
use tracing::{info, warn};

use crate::aws::{load_sdk_config, CloudFrontInvalidator, S3Store};
use crate::generate::{write_inject_item, Functions};
use crate::git::ensure_clean;
use crate::globals::{app_globals, app_version};
use crate::load_config::{load_config, CliConfig, DeployFlags, DEFAULT_CONFIG_FILE};

/// Release identifiers CI providers expose when `RELEASE` is not set.
const RELEASE_FALLBACK_ENV: &[&str] = &["CIRCLE_SHA1", "BITBUCKET_COMMIT", "GITHUB_SHA"];
const VERSION_FALLBACK_ENV: &[&str] = &["CIRCLE_TAG", "BITBUCKET_TAG"];

/// CLI for spa-deploy: ship a static single-page app to S3 and CloudFront.
#[derive(Parser, Debug)]
#[clap(
    name = "spa-deploy",
    version,
    about = "Deploy a static single-page app build to S3 and invalidate CloudFront"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sync the build directory to the bucket, then invalidate changed entry points
    Deploy(DeployArgs),
    /// Invalidate the configured CloudFront paths without deploying
    Invalidate(InvalidateArgs),
    /// Write runtime config files from the `inject` entries of the config file
    Inject(InjectArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DeployArgs {
    /// Path to the YAML config file, relative to --pwd unless absolute
    #[clap(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Project directory holding the build output
    #[clap(long, env = "PWD", default_value = ".")]
    pub pwd: PathBuf,

    /// Stage being deployed, exposed to the app as APP_STAGE
    #[clap(long, env = "STAGE")]
    pub stage: String,

    /// Release identifier (usually the git sha), exposed as APP_RELEASE
    #[clap(long, env = "RELEASE")]
    pub release: Option<String>,

    /// App version, exposed as APP_VERSION
    #[clap(long, env = "APP_VERSION")]
    pub app_version: Option<String>,

    /// Remove remote files that are not part of the build
    #[clap(long)]
    pub purge: bool,

    /// Upload every file even if unchanged
    #[clap(long)]
    pub force: bool,

    /// Also list unchanged files in the plan
    #[clap(long, env = "VERBOSE", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub verbose: bool,

    /// Non-interactive: do not ask for confirmation
    #[clap(long, env = "CI", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub ci: bool,

    /// Deploy even when the git working tree has uncommitted changes
    #[clap(long, env = "IGNORE_GIT_CHANGES", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub ignore_git_changes: bool,

    /// Maximum concurrent uploads/deletes within one plan tier
    #[clap(long, default_value_t = 1)]
    pub concurrency: usize,

    /// Only deploy the `deploy` entry with this name
    #[clap(long)]
    pub target: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct InvalidateArgs {
    /// Path to the YAML config file, relative to --pwd unless absolute
    #[clap(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Project directory
    #[clap(long, env = "PWD", default_value = ".")]
    pub pwd: PathBuf,

    /// Non-interactive: do not ask for confirmation
    #[clap(long, env = "CI", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub ci: bool,

    /// Only invalidate for the `deploy` entry with this name
    #[clap(long)]
    pub target: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct InjectArgs {
    /// Only write the `inject` entry with this name
    pub target: Option<String>,

    /// Path to the YAML config file, relative to --pwd unless absolute
    #[clap(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Project directory; destinations are relative to it
    #[clap(long, env = "PWD", default_value = ".")]
    pub pwd: PathBuf,

    /// Value of ${func:stage}
    #[clap(long, env = "STAGE")]
    pub stage: Option<String>,

    /// Value of ${func:release}
    #[clap(long, env = "RELEASE")]
    pub release: Option<String>,

    /// App version used for ${func:version}
    #[clap(long, env = "APP_VERSION")]
    pub app_version: Option<String>,
}

/// Async CLI entrypoint for main() and integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Deploy(args) => {
            info!(command = "deploy", stage = %args.stage, "Starting deploy");
            deploy(args).await
        }
        Commands::Invalidate(args) => {
            info!(command = "invalidate", "Starting standalone invalidation");
            invalidate(args).await
        }
        Commands::Inject(args) => {
            info!(command = "inject", "Writing runtime config files");
            inject(args)
        }
    }
}

async fn deploy(args: DeployArgs) -> Result<()> {
    if !args.ci {
        info!("Running interactively");
    }
    ensure_clean(&args.pwd, args.ignore_git_changes)?;

    let file = load_config(resolve(&args.pwd, &args.config))?;

    let release = args
        .release
        .clone()
        .or_else(|| env_fallback(RELEASE_FALLBACK_ENV))
        .ok_or_else(|| anyhow!("release is not set (use --release or RELEASE)"))?;
    let version = args
        .app_version
        .clone()
        .or_else(|| env_fallback(VERSION_FALLBACK_ENV));
    let globals = app_globals(
        file.string_globals(),
        &args.stage,
        &release,
        version.as_deref(),
    );

    let flags = DeployFlags {
        purge: args.purge,
        force: args.force,
        concurrency: args.concurrency,
    };
    let configs: Vec<DeployConfig> = file
        .targets(args.target.as_deref())?
        .iter()
        .map(|target| target.deploy_config(&args.pwd, globals.clone(), flags))
        .collect();
    for config in &configs {
        config.validate()?;
    }

    for config in &configs {
        if !deploy_target(config, &args).await? {
            println!("Canceled");
            return Ok(());
        }
    }
    println!("Done!");
    Ok(())
}

/// Plan, confirm and apply one target. Returns false when the user cancels.
async fn deploy_target(config: &DeployConfig, args: &DeployArgs) -> Result<bool> {
    let label = config.name.as_deref().unwrap_or("default");
    println!("Deploying {label}...");
    config.trace_loaded();

    let sdk_config = load_sdk_config(&config.region).await;
    let store = S3Store::new(&sdk_config, config.endpoint.as_deref());

    let deploy_plan = prepare_deploy(config, &store)
        .await
        .with_context(|| format!("Failed to prepare the S3 sync plan for {label}"))?;

    println!("S3 Sync Plan");
    let rendered = render_plan(&deploy_plan.plan, args.verbose);
    if !rendered.is_empty() {
        println!("{rendered}");
    }

    if !deploy_plan.invalidations.is_empty() {
        println!("CloudFront invalidations");
        for path in &deploy_plan.invalidations {
            println!("{path}");
        }
        if config.distribution_ids.is_empty() {
            warn!(deploy_target = label, "No CloudFront distribution set, will not invalidate cache");
        }
    }

    if !deploy_plan.has_changes() {
        println!("Nothing to do!");
        return Ok(true);
    }

    if !args.ci && !confirm("Press enter to deploy...")? {
        return Ok(false);
    }

    let cdn = CloudFrontInvalidator::new(&sdk_config, config.cloudfront_endpoint.as_deref());
    let report = apply_deploy(&deploy_plan, config, &store, &cdn).await?;

    info!(
        deploy_target = label,
        uploaded = report.execution.uploaded,
        deleted = report.execution.deleted,
        invalidations = report.invalidations.len(),
        "Deploy complete"
    );
    Ok(true)
}

async fn invalidate(args: InvalidateArgs) -> Result<()> {
    let file: CliConfig = load_config(resolve(&args.pwd, &args.config))?;

    for target in file.targets(args.target.as_deref())? {
        let region = target.region()?;
        info!(deploy_target = target.label(), region, "Using AWS region");

        let paths = standalone_paths(&target.invalidate_paths());
        println!("CloudFront invalidations");
        for path in &paths {
            println!("{path}");
        }

        let distribution_ids = target.distribution_ids();
        if distribution_ids.is_empty() {
            warn!(deploy_target = target.label(), "No CloudFront distribution set, will not invalidate cache");
            continue;
        }

        if !args.ci && !confirm("Press enter to invalidate...")? {
            println!("Canceled");
            return Ok(());
        }

        let sdk_config = load_sdk_config(region).await;
        let endpoint = target.cloudfront_endpoint();
        let cdn = CloudFrontInvalidator::new(&sdk_config, endpoint.as_deref());
        let receipts = execute_invalidations(&cdn, &paths, &distribution_ids).await?;
        info!(deploy_target = target.label(), invalidations = receipts.len(), "Invalidation complete");
    }

    println!("Done!");
    Ok(())
}

fn inject(args: InjectArgs) -> Result<()> {
    let file = load_config(resolve(&args.pwd, &args.config))?;
    let items = file.inject_items(args.target.as_deref())?;
    if items.is_empty() {
        warn!("No inject entries in the config file");
        return Ok(());
    }

    let release = args
        .release
        .clone()
        .or_else(|| env_fallback(RELEASE_FALLBACK_ENV));
    let version = args
        .app_version
        .clone()
        .or_else(|| env_fallback(VERSION_FALLBACK_ENV));
    let functions = Functions {
        version: match (&args.stage, &release) {
            (Some(stage), Some(release)) => Some(app_version(stage, release, version.as_deref())),
            _ => version,
        },
        stage: args.stage.clone(),
        release,
        region: file.aws.region.clone(),
    };

    for item in &items {
        let written = write_inject_item(item, &args.pwd, &functions)?;
        println!("Writing {}", written.display());
    }
    Ok(())
}

fn resolve(pwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        pwd.join(path)
    }
}

fn env_fallback(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.is_empty())
}

fn confirm(prompt: &str) -> Result<bool> {
    let confirmed = Confirm::new()
        .with_prompt(prompt)
        .default(true)
        .interact()?;
    Ok(confirmed)
}
