// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mercury command line interface.
//!
//! Usage:
//!
//! ```text
//! mcli [-c CONFIG] [-m URL] [-v...] <command>
//! ```
//!
//! Examples:
//!
//! ```text
//! mcli inventory query -q '{"rack": "r12"}' -p mercury_id,os
//! mcli rpc submit -t a1b2c3 -m run -a uptime --wait
//! mcli shell -q @rack12.yml
//! mcli press -t a1b2c3 -c router.conf --assets-file site.yml --wait
//! ```
//!
//! Exit codes: 0 success, 1 user or configuration error, 2 asset backend
//! failure, 3 no matching targets, 4 transport or server error.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use mercury_sdk::{
    AssetBackend, AssetBundle, AuthToken, CancellationToken, ConfigurationSource,
    DEFAULT_TOKEN_TTL_HOURS, FileConfig, Job, JobEngine, JoinOptions, JoinOutcome, MercuryClient,
    PressRequest, Query, SdkConfig, SdkError, Shell, ShellOptions, StdinLines, TargetDescriptor,
    TokenCache, login,
};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mcli")]
#[command(version)]
#[command(about = "The Mercury Command Line Interface")]
struct Cli {
    /// SDK configuration file [default: <program-directory>/mcli.yml]
    #[arg(short = 'c', long)]
    config_file: Option<PathBuf>,

    /// Alternative location for program data [default: ~/.mercury-sdk]
    #[arg(long)]
    program_directory: Option<PathBuf>,

    /// Alternative location of the token cache [default: <program-directory>/.token.yml]
    #[arg(long)]
    token_cache: Option<PathBuf>,

    /// The Mercury service URL
    #[arg(short = 'm', long, env = "MERCURY_API_URL")]
    mercury_url: Option<String>,

    /// Verbosity level: -v info, -vv debug, -vvv trace
    #[arg(short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Login to the authentication service and cache the token
    Login {
        /// Do not store the token
        #[arg(long)]
        no_store: bool,

        /// Do not print the token
        #[arg(short, long)]
        quiet: bool,
    },

    /// Remove the cached token
    Logout,

    /// Bypass the auth handler and set a token directly
    SetToken {
        /// The token to set
        token: String,

        /// Number of hours to consider the token valid
        #[arg(long, default_value_t = DEFAULT_TOKEN_TTL_HOURS)]
        expire_at: i64,
    },

    /// Inventory query operations
    Inventory {
        #[command(subcommand)]
        command: InventoryCommands,
    },

    /// RPC job operations
    Rpc {
        #[command(subcommand)]
        command: RpcCommands,
    },

    /// Run commands on devices interactively
    Shell(ShellArgs),

    /// Push a rendered configuration to devices
    Press(PressArgs),
}

#[derive(Subcommand, Debug)]
enum InventoryCommands {
    /// Get a device record by mercury_id
    Get {
        mercury_id: String,

        /// Comma separated fields to return
        #[arg(short, long)]
        projection: Option<String>,
    },

    /// Query device records
    Query {
        /// Query as JSON or YAML; `-` reads stdin, `@file` reads a file
        #[arg(short, long, default_value = "{}")]
        query: String,

        /// Comma separated fields to return
        #[arg(short, long)]
        projection: Option<String>,

        /// Maximum number of records [default: MERCURY_MAX_ITEMS or 100]
        #[arg(short = 'n', long)]
        max_items: Option<u32>,

        /// Only search for active devices
        #[arg(short, long)]
        active: bool,
    },
}

#[derive(Subcommand, Debug)]
enum RpcCommands {
    /// Submit a job
    Submit {
        #[command(flatten)]
        target: TargetArgs,

        /// The RPC method to run
        #[arg(short, long)]
        method: String,

        /// Positional arguments
        #[arg(short, long, num_args = 1..)]
        args: Vec<String>,

        /// Keyword arguments as a JSON or YAML mapping
        #[arg(short, long)]
        kwargs: Option<String>,

        /// Wait for completion and print the tasks
        #[arg(long)]
        wait: bool,

        #[command(flatten)]
        wait_args: WaitArgs,
    },

    /// Show the status of a job
    Status { job_id: String },

    /// Show the tasks of a job
    Tasks { job_id: String },

    /// Wait for a job to complete and print its tasks
    Wait {
        job_id: String,

        #[command(flatten)]
        wait_args: WaitArgs,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct TargetArgs {
    /// Target query as JSON or YAML; `-` reads stdin, `@file` reads a file
    #[arg(short, long)]
    query: Option<String>,

    /// The mercury_id of a single target
    #[arg(short, long)]
    target: Option<String>,
}

impl TargetArgs {
    fn descriptor(&self) -> Result<TargetDescriptor, SdkError> {
        match (&self.target, &self.query) {
            (Some(target), _) => Ok(TargetDescriptor::device(target)),
            (None, Some(query)) => Ok(TargetDescriptor::Query(read_query(query)?)),
            (None, None) => Err(SdkError::Validation(
                "must provide a query or target".to_string(),
            )),
        }
    }
}

#[derive(Args, Debug)]
struct WaitArgs {
    /// Stop waiting after this many seconds; the job keeps running
    #[arg(long)]
    timeout: Option<f64>,

    /// Seconds between status polls [default: MERCURY_POLL_INTERVAL_MS or 2]
    #[arg(long)]
    poll_interval: Option<f64>,
}

impl WaitArgs {
    fn options(&self) -> Result<JoinOptions, SdkError> {
        let mut options = JoinOptions::default().with_cancel(ctrl_c_token());
        if let Some(interval) = self.poll_interval {
            options = options.with_poll_interval(seconds(interval, "--poll-interval")?);
        }
        if let Some(timeout) = self.timeout {
            options = options.with_timeout(seconds(timeout, "--timeout")?);
        }
        Ok(options)
    }
}

#[derive(Args, Debug)]
struct ShellArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Run this command, print the result and exit
    #[arg(short, long)]
    run: Option<String>,

    /// Suppress command output
    #[arg(long)]
    quiet: bool,

    /// Only print the raw command output
    #[arg(long)]
    raw: bool,
}

#[derive(Args, Debug)]
struct PressArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Configuration template file, `-` reads stdin
    #[arg(short = 'c', long)]
    configuration: String,

    /// YAML or JSON asset file
    #[arg(long)]
    assets_file: Option<PathBuf>,

    /// Asset backend executable, called with a scratch directory
    #[arg(long)]
    asset_backend: Option<PathBuf>,

    /// Argument passed to the asset backend before the scratch directory
    #[arg(long = "asset-backend-arg", allow_hyphen_values = true)]
    asset_backend_args: Vec<String>,

    /// Explicit asset, single target only
    #[arg(long = "asset", value_name = "KEY=VALUE")]
    assets: Vec<String>,

    /// Print the composed configuration instead of submitting it
    #[arg(long)]
    dry_run: bool,

    /// Wait for completion and print the tasks
    #[arg(long)]
    wait: bool,

    /// Stop waiting after this many seconds
    #[arg(long)]
    timeout: Option<f64>,
}

impl PressArgs {
    fn request(&self) -> Result<PressRequest, SdkError> {
        let mut request = PressRequest::new(
            self.target.descriptor()?,
            ConfigurationSource::from_arg(&self.configuration),
        );
        if let Some(path) = &self.assets_file {
            request = request.with_assets_file(path);
        }
        if let Some(program) = &self.asset_backend {
            request = request
                .with_backend(AssetBackend::new(program).with_args(self.asset_backend_args.clone()));
        }
        let overrides = self
            .assets
            .iter()
            .map(|assignment| AssetBundle::parse_assignment(assignment))
            .collect::<Result<AssetBundle, SdkError>>()?;
        Ok(request.with_overrides(overrides))
    }
}

struct Paths {
    program_directory: PathBuf,
    config_file: PathBuf,
    token_cache: PathBuf,
}

impl Paths {
    fn resolve(cli: &Cli) -> Result<Self, SdkError> {
        let program_directory = match &cli.program_directory {
            Some(dir) => dir.clone(),
            None => dirs::home_dir()
                .ok_or_else(|| SdkError::Config("could not determine home directory".to_string()))?
                .join(".mercury-sdk"),
        };

        Ok(Self {
            config_file: cli
                .config_file
                .clone()
                .unwrap_or_else(|| program_directory.join("mcli.yml")),
            token_cache: cli
                .token_cache
                .clone()
                .unwrap_or_else(|| program_directory.join(".token.yml")),
            program_directory,
        })
    }
}

fn ensure_program_directory(path: &Path) -> Result<(), SdkError> {
    if path.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    }
    debug!(path = %path.display(), "Created program directory");
    Ok(())
}

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Read `-` (stdin), `@path` (file) or literal text.
fn read_text_arg(arg: &str) -> anyhow::Result<String> {
    if arg == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("could not read from stdin")?;
        Ok(text)
    } else if let Some(path) = arg.strip_prefix('@') {
        std::fs::read_to_string(path).with_context(|| format!("could not read {}", path))
    } else {
        Ok(arg.to_string())
    }
}

fn read_query(arg: &str) -> Result<Query, SdkError> {
    let text = read_text_arg(arg).map_err(|e| SdkError::Validation(format!("{:#}", e)))?;
    Query::parse(&text)
}

fn parse_kwargs(arg: &str) -> Result<Map<String, Value>, SdkError> {
    let text = read_text_arg(arg).map_err(|e| SdkError::Validation(format!("{:#}", e)))?;
    let kwargs = Query::parse(&text)
        .map_err(|_| SdkError::Validation("kwargs must be a JSON or YAML mapping".to_string()))?;
    Ok(kwargs.as_map().clone())
}

fn split_projection(projection: &Option<String>) -> Vec<&str> {
    projection
        .as_deref()
        .map(|fields| fields.split(',').collect())
        .unwrap_or_default()
}

fn seconds(value: f64, flag: &str) -> Result<Duration, SdkError> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| SdkError::Validation(format!("{} must be a non-negative number", flag)))
}

/// A token cancelled on Ctrl-C.
fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
    token
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), SdkError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn connect(
    mercury_url: Option<&str>,
    file_config: &FileConfig,
    cache: &TokenCache,
) -> Result<MercuryClient, SdkError> {
    let url = mercury_url
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .or_else(|| file_config.mercury_api.url.clone())
        .ok_or_else(|| SdkError::Config("Mercury Service URL is undefined".to_string()))?;

    let token = cache.load()?;
    if token.is_none() {
        debug!("No cached token");
    }

    let config = SdkConfig::from_env()?.with_api_url(url);
    MercuryClient::new(config, token)
}

async fn print_outcome(jobs: &JobEngine, job_id: &str, outcome: JoinOutcome) -> Result<(), SdkError> {
    match outcome {
        JoinOutcome::Completed(_) => print_json(&jobs.tasks_of(job_id).await?),
        JoinOutcome::TimedOut(status) => {
            warn!(%job_id, "Timed out; the job keeps running");
            eprintln!("timed out waiting for job {}; it keeps running", job_id);
            print_json(&status)
        }
        JoinOutcome::Cancelled(status) => {
            eprintln!("stopped waiting for job {}", job_id);
            print_json(&status)
        }
    }
}

async fn wait_and_print(jobs: &JobEngine, job: &mut Job, options: JoinOptions) -> Result<(), SdkError> {
    eprintln!("waiting for job {}", job.job_id());
    let outcome = jobs.join(job, options).await?;
    print_outcome(jobs, job.job_id(), outcome).await
}

async fn inventory(client: &MercuryClient, command: InventoryCommands) -> Result<(), SdkError> {
    match command {
        InventoryCommands::Get {
            mercury_id,
            projection,
        } => {
            let record = client
                .inventory()
                .get(&mercury_id, &split_projection(&projection))
                .await?;
            print_json(&record)
        }
        InventoryCommands::Query {
            query,
            projection,
            max_items,
            active,
        } => {
            let mut query = read_query(&query)?;
            if active {
                query.insert("active", json!({"$ne": null}));
            }
            let inventory = client.inventory();
            let projection = split_projection(&projection);
            let page = match max_items {
                Some(limit) => inventory.query(&query, &projection, Some(limit)).await?,
                None => inventory.query_page(&query, &projection).await?,
            };
            print_json(&page)
        }
    }
}

async fn rpc(client: &MercuryClient, command: RpcCommands) -> Result<(), SdkError> {
    let jobs = client.jobs();
    match command {
        RpcCommands::Submit {
            target,
            method,
            args,
            kwargs,
            wait,
            wait_args,
        } => {
            let target = target.descriptor()?;
            let kwargs = match kwargs {
                Some(kwargs) => parse_kwargs(&kwargs)?,
                None => Map::new(),
            };
            let args = args.into_iter().map(Value::String).collect();

            let mut job = jobs.submit(target, method, args, kwargs).await?;
            if wait {
                wait_and_print(&jobs, &mut job, wait_args.options()?).await
            } else {
                print_json(&job.receipt())
            }
        }
        RpcCommands::Status { job_id } => print_json(&jobs.status_of(&job_id).await?),
        RpcCommands::Tasks { job_id } => print_json(&jobs.tasks_of(&job_id).await?),
        RpcCommands::Wait { job_id, wait_args } => {
            let outcome = jobs.wait_for(&job_id, wait_args.options()?).await?;
            print_outcome(&jobs, &job_id, outcome).await
        }
    }
}

async fn shell(client: &MercuryClient, args: ShellArgs) -> Result<(), SdkError> {
    let options = ShellOptions {
        quiet: args.quiet,
        raw: args.raw,
        ..ShellOptions::default()
    };
    let mut shell = Shell::new(
        client.jobs(),
        args.target.descriptor()?,
        std::io::stdout(),
        std::io::stderr(),
    )
    .with_options(options);

    match args.run {
        Some(command) => {
            shell.run_once(command.trim()).await?;
        }
        None => shell.run(&mut StdinLines::new()).await?,
    }
    Ok(())
}

async fn press(client: &MercuryClient, args: PressArgs) -> Result<(), SdkError> {
    let request = args.request()?;
    let press = client.press();

    if args.dry_run {
        print!("{}", press.compose(&request).await?);
        return Ok(());
    }

    let mut job = press.press(request).await?;
    if !args.wait {
        return print_json(&job.receipt());
    }

    let mut options = JoinOptions::default().with_cancel(ctrl_c_token());
    if let Some(timeout) = args.timeout {
        options = options.with_timeout(seconds(timeout, "--timeout")?);
    }
    wait_and_print(&client.jobs(), &mut job, options).await
}

async fn run(cli: Cli) -> Result<(), SdkError> {
    let paths = Paths::resolve(&cli)?;
    ensure_program_directory(&paths.program_directory)?;
    let file_config = FileConfig::load(&paths.config_file)?;
    let cache = TokenCache::new(paths.token_cache);
    let mercury_url = cli.mercury_url.as_deref();

    match cli.command {
        Commands::Login { no_store, quiet } => {
            let token = login(&cache, file_config.auth_handler.as_ref(), !no_store).await?;
            if !quiet {
                println!("Expires: {}, Token: {}", token.expires_at, token.token);
            }
            Ok(())
        }
        Commands::Logout => {
            cache.clear()?;
            info!(path = %cache.path().display(), "Token cache cleared");
            Ok(())
        }
        Commands::SetToken { token, expire_at } => {
            if expire_at <= 0 {
                return Err(SdkError::Validation(
                    "--expire-at must be a positive number of hours".to_string(),
                ));
            }
            cache.store(&AuthToken::valid_for(
                token,
                chrono::Duration::hours(expire_at),
            ))
        }
        Commands::Inventory { command } => {
            inventory(&connect(mercury_url, &file_config, &cache)?, command).await
        }
        Commands::Rpc { command } => rpc(&connect(mercury_url, &file_config, &cache)?, command).await,
        Commands::Shell(args) => shell(&connect(mercury_url, &file_config, &cache)?, args).await,
        Commands::Press(args) => press(&connect(mercury_url, &file_config, &cache)?, args).await,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Load .env before clap reads MERCURY_API_URL.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(envelope) = e.envelope() {
                if let Ok(body) = serde_json::to_string_pretty(envelope) {
                    println!("{}", body);
                }
            }
            eprintln!("error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
