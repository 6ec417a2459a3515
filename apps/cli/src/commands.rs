//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use spritevault_core::{
    ApprovalWorkflow, LogNotifier, SubmitRequest, credits_list, fetch, todo_list,
};
use spritevault_shared::{
    AppConfig, CatalogFilter, FolderTree, Submission, SubmissionState, Vote, database_path,
    folder_tree, init_config, load_config,
};
use spritevault_storage::Storage;
use spritevault_store::DriveClient;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// spritevault: community sprite submissions with review votes.
#[derive(Parser)]
#[command(
    name = "spritevault",
    version,
    about = "Submit sprites for review, settle votes, and list what is published.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Stage a new revision of a sprite and open its review vote.
    Submit {
        /// Category to submit into (item, block, ...).
        category: String,

        /// Local file with the new sprite.
        file: PathBuf,

        /// Sprite file name in the store (defaults to the local file name).
        #[arg(short, long)]
        name: Option<String>,

        /// Submitter identifier recorded in the credits.
        #[arg(long, env = "SPRITEVAULT_SUBMITTER_ID")]
        submitter_id: String,

        /// Submitter display name recorded in the credits.
        #[arg(long, env = "SPRITEVAULT_SUBMITTER_NAME")]
        submitter_name: String,

        /// Stay running until the vote ends and settle it.
        #[arg(long)]
        wait: bool,
    },

    /// Cast or change a vote on an open submission.
    Vote {
        /// Submission identifier.
        submission: String,

        /// Voter identifier; each voter counts once.
        voter: String,

        /// approve or reject.
        choice: String,
    },

    /// Settle every submission whose voting window has ended.
    Resume,

    /// Keep settling due submissions until interrupted.
    Watch,

    /// Show the state of a submission.
    Status {
        /// Submission identifier.
        submission: String,
    },

    /// Download a published sprite.
    Fetch {
        /// Category to look in.
        category: String,

        /// Sprite file name.
        name: String,

        /// Output path (defaults to the sprite name in the current directory).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// List published sprites not updated since the configured cutoff.
    Todo {
        /// Category to list.
        category: String,
    },

    /// List sprite credits.
    Credits {
        /// Only this category.
        #[arg(long)]
        category: Option<String>,

        /// Only this creator display name.
        #[arg(long)]
        creator: Option<String>,

        /// Only this creator identifier.
        #[arg(long)]
        creator_id: Option<String>,

        /// Only this sprite file name.
        #[arg(long)]
        sprite: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "spritevault=info",
        1 => "spritevault=debug",
        _ => "spritevault=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Submit {
            category,
            file,
            name,
            submitter_id,
            submitter_name,
            wait,
        } => {
            cmd_submit(
                &category,
                &file,
                name.as_deref(),
                submitter_id,
                submitter_name,
                wait,
            )
            .await
        }
        Command::Vote {
            submission,
            voter,
            choice,
        } => cmd_vote(&submission, &voter, &choice).await,
        Command::Resume => cmd_resume().await,
        Command::Watch => cmd_watch().await,
        Command::Status { submission } => cmd_status(&submission).await,
        Command::Fetch {
            category,
            name,
            out,
        } => cmd_fetch(&category, &name, out).await,
        Command::Todo { category } => cmd_todo(&category).await,
        Command::Credits {
            category,
            creator,
            creator_id,
            sprite,
        } => cmd_credits(category, creator, creator_id, sprite).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Shared setup
// ---------------------------------------------------------------------------

/// Everything a store-backed command needs.
struct Context {
    config: AppConfig,
    folders: FolderTree,
    tree: DriveClient,
    storage: Storage,
}

impl Context {
    async fn load() -> Result<Self> {
        let config = load_config()?;
        let folders = folder_tree(&config)?;
        let tree = DriveClient::from_config(&config)?;
        let storage = open_storage(&config).await?;
        Ok(Self {
            config,
            folders,
            tree,
            storage,
        })
    }

    fn workflow(&self) -> Result<ApprovalWorkflow<'_, DriveClient, Storage, Storage, LogNotifier>> {
        let secs = self.config.workflow.voting_window_secs;
        let window = i64::try_from(secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| eyre!("workflow.voting_window_secs {secs} is out of range"))?;
        Ok(ApprovalWorkflow::new(
            &self.tree,
            &self.folders,
            &self.storage,
            &self.storage,
            &self.storage,
            &LogNotifier,
            window,
        ))
    }
}

async fn open_storage(config: &AppConfig) -> Result<Storage> {
    let path = database_path(config)?;
    Ok(Storage::open(&path).await?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_submit(
    category: &str,
    file: &Path,
    name: Option<&str>,
    submitter_id: String,
    submitter_name: String,
    wait: bool,
) -> Result<()> {
    let ctx = Context::load().await?;
    let category = ctx.folders.category(category)?;

    let sprite_name = match name {
        Some(n) => n.to_string(),
        None => file
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| eyre!("cannot derive a sprite name from '{}'", file.display()))?,
    };
    let bytes = tokio::fs::read(file)
        .await
        .wrap_err_with(|| format!("reading {}", file.display()))?;

    info!(%category, sprite = %sprite_name, size = bytes.len(), "submitting");

    let workflow = ctx.workflow()?;
    let spinner = new_spinner()?;
    spinner.set_message(format!("Staging {sprite_name}"));
    let submission = workflow
        .submit(SubmitRequest {
            category,
            sprite_name,
            bytes,
            submitter_id,
            submitter_name,
        })
        .await;
    spinner.finish_and_clear();
    let submission = submission?;
    print_submission(&submission);

    if wait && submission.state == SubmissionState::PollOpen {
        let spinner = new_spinner()?;
        if let Some(closes_at) = submission.poll_closes_at {
            spinner.set_message(format!("Vote open until {closes_at}"));
        }
        let settled = workflow.wait_and_close(&submission.id).await;
        spinner.finish_and_clear();
        print_submission(&settled?);
    }

    Ok(())
}

async fn cmd_vote(submission: &str, voter: &str, choice: &str) -> Result<()> {
    let vote: Vote = choice.parse()?;
    let ctx = Context::load().await?;
    ctx.workflow()?.vote(submission, voter, vote).await?;
    println!("Recorded {} from {voter} on {submission}", vote.as_str());
    Ok(())
}

async fn cmd_resume() -> Result<()> {
    let ctx = Context::load().await?;
    let settled = ctx.workflow()?.resume_due(Utc::now()).await?;
    if settled.is_empty() {
        println!("No votes are due.");
    }
    for submission in &settled {
        print_submission(submission);
    }
    Ok(())
}

async fn cmd_watch() -> Result<()> {
    let ctx = Context::load().await?;
    let workflow = ctx.workflow()?;
    let interval = std::time::Duration::from_secs(ctx.config.workflow.poll_interval_secs.max(1));

    info!(interval_secs = interval.as_secs(), "watching for due votes");
    loop {
        match workflow.resume_due(Utc::now()).await {
            Ok(settled) => settled.iter().for_each(print_submission),
            Err(e) => warn!(error = %e, "sweep failed"),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping watch");
                return Ok(());
            }
        }
    }
}

async fn cmd_status(submission: &str) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;
    let found = storage
        .get_submission(submission)
        .await?
        .ok_or_else(|| eyre!("no submission '{submission}'"))?;
    print_submission(&found);
    Ok(())
}

async fn cmd_fetch(category: &str, name: &str, out: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let folders = folder_tree(&config)?;
    let tree = DriveClient::from_config(&config)?;
    let category = folders.category(category)?;

    let Some(sprite) = fetch(&tree, &folders, &category, name).await? else {
        println!("{name} was not found in {category}.");
        return Ok(());
    };

    let out = out.unwrap_or_else(|| PathBuf::from(name));
    tokio::fs::write(&out, &sprite.bytes)
        .await
        .wrap_err_with(|| format!("writing {}", out.display()))?;
    println!(
        "Saved {name} ({} bytes, from '{}') to {}",
        sprite.bytes.len(),
        sprite.found.folder_path,
        out.display()
    );
    Ok(())
}

async fn cmd_todo(category: &str) -> Result<()> {
    let config = load_config()?;
    let folders = folder_tree(&config)?;
    let tree = DriveClient::from_config(&config)?;
    let category = folders.category(category)?;
    let cutoff = config.listings.todo_cutoff()?;

    let chunks = todo_list(&tree, &folders, &category, cutoff, config.listings.chunk_len).await?;
    if chunks.is_empty() {
        println!("Nothing left to do in '{category}'.");
        return Ok(());
    }
    println!("Sprites in '{category}' not updated since {cutoff}:");
    print_chunks(&chunks);
    Ok(())
}

async fn cmd_credits(
    category: Option<String>,
    creator: Option<String>,
    creator_id: Option<String>,
    sprite: Option<String>,
) -> Result<()> {
    let config = load_config()?;
    let category = match category {
        Some(name) => Some(folder_tree(&config)?.category(&name)?),
        None => None,
    };
    let storage = open_storage(&config).await?;

    let filter = CatalogFilter {
        sprite_name: sprite,
        creator_name: creator,
        creator_id,
        category,
    };
    let chunks = credits_list(&storage, &filter, config.listings.chunk_len).await?;
    if chunks.is_empty() {
        println!("No credits found, check the spelling of the filters.");
        return Ok(());
    }
    print_chunks(&chunks);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn new_spinner() -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    Ok(spinner)
}

fn print_submission(submission: &Submission) {
    println!();
    println!("  Submission: {}", submission.id);
    println!("  Sprite:     {} ({})", submission.sprite_name, submission.category);
    println!("  Submitter:  {}", submission.submitter_name);
    println!("  State:      {}", submission.state);
    if let Some(closes_at) = submission.poll_closes_at {
        println!("  Vote ends:  {closes_at}");
    }
    if let Some(detail) = &submission.detail {
        println!("  Detail:     {detail}");
    }
    println!();
}

/// Print each chunk as its own block, the way a message front-end would send them.
fn print_chunks(chunks: &[String]) {
    for chunk in chunks {
        println!("{chunk}");
        println!();
    }
}
