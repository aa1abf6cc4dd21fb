//! `tramita`: follow Câmara dos Deputados bill steps and the subreddit
//! posts that announce them.

mod collect;
mod config;
mod display;

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{Level, warn};

use tramita_core::{DateWindow, PostDraft, Update, select_for_publishing, select_for_removal};

use crate::collect::Source;
use crate::config::Config;

#[derive(Parser)]
#[command(name = "tramita", version, about = "Bill step tracker for the Brazilian Chamber of Deputies")]
struct Cli {
    /// Log verbosity.
    #[arg(long, short = 'l', value_enum, default_value_t = LogLevel::Info, global = true)]
    log: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List reconciled updates for a date window.
    List(Selection),
    /// Show what would be posted, or with --remove, taken down.
    Plan {
        #[command(flatten)]
        selection: Selection,
        /// Select published posts for removal instead.
        #[arg(long)]
        remove: bool,
    },
}

impl Command {
    fn selection(&self) -> &Selection {
        match self {
            Command::List(selection) | Command::Plan { selection, .. } => selection,
        }
    }
}

#[derive(Args)]
struct Selection {
    /// Date window: `YYYY-MM-DD` (through today) or `YYYY-MM-DD:YYYY-MM-DD`.
    /// Defaults to today.
    #[arg(long, short = 'd')]
    days: Option<String>,

    /// Sources to read. Both when omitted.
    #[arg(long = "source", short = 's', value_enum)]
    sources: Vec<Source>,

    /// Keep only flagged updates.
    #[arg(long, short = 'F')]
    only_flagged: bool,
}

impl Selection {
    fn sources(&self) -> Vec<Source> {
        if self.sources.is_empty() {
            vec![Source::Reddit, Source::Camara]
        } else {
            self.sources.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(Level::from(cli.log))
        .with_target(false)
        .init();
    tracing::info!("tramita v{}", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let selection = cli.command.selection();
    let sources = selection.sources();
    let config = Config::from_env(sources.contains(&Source::Reddit))?;
    let window = DateWindow::parse(selection.days.as_deref(), Local::now().date_naive())?;

    let deadline = config.deadline;
    let mut updates = tokio::select! {
        result = tokio::time::timeout(deadline, collect::collect(&config, &window, &sources)) => {
            result.with_context(|| format!("run did not finish within {}s", deadline.as_secs()))??
        }
        _ = tokio::signal::ctrl_c() => bail!("interrupted"),
    };

    if selection.only_flagged {
        updates.retain(|update| update.flagged);
    }

    match &cli.command {
        Command::List(_) => display::print_updates(&updates),
        Command::Plan { remove: false, .. } => plan_publishing(&updates),
        Command::Plan { remove: true, .. } => {
            display::print_removals(&select_for_removal(&updates))
        }
    }
    Ok(())
}

fn plan_publishing(updates: &[Update]) {
    let selected = select_for_publishing(updates);
    if selected.is_empty() {
        println!("Nothing to publish.");
        return;
    }
    for update in selected {
        match PostDraft::from_update(update) {
            Ok(draft) => display::print_draft(update, &draft),
            Err(err) => warn!(key = %update.key, error = %err, "cannot draft post"),
        }
    }
}
