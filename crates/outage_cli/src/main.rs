use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use outage_core::automation::{self, WaitTarget};
use outage_core::clock::ThreadSleeper;
use outage_core::config::{CreateOptions, PluginConfig};
use outage_core::domain::{format_timestamp, Outage};
use outage_core::error::{AppError, PLUGIN_CONFIGURATION};
use outage_core::integrations::FileStaticPage;
use outage_core::stage::get_stage;
use outage_core::validate::{ensure_valid, validate_all_outages};
use outage_core::{workspace, FinishOutcome, OutageRepository};

/// Output format for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ListFilter {
    All,
    Unended,
    Ended,
}

/// Schedule, finish and wait for maintenance outages.
#[derive(Parser)]
#[command(name = "outagectl", version, about = "Maintenance outage automation")]
struct Cli {
    /// Outage settings (TOML)
    #[arg(long, global = true, env = "OUTAGE_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database; overrides `database_path` from the config file
    #[arg(long, global = true, env = "OUTAGE_DB")]
    db: Option<PathBuf>,

    /// User id recorded on created or modified outages
    #[arg(long, global = true, default_value_t = 0)]
    actor: i64,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Schedule a new outage relative to now
    Create {
        /// Extra create option as KEY=VALUE (start, duration, warn, title, description,
        /// autostart, clone, only_id, block); flags below take precedence
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
        /// Seconds from now until the outage starts
        #[arg(long)]
        start: Option<i64>,
        /// Planned length in seconds (defaults to the configured duration)
        #[arg(long)]
        duration: Option<i64>,
        /// Warning lead time in seconds before the start
        #[arg(long)]
        warn: Option<i64>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Enter maintenance mode automatically at the start time
        #[arg(long)]
        autostart: Option<bool>,
        /// Copy unset fields from an existing outage
        #[arg(long)]
        clone: Option<i64>,
        /// Print only the new outage id
        #[arg(long)]
        only_id: bool,
        /// Wait for the new outage to start before exiting
        #[arg(long)]
        block: bool,
    },

    /// Mark an ongoing outage as finished now
    Finish {
        /// Outage to finish (defaults to the ongoing one)
        #[arg(long)]
        id: Option<i64>,
    },

    /// Block until an outage starts
    Wait {
        /// Outage to wait for (defaults to the active one)
        #[arg(long)]
        id: Option<i64>,
        /// Longest single sleep in seconds (defaults to the configured cap)
        #[arg(long)]
        sleep: Option<i64>,
    },

    /// Run the periodic maintenance task once
    Tick,

    /// List stored outages
    List {
        #[arg(long, default_value = "all", value_enum)]
        filter: ListFilter,
    },

    /// Delete an outage
    Delete {
        id: i64,
    },

    /// Report stored outages that break the scheduling rules
    Validate,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("outagectl: {e}");
        if let Some(details) = &e.details {
            eprintln!("  {details}");
        }
        process::exit(e.exit_code());
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), AppError> {
    let config = match &cli.config {
        Some(path) => PluginConfig::load(path)?,
        None => PluginConfig::default(),
    };
    let db_path = cli
        .db
        .clone()
        .or_else(|| config.database_path.clone())
        .ok_or_else(|| {
            AppError::new(PLUGIN_CONFIGURATION, "No outage database configured")
                .with_details("pass --db or set database_path in the config file")
        })?;
    let mut repo = open_repository(&db_path, &config, cli.actor)?;
    debug!(db = %db_path.display(), "opened outage database");

    let mut stdout = io::stdout().lock();
    match cli.command {
        Commands::Create {
            set,
            start,
            duration,
            warn,
            title,
            description,
            autostart,
            clone,
            only_id,
            block,
        } => {
            let base = CreateOptions::from_assignments(&set)?;
            let opts = CreateOptions {
                start: start.or(base.start),
                duration: duration.or(base.duration),
                warn: warn.or(base.warn),
                title: title.or(base.title),
                description: description.or(base.description),
                autostart: autostart.or(base.autostart),
                clone: clone.or(base.clone),
                only_id: only_id || base.only_id,
                block: block || base.block,
            };
            cmd_create(&mut repo, &config, &opts, &mut stdout)
        }
        Commands::Finish { id } => cmd_finish(&mut repo, id, &mut stdout),
        Commands::Wait { id, sleep } => {
            let target = id.map_or(WaitTarget::Active, WaitTarget::Id);
            let max_sleep = sleep.unwrap_or(config.wait_max_sleep);
            automation::wait_for_outage(&repo, target, max_sleep, &mut ThreadSleeper, &mut stdout)
                .map(|_| ())
        }
        Commands::Tick => {
            let report = automation::tick(&repo)?;
            info!(?report, "maintenance task finished");
            if cli.output == OutputFormat::Json {
                print_json(&mut stdout, &report)?;
            }
            Ok(())
        }
        Commands::List { filter } => cmd_list(&repo, filter, cli.output, &mut stdout),
        Commands::Delete { id } => {
            repo.delete(id)?;
            emit(&mut stdout, &format!("Outage #{id} deleted."))
        }
        Commands::Validate => {
            let report = validate_all_outages(&repo)?;
            if cli.output == OutputFormat::Json {
                return print_json(&mut stdout, &report);
            }
            for item in &report {
                for warning in &item.warnings {
                    emit(
                        &mut stdout,
                        &format!("#{} {}: {} {}", item.id, item.title, warning.code, warning.message),
                    )?;
                }
            }
            Ok(())
        }
    }
}

fn open_repository(
    db_path: &Path,
    config: &PluginConfig,
    actor: i64,
) -> Result<OutageRepository, AppError> {
    let conn = workspace::open_or_create(db_path)?;
    let repo = OutageRepository::new(conn).with_actor(actor);
    Ok(match &config.static_page_path {
        Some(path) => repo.with_static_page(FileStaticPage::new(path)),
        None => repo,
    })
}

fn cmd_create(
    repo: &mut OutageRepository,
    config: &PluginConfig,
    opts: &CreateOptions,
    out: &mut dyn Write,
) -> Result<(), AppError> {
    let source = match opts.clone {
        Some(id) => Some(repo.get_by_id(id)?.ok_or_else(|| {
            AppError::not_found("Outage to clone not found").with_details(format!("id={id}"))
        })?),
        None => None,
    };
    let outage = opts.build_outage(config, repo.now(), source.as_ref())?;
    ensure_valid(&outage)?;
    let id = repo.save(&outage)?;

    if opts.only_id {
        emit(out, &id.to_string())?;
    } else {
        emit(
            out,
            &format!(
                "Outage #{id} created: {} from {} to {}.",
                outage.title(),
                outage.starttime.map(format_timestamp).unwrap_or_default(),
                outage.stoptime.map(format_timestamp).unwrap_or_default(),
            ),
        )?;
    }

    if opts.block {
        automation::wait_for_outage(
            repo,
            WaitTarget::Id(id),
            config.wait_max_sleep,
            &mut ThreadSleeper,
            out,
        )?;
    }
    Ok(())
}

fn cmd_finish(
    repo: &mut OutageRepository,
    id: Option<i64>,
    out: &mut dyn Write,
) -> Result<(), AppError> {
    let now = repo.now();
    let id = match id {
        Some(id) => id,
        None => repo
            .get_ongoing(now)?
            .and_then(|o| o.id)
            .ok_or_else(|| AppError::not_found("No outage is ongoing"))?,
    };

    let line = match repo.finish(id, now)? {
        FinishOutcome::Finished => format!("Outage #{id} finished."),
        FinishOutcome::AlreadyEnded => format!("Outage #{id} has already ended."),
        FinishOutcome::NotOngoing => format!("Outage #{id} has not started."),
        FinishOutcome::NotFound => format!("Outage #{id} not found."),
    };
    emit(out, &line)
}

fn cmd_list(
    repo: &OutageRepository,
    filter: ListFilter,
    output: OutputFormat,
    out: &mut dyn Write,
) -> Result<(), AppError> {
    let now = repo.now();
    let outages = match filter {
        ListFilter::All => repo.get_all()?,
        ListFilter::Unended => repo.get_all_unended(now)?,
        ListFilter::Ended => repo.get_all_ended(now)?,
    };
    if output == OutputFormat::Json {
        return print_json(out, &outages);
    }
    for outage in &outages {
        emit(out, &list_line(outage, now)?)?;
    }
    Ok(())
}

fn list_line(outage: &Outage, now: i64) -> Result<String, AppError> {
    let stage = get_stage(outage, now)?;
    Ok(format!(
        "#{:<5} {:<8} {} -> {}  {}",
        outage.id.unwrap_or_default(),
        stage,
        outage.starttime.map(format_timestamp).unwrap_or_default(),
        outage.stoptime.map(format_timestamp).unwrap_or_default(),
        outage.title(),
    ))
}

fn print_json<T: serde::Serialize>(out: &mut dyn Write, value: &T) -> Result<(), AppError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| {
        AppError::new("SERIALIZE_FAILED", "Failed to serialize output").with_details(e.to_string())
    })?;
    emit(out, &text)
}

fn emit(out: &mut dyn Write, line: &str) -> Result<(), AppError> {
    writeln!(out, "{line}").map_err(|e| {
        AppError::new("IO_WRITE_FAILED", "Failed to write output").with_details(e.to_string())
    })
}
