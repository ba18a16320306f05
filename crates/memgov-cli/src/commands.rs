use std::str::FromStr;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use colored::Colorize;
use serde::Serialize;
use tracing::debug;

use memgov_audit::{AuditReport, Verdict};
use memgov_fsio::write_atomic;
use memgov_store::{MergeRequest, StatusStore, StoreConfig, StoreError};
use memgov_types::{ItemValue, MemoryItem, Status, StatusCounts};

use crate::cli::*;

pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_SEVERE: u8 = 2;
pub const EXIT_INVALID: u8 = 3;
pub const EXIT_LOCK_TIMEOUT: u8 = 4;

pub fn run_command(cli: Cli) -> anyhow::Result<u8> {
    let config = resolve_config(&cli)?;
    debug!(
        memory_root = %config.memory_root.display(),
        workspace_root = %config.workspace_root.display(),
        "configuration resolved"
    );
    let store = StatusStore::new(&config);
    let format = cli.format;
    let today = Local::now().date_naive();

    match cli.command {
        Command::Init => cmd_init(&store, format),
        Command::Status => cmd_status(&store, format),
        Command::List(args) => cmd_list(&store, args, format),
        Command::SetStatus(args) => cmd_set_status(&store, args, today, format),
        Command::Merge(args) => cmd_merge(&store, args, today, format),
        Command::Conflicts => cmd_conflicts(&store, format),
        Command::Audit(args) => cmd_audit(&store, args, today, format),
    }
}

/// Map a failure to the process exit code.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<StoreError>() {
        Some(StoreError::AuditRejected { .. }) => EXIT_SEVERE,
        Some(
            StoreError::NotFound(_)
            | StoreError::InvalidArgument(_)
            | StoreError::NotConflicting { .. },
        ) => EXIT_INVALID,
        Some(StoreError::LockTimeout { .. }) => EXIT_LOCK_TIMEOUT,
        _ => EXIT_FAILURE,
    }
}

fn resolve_config(cli: &Cli) -> anyhow::Result<StoreConfig> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::default(),
    };
    if let Some(root) = &cli.memory_root {
        config.memory_root = root.clone();
    }
    if let Some(root) = &cli.workspace_root {
        config.workspace_root = root.clone();
    }
    Ok(config)
}

fn parse_status(raw: &str) -> Result<Status, StoreError> {
    Ok(Status::from_str(raw)?)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_counts(counts: &StatusCounts) {
    println!(
        "  active: {}  pending: {}  deprecated: {}",
        counts.active.to_string().green(),
        counts.pending.to_string().yellow(),
        counts.deprecated.to_string().dimmed()
    );
}

fn colored_status(status: Status) -> colored::ColoredString {
    match status {
        Status::Active => status.as_str().green(),
        Status::Pending => status.as_str().yellow(),
        Status::Deprecated => status.as_str().dimmed(),
    }
}

fn cmd_init(store: &StatusStore, format: OutputFormat) -> anyhow::Result<u8> {
    let report = store.init()?;
    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            println!(
                "{} Initialized memory store in {}",
                "✓".green().bold(),
                report.paths.memory_root.display().to_string().bold()
            );
            println!("  Projection: {}", report.paths.runtime_projection.display());
            print_counts(&report.counts);
        }
    }
    Ok(EXIT_OK)
}

fn cmd_status(store: &StatusStore, format: OutputFormat) -> anyhow::Result<u8> {
    let counts = store.counts()?;
    match format {
        OutputFormat::Json => print_json(&counts)?,
        OutputFormat::Text => {
            println!("Memory store {}", store.paths().memory_root.display().to_string().bold());
            print_counts(&counts);
        }
    }
    Ok(EXIT_OK)
}

fn cmd_list(store: &StatusStore, args: ListArgs, format: OutputFormat) -> anyhow::Result<u8> {
    let filter = args.status.as_deref().map(parse_status).transpose()?;
    let items: Vec<MemoryItem> = store
        .flatten()?
        .into_iter()
        .filter(|item| filter.map_or(true, |s| item.status == s))
        .collect();

    match format {
        OutputFormat::Json => print_json(&items)?,
        OutputFormat::Text if items.is_empty() => println!("No memory items."),
        OutputFormat::Text => {
            for item in &items {
                println!(
                    "{} [{}] {}/{} = {}  ({}; {}..{})",
                    item.id.cyan(),
                    colored_status(item.status),
                    item.topic,
                    item.key.bold(),
                    item.value,
                    item.scope,
                    item.effective_from,
                    item.expires
                );
            }
        }
    }
    Ok(EXIT_OK)
}

fn cmd_set_status(
    store: &StatusStore,
    args: SetStatusArgs,
    today: NaiveDate,
    format: OutputFormat,
) -> anyhow::Result<u8> {
    let to = parse_status(&args.status)?;
    let change = store.change_status(&args.id, to, today)?;
    match format {
        OutputFormat::Json => print_json(&change)?,
        OutputFormat::Text if change.from == change.to => {
            println!("{} is already {}", args.id.cyan(), colored_status(change.to));
        }
        OutputFormat::Text => {
            println!(
                "{} {}: {} → {}",
                "✓".green().bold(),
                args.id.cyan(),
                colored_status(change.from),
                colored_status(change.to)
            );
            print_counts(&change.counts);
        }
    }
    Ok(EXIT_OK)
}

fn cmd_merge(
    store: &StatusStore,
    args: MergeArgs,
    today: NaiveDate,
    format: OutputFormat,
) -> anyhow::Result<u8> {
    let value = if args.text {
        ItemValue::Text(args.value)
    } else {
        ItemValue::parse_loose(&args.value)
    };
    let mut request = MergeRequest::new(args.left, args.right, value);
    if let Some(keep) = args.keep {
        request = request.keep(keep);
    }
    let outcome = store.merge_conflict(&request, today)?;
    match format {
        OutputFormat::Json => print_json(&outcome)?,
        OutputFormat::Text => {
            println!("{} Resolved conflict {}", "✓".green().bold(), outcome.pair_id.yellow());
            println!("  Kept:       {} = {}", outcome.merged_id.cyan(), request.merged_value);
            println!("  Deprecated: {}", outcome.deprecated_id.dimmed());
            print_counts(&outcome.counts);
        }
    }
    Ok(EXIT_OK)
}

fn cmd_conflicts(store: &StatusStore, format: OutputFormat) -> anyhow::Result<u8> {
    let pairs = store.list_conflicts()?;
    match format {
        OutputFormat::Json => print_json(&pairs)?,
        OutputFormat::Text if pairs.is_empty() => {
            println!("{} No unresolved conflicts.", "✓".green());
        }
        OutputFormat::Text => {
            for pair in &pairs {
                println!(
                    "{} {} vs {} on {}/{}",
                    "conflict".red().bold(),
                    pair.left.cyan(),
                    pair.right.cyan(),
                    pair.topic,
                    pair.key.bold()
                );
            }
        }
    }
    Ok(EXIT_OK)
}

fn cmd_audit(
    store: &StatusStore,
    args: AuditArgs,
    today: NaiveDate,
    format: OutputFormat,
) -> anyhow::Result<u8> {
    let report = store.audit(today)?;
    if let Some(path) = &args.report {
        let json = serde_json::to_vec_pretty(&report)?;
        write_atomic(path, &json)
            .with_context(|| format!("failed to write audit report to {}", path.display()))?;
    }
    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => print_audit(&report),
    }
    Ok(report.verdict.exit_code())
}

fn print_audit(report: &AuditReport) {
    let verdict = match report.verdict {
        Verdict::Clean => report.verdict.to_string().green().bold(),
        Verdict::StaleOnly => report.verdict.to_string().yellow().bold(),
        Verdict::Severe => report.verdict.to_string().red().bold(),
    };
    println!(
        "Audit: {} ({} items, {} issues)",
        verdict,
        report.item_count,
        report.issues.len()
    );
    for issue in &report.issues {
        let code = if issue.code.is_severe() {
            issue.code.as_str().red()
        } else {
            issue.code.as_str().yellow()
        };
        let subject = issue.id.as_deref().unwrap_or("-");
        match issue.record {
            Some(index) => println!("  [{code}] {subject} (record {index}): {}", issue.message),
            None => println!("  [{code}] {subject}: {}", issue.message),
        }
    }
}
