//! Binary entry point for the graphcheck CLI.
#![forbid(unsafe_code)]

#[path = "cli/config.rs"]
mod config;
#[path = "cli/ui.rs"]
mod ui;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand, ValueEnum};
use graphcheck::{
    admin::{check_snapshot, inspect, AdminCheckOptions, AdminError, InspectReport},
    check::{CheckConfig, CheckError, ConsistencySummary},
};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

use config::{skip_group, CliConfig};
use ui::{format_duration, Theme, Ui};

const EXIT_FATAL: i32 = 1;
const EXIT_INCONSISTENT: i32 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "graphcheck",
    version,
    about = "Consistency checker for graph store snapshots",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = Theme::Auto,
        help = "Color theme for text output"
    )]
    theme: Theme,

    #[arg(long, short, global = true, help = "Print plain output without progress")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct CheckCmd {
    #[arg(value_name = "SNAPSHOT")]
    snapshot: PathBuf,

    #[arg(long, env = "GRAPHCHECK_WORKERS", help = "Worker threads per phase")]
    workers: Option<usize>,

    #[arg(long, value_name = "IDS", help = "Ids handed to a worker at a time")]
    chunk_size: Option<u64>,

    #[arg(long, value_name = "BYTES", help = "Hard cap on cache memory")]
    max_memory: Option<u64>,

    #[arg(long, value_name = "N", help = "Violations kept in the report")]
    max_violations: Option<usize>,

    #[arg(long, help = "Skip node, relationship and group record checks")]
    skip_graph: bool,

    #[arg(long, help = "Skip label index checks")]
    skip_label_index: bool,

    #[arg(long, help = "Skip property chain checks")]
    skip_properties: bool,

    #[arg(long, help = "Skip schema and property index checks")]
    skip_indexes: bool,

    #[arg(long, help = "Skip aggregate count checks")]
    skip_counts: bool,

    #[arg(long, value_name = "NAME", help = "Named profile from the config file")]
    profile: Option<String>,

    #[arg(
        long,
        value_name = "PATH",
        env = "GRAPHCHECK_CONFIG",
        help = "CLI config file with check profiles"
    )]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Check a snapshot for inconsistencies")]
    Check(CheckCmd),

    #[command(about = "Print high ids, tokens and schema of a snapshot")]
    Inspect {
        #[arg(value_name = "SNAPSHOT")]
        snapshot: PathBuf,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() {
    install_tracing_subscriber();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(EXIT_FATAL);
        }
    }
}

fn install_tracing_subscriber() {
    let filter =
        EnvFilter::try_from_env("GRAPHCHECK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<i32, Box<dyn Error>> {
    let ui = Ui::new(cli.theme, cli.quiet);
    match cli.command {
        Command::Check(cmd) => run_check(&ui, cli.format, cmd),
        Command::Inspect { snapshot } => {
            let task = ui.task(format!("Reading {}", snapshot.display()));
            let report = inspect(&snapshot)?;
            task.finish();
            emit(cli.format, &report, || print_inspect_text(&ui, &report))?;
            Ok(0)
        }
    }
}

fn run_check(ui: &Ui, format: OutputFormat, cmd: CheckCmd) -> Result<i32, Box<dyn Error>> {
    let check = build_check_config(&cmd)?;
    let mut opts = AdminCheckOptions {
        check,
        ..AdminCheckOptions::default()
    };
    let progress = match format {
        OutputFormat::Text => ui.check_progress().map(Arc::new),
        OutputFormat::Json => None,
    };
    if let Some(progress) = &progress {
        opts.progress = progress.clone();
    }

    let started = Instant::now();
    let result = check_snapshot(&cmd.snapshot, &opts);
    if let Some(progress) = &progress {
        progress.finish();
    }
    let elapsed = started.elapsed();

    match result {
        Ok(summary) => {
            emit(format, &summary, || print_summary_text(ui, &cmd, &summary))?;
            if summary.is_consistent() {
                if format == OutputFormat::Text {
                    ui.success(&format!(
                        "No inconsistencies found in {}",
                        format_duration(elapsed)
                    ));
                }
                Ok(0)
            } else {
                if format == OutputFormat::Text {
                    ui.warn(&format!(
                        "{} inconsistencies found in {}",
                        summary.total_violations,
                        format_duration(elapsed)
                    ));
                }
                Ok(EXIT_INCONSISTENT)
            }
        }
        Err(AdminError::Check(CheckError::ScanAborted {
            phase,
            source,
            summary,
        })) => {
            emit(format, summary.as_ref(), || {
                print_summary_text(ui, &cmd, &summary)
            })?;
            ui.warn(&format!(
                "check aborted during {phase} with {} inconsistencies reported so far",
                summary.total_violations
            ));
            Err(Box::new(source))
        }
        Err(err) => Err(Box::new(err)),
    }
}

/// Defaults, then the selected profile, then explicit flags.
fn build_check_config(cmd: &CheckCmd) -> Result<CheckConfig, Box<dyn Error>> {
    let file = CliConfig::load(cmd.config.clone())?;
    let mut check = CheckConfig::default();
    if let Some(profile) = file.resolve(cmd.profile.as_deref())? {
        debug!(
            profile = %profile.name,
            path = ?file.path(),
            "cli.profile.applied"
        );
        profile.apply(&mut check);
    }
    if let Some(workers) = cmd.workers {
        check.workers = workers;
    }
    if let Some(chunk_size) = cmd.chunk_size {
        check.ids_per_chunk = chunk_size;
    }
    if let Some(max_memory) = cmd.max_memory {
        check.memory_ceiling = Some(max_memory);
    }
    if let Some(max_violations) = cmd.max_violations {
        check.max_retained_violations = Some(max_violations);
    }
    let skips = [
        (cmd.skip_graph, "graph"),
        (cmd.skip_label_index, "label-index"),
        (cmd.skip_properties, "properties"),
        (cmd.skip_indexes, "indexes"),
        (cmd.skip_counts, "counts"),
    ];
    for (skip, group) in skips {
        if skip {
            skip_group(&mut check.flags, group);
        }
    }
    Ok(check)
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: serde::Serialize,
    F: FnOnce(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_summary_text(ui: &Ui, cmd: &CheckCmd, summary: &ConsistencySummary) {
    ui.section(
        "Check",
        [
            ("snapshot", cmd.snapshot.display().to_string()),
            ("completed", summary.completed.to_string()),
            ("phases", summary.phases.join(", ")),
            ("windows", summary.windows.to_string()),
            ("window size", summary.window_size.to_string()),
            ("violations", summary.total_violations.to_string()),
        ],
    );
    ui.list(
        "Violations by kind",
        summary
            .violations_by_kind
            .iter()
            .map(|(kind, count)| format!("{}: {count}", kind.as_str())),
    );
    ui.list(
        "Violations",
        summary.violations.iter().map(ToString::to_string),
    );
    if summary.violations_truncated {
        ui.warn(&format!(
            "only {} of {} violations retained",
            summary.violations.len(),
            summary.total_violations
        ));
    }
    ui.list(
        "Nodes by label",
        summary
            .nodes_by_label
            .iter()
            .map(|(label, count)| format!("{label}: {count}")),
    );
    ui.list(
        "Relationships by type",
        summary
            .relationships_by_type
            .iter()
            .map(|(ty, count)| format!("{ty}: {count}")),
    );
    ui.list("Skipped indexes", summary.skipped_indexes.iter().cloned());
    ui.spacer();
}

fn print_inspect_text(ui: &Ui, report: &InspectReport) {
    ui.section(
        "Snapshot",
        [
            ("path", report.path.clone()),
            ("size", format!("{} bytes", report.size_bytes)),
            (
                "label index high node",
                report.label_index_high_node_id.to_string(),
            ),
            ("constraints", report.constraints.to_string()),
        ],
    );
    ui.section(
        "High ids",
        report
            .high_ids
            .iter()
            .map(|(ty, high)| (ty.as_str(), high)),
    );
    ui.section(
        "Tokens",
        [
            ("labels", report.tokens.labels),
            ("relationship types", report.tokens.relationship_types),
            ("property keys", report.tokens.property_keys),
        ],
    );
    ui.list(
        "Indexes",
        report.indexes.iter().map(|index| {
            format!(
                "#{} {} {}{} [{:?}]",
                index.id,
                index.name,
                index.schema,
                if index.unique { " unique" } else { "" },
                index.state
            )
        }),
    );
}
