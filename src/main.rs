use anyhow::{Context, Result};
use buildmon::build_info::format_elapsed;
use buildmon::cli::{Cli, Command, OutputFormat};
use buildmon::config::MonitorConfig;
use buildmon::csv_output::write_report;
use buildmon::machine_info::MachineInfo;
use buildmon::replay::{read_events, replay};
use buildmon::session::SessionSnapshot;
use buildmon::usage;
use clap::Parser;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn run_report(
    events: &Path,
    output_log: Option<&Path>,
    out: &Path,
    config: Option<&Path>,
    with_machine_info: bool,
) -> Result<()> {
    let config = match config {
        Some(path) => MonitorConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => MonitorConfig::default(),
    };

    let events = read_events(events)
        .with_context(|| format!("Failed to read event log {}", events.display()))?;

    let build_output = output_log
        .map(|path| {
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read build output {}", path.display()))
        })
        .transpose()?;

    let outcome = replay(&events, true);
    if outcome.rejected > 0 {
        eprintln!(
            "warning: {} event(s) did not match the session state and were ignored",
            outcome.rejected
        );
    }
    if !outcome.critical_path_found {
        anyhow::bail!("No critical path could be resolved from the event log");
    }

    let machine = with_machine_info.then(|| MachineInfo::current().describe(" | "));
    let written = outcome.monitor.with_session(|session| {
        write_report(
            out,
            session,
            build_output.as_deref(),
            machine.as_deref(),
            &config,
        )
    })?;

    if !written.complete {
        eprintln!("warning: build timing data was incomplete, report may be missing values");
    }
    println!(
        "Wrote {} critical path unit(s) and {} task column(s) to {}",
        written.rows,
        written.detailed_columns,
        out.display()
    );

    Ok(())
}

fn run_summary(events: &Path, format: OutputFormat) -> Result<()> {
    let events = read_events(events)
        .with_context(|| format!("Failed to read event log {}", events.display()))?;
    let outcome = replay(&events, true);
    let snapshot = outcome.monitor.snapshot();

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&snapshot)
                .context("Failed to serialize session summary")?;
            println!("{}", json);
        }
        OutputFormat::Text => print_summary(&snapshot),
    }

    Ok(())
}

fn print_summary(snapshot: &SessionSnapshot) {
    println!("Session: {}", snapshot.name);
    println!("Started: {}", snapshot.started_at);

    let failed = snapshot.finished.iter().filter(|b| !b.success).count();
    if failed == 0 {
        println!("Units finished: {} (all succeeded)", snapshot.finished.len());
    } else {
        println!(
            "Units finished: {} ({} failed)",
            snapshot.finished.len(),
            failed
        );
    }
    if !snapshot.in_progress.is_empty() {
        println!("Units still running: {}", snapshot.in_progress.len());
    }
    println!("Max concurrent: {}", snapshot.max_concurrent);
    println!("Utilization: {}%", snapshot.percentage_utilization);

    if let Some(avg) = usage::average_percent(&snapshot.cpu_usage) {
        println!("Average CPU: {:.1}%", avg);
    }

    if snapshot.critical_path.is_empty() {
        println!("Critical path: none");
        return;
    }

    let total: Duration = snapshot
        .critical_path
        .iter()
        .map(|b| b.elapsed())
        .sum();
    println!(
        "Critical path ({} units, {}):",
        snapshot.critical_path.len(),
        format_elapsed(total)
    );
    for (i, unit) in snapshot.critical_path.iter().enumerate() {
        println!(
            "  {}. {}  {}",
            i + 1,
            unit.display_name,
            format_elapsed(unit.elapsed())
        );
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    match args.command {
        Command::Report {
            events,
            output_log,
            out,
            config,
            no_machine_info,
        } => run_report(
            &events,
            output_log.as_deref(),
            &out,
            config.as_deref(),
            !no_machine_info,
        ),
        Command::Summary { events, format } => run_summary(&events, format),
    }
}
