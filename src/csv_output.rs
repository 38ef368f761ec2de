//! CSV export of the critical path report
//!
//! Layout:
//!
//! ```text
//! "CRITICAL PATH for App.sln  |  Build Started: ...  |  Cores: 8 | ..."
//! <blank, warning, blank rows when a unit failed>
//! "Summary Report:",,,,,,"Detailed Report: (...)"
//! "Critical Path Order","Project Name",...,"End Time [s]",,"CL [ms]","Link [ms]"
//! "2","app.vcxproj","5.000","4.100","9.100",,"3956",
//! ```
//!
//! Every present cell is quoted; an absent cell is written as nothing at
//! all. A spreadsheet then shows "no data for this task" as a blank cell,
//! while a quoted empty string stays an (empty) value.

use crate::build_info::BuildInterval;
use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::report::{detailed_report, DetailedReport};
use crate::session::Session;
use crate::timing_parser::parse_build_timings;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Warning row written when any unit of the session failed
pub const BUILD_FAILED_WARNING: &str =
    "WARNING! One or more projects build failed! Report does not reflect real build times!";

const SUMMARY_PRE_HEADER: &str = "Summary Report:";
const DETAILED_PRE_HEADER: &str =
    "Detailed Report: (Columns Sorted Descending according to sum for column)";
const SUMMARY_HEADER: [&str; 5] = [
    "Critical Path Order",
    "Project Name",
    "Build Time in [s] (Sorted Descending)",
    "Start Time [s]",
    "End Time [s]",
];

/// One report cell; `None` is written as an empty field
pub type Cell = Option<String>;

/// Escape a single cell
///
/// `None` becomes an empty field. A present value is wrapped in quotes with
/// embedded quotes doubled, so `Some("")` becomes `""`.
pub fn escape_cell(cell: Option<&str>) -> String {
    match cell {
        None => String::new(),
        Some(value) => format!("\"{}\"", value.replace('"', "\"\"")),
    }
}

/// Escape and join a row; a `None` row is a blank line
pub fn escape_row(row: Option<&[Cell]>, separator: &str) -> String {
    let Some(row) = row else {
        return String::new();
    };
    row.iter()
        .map(|cell| escape_cell(cell.as_deref()))
        .collect::<Vec<_>>()
        .join(separator)
}

fn text(value: impl Into<String>) -> Cell {
    Some(value.into())
}

/// Seconds with millisecond precision, e.g. `4.015`
fn seconds(d: Duration) -> Cell {
    let millis = d.as_millis();
    Some(format!("{}.{:03}", millis / 1000, millis % 1000))
}

/// Rendered report plus whether it lost any timing data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvReport {
    pub content: String,

    /// False if the timing text was malformed or values were dropped
    pub complete: bool,

    /// Number of unit rows
    pub rows: usize,

    /// Number of task columns in the detailed part
    pub detailed_columns: usize,
}

/// Outcome of [`write_report`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOutcome {
    pub complete: bool,
    pub rows: usize,
    pub detailed_columns: usize,
}

/// CSV report formatter for a resolved session
#[derive(Debug)]
pub struct CsvReportBuilder<'a> {
    config: &'a MonitorConfig,
    machine: Option<&'a str>,
}

impl<'a> CsvReportBuilder<'a> {
    /// Create a formatter using the separators and suffixes of `config`
    pub fn new(config: &'a MonitorConfig) -> Self {
        Self {
            config,
            machine: None,
        }
    }

    /// Append a machine description to the title row
    pub fn machine(mut self, machine: &'a str) -> Self {
        self.machine = Some(machine);
        self
    }

    /// Render the report for the session's critical path
    ///
    /// `build_output` is the build log text with task performance
    /// summaries; only sections of critical path units are used.
    ///
    /// # Errors
    ///
    /// [`MonitorError::EmptyCriticalPath`] if the session has no resolved
    /// critical path.
    pub fn build(&self, session: &Session, build_output: Option<&str>) -> Result<CsvReport> {
        let path = session.critical_path();
        if path.is_empty() {
            return Err(MonitorError::EmptyCriticalPath);
        }

        let only: HashSet<u32> = path.iter().map(|b| b.order_number).collect();
        let parsed = parse_build_timings(build_output, &only);
        let (detailed, complete) = detailed_report(&parsed, self.config.strict_densify);

        let mut rows: Vec<Option<Vec<Cell>>> = Vec::new();

        let title = format!(
            "{}{}",
            self.config.title_prefix,
            session.title(&self.config.field_separator, true, self.machine)
        );
        rows.push(Some(vec![text(title)]));

        if !session.all_succeeded() {
            rows.push(None);
            rows.push(Some(vec![text(BUILD_FAILED_WARNING)]));
            rows.push(None);
        }

        rows.push(Some(self.pre_header(detailed.as_ref())));
        rows.push(Some(self.header(detailed.as_ref())));

        for (position, interval) in sorted_longest_first(path) {
            rows.push(Some(unit_row(position, interval, detailed.as_ref())));
        }

        let content = rows
            .iter()
            .map(|row| escape_row(row.as_deref(), &self.config.csv_separator))
            .collect::<Vec<_>>()
            .join("\n")
            + "\n";

        Ok(CsvReport {
            content,
            complete,
            rows: path.len(),
            detailed_columns: detailed.as_ref().map_or(0, |d| d.columns.len()),
        })
    }

    fn pre_header(&self, detailed: Option<&DetailedReport>) -> Vec<Cell> {
        let mut row = vec![text(SUMMARY_PRE_HEADER)];
        if detailed.is_some() {
            row.resize(SUMMARY_HEADER.len(), None);
            row.push(None);
            row.push(text(DETAILED_PRE_HEADER));
        }
        row
    }

    fn header(&self, detailed: Option<&DetailedReport>) -> Vec<Cell> {
        let mut row: Vec<Cell> = SUMMARY_HEADER.iter().map(|h| text(*h)).collect();
        if let Some(detailed) = detailed {
            row.push(None);
            row.extend(
                detailed
                    .columns
                    .names()
                    .iter()
                    .map(|name| text(format!("{}{}", name, self.config.duration_unit_suffix))),
            );
        }
        row
    }
}

/// Path entries with their 1-based chronological position, longest first
///
/// Equal elapsed times keep chronological order.
fn sorted_longest_first(path: &[BuildInterval]) -> Vec<(usize, &BuildInterval)> {
    let mut sorted: Vec<(usize, &BuildInterval)> =
        path.iter().enumerate().map(|(i, b)| (i + 1, b)).collect();
    sorted.sort_by(|a, b| b.1.cmp_elapsed(a.1));
    sorted
}

fn unit_row(position: usize, interval: &BuildInterval, detailed: Option<&DetailedReport>) -> Vec<Cell> {
    let mut row = vec![
        text(position.to_string()),
        text(interval.display_name.clone()),
        seconds(interval.elapsed()),
        seconds(interval.begin),
        seconds(interval.end),
    ];

    if let Some(detailed) = detailed {
        row.push(None);
        // Units without a timing section (e.g. C# projects) get no detail cells
        if let Some(values) = detailed.row(interval.order_number) {
            row.extend(values.iter().map(|v| v.map(|ms| ms.to_string())));
        }
    }

    row
}

/// Render the report and write it to `path`, replacing any existing file
///
/// # Errors
///
/// [`MonitorError::EmptyCriticalPath`] when there is nothing to export and
/// [`MonitorError::ReportWrite`] when the file cannot be written. Nothing
/// panics on I/O failure.
pub fn write_report(
    path: &Path,
    session: &Session,
    build_output: Option<&str>,
    machine: Option<&str>,
    config: &MonitorConfig,
) -> Result<ReportOutcome> {
    let mut builder = CsvReportBuilder::new(config);
    if let Some(machine) = machine {
        builder = builder.machine(machine);
    }
    let report = builder.build(session, build_output)?;

    if let Err(source) = fs::write(path, &report.content) {
        tracing::error!(path = %path.display(), error = %source, "failed to write report");
        return Err(MonitorError::ReportWrite {
            path: path.to_path_buf(),
            source,
        });
    }

    tracing::info!(
        path = %path.display(),
        rows = report.rows,
        complete = report.complete,
        "critical path report written"
    );

    Ok(ReportOutcome {
        complete: report.complete,
        rows: report.rows,
        detailed_columns: report.detailed_columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::dependency_graph::DependencyGraph;
    use chrono::{Local, TimeZone};
    use std::sync::Arc;

    const BUILD_OUTPUT: &str = "1>Task Performance Summary:\n\
        1>        0 ms  AssignCulture                              1 calls\n\
        1>     3956 ms  CL                                         2 calls\n\
        \n\
        2>Task Performance Summary:\n\
        2>      628 ms  Link                                       1 calls\n\
        2>     1200 ms  CL                                         2 calls\n\
        \n";

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    /// core (0..4s) then app (4.1..9.1s), app depends on core
    fn resolved_session(app_success: bool) -> Session {
        let wall = Local.with_ymd_and_hms(2024, 3, 1, 14, 5, 9).unwrap();
        let clock = Arc::new(ManualClock::starting_at(wall));
        let mut session = Session::with_clock(clock.clone());
        session.begin_session("App.sln");

        session.begin_unit("src/core/core.vcxproj");
        clock.set(ms(4000));
        session.finish_unit("src/core/core.vcxproj", true).unwrap();
        clock.set(ms(4100));
        session.begin_unit("src/app/app.vcxproj");
        clock.set(ms(9100));
        session.finish_unit("src/app/app.vcxproj", app_success).unwrap();

        let graph: DependencyGraph = vec![
            ("src/app/app.vcxproj", vec!["src/core/core.vcxproj"]),
            ("src/core/core.vcxproj", vec![]),
        ]
        .into_iter()
        .collect();
        assert!(session.finish_session(graph, true));
        session
    }

    fn lines(report: &CsvReport) -> Vec<&str> {
        report.content.lines().collect()
    }

    #[test]
    fn test_escape_cell() {
        assert_eq!(escape_cell(None), "");
        assert_eq!(escape_cell(Some("")), "\"\"");
        assert_eq!(escape_cell(Some("CL")), "\"CL\"");
        assert_eq!(escape_cell(Some("say \"hi\"")), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_escape_row() {
        let row = vec![text("a"), None, text("")];
        assert_eq!(escape_row(Some(row.as_slice()), ","), "\"a\",,\"\"");
        assert_eq!(escape_row(None, ","), "");
    }

    #[test]
    fn test_report_without_timing_text() {
        let session = resolved_session(true);
        let config = MonitorConfig::default();

        let report = CsvReportBuilder::new(&config).build(&session, None).unwrap();
        let lines = lines(&report);

        assert!(report.complete);
        assert_eq!(report.detailed_columns, 0);
        assert_eq!(
            lines[0],
            "\"CRITICAL PATH for App.sln  |  Build Started: 2024-03-01 14:05:09\""
        );
        assert_eq!(lines[1], "\"Summary Report:\"");
        assert_eq!(
            lines[2],
            "\"Critical Path Order\",\"Project Name\",\"Build Time in [s] (Sorted Descending)\",\"Start Time [s]\",\"End Time [s]\""
        );
        assert_eq!(lines[3], "\"2\",\"app.vcxproj\",\"5.000\",\"4.100\",\"9.100\"");
        assert_eq!(lines[4], "\"1\",\"core.vcxproj\",\"4.000\",\"0.000\",\"4.000\"");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_report_with_detailed_columns() {
        let session = resolved_session(true);
        let config = MonitorConfig::default();

        let report = CsvReportBuilder::new(&config)
            .machine("Cores: 8")
            .build(&session, Some(BUILD_OUTPUT))
            .unwrap();
        let lines = lines(&report);

        assert!(report.complete);
        assert_eq!(report.detailed_columns, 3);
        assert!(lines[0].ends_with("  |  Cores: 8\""));
        assert_eq!(
            lines[1],
            "\"Summary Report:\",,,,,,\"Detailed Report: (Columns Sorted Descending according to sum for column)\""
        );
        assert!(lines[2].ends_with(",\"End Time [s]\",,\"CL [ms]\",\"Link [ms]\",\"AssignCulture [ms]\""));
        // app is unit 2: CL and Link, no AssignCulture
        assert_eq!(
            lines[3],
            "\"2\",\"app.vcxproj\",\"5.000\",\"4.100\",\"9.100\",,\"1200\",\"628\","
        );
        assert_eq!(
            lines[4],
            "\"1\",\"core.vcxproj\",\"4.000\",\"0.000\",\"4.000\",,\"3956\",,\"0\""
        );
    }

    #[test]
    fn test_unit_without_timing_section_gets_no_detail_cells() {
        let session = resolved_session(true);
        let config = MonitorConfig::default();
        let only_core = "1>Task Performance Summary:\n1> 3956 ms CL 2 calls\n\n";

        let report = CsvReportBuilder::new(&config)
            .build(&session, Some(only_core))
            .unwrap();
        let lines = lines(&report);

        assert_eq!(lines[3], "\"2\",\"app.vcxproj\",\"5.000\",\"4.100\",\"9.100\",");
        assert!(lines[4].ends_with(",,\"3956\""));
    }

    #[test]
    fn test_failed_build_warning_block() {
        let session = resolved_session(false);
        let config = MonitorConfig::default();

        let report = CsvReportBuilder::new(&config).build(&session, None).unwrap();
        let lines = lines(&report);

        assert_eq!(lines[1], "");
        assert_eq!(lines[2], format!("\"{}\"", BUILD_FAILED_WARNING));
        assert_eq!(lines[3], "");
        assert_eq!(lines[4], "\"Summary Report:\"");
    }

    #[test]
    fn test_truncated_timing_text_marks_incomplete() {
        let session = resolved_session(true);
        let config = MonitorConfig::default();
        let truncated = "1>Task Performance Summary:\n1> 3956 ms CL 2 calls";

        let report = CsvReportBuilder::new(&config)
            .build(&session, Some(truncated))
            .unwrap();

        assert!(!report.complete);
        assert_eq!(report.detailed_columns, 0);
    }

    #[test]
    fn test_custom_separator_and_suffix() {
        let session = resolved_session(true);
        let config = MonitorConfig {
            csv_separator: ";".to_string(),
            duration_unit_suffix: " (ms)".to_string(),
            ..MonitorConfig::default()
        };

        let report = CsvReportBuilder::new(&config)
            .build(&session, Some(BUILD_OUTPUT))
            .unwrap();

        assert!(lines(&report)[2].contains(";;\"CL (ms)\";"));
    }

    #[test]
    fn test_self_dependent_unit_written_once() {
        let clock = Arc::new(ManualClock::new());
        let mut session = Session::with_clock(clock.clone());
        session.begin_session("App.sln");
        session.begin_unit("x");
        clock.set(ms(10));
        session.finish_unit("x", true).unwrap();
        session.begin_unit("a");
        clock.set(ms(40));
        session.finish_unit("a", true).unwrap();
        let graph: DependencyGraph = vec![("a", vec!["a"]), ("x", vec![])].into_iter().collect();
        assert!(session.finish_session(graph, true));

        let report = CsvReportBuilder::new(&MonitorConfig::default())
            .build(&session, None)
            .unwrap();

        assert_eq!(report.rows, 1);
        assert_eq!(
            lines(&report).iter().filter(|l| l.starts_with("\"1\",\"a\"")).count(),
            1
        );
        assert!(!report.content.contains("\"2\",\"a\""));
    }

    #[test]
    fn test_empty_critical_path() {
        let session = Session::with_clock(Arc::new(ManualClock::new()));
        let config = MonitorConfig::default();

        let err = CsvReportBuilder::new(&config).build(&session, None).unwrap_err();
        assert!(matches!(err, MonitorError::EmptyCriticalPath));
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        let session = resolved_session(true);

        let outcome = write_report(
            &path,
            &session,
            Some(BUILD_OUTPUT),
            None,
            &MonitorConfig::default(),
        )
        .unwrap();

        assert!(outcome.complete);
        assert_eq!(outcome.rows, 2);
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("\"CRITICAL PATH for App.sln"));
    }

    #[test]
    fn test_write_report_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("report.csv");
        let session = resolved_session(true);

        let err = write_report(&path, &session, None, None, &MonitorConfig::default()).unwrap_err();
        assert!(matches!(err, MonitorError::ReportWrite { .. }));
    }
}
