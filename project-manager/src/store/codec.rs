// Flat-file record codec
//
// One record per line, `|` between fields, `#` starts a comment line. Parsing is
// tolerant: a bad row yields a `RowError` for the caller to log and the rest of the
// file still loads.
//
// Log file layout:
//   Incomplete
//   3|2020-01-01T09:00:00||Design
//
//   Complete
//   0|2020-01-01T07:00:00|2020-01-01T08:00:00|Plan

use std::fs;
use std::path::Path;

use chrono::{NaiveDateTime, Timelike};
use thiserror::Error;

use crate::store::diagnostics::{Diagnostics, Severity};
use crate::store::ids::{LogId, ProjectId};
use crate::store::model::{
    resolve_full_path, FileTarget, ModelError, Project, ProjectFile, ProjectLog, FIELD_DELIMITER,
};

pub const COMMENT_PREFIX: char = '#';
pub const INCOMPLETE_MARKER: &str = "Incomplete";
pub const COMPLETE_MARKER: &str = "Complete";

/// On-disk timestamp format (ISO-8601, local wall-clock, second precision)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Formats accepted on read besides `TIMESTAMP_FORMAT`. The en-US forms come from
/// older data files.
const LEGACY_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
];

/// Section of the log file a data row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSection {
    Incomplete,
    Complete,
}

impl std::fmt::Display for LogSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogSection::Incomplete => write!(f, "incomplete"),
            LogSection::Complete => write!(f, "complete"),
        }
    }
}

/// A record that could not be turned into an entity
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("Could not parse line '{0}'. Skipping entry.")]
    FieldCount(String),

    #[error("Could not parse {kind} id '{value}'. Skipping entry.")]
    InvalidId { kind: &'static str, value: String },

    #[error("Invalid {field} '{value}'. Skipping entry.")]
    InvalidText { field: &'static str, value: String },

    #[error("Could not parse log {which} time '{value}'. Skipping entry.")]
    InvalidTimestamp { which: &'static str, value: String },

    #[error("Could not determine whether log '{0}' is complete or incomplete. Skipping entry.")]
    NoSection(String),

    #[error("Invalid end time '{value}' for a {section} log. Skipping entry.")]
    EndMismatch { value: String, section: LogSection },

    #[error("Only one incomplete entry is allowed. Additional entry '{0}' will be skipped.")]
    ExtraIncomplete(String),

    #[error("Could not parse file type. Value was '{0}'. Skipping entry.")]
    InvalidFileFlag(String),

    #[error("Could not parse file target '{value}': {source}. Skipping entry.")]
    InvalidTarget {
        value: String,
        #[source]
        source: ModelError,
    },

    #[error("Could not parse program to open '{0}'. Skipping entry.")]
    InvalidProgram(String),
}

impl RowError {
    /// Every dropped row is a structural problem
    pub fn severity(&self) -> Severity {
        Severity::High
    }
}

// ============================================================================
// Lines and fields
// ============================================================================

/// Trimmed, non-blank, non-comment lines in file order
pub fn logical_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(COMMENT_PREFIX))
}

/// Read the logical lines of a file. I/O failures are logged and yield no lines.
pub fn read_logical_lines(path: &Path, diag: &mut Diagnostics) -> Vec<String> {
    match fs::read_to_string(path) {
        Ok(content) => logical_lines(&content).map(str::to_string).collect(),
        Err(e) => {
            diag.log(
                Severity::High,
                format!("Error parsing file '{}':\n{}", path.display(), e),
            );
            Vec::new()
        }
    }
}

/// Split a record that must have exactly `count` fields
pub fn split_exact(line: &str, count: usize) -> Option<Vec<&str>> {
    let fields: Vec<&str> = line.split(FIELD_DELIMITER).collect();
    (fields.len() == count).then_some(fields)
}

/// Split `key|value`, keeping any further delimiters inside the value
pub fn split_key_value(line: &str) -> Option<(&str, &str)> {
    line.split_once(FIELD_DELIMITER)
}

// ============================================================================
// Timestamps
// ============================================================================

pub fn format_timestamp(timestamp: NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    std::iter::once(TIMESTAMP_FORMAT)
        .chain(LEGACY_TIMESTAMP_FORMATS.iter().copied())
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

/// Drop sub-second precision so in-memory values match what a reload produces
pub fn truncate_to_seconds(timestamp: NaiveDateTime) -> NaiveDateTime {
    timestamp.with_nanosecond(0).unwrap_or(timestamp)
}

// ============================================================================
// Project list rows: id|name
// ============================================================================

pub fn parse_project_row(line: &str) -> Result<(ProjectId, String), RowError> {
    let fields = split_exact(line, 2).ok_or_else(|| RowError::FieldCount(line.to_string()))?;

    let id = parse_id("project", fields[0])?;
    let name = fields[1];
    if name.trim().is_empty() {
        return Err(RowError::InvalidText {
            field: "project name",
            value: name.to_string(),
        });
    }

    Ok((id, name.trim().to_string()))
}

pub fn format_project_row(project: &Project) -> String {
    format!("{}|{}\n", project.id(), project.name())
}

// ============================================================================
// Log rows: id|start|end|description
// ============================================================================

/// Result of parsing a project's log file
#[derive(Debug, Default)]
pub struct ParsedLogs {
    pub completed: Vec<ProjectLog>,
    pub incomplete: Option<ProjectLog>,
    /// Rows that were skipped, in file order
    pub errors: Vec<RowError>,
}

/// Parse the logical lines of a log file
pub fn parse_log_lines<'a, I>(lines: I, project_id: ProjectId) -> ParsedLogs
where
    I: IntoIterator<Item = &'a str>,
{
    let mut parsed = ParsedLogs::default();
    let mut section: Option<LogSection> = None;

    for line in lines {
        if line == INCOMPLETE_MARKER {
            section = Some(LogSection::Incomplete);
            continue;
        }
        if line == COMPLETE_MARKER {
            section = Some(LogSection::Complete);
            continue;
        }

        let Some(current) = section else {
            parsed.errors.push(RowError::NoSection(line.to_string()));
            continue;
        };

        match parse_log_row(line, current, project_id) {
            Ok(log) if current == LogSection::Complete => parsed.completed.push(log),
            Ok(log) => {
                if parsed.incomplete.is_none() {
                    parsed.incomplete = Some(log);
                } else {
                    parsed
                        .errors
                        .push(RowError::ExtraIncomplete(log.description().to_string()));
                }
            }
            Err(e) => parsed.errors.push(e),
        }
    }

    parsed
}

/// Parse one data row in the context of its section
pub fn parse_log_row(
    line: &str,
    section: LogSection,
    project_id: ProjectId,
) -> Result<ProjectLog, RowError> {
    let fields = split_exact(line, 4).ok_or_else(|| RowError::FieldCount(line.to_string()))?;

    let id: LogId = parse_id("log", fields[0])?;

    let start = parse_timestamp(fields[1]).ok_or_else(|| RowError::InvalidTimestamp {
        which: "start",
        value: fields[1].to_string(),
    })?;

    let end = match (section, fields[2].is_empty()) {
        (LogSection::Incomplete, true) => None,
        (LogSection::Complete, false) => {
            Some(
                parse_timestamp(fields[2]).ok_or_else(|| RowError::InvalidTimestamp {
                    which: "end",
                    value: fields[2].to_string(),
                })?,
            )
        }
        _ => {
            return Err(RowError::EndMismatch {
                value: fields[2].to_string(),
                section,
            })
        }
    };

    let description = fields[3];
    let log = match end {
        Some(end) => ProjectLog::complete(id, project_id, start, end, description),
        None => ProjectLog::incomplete(id, project_id, start, description),
    };
    log.map_err(|_| RowError::InvalidText {
        field: "log description",
        value: description.to_string(),
    })
}

pub fn format_log_row(log: &ProjectLog) -> String {
    format!(
        "{}|{}|{}|{}\n",
        log.id(),
        format_timestamp(log.start()),
        log.end().map(format_timestamp).unwrap_or_default(),
        log.description()
    )
}

/// Body of a log file (everything after the header)
pub fn format_log_body(project: &Project) -> String {
    let mut body = String::new();

    if let Some(log) = project.incomplete_log() {
        body.push_str(INCOMPLETE_MARKER);
        body.push('\n');
        body.push_str(&format_log_row(log));
        body.push('\n');
    }

    body.push_str(COMPLETE_MARKER);
    body.push('\n');
    for log in project.completed_logs() {
        body.push_str(&format_log_row(log));
    }

    body
}

// ============================================================================
// File rows: title|target|true/false|programToOpen
// ============================================================================

pub fn parse_file_row(line: &str, project_id: ProjectId) -> Result<ProjectFile, RowError> {
    let fields = split_exact(line, 4).ok_or_else(|| RowError::FieldCount(line.to_string()))?;

    let title = fields[0];
    if title.trim().is_empty() {
        return Err(RowError::InvalidText {
            field: "file title",
            value: title.to_string(),
        });
    }

    // The flag decides how the target is validated, so check it first
    let is_file = match fields[2] {
        "true" => true,
        "false" => false,
        other => return Err(RowError::InvalidFileFlag(other.to_string())),
    };

    let target =
        FileTarget::parse(fields[1], is_file).map_err(|source| RowError::InvalidTarget {
            value: fields[1].to_string(),
            source,
        })?;

    let program_to_open = match fields[3] {
        "" => None,
        raw => Some(
            resolve_full_path(raw).map_err(|_| RowError::InvalidProgram(raw.to_string()))?,
        ),
    };

    ProjectFile::new(title, target, program_to_open, project_id).map_err(|e| match e {
        ModelError::InvalidPath(raw) => RowError::InvalidProgram(raw),
        _ => RowError::InvalidText {
            field: "file title",
            value: title.to_string(),
        },
    })
}

pub fn format_file_row(file: &ProjectFile) -> String {
    format!(
        "{}|{}|{}|{}\n",
        file.title(),
        file.target().as_record_value(),
        if file.target().is_file() { "true" } else { "false" },
        file.program_to_open()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default()
    )
}

// ============================================================================
// Settings rows: key|value
// ============================================================================

pub fn format_settings_row(key: &str, value: &str) -> String {
    format!("{}|{}\n", key, value)
}

fn parse_id(kind: &'static str, value: &str) -> Result<u32, RowError> {
    value.trim().parse::<u32>().map_err(|_| RowError::InvalidId {
        kind,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_logical_lines_skip_comments_and_blanks() {
        let content = "# header\n#\n\n  0|Website  \n   # indented comment\n\t\n1|Taxes\n";
        let lines: Vec<_> = logical_lines(content).collect();
        assert_eq!(lines, vec!["0|Website", "1|Taxes"]);
    }

    #[test]
    fn test_read_missing_file_logs_and_returns_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut diag = Diagnostics::new();
        let lines = read_logical_lines(&dir.path().join("missing.txt"), &mut diag);
        assert!(lines.is_empty());
        assert_eq!(diag.count(Severity::High), 1);
    }

    #[test]
    fn test_split_key_value_keeps_delimiters_in_value() {
        assert_eq!(split_key_value("hidden_projects|1|4|7"), Some(("hidden_projects", "1|4|7")));
        assert_eq!(split_key_value("hidden_projects|"), Some(("hidden_projects", "")));
        assert_eq!(split_key_value("no delimiter"), None);
    }

    #[test]
    fn test_project_row() {
        assert_eq!(parse_project_row("0|Website"), Ok((0, "Website".to_string())));
        assert!(matches!(parse_project_row("-1|Bad"), Err(RowError::InvalidId { .. })));
        assert!(matches!(parse_project_row("x|Bad"), Err(RowError::InvalidId { .. })));
        assert!(matches!(parse_project_row("3|"), Err(RowError::InvalidText { .. })));
        assert!(matches!(parse_project_row("3|a|b"), Err(RowError::FieldCount(_))));
    }

    #[test]
    fn test_timestamp_formats() {
        assert_eq!(parse_timestamp("2020-01-01T09:00:00"), Some(at(9, 0)));
        assert_eq!(parse_timestamp("01/01/2020 10:30:00"), Some(at(10, 30)));
        assert_eq!(parse_timestamp("1/1/2020 2:15:00 PM"), Some(at(14, 15)));
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(format_timestamp(at(9, 5)), "2020-01-01T09:05:00");
    }

    #[test]
    fn test_legacy_complete_row_duration() {
        let lines = [
            "Complete",
            "0|01/01/2020 09:00:00|01/01/2020 10:30:00|Design",
        ];
        let parsed = parse_log_lines(lines, 0);
        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.completed.len(), 1);
        assert_eq!(parsed.completed[0].duration(), Some(Duration::minutes(90)));
    }

    #[test]
    fn test_row_before_section_marker_skipped() {
        let lines = ["0|2020-01-01T09:00:00|2020-01-01T10:00:00|Design", "Complete"];
        let parsed = parse_log_lines(lines, 0);
        assert!(parsed.completed.is_empty());
        assert!(matches!(parsed.errors[0], RowError::NoSection(_)));
    }

    #[test]
    fn test_second_incomplete_row_discarded() {
        let lines = [
            "Incomplete",
            "4|2020-01-01T09:00:00||First",
            "5|2020-01-01T10:00:00||Second",
            "Complete",
        ];
        let parsed = parse_log_lines(lines, 0);
        assert_eq!(parsed.incomplete.as_ref().map(|l| l.id()), Some(4));
        assert_eq!(parsed.errors, vec![RowError::ExtraIncomplete("Second".to_string())]);
    }

    #[test]
    fn test_end_must_match_section() {
        let filled_in_incomplete = parse_log_row(
            "1|2020-01-01T09:00:00|2020-01-01T10:00:00|Design",
            LogSection::Incomplete,
            0,
        );
        assert!(matches!(filled_in_incomplete, Err(RowError::EndMismatch { .. })));

        let blank_in_complete = parse_log_row("1|2020-01-01T09:00:00||Design", LogSection::Complete, 0);
        assert!(matches!(blank_in_complete, Err(RowError::EndMismatch { .. })));
    }

    #[test]
    fn test_corrupt_row_isolated() {
        let lines = [
            "Complete",
            "0|2020-01-01T07:00:00|2020-01-01T08:00:00|Plan",
            "1|not a time|2020-01-01T08:00:00|Broken",
            "2|2020-01-01T09:00:00|2020-01-01T10:00:00|Build",
            "3|2020-01-01T11:00:00|2020-01-01T12:00:00|",
        ];
        let parsed = parse_log_lines(lines, 0);
        assert_eq!(parsed.completed.len(), 2);
        assert_eq!(parsed.errors.len(), 2);
        assert!(parsed.errors.iter().all(|e| e.severity() == Severity::High));
    }

    #[test]
    fn test_log_body_layout() {
        let mut project = Project::new(3, "Alpha").unwrap();
        project
            .set_incomplete_log(ProjectLog::incomplete(1, 3, at(9, 0), "Design").unwrap())
            .unwrap();
        project
            .add_completed_log(ProjectLog::complete(0, 3, at(7, 0), at(8, 0), "Plan").unwrap())
            .unwrap();

        assert_eq!(
            format_log_body(&project),
            "Incomplete\n1|2020-01-01T09:00:00||Design\n\nComplete\n0|2020-01-01T07:00:00|2020-01-01T08:00:00|Plan\n"
        );
    }

    #[test]
    fn test_file_rows() {
        let url = parse_file_row("Docs|http://example.com/docs|false|", 2).unwrap();
        assert!(!url.target().is_file());
        assert!(url.program_to_open().is_none());
        assert_eq!(format_file_row(&url), "Docs|http://example.com/docs|false|\n");

        assert!(matches!(
            parse_file_row("Docs|http://example.com|maybe|", 2),
            Err(RowError::InvalidFileFlag(_))
        ));
        assert!(matches!(
            parse_file_row("Docs|not a url|false|", 2),
            Err(RowError::InvalidTarget { .. })
        ));
        assert!(matches!(
            parse_file_row("|http://example.com|false|", 2),
            Err(RowError::InvalidText { .. })
        ));
    }

    #[test]
    fn test_local_file_row_with_program() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("plan.txt");
        let program = dir.path().join("editor");
        let line = format!("Plan|{}|true|{}", target.display(), program.display());

        let file = parse_file_row(&line, 0).unwrap();
        assert_eq!(file.target(), &FileTarget::LocalPath(target));
        assert_eq!(file.program_to_open(), Some(program.as_path()));
        assert_eq!(format_file_row(&file), format!("{}\n", line));
    }
}
