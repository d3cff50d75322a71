//! User settings persisted in `settings.txt`
//!
//! Loading is two-phase: `Settings::load` applies defaults and then overrides them
//! key by key, keeping `hidden_projects` raw; `resolve_hidden` turns it into ids
//! once the project list is known.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::store::codec::{format_settings_row, read_logical_lines, split_key_value};
use crate::store::diagnostics::{Diagnostics, Severity};
use crate::store::ids::ProjectId;
use crate::store::model::FIELD_DELIMITER;
use crate::store::templates::SETTINGS_HEADER;

pub mod keys {
    pub const SORTING_METHOD: &str = "sorting_method";
    pub const HIDDEN_PROJECTS: &str = "hidden_projects";
    pub const SUMMARY_SORT_BY_TIME: &str = "summary_sort_by_time";
    pub const SUMMARY_IGNORE_HIDDEN_PROJECTS: &str = "summary_ignore_hidden_projects";
    pub const DEBUG_MODE_ON: &str = "debug_mode_on";
    pub const USE_CUSTOM_TEMPLATES: &str = "use_custom_templates";
    pub const ADD_TIMESTAMP_TO_NOTES: &str = "add_timestamp_to_notes";
    pub const DISPLAY_INCOMPLETE_LOG_WARNING: &str = "display_incomplete_log_warning";
    pub const DATA_DIRECTORY: &str = "data_directory";

    /// Every key, in the order they are written
    pub const ALL: [&str; 9] = [
        SORTING_METHOD,
        HIDDEN_PROJECTS,
        SUMMARY_SORT_BY_TIME,
        SUMMARY_IGNORE_HIDDEN_PROJECTS,
        DEBUG_MODE_ON,
        USE_CUSTOM_TEMPLATES,
        ADD_TIMESTAMP_TO_NOTES,
        DISPLAY_INCOMPLETE_LOG_WARNING,
        DATA_DIRECTORY,
    ];
}

/// Display order of the project list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortingMethod {
    /// Id ascending
    OldFirst,
    /// Id descending
    #[default]
    NewFirst,
    NameAToZ,
    NameZToA,
}

impl SortingMethod {
    pub const ALL: [SortingMethod; 4] = [
        SortingMethod::OldFirst,
        SortingMethod::NewFirst,
        SortingMethod::NameAToZ,
        SortingMethod::NameZToA,
    ];

    pub fn token(self) -> &'static str {
        match self {
            SortingMethod::OldFirst => "old_first",
            SortingMethod::NewFirst => "new_first",
            SortingMethod::NameAToZ => "name_a_to_z",
            SortingMethod::NameZToA => "name_z_to_a",
        }
    }
}

impl std::fmt::Display for SortingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for SortingMethod {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|method| method.token() == s)
            .ok_or_else(|| SettingsError::InvalidValue {
                key: keys::SORTING_METHOD,
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Unknown setting '{0}'")]
    UnknownKey(String),

    #[error("Invalid value '{value}' for setting '{key}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("Setting '{0}' cannot be set directly")]
    NotDirectlySettable(&'static str),
}

/// Typed view of the settings file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub sorting_method: SortingMethod,
    hidden_projects: BTreeSet<ProjectId>,
    /// Raw `hidden_projects` value until the project list has been loaded
    #[serde(skip)]
    pending_hidden: Option<String>,
    pub summary_sort_by_time: bool,
    pub summary_ignore_hidden_projects: bool,
    pub debug_mode_on: bool,
    pub use_custom_templates: bool,
    pub add_timestamp_to_notes: bool,
    pub display_incomplete_log_warning: bool,
    pub data_directory: PathBuf,
}

impl Settings {
    /// Defaults, with the data directory supplied by the runtime config
    pub fn new(default_data_dir: impl Into<PathBuf>) -> Self {
        Self {
            sorting_method: SortingMethod::default(),
            hidden_projects: BTreeSet::new(),
            pending_hidden: None,
            summary_sort_by_time: false,
            summary_ignore_hidden_projects: false,
            debug_mode_on: false,
            use_custom_templates: true,
            add_timestamp_to_notes: true,
            display_incomplete_log_warning: false,
            data_directory: default_data_dir.into(),
        }
    }

    /// Phase one: defaults, then each row of the settings file in order
    pub fn load(path: &Path, default_data_dir: impl Into<PathBuf>, diag: &mut Diagnostics) -> Self {
        let mut settings = Self::new(default_data_dir);
        let mut seen = HashSet::new();

        for line in read_logical_lines(path, diag) {
            let Some((key, value)) = split_key_value(&line) else {
                diag.log(
                    Severity::High,
                    format!("Could not parse settings line '{}'. Skipping entry.", line),
                );
                continue;
            };

            if !seen.insert(key.to_string()) {
                diag.log(
                    Severity::Warning,
                    format!("Duplicate setting '{}' found. Using last value.", key),
                );
            }
            settings.apply_row(key, value, diag);
        }

        settings
    }

    fn apply_row(&mut self, key: &str, value: &str, diag: &mut Diagnostics) {
        let value = value.trim();
        match key {
            keys::SORTING_METHOD => match value.parse() {
                Ok(method) => self.sorting_method = method,
                Err(_) => diag.log(
                    Severity::Moderate,
                    format!(
                        "Unknown sorting method '{}'. Using {} instead.",
                        value, self.sorting_method
                    ),
                ),
            },
            keys::HIDDEN_PROJECTS => self.pending_hidden = Some(value.to_string()),
            keys::SUMMARY_SORT_BY_TIME => self.summary_sort_by_time = parse_bool(value),
            keys::SUMMARY_IGNORE_HIDDEN_PROJECTS => {
                self.summary_ignore_hidden_projects = parse_bool(value)
            }
            keys::DEBUG_MODE_ON => self.debug_mode_on = parse_bool(value),
            keys::USE_CUSTOM_TEMPLATES => self.use_custom_templates = parse_bool(value),
            keys::ADD_TIMESTAMP_TO_NOTES => self.add_timestamp_to_notes = parse_bool(value),
            keys::DISPLAY_INCOMPLETE_LOG_WARNING => {
                self.display_incomplete_log_warning = parse_bool(value)
            }
            keys::DATA_DIRECTORY => {
                let dir = PathBuf::from(value);
                if !value.is_empty() && dir.is_dir() {
                    self.data_directory = dir;
                } else {
                    diag.log(
                        Severity::High,
                        format!(
                            "Data directory '{}' does not exist. Using {} instead.",
                            value,
                            self.data_directory.display()
                        ),
                    );
                }
            }
            other => diag.log(
                Severity::Warning,
                format!("Unknown setting '{}' ignored.", other),
            ),
        }
    }

    /// Phase two: resolve the raw hidden-project list against the loaded projects
    pub fn resolve_hidden(&mut self, is_known: impl Fn(ProjectId) -> bool, diag: &mut Diagnostics) {
        let Some(raw) = self.pending_hidden.take() else {
            return;
        };

        for token in raw.split(FIELD_DELIMITER).map(str::trim).filter(|t| !t.is_empty()) {
            match token.parse::<ProjectId>() {
                Ok(id) if is_known(id) => {
                    self.hidden_projects.insert(id);
                }
                Ok(id) => diag.log(
                    Severity::Moderate,
                    format!("Hidden project id {} does not match any project. Ignoring.", id),
                ),
                Err(_) => diag.log(
                    Severity::Moderate,
                    format!("Could not parse hidden project id '{}'. Ignoring.", token),
                ),
            }
        }
    }

    pub fn hidden_projects(&self) -> &BTreeSet<ProjectId> {
        &self.hidden_projects
    }

    pub fn is_hidden(&self, id: ProjectId) -> bool {
        self.hidden_projects.contains(&id)
    }

    /// Returns false if the project was already hidden
    pub fn hide(&mut self, id: ProjectId) -> bool {
        self.hidden_projects.insert(id)
    }

    /// Returns false if the project was not hidden
    pub fn unhide(&mut self, id: ProjectId) -> bool {
        self.hidden_projects.remove(&id)
    }

    /// Change one setting from user input. Hidden projects and the data directory
    /// have dedicated operations because they touch more than this record.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        let flag = |key: &'static str| parse_bool_strict(key, value);
        match key {
            keys::SORTING_METHOD => self.sorting_method = value.parse()?,
            keys::SUMMARY_SORT_BY_TIME => self.summary_sort_by_time = flag(keys::SUMMARY_SORT_BY_TIME)?,
            keys::SUMMARY_IGNORE_HIDDEN_PROJECTS => {
                self.summary_ignore_hidden_projects = flag(keys::SUMMARY_IGNORE_HIDDEN_PROJECTS)?
            }
            keys::DEBUG_MODE_ON => self.debug_mode_on = flag(keys::DEBUG_MODE_ON)?,
            keys::USE_CUSTOM_TEMPLATES => self.use_custom_templates = flag(keys::USE_CUSTOM_TEMPLATES)?,
            keys::ADD_TIMESTAMP_TO_NOTES => {
                self.add_timestamp_to_notes = flag(keys::ADD_TIMESTAMP_TO_NOTES)?
            }
            keys::DISPLAY_INCOMPLETE_LOG_WARNING => {
                self.display_incomplete_log_warning = flag(keys::DISPLAY_INCOMPLETE_LOG_WARNING)?
            }
            keys::HIDDEN_PROJECTS => return Err(SettingsError::NotDirectlySettable(keys::HIDDEN_PROJECTS)),
            keys::DATA_DIRECTORY => return Err(SettingsError::NotDirectlySettable(keys::DATA_DIRECTORY)),
            other => return Err(SettingsError::UnknownKey(other.to_string())),
        }
        Ok(())
    }

    /// `(key, value)` pairs as they are written to disk
    pub fn rows(&self) -> Vec<(&'static str, String)> {
        let hidden = match &self.pending_hidden {
            // Not resolved yet: keep what was on disk
            Some(raw) => raw.clone(),
            None => self
                .hidden_projects
                .iter()
                .map(ProjectId::to_string)
                .collect::<Vec<_>>()
                .join(&FIELD_DELIMITER.to_string()),
        };

        vec![
            (keys::SORTING_METHOD, self.sorting_method.to_string()),
            (keys::HIDDEN_PROJECTS, hidden),
            (keys::SUMMARY_SORT_BY_TIME, self.summary_sort_by_time.to_string()),
            (
                keys::SUMMARY_IGNORE_HIDDEN_PROJECTS,
                self.summary_ignore_hidden_projects.to_string(),
            ),
            (keys::DEBUG_MODE_ON, self.debug_mode_on.to_string()),
            (keys::USE_CUSTOM_TEMPLATES, self.use_custom_templates.to_string()),
            (keys::ADD_TIMESTAMP_TO_NOTES, self.add_timestamp_to_notes.to_string()),
            (
                keys::DISPLAY_INCOMPLETE_LOG_WARNING,
                self.display_incomplete_log_warning.to_string(),
            ),
            (
                keys::DATA_DIRECTORY,
                self.data_directory.to_string_lossy().to_string(),
            ),
        ]
    }

    /// Full settings file, header included
    pub fn to_file_contents(&self) -> String {
        let mut contents = SETTINGS_HEADER.to_string();
        for (key, value) in self.rows() {
            contents.push_str(&format_settings_row(key, &value));
        }
        contents
    }
}

fn parse_bool(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

fn parse_bool_strict(key: &'static str, value: &str) -> Result<bool, SettingsError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(SettingsError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}
