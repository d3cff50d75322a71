// Entity model: projects, their time logs, and their attached files
//
// Projects live in an arena keyed by id (see organizer.rs); logs and files carry the
// owning project's id instead of a back-reference.

use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::store::ids::{LogId, ProjectId};

/// Field delimiter of every flat-file record
pub const FIELD_DELIMITER: char = '|';

/// In-memory invariant violations. Callers in the store log these at HIGH.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} '{value}' must not contain '|' or line breaks")]
    IllegalCharacter { field: &'static str, value: String },

    #[error("project '{project}' already has an incomplete log (id {existing})")]
    IncompleteLogExists { project: String, existing: LogId },

    #[error("project '{project}' has no incomplete log to finish")]
    NoIncompleteLog { project: String },

    #[error("log {id} is incomplete; it cannot be added as a completed log")]
    LogNotComplete { id: LogId },

    #[error("log {id} already has an end time; it cannot become the incomplete log")]
    LogAlreadyComplete { id: LogId },

    #[error("project '{project}' has no log with id {id}")]
    LogNotFound { project: String, id: LogId },

    #[error("project '{project}' already has a file titled '{title}'")]
    DuplicateFileTitle { project: String, title: String },

    #[error("project '{project}' has no file titled '{title}'")]
    FileNotFound { project: String, title: String },

    #[error("'{0}' cannot be resolved to a full path")]
    InvalidPath(String),

    #[error("'{0}' is not an absolute http url")]
    InvalidUrl(String),

    #[error("{what} belongs to project {owner}, not project {project}")]
    WrongProject {
        what: &'static str,
        owner: ProjectId,
        project: ProjectId,
    },

    #[error("no {0} ids left")]
    IdsExhausted(&'static str),
}

/// Check a user-supplied text field that ends up inside a record and return it
/// trimmed. Record lines are trimmed on read, so surrounding whitespace would not
/// survive a reload.
pub fn validate_field<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ModelError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ModelError::Empty { field });
    }
    if value.contains(FIELD_DELIMITER) || value.contains(['\n', '\r']) {
        return Err(ModelError::IllegalCharacter {
            field,
            value: value.to_string(),
        });
    }
    Ok(value)
}

/// Resolve a path against the working directory, rejecting unusable values
pub fn resolve_full_path(raw: &str) -> Result<PathBuf, ModelError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.contains([FIELD_DELIMITER, '\0', '\n', '\r']) {
        return Err(ModelError::InvalidPath(raw.to_string()));
    }
    std::path::absolute(trimmed).map_err(|_| ModelError::InvalidPath(raw.to_string()))
}

/// Resolve an opener program to a full path. An empty path means "no program".
pub fn resolve_program(program: Option<PathBuf>) -> Result<Option<PathBuf>, ModelError> {
    let Some(program) = program.filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(None);
    };
    let raw = program
        .to_str()
        .ok_or_else(|| ModelError::InvalidPath(program.to_string_lossy().to_string()))?;
    resolve_full_path(raw).map(Some)
}

// ============================================================================
// Logs
// ============================================================================

/// A timed work session. `end` is `None` exactly while the log is incomplete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectLog {
    id: LogId,
    project_id: ProjectId,
    start: NaiveDateTime,
    end: Option<NaiveDateTime>,
    description: String,
}

impl ProjectLog {
    /// Create a started-but-unfinished log
    pub fn incomplete(
        id: LogId,
        project_id: ProjectId,
        start: NaiveDateTime,
        description: &str,
    ) -> Result<Self, ModelError> {
        let description = validate_field("log description", description)?;
        Ok(Self {
            id,
            project_id,
            start,
            end: None,
            description: description.to_string(),
        })
    }

    /// Create a finished log
    pub fn complete(
        id: LogId,
        project_id: ProjectId,
        start: NaiveDateTime,
        end: NaiveDateTime,
        description: &str,
    ) -> Result<Self, ModelError> {
        let description = validate_field("log description", description)?;
        Ok(Self {
            id,
            project_id,
            start,
            end: Some(end),
            description: description.to_string(),
        })
    }

    pub fn id(&self) -> LogId {
        self.id
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> Option<NaiveDateTime> {
        self.end
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_complete(&self) -> bool {
        self.end.is_some()
    }

    /// Elapsed time of a completed log
    pub fn duration(&self) -> Option<Duration> {
        self.end.map(|end| end - self.start)
    }

    pub fn set_start(&mut self, start: NaiveDateTime) {
        self.start = start;
    }

    pub fn set_description(&mut self, description: &str) -> Result<(), ModelError> {
        let description = validate_field("log description", description)?;
        self.description = description.to_string();
        Ok(())
    }

    /// Move the end of a completed log. Incomplete logs are finished through
    /// `Project::finish_incomplete_log` only.
    pub fn set_end(&mut self, end: NaiveDateTime) -> Result<(), ModelError> {
        if self.end.is_none() {
            return Err(ModelError::LogNotComplete { id: self.id });
        }
        self.end = Some(end);
        Ok(())
    }
}

// ============================================================================
// Files
// ============================================================================

/// What a project file entry points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum FileTarget {
    LocalPath(PathBuf),
    RemoteUrl(Url),
}

impl FileTarget {
    /// A local file, resolved to a full path
    pub fn local(raw: &str) -> Result<Self, ModelError> {
        resolve_full_path(raw).map(FileTarget::LocalPath)
    }

    /// An absolute http(s) url
    pub fn remote(raw: &str) -> Result<Self, ModelError> {
        if raw.contains(FIELD_DELIMITER) {
            return Err(ModelError::InvalidUrl(raw.to_string()));
        }
        let url = Url::parse(raw).map_err(|_| ModelError::InvalidUrl(raw.to_string()))?;
        match url.scheme() {
            "http" | "https" if url.has_host() => Ok(FileTarget::RemoteUrl(url)),
            _ => Err(ModelError::InvalidUrl(raw.to_string())),
        }
    }

    pub fn parse(raw: &str, is_file: bool) -> Result<Self, ModelError> {
        if is_file {
            Self::local(raw)
        } else {
            Self::remote(raw)
        }
    }

    /// Re-check a target that may have been built directly from its variant
    pub fn validated(self) -> Result<Self, ModelError> {
        match self {
            FileTarget::LocalPath(path) => match path.to_str() {
                Some(raw) => Self::local(raw),
                None => Err(ModelError::InvalidPath(path.to_string_lossy().to_string())),
            },
            FileTarget::RemoteUrl(url) => Self::remote(url.as_str()),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, FileTarget::LocalPath(_))
    }

    /// The value written to the files file
    pub fn as_record_value(&self) -> String {
        match self {
            FileTarget::LocalPath(path) => path.to_string_lossy().to_string(),
            FileTarget::RemoteUrl(url) => url.as_str().to_string(),
        }
    }

    /// Basename for files, host + path (+ query) for urls
    pub fn short_display_name(&self) -> String {
        match self {
            FileTarget::LocalPath(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| path.to_string_lossy().to_string()),
            FileTarget::RemoteUrl(url) => {
                let mut short = format!("{}{}", url.host_str().unwrap_or_default(), url.path());
                if let Some(query) = url.query() {
                    short.push('?');
                    short.push_str(query);
                }
                short
            }
        }
    }
}

/// A file or url attached to a project, with an optional opener program
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectFile {
    title: String,
    target: FileTarget,
    program_to_open: Option<PathBuf>,
    project_id: ProjectId,
}

impl ProjectFile {
    pub fn new(
        title: &str,
        target: FileTarget,
        program_to_open: Option<PathBuf>,
        project_id: ProjectId,
    ) -> Result<Self, ModelError> {
        let title = validate_field("file title", title)?;
        Ok(Self {
            title: title.to_string(),
            target: target.validated()?,
            program_to_open: resolve_program(program_to_open)?,
            project_id,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn target(&self) -> &FileTarget {
        &self.target
    }

    pub fn program_to_open(&self) -> Option<&Path> {
        self.program_to_open.as_deref()
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn short_display_name(&self) -> String {
        self.target.short_display_name()
    }

    pub fn set_title(&mut self, title: &str) -> Result<(), ModelError> {
        let title = validate_field("file title", title)?;
        self.title = title.to_string();
        Ok(())
    }

    pub fn change_target(&mut self, target: FileTarget) -> Result<(), ModelError> {
        self.target = target.validated()?;
        Ok(())
    }

    /// `None` means "use the OS default handler"
    pub fn set_program_to_open(&mut self, program: Option<PathBuf>) -> Result<(), ModelError> {
        self.program_to_open = resolve_program(program)?;
        Ok(())
    }
}

// ============================================================================
// Projects
// ============================================================================

/// Top-level unit of organization; exclusively owns its logs and files
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    id: ProjectId,
    name: String,
    completed_logs: Vec<ProjectLog>,
    incomplete_log: Option<ProjectLog>,
    files: Vec<ProjectFile>,
}

impl Project {
    pub fn new(id: ProjectId, name: &str) -> Result<Self, ModelError> {
        let name = validate_field("project name", name)?;
        Ok(Self {
            id,
            name: name.to_string(),
            completed_logs: Vec::new(),
            incomplete_log: None,
            files: Vec::new(),
        })
    }

    pub fn id(&self) -> ProjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Change the name, returning the previous one. The caller is responsible for
    /// migrating the backing files (see `ProjectStore::rename_project`).
    pub fn set_name(&mut self, name: &str) -> Result<String, ModelError> {
        let name = validate_field("project name", name)?;
        Ok(std::mem::replace(&mut self.name, name.to_string()))
    }

    pub fn completed_logs(&self) -> &[ProjectLog] {
        &self.completed_logs
    }

    pub fn incomplete_log(&self) -> Option<&ProjectLog> {
        self.incomplete_log.as_ref()
    }

    pub fn files(&self) -> &[ProjectFile] {
        &self.files
    }

    /// Incomplete log first, then completed logs in display order
    pub fn logs(&self) -> impl Iterator<Item = &ProjectLog> {
        self.incomplete_log.iter().chain(self.completed_logs.iter())
    }

    pub fn log(&self, id: LogId) -> Option<&ProjectLog> {
        self.logs().find(|log| log.id == id)
    }

    pub fn log_mut(&mut self, id: LogId) -> Option<&mut ProjectLog> {
        if self.incomplete_log.as_ref().is_some_and(|log| log.id == id) {
            return self.incomplete_log.as_mut();
        }
        self.completed_logs.iter_mut().find(|log| log.id == id)
    }

    fn check_owner(&self, what: &'static str, owner: ProjectId) -> Result<(), ModelError> {
        if owner != self.id {
            return Err(ModelError::WrongProject {
                what,
                owner,
                project: self.id,
            });
        }
        Ok(())
    }

    /// Install the project's single incomplete log
    pub fn set_incomplete_log(&mut self, log: ProjectLog) -> Result<(), ModelError> {
        self.check_owner("log", log.project_id())?;
        if log.is_complete() {
            return Err(ModelError::LogAlreadyComplete { id: log.id });
        }
        if let Some(existing) = &self.incomplete_log {
            if existing.id != log.id {
                return Err(ModelError::IncompleteLogExists {
                    project: self.name.clone(),
                    existing: existing.id,
                });
            }
        }
        self.incomplete_log = Some(log);
        Ok(())
    }

    pub fn add_completed_log(&mut self, log: ProjectLog) -> Result<(), ModelError> {
        self.check_owner("log", log.project_id())?;
        if !log.is_complete() {
            return Err(ModelError::LogNotComplete { id: log.id });
        }
        self.completed_logs.push(log);
        Ok(())
    }

    /// Stamp the incomplete log with `end` and move it into the completed logs
    pub fn finish_incomplete_log(&mut self, end: NaiveDateTime) -> Result<&ProjectLog, ModelError> {
        let Some(mut log) = self.incomplete_log.take() else {
            return Err(ModelError::NoIncompleteLog {
                project: self.name.clone(),
            });
        };
        log.end = Some(end);
        self.completed_logs.push(log);
        self.completed_logs
            .last()
            .ok_or_else(|| ModelError::NoIncompleteLog {
                project: self.name.clone(),
            })
    }

    /// Remove a log by id, clearing the incomplete slot if it was that log
    pub fn remove_log(&mut self, id: LogId) -> Option<ProjectLog> {
        if self.incomplete_log.as_ref().is_some_and(|log| log.id == id) {
            return self.incomplete_log.take();
        }
        let index = self.completed_logs.iter().position(|log| log.id == id)?;
        Some(self.completed_logs.remove(index))
    }

    pub fn add_file(&mut self, file: ProjectFile) -> Result<(), ModelError> {
        self.check_owner("file", file.project_id())?;
        self.files.push(file);
        Ok(())
    }

    pub fn remove_file(&mut self, file: &ProjectFile) -> bool {
        match self.files.iter().position(|f| f == file) {
            Some(index) => {
                self.files.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn file(&self, title: &str) -> Option<&ProjectFile> {
        self.files.iter().find(|file| file.title == title)
    }

    pub fn file_mut(&mut self, title: &str) -> Option<&mut ProjectFile> {
        self.files.iter_mut().find(|file| file.title == title)
    }

    /// Newest start first
    pub fn sort_completed_logs(&mut self) {
        self.completed_logs
            .sort_by(|a, b| b.start.cmp(&a.start).then(b.id.cmp(&a.id)));
    }

    pub fn sort_files(&mut self) {
        self.files.sort_by(|a, b| a.title.cmp(&b.title));
    }

    /// Sum of completed log durations; the incomplete log does not count
    pub fn total_time(&self) -> Duration {
        self.completed_logs
            .iter()
            .filter_map(ProjectLog::duration)
            .fold(Duration::zero(), |acc, d| acc + d)
    }
}
