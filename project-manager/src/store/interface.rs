//! The project store: single owner of settings, templates, ids and projects, and the
//! only code that touches the data directory.
//!
//! Opening is two-phase. [`ProjectStore::open`] reads settings and templates and
//! makes sure the data directory structure exists; [`ProjectStore::load`] then reads
//! the project list and every project's records, and resolves hidden projects.
//!
//! Expected failures (bad rows, missing or locked files, rejected mutations) are
//! recorded in [`Diagnostics`] and the operation degrades: reads come back empty,
//! writes are abandoned, mutations become no-ops. Return values (`bool`, `Option`)
//! say whether the operation took effect.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::store::codec::{
    format_file_row, format_log_body, format_project_row, parse_file_row, parse_log_lines,
    parse_project_row, read_logical_lines, truncate_to_seconds,
};
use crate::store::config::Config;
use crate::store::diagnostics::{Diagnostics, Severity};
use crate::store::ids::{IdAllocator, LogId, ProjectId};
use crate::store::model::{
    resolve_program, validate_field, FileTarget, ModelError, Project, ProjectFile, ProjectLog,
};
use crate::store::organizer::{Projects, Summary};
use crate::store::paths::{DataPaths, ProjectFileKind};
use crate::store::persistence::{
    atomic_write, copy_dir_recursive, create_file, remove_file_if_exists, StoreError,
};
use crate::store::settings::{keys, Settings, SettingsError};
use crate::store::templates::{
    files_header, logs_header, TemplateKind, Templates, BACKUP_ID_SEED, PROJECT_LIST_HEADER,
};

/// Format of the stamp appended to notes files
pub const NOTES_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Fields of a log to change; `None` leaves a field as it is
#[derive(Debug, Clone, Default)]
pub struct LogEdit {
    pub start: Option<NaiveDateTime>,
    /// Only valid for completed logs
    pub end: Option<NaiveDateTime>,
    pub description: Option<String>,
}

/// Fields of a file entry to change; `None` leaves a field as it is
#[derive(Debug, Clone, Default)]
pub struct FileEdit {
    pub title: Option<String>,
    pub target: Option<FileTarget>,
    /// `Some(None)` resets to the OS default handler
    pub program_to_open: Option<Option<PathBuf>>,
}

pub struct ProjectStore {
    config: Config,
    settings: Settings,
    templates: Templates,
    ids: IdAllocator,
    projects: Projects,
    diagnostics: Diagnostics,
}

impl ProjectStore {
    // ========================================================================
    // Setup
    // ========================================================================

    /// Phase one: settings, templates and the data directory structure
    pub fn open(config: Config) -> Self {
        let mut diagnostics = Diagnostics::new();

        if let Err(e) = config.ensure_dirs() {
            diagnostics.log(
                Severity::High,
                format!(
                    "Could not create runtime directory {}:\n{}",
                    config.runtime_dir.display(),
                    e
                ),
            );
        }

        let settings_file = config.settings_file();
        let defaults = Settings::new(config.default_data_dir());
        if let Err(e) = create_file(&settings_file, &defaults.to_file_contents(), false) {
            diagnostics.log(Severity::High, format!("Could not create settings file:\n{}", e));
        }
        let settings = Settings::load(&settings_file, config.default_data_dir(), &mut diagnostics);

        let templates_dir = config.templates_dir();
        for kind in TemplateKind::ALL {
            if let Err(e) = create_file(&kind.path_in(&templates_dir), kind.default_template(), false)
            {
                diagnostics.log(
                    Severity::Moderate,
                    format!("Could not create template file:\n{}", e),
                );
            }
        }
        let templates = Templates::load(&templates_dir, settings.use_custom_templates, &mut diagnostics);

        let mut store = Self {
            config,
            settings,
            templates,
            ids: IdAllocator::new(),
            projects: Projects::new(),
            diagnostics,
        };
        store.verify_data_directory();

        tracing::debug!(
            data_dir = %store.settings.data_directory.display(),
            "Opened project store"
        );
        store
    }

    /// Create the data directory, its subdirectories and the fixed files if missing
    fn verify_data_directory(&mut self) -> bool {
        let paths = self.data_paths();

        for dir in std::iter::once(paths.root().to_path_buf()).chain(paths.required_dirs()) {
            if let Err(e) = fs::create_dir_all(&dir) {
                self.diagnostics.log(
                    Severity::High,
                    format!("Could not create directory {}:\n{}", dir.display(), e),
                );
                return false;
            }
        }

        let fixed_files = [
            (paths.project_list_file(), PROJECT_LIST_HEADER.to_string()),
            (paths.common_notes_file(), self.templates.common_notes_header()),
            (paths.backup_id_file(), BACKUP_ID_SEED.to_string()),
        ];
        let mut ok = true;
        for (path, contents) in fixed_files {
            if let Err(e) = create_file(&path, &contents, false) {
                self.diagnostics.log(Severity::High, format!("Could not create file:\n{}", e));
                ok = false;
            }
        }
        ok
    }

    /// Phase two: read the project list and every project's records.
    /// Returns the number of projects loaded.
    pub fn load(&mut self) -> usize {
        self.projects.clear();
        let list_file = self.data_paths().project_list_file();

        for line in read_logical_lines(&list_file, &mut self.diagnostics) {
            let (id, name) = match parse_project_row(&line) {
                Ok(row) => row,
                Err(e) => {
                    self.diagnostics.log(e.severity(), e.to_string());
                    continue;
                }
            };
            if self.projects.contains(id) {
                self.diagnostics.log(
                    Severity::High,
                    format!("Duplicate project id {} in line '{}'. Skipping entry.", id, line),
                );
                continue;
            }
            match Project::new(id, &name) {
                Ok(project) => {
                    self.ids.observe_project(id);
                    self.projects.insert(project);
                }
                Err(e) => self
                    .diagnostics
                    .log(Severity::High, format!("{}. Skipping entry.", e)),
            }
        }

        for id in self.projects.ids() {
            self.create_files_for_project(id, false);
            self.load_logs(id);
            self.load_files(id);
        }

        let projects = &self.projects;
        self.settings
            .resolve_hidden(|id| projects.contains(id), &mut self.diagnostics);

        tracing::info!(projects = self.projects.len(), "Loaded projects");
        self.projects.len()
    }

    fn load_logs(&mut self, id: ProjectId) {
        let Some(path) = self.get_path(id, ProjectFileKind::Logs) else {
            return;
        };
        let lines = read_logical_lines(&path, &mut self.diagnostics);
        let parsed = parse_log_lines(lines.iter().map(String::as_str), id);

        for e in &parsed.errors {
            self.diagnostics
                .log(e.severity(), format!("{}: {}", path.display(), e));
        }

        let Some(project) = self.projects.get_mut(id) else {
            return;
        };
        let logs = parsed
            .incomplete
            .into_iter()
            .chain(parsed.completed);
        for log in logs {
            if project.log(log.id()).is_some() {
                self.diagnostics.log(
                    Severity::High,
                    format!(
                        "{}: Duplicate log id {}. Skipping entry.",
                        path.display(),
                        log.id()
                    ),
                );
                continue;
            }
            self.ids.observe_log(id, log.id());
            let result = if log.is_complete() {
                project.add_completed_log(log)
            } else {
                project.set_incomplete_log(log)
            };
            if let Err(e) = result {
                self.diagnostics.log(Severity::High, e.to_string());
            }
        }
        project.sort_completed_logs();
    }

    fn load_files(&mut self, id: ProjectId) {
        let Some(path) = self.get_path(id, ProjectFileKind::Files) else {
            return;
        };
        let lines = read_logical_lines(&path, &mut self.diagnostics);

        let Some(project) = self.projects.get_mut(id) else {
            return;
        };
        for line in &lines {
            match parse_file_row(line, id) {
                Ok(file) if project.file(file.title()).is_some() => self.diagnostics.log(
                    Severity::High,
                    format!(
                        "{}: Duplicate file title '{}'. Skipping entry.",
                        path.display(),
                        file.title()
                    ),
                ),
                Ok(file) => {
                    if let Err(e) = project.add_file(file) {
                        self.diagnostics.log(Severity::High, e.to_string());
                    }
                }
                Err(e) => self
                    .diagnostics
                    .log(e.severity(), format!("{}: {}", path.display(), e)),
            }
        }
        project.sort_files();
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    pub fn projects(&self) -> &Projects {
        &self.projects
    }

    pub fn project(&self, id: ProjectId) -> Option<&Project> {
        self.projects.get(id)
    }

    /// Projects in the configured display order
    pub fn sorted_projects(&self) -> Vec<&Project> {
        self.projects.sorted(self.settings.sorting_method)
    }

    pub fn projects_with_incomplete_logs(&self) -> Vec<&Project> {
        self.projects
            .iter()
            .filter(|p| p.incomplete_log().is_some())
            .collect()
    }

    pub fn summary(&self) -> Summary {
        self.projects.summary(&self.settings)
    }

    /// Next unused project id. `None` (logged at HIGH) once the id range is used up.
    pub fn request_project_id(&mut self) -> Option<ProjectId> {
        let id = self.ids.request_project_id();
        if id.is_none() {
            self.diagnostics
                .log(Severity::High, ModelError::IdsExhausted("project").to_string());
        }
        id
    }

    /// Next unused log id for `project`. `None` (logged at HIGH) once the id range
    /// is used up.
    pub fn request_log_id(&mut self, project: ProjectId) -> Option<LogId> {
        let id = self.ids.request_log_id(project);
        if id.is_none() {
            self.diagnostics
                .log(Severity::High, ModelError::IdsExhausted("log").to_string());
        }
        id
    }

    // ========================================================================
    // Paths
    // ========================================================================

    /// Layout of the current data directory
    pub fn data_paths(&self) -> DataPaths {
        DataPaths::new(&self.settings.data_directory)
    }

    /// Path of one of a project's files, or `None` for an unknown project
    pub fn get_path(&self, id: ProjectId, kind: ProjectFileKind) -> Option<PathBuf> {
        let project = self.projects.get(id)?;
        Some(self.data_paths().project_file(kind, id, project.name()))
    }

    // ========================================================================
    // Per-project files
    // ========================================================================

    /// Make sure the project's three files exist, each starting with its header.
    /// Existing files are only replaced when `overwrite` is set.
    pub fn create_files_for_project(&mut self, id: ProjectId, overwrite: bool) -> bool {
        let Some(name) = self.project_name(id, "create files") else {
            return false;
        };
        let paths = self.data_paths();
        let notes_header = self.templates.project_notes_header(&name, &mut self.diagnostics);

        let files = [
            (ProjectFileKind::Logs, logs_header(&name, id)),
            (ProjectFileKind::Notes, notes_header),
            (ProjectFileKind::Files, files_header(&name, id)),
        ];

        let mut ok = true;
        for (kind, contents) in files {
            let path = paths.project_file(kind, id, &name);
            if let Err(e) = create_file(&path, &contents, overwrite) {
                self.diagnostics.log(
                    Severity::High,
                    format!("Could not create {} file for project '{}':\n{}", kind, name, e),
                );
                ok = false;
            }
        }
        ok
    }

    /// Rename a project and migrate its files to the new name
    pub fn rename_project(&mut self, id: ProjectId, new_name: &str) -> bool {
        let result = match self.projects.get_mut(id) {
            Some(project) => project.set_name(new_name),
            None => {
                self.log_unknown_project(id, "rename project");
                return false;
            }
        };
        let old_name = match result {
            Ok(old_name) => old_name,
            Err(e) => {
                self.diagnostics
                    .log(Severity::High, format!("Cannot rename project {}: {}", id, e));
                return false;
            }
        };
        if old_name == new_name.trim() {
            return true;
        }

        let migrated = self.rename_project_files(id, &old_name);
        self.write_project_list_file() && migrated
    }

    /// Move a project's files from the paths for `old_name` to the paths for its
    /// current name. The notes header is swapped; logs and files are rewritten from
    /// memory. New files are written before the old ones are deleted, and the old
    /// ones are kept if any write fails. Not transactional.
    pub fn rename_project_files(&mut self, id: ProjectId, old_name: &str) -> bool {
        let Some(new_name) = self.project_name(id, "rename project files") else {
            return false;
        };
        let paths = self.data_paths();

        let old_notes = paths.project_file(ProjectFileKind::Notes, id, old_name);
        let old_header = self.templates.project_notes_header(old_name, &mut self.diagnostics);
        let new_header = self.templates.project_notes_header(&new_name, &mut self.diagnostics);

        let notes_text = match fs::read_to_string(&old_notes) {
            Ok(text) => {
                let body = text.strip_prefix(old_header.as_str()).unwrap_or(text.as_str());
                format!("{}{}", new_header, body)
            }
            Err(e) => {
                self.diagnostics.log(
                    Severity::High,
                    format!(
                        "Could not read project '{}' old notes file after name change:\n{}",
                        new_name, e
                    ),
                );
                new_header
            }
        };

        let new_notes = paths.project_file(ProjectFileKind::Notes, id, &new_name);
        let mut written = match atomic_write(&new_notes, &notes_text) {
            Ok(()) => true,
            Err(e) => {
                self.diagnostics.log(
                    Severity::High,
                    format!(
                        "Error writing to new project '{}' file after name change:\n{}\n\nProject Notes:\n{}",
                        new_name, e, notes_text
                    ),
                );
                false
            }
        };
        written &= self.write_logs_for_project(id);
        written &= self.write_files_for_project(id);

        if !written {
            self.diagnostics.log(
                Severity::High,
                format!(
                    "Keeping old files of project '{}' because the new files could not be written.",
                    new_name
                ),
            );
            return false;
        }

        for kind in ProjectFileKind::ALL {
            let old_path = paths.project_file(kind, id, old_name);
            if old_path == paths.project_file(kind, id, &new_name) {
                continue;
            }
            if let Err(e) = remove_file_if_exists(&old_path) {
                self.diagnostics.log(
                    Severity::Moderate,
                    format!(
                        "Could not delete old project '{}' file after name change:\n{}",
                        new_name, e
                    ),
                );
            }
        }

        tracing::info!(project = id, from = old_name, to = %new_name, "Renamed project files");
        true
    }

    /// Best-effort delete of a project's three files
    pub fn delete_files_for_project(&mut self, id: ProjectId) -> bool {
        let Some(name) = self.project_name(id, "delete files") else {
            return false;
        };
        let paths = self.data_paths();

        let mut ok = true;
        for kind in ProjectFileKind::ALL {
            if let Err(e) = remove_file_if_exists(&paths.project_file(kind, id, &name)) {
                self.diagnostics.log(
                    Severity::Moderate,
                    format!("Could not delete files for project '{}':\n{}", name, e),
                );
                ok = false;
            }
        }
        ok
    }

    // ========================================================================
    // Whole-file writes
    // ========================================================================

    /// Rewrite the project list from memory, ordered by id
    pub fn write_project_list_file(&mut self) -> bool {
        let mut contents = PROJECT_LIST_HEADER.to_string();
        for project in self.projects.iter() {
            contents.push_str(&format_project_row(project));
        }
        let path = self.data_paths().project_list_file();
        self.write_or_log(&path, &contents, "project list")
    }

    /// Rewrite a project's log file: incomplete block first, then completed logs
    pub fn write_logs_for_project(&mut self, id: ProjectId) -> bool {
        let Some(project) = self.projects.get(id) else {
            self.log_unknown_project(id, "write logs");
            return false;
        };
        let contents = format!(
            "{}{}",
            logs_header(project.name(), id),
            format_log_body(project)
        );
        let path = self.data_paths().project_file(ProjectFileKind::Logs, id, project.name());
        self.write_or_log(&path, &contents, "logs")
    }

    pub fn write_files_for_project(&mut self, id: ProjectId) -> bool {
        let Some(project) = self.projects.get(id) else {
            self.log_unknown_project(id, "write files");
            return false;
        };
        let mut contents = files_header(project.name(), id);
        for file in project.files() {
            contents.push_str(&format_file_row(file));
        }
        let path = self.data_paths().project_file(ProjectFileKind::Files, id, project.name());
        self.write_or_log(&path, &contents, "files")
    }

    /// Project list plus every project's logs and files
    pub fn write_all_project_data(&mut self) -> bool {
        let mut ok = self.write_project_list_file();
        for id in self.projects.ids() {
            ok &= self.write_logs_for_project(id);
            ok &= self.write_files_for_project(id);
        }
        ok
    }

    pub fn save_settings(&mut self) -> bool {
        let contents = self.settings.to_file_contents();
        let path = self.config.settings_file();
        self.write_or_log(&path, &contents, "settings")
    }

    fn write_or_log(&mut self, path: &Path, contents: &str, what: &str) -> bool {
        match atomic_write(path, contents) {
            Ok(()) => true,
            Err(e) => {
                self.diagnostics
                    .log(Severity::High, format!("Error writing {} file:\n{}", what, e));
                false
            }
        }
    }

    // ========================================================================
    // Projects
    // ========================================================================

    /// Create a project with a fresh id and its three files
    pub fn create_project(&mut self, name: &str) -> Option<ProjectId> {
        if let Err(e) = validate_field("project name", name) {
            self.diagnostics
                .log(Severity::High, format!("Cannot create project: {}", e));
            return None;
        }

        let id = self.request_project_id()?;
        let project = match Project::new(id, name) {
            Ok(project) => project,
            Err(e) => {
                self.diagnostics
                    .log(Severity::High, format!("Cannot create project: {}", e));
                return None;
            }
        };
        self.projects.insert(project);

        self.create_files_for_project(id, true);
        self.write_project_list_file();
        tracing::info!(project = id, name, "Created project");
        Some(id)
    }

    /// Delete a project and its files, and un-hide it
    pub fn remove_project(&mut self, id: ProjectId) -> Option<Project> {
        if !self.projects.contains(id) {
            self.log_unknown_project(id, "remove project");
            return None;
        }

        self.delete_files_for_project(id);
        let removed = self.projects.remove(id);
        if self.settings.unhide(id) {
            self.save_settings();
        }
        self.write_project_list_file();
        removed
    }

    /// Returns the number of projects removed
    pub fn remove_all_projects(&mut self) -> usize {
        let ids = self.projects.ids();
        for id in &ids {
            self.remove_project(*id);
        }
        ids.len()
    }

    pub fn hide(&mut self, id: ProjectId) -> bool {
        if !self.projects.contains(id) {
            self.log_unknown_project(id, "hide project");
            return false;
        }
        self.settings.hide(id);
        self.save_settings()
    }

    /// Returns false if the project was not hidden
    pub fn unhide(&mut self, id: ProjectId) -> bool {
        if !self.settings.unhide(id) {
            return false;
        }
        self.save_settings()
    }

    // ========================================================================
    // Logs
    // ========================================================================

    /// Start the project's incomplete log at `now`
    pub fn start_log(
        &mut self,
        id: ProjectId,
        description: &str,
        now: NaiveDateTime,
    ) -> Option<LogId> {
        let start = truncate_to_seconds(now);
        let log_id = self.mutate_project(id, "start log", |project, ids| {
            if let Some(existing) = project.incomplete_log() {
                return Err(ModelError::IncompleteLogExists {
                    project: project.name().to_string(),
                    existing: existing.id(),
                });
            }
            validate_field("log description", description)?;
            let log_id = ids
                .request_log_id(id)
                .ok_or(ModelError::IdsExhausted("log"))?;
            let log = ProjectLog::incomplete(log_id, id, start, description)?;
            project.set_incomplete_log(log)?;
            Ok(log_id)
        })?;

        self.write_logs_for_project(id);
        Some(log_id)
    }

    /// Finish the project's incomplete log at `now`. Finishing when nothing is
    /// running is logged at LOW and does nothing.
    pub fn finish_log(&mut self, id: ProjectId, now: NaiveDateTime) -> Option<LogId> {
        let end = truncate_to_seconds(now);
        let project = match self.projects.get(id) {
            Some(project) => project,
            None => {
                self.log_unknown_project(id, "finish log");
                return None;
            }
        };
        if project.incomplete_log().is_none() {
            let message = format!("Project '{}' has no incomplete log to finish.", project.name());
            self.diagnostics.log(Severity::Low, message);
            return None;
        }

        let log_id = self.mutate_project(id, "finish log", |project, _| {
            let log_id = project.finish_incomplete_log(end)?.id();
            project.sort_completed_logs();
            Ok(log_id)
        })?;

        self.write_logs_for_project(id);
        Some(log_id)
    }

    /// Record a log that already has both ends
    pub fn add_completed_log(
        &mut self,
        id: ProjectId,
        start: NaiveDateTime,
        end: NaiveDateTime,
        description: &str,
    ) -> Option<LogId> {
        let (start, end) = (truncate_to_seconds(start), truncate_to_seconds(end));
        let log_id = self.mutate_project(id, "add log", |project, ids| {
            validate_field("log description", description)?;
            let log_id = ids
                .request_log_id(id)
                .ok_or(ModelError::IdsExhausted("log"))?;
            let log = ProjectLog::complete(log_id, id, start, end, description)?;
            project.add_completed_log(log)?;
            project.sort_completed_logs();
            Ok(log_id)
        })?;

        self.write_logs_for_project(id);
        Some(log_id)
    }

    /// Change a log in place. Nothing changes unless every requested edit is valid.
    pub fn edit_log(&mut self, id: ProjectId, log_id: LogId, edit: LogEdit) -> bool {
        let edited = self.mutate_project(id, "edit log", |project, _| {
            let name = project.name().to_string();
            let log = project.log_mut(log_id).ok_or(ModelError::LogNotFound {
                project: name,
                id: log_id,
            })?;

            if let Some(description) = &edit.description {
                validate_field("log description", description)?;
            }
            if edit.end.is_some() && !log.is_complete() {
                return Err(ModelError::LogNotComplete { id: log_id });
            }

            if let Some(description) = &edit.description {
                log.set_description(description)?;
            }
            if let Some(start) = edit.start {
                log.set_start(truncate_to_seconds(start));
            }
            if let Some(end) = edit.end {
                log.set_end(truncate_to_seconds(end))?;
            }
            project.sort_completed_logs();
            Ok(())
        });

        edited.is_some() && self.write_logs_for_project(id)
    }

    pub fn remove_log(&mut self, id: ProjectId, log_id: LogId) -> Option<ProjectLog> {
        let removed = self.mutate_project(id, "remove log", |project, _| {
            let name = project.name().to_string();
            project.remove_log(log_id).ok_or(ModelError::LogNotFound {
                project: name,
                id: log_id,
            })
        })?;

        self.write_logs_for_project(id);
        Some(removed)
    }

    // ========================================================================
    // File entries
    // ========================================================================

    pub fn add_file(
        &mut self,
        id: ProjectId,
        title: &str,
        target: FileTarget,
        program_to_open: Option<PathBuf>,
    ) -> bool {
        let added = self.mutate_project(id, "add file", |project, _| {
            let file = ProjectFile::new(title, target, program_to_open, id)?;
            if project.file(file.title()).is_some() {
                return Err(ModelError::DuplicateFileTitle {
                    project: project.name().to_string(),
                    title: file.title().to_string(),
                });
            }
            project.add_file(file)?;
            project.sort_files();
            Ok(())
        });

        added.is_some() && self.write_files_for_project(id)
    }

    pub fn remove_file(&mut self, id: ProjectId, title: &str) -> Option<ProjectFile> {
        let removed = self.mutate_project(id, "remove file", |project, _| {
            let file = project
                .file(title)
                .cloned()
                .ok_or_else(|| ModelError::FileNotFound {
                    project: project.name().to_string(),
                    title: title.to_string(),
                })?;
            project.remove_file(&file);
            Ok(file)
        })?;

        self.write_files_for_project(id);
        Some(removed)
    }

    /// Change a file entry in place. Nothing changes unless every requested edit is valid.
    pub fn edit_file(&mut self, id: ProjectId, title: &str, edit: FileEdit) -> bool {
        let edited = self.mutate_project(id, "edit file", |project, _| {
            let name = project.name().to_string();
            if project.file(title).is_none() {
                return Err(ModelError::FileNotFound {
                    project: name,
                    title: title.to_string(),
                });
            }
            if let Some(new_title) = &edit.title {
                let new_title = validate_field("file title", new_title)?;
                if new_title != title && project.file(new_title).is_some() {
                    return Err(ModelError::DuplicateFileTitle {
                        project: name,
                        title: new_title.to_string(),
                    });
                }
            }
            let target = edit.target.map(FileTarget::validated).transpose()?;
            let program = edit.program_to_open.map(resolve_program).transpose()?;

            let file = project.file_mut(title).ok_or(ModelError::FileNotFound {
                project: name,
                title: title.to_string(),
            })?;
            if let Some(new_title) = &edit.title {
                file.set_title(new_title)?;
            }
            if let Some(target) = target {
                file.change_target(target)?;
            }
            if let Some(program) = program {
                file.set_program_to_open(program)?;
            }
            project.sort_files();
            Ok(())
        });

        edited.is_some() && self.write_files_for_project(id)
    }

    // ========================================================================
    // Notes
    // ========================================================================

    /// Rewrite a project's notes file to just its header
    pub fn reset_notes_file(&mut self, id: ProjectId) -> bool {
        let Some(name) = self.project_name(id, "reset notes file") else {
            return false;
        };
        let header = self.templates.project_notes_header(&name, &mut self.diagnostics);
        let path = self.data_paths().project_file(ProjectFileKind::Notes, id, &name);

        match atomic_write(&path, &header) {
            Ok(()) => true,
            Err(e) => {
                self.diagnostics.log(
                    Severity::Moderate,
                    format!("Error resetting project {} notes file:\n{}", name, e),
                );
                false
            }
        }
    }

    /// Make sure a notes file exists (a project's, or the common one for `None`) and
    /// append the timestamp stamp if enabled. Returns the path to open.
    pub fn prepare_notes_file(
        &mut self,
        project: Option<ProjectId>,
        now: NaiveDateTime,
    ) -> Option<PathBuf> {
        let path = match project {
            Some(id) => {
                let Some(path) = self.get_path(id, ProjectFileKind::Notes) else {
                    self.log_unknown_project(id, "open notes file");
                    return None;
                };
                if !path.exists() {
                    self.create_files_for_project(id, false);
                }
                path
            }
            None => {
                let path = self.data_paths().common_notes_file();
                if let Err(e) = create_file(&path, &self.templates.common_notes_header(), false) {
                    self.diagnostics.log(
                        Severity::High,
                        format!("Error creating common notes file:\n{}", e),
                    );
                    return None;
                }
                path
            }
        };

        if self.settings.add_timestamp_to_notes {
            let when = now.format(NOTES_TIMESTAMP_FORMAT).to_string();
            let stamp = self.templates.timestamp(&when, &mut self.diagnostics);
            if let Err(e) = append(&path, &stamp) {
                self.diagnostics.log(
                    Severity::High,
                    format!("Error adding timestamp to notes file:\n{}", e),
                );
            }
        }

        Some(path)
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// Change one setting from user input and save the settings file
    pub fn set_setting(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.settings.set(key, value)?;
        if key == keys::USE_CUSTOM_TEMPLATES {
            self.templates
                .set_use_custom(self.settings.use_custom_templates);
        }
        self.save_settings();
        Ok(())
    }

    // ========================================================================
    // Backups and the data directory
    // ========================================================================

    /// Read, increment and rewrite the backup id file
    pub fn request_backup_id(&mut self) -> Option<u32> {
        let path = self.data_paths().backup_id_file();
        let result = fs::read_to_string(&path)
            .map_err(|e| StoreError::io("read", &path, e))
            .and_then(|text| {
                let last: i64 = text
                    .trim()
                    .parse()
                    .map_err(|_| StoreError::BadBackupId(text.trim().to_string()))?;
                u32::try_from(last + 1).map_err(|_| StoreError::BadBackupId(text.trim().to_string()))
            })
            .and_then(|next| atomic_write(&path, &next.to_string()).map(|()| next));

        match result {
            Ok(next) => Some(next),
            Err(e) => {
                self.diagnostics
                    .log(Severity::High, format!("Could not get backup id:\n{}", e));
                None
            }
        }
    }

    /// Save everything, then copy the data directory into `backup/backup_<id>`.
    /// Returns the backup directory.
    pub fn backup(&mut self) -> Option<PathBuf> {
        self.write_all_project_data();
        let backup_id = self.request_backup_id()?;

        let paths = self.data_paths();
        let target = paths.backup_target(backup_id);
        match copy_dir_recursive(paths.root(), &target, Some(&paths.backup_dir())) {
            Ok(copied) => {
                tracing::info!(files = copied, target = %target.display(), "Backed up data directory");
                Some(target)
            }
            Err(e) => {
                self.diagnostics
                    .log(Severity::High, format!("Could not back up data:\n{}", e));
                None
            }
        }
    }

    /// Copy the whole data directory to `new_dir` and use it from now on
    pub fn change_data_directory(&mut self, new_dir: &Path) -> bool {
        let (old_dir, new_dir) = match (
            std::path::absolute(&self.settings.data_directory),
            std::path::absolute(new_dir),
        ) {
            (Ok(old_dir), Ok(new_dir)) => (old_dir, new_dir),
            (_, Err(e)) | (Err(e), _) => {
                self.diagnostics.log(
                    Severity::High,
                    format!("Could not resolve data directory {}:\n{}", new_dir.display(), e),
                );
                return false;
            }
        };

        if new_dir == old_dir {
            return true;
        }
        if new_dir.starts_with(&old_dir) {
            self.diagnostics.log(
                Severity::High,
                format!(
                    "Cannot move data directory into itself ({} is inside {}).",
                    new_dir.display(),
                    old_dir.display()
                ),
            );
            return false;
        }

        self.write_all_project_data();
        if let Err(e) = copy_dir_recursive(&old_dir, &new_dir, None) {
            self.diagnostics.log(
                Severity::High,
                format!("Could not copy data directory:\n{}", e),
            );
            return false;
        }

        self.settings.data_directory = new_dir;
        self.verify_data_directory();
        tracing::info!(
            from = %old_dir.display(),
            to = %self.settings.data_directory.display(),
            "Changed data directory"
        );
        self.save_settings()
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn project_name(&mut self, id: ProjectId, action: &str) -> Option<String> {
        match self.projects.get(id) {
            Some(project) => Some(project.name().to_string()),
            None => {
                self.log_unknown_project(id, action);
                None
            }
        }
    }

    fn log_unknown_project(&mut self, id: ProjectId, action: &str) {
        self.diagnostics.log(
            Severity::High,
            format!("Cannot {}: no project with id {}", action, id),
        );
    }

    /// Run an in-memory mutation on one project; failures are logged at HIGH
    fn mutate_project<T>(
        &mut self,
        id: ProjectId,
        action: &str,
        mutation: impl FnOnce(&mut Project, &mut IdAllocator) -> Result<T, ModelError>,
    ) -> Option<T> {
        let Some(project) = self.projects.get_mut(id) else {
            self.log_unknown_project(id, action);
            return None;
        };
        match mutation(project, &mut self.ids) {
            Ok(value) => Some(value),
            Err(e) => {
                self.diagnostics
                    .log(Severity::High, format!("Cannot {}: {}", action, e));
                None
            }
        }
    }
}

fn append(path: &Path, text: &str) -> Result<(), StoreError> {
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| StoreError::io("open", path, e))?;
    file.write_all(text.as_bytes())
        .map_err(|e| StoreError::io("append to", path, e))
}
