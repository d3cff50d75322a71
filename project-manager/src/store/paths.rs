//! Data-directory layout and per-project file naming
//!
//! Per-project files are named `{id}_{sanitized name}_{suffix}.txt` under one
//! subdirectory per kind, so renaming a project moves its files. Paths are always
//! computed from the current data directory and never cached.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::store::ids::ProjectId;

/// Characters that are illegal in a filename on at least one supported platform
static ILLEGAL_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).unwrap());

pub const BACKUP_DIR_NAME: &str = "backup";

/// The three files every project owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectFileKind {
    Logs,
    Notes,
    Files,
}

impl ProjectFileKind {
    pub const ALL: [ProjectFileKind; 3] = [
        ProjectFileKind::Logs,
        ProjectFileKind::Notes,
        ProjectFileKind::Files,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            ProjectFileKind::Logs => "logs",
            ProjectFileKind::Notes => "notes",
            ProjectFileKind::Files => "files",
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            ProjectFileKind::Logs => "logs",
            ProjectFileKind::Notes => "notes",
            ProjectFileKind::Files => "files",
        }
    }
}

impl std::fmt::Display for ProjectFileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.suffix())
    }
}

/// Strip characters that cannot appear in a filename
pub fn sanitize_name(name: &str) -> String {
    ILLEGAL_FILENAME_CHARS.replace_all(name, "").to_string()
}

/// Layout of one data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_list_file(&self) -> PathBuf {
        self.root.join("projects.txt")
    }

    pub fn common_notes_file(&self) -> PathBuf {
        self.root.join("notes.txt")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.root.join(BACKUP_DIR_NAME)
    }

    pub fn backup_id_file(&self) -> PathBuf {
        self.backup_dir().join("backup_id.txt")
    }

    pub fn backup_target(&self, backup_id: u32) -> PathBuf {
        self.backup_dir().join(format!("backup_{}", backup_id))
    }

    /// Subdirectories that must exist under the root
    pub fn required_dirs(&self) -> Vec<PathBuf> {
        ProjectFileKind::ALL
            .iter()
            .map(|kind| self.root.join(kind.dir_name()))
            .chain(std::iter::once(self.backup_dir()))
            .collect()
    }

    /// Path of one of a project's files, by id and (unsanitized) name
    pub fn project_file(&self, kind: ProjectFileKind, id: ProjectId, name: &str) -> PathBuf {
        self.root.join(kind.dir_name()).join(format!(
            "{}_{}_{}.txt",
            id,
            sanitize_name(name),
            kind.suffix()
        ))
    }
}
