// Flat-file project store
// Projects, their time logs and attached files, persisted as pipe-delimited text
// files under a configurable data directory.

pub mod codec;
pub mod config;
pub mod diagnostics;
pub mod ids;
pub mod interface;
pub mod model;
pub mod organizer;
pub mod paths;
pub mod persistence;
pub mod settings;
pub mod templates;

pub use config::Config;
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use ids::{LogId, ProjectId};
pub use interface::{FileEdit, LogEdit, ProjectStore};
pub use model::{FileTarget, ModelError, Project, ProjectFile, ProjectLog};
pub use organizer::{format_duration, Projects, Summary, SummaryRow};
pub use paths::ProjectFileKind;
pub use settings::{Settings, SettingsError, SortingMethod};
