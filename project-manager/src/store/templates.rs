//! File headers and user-customizable templates
//!
//! Fixed headers (project list, settings, logs, files) are plain comment blocks.
//! The notes headers and the notes timestamp can be overridden by template files in
//! the runtime directory; those use positional `{0}` placeholders with `{{`/`}}`
//! escapes. A custom template that fails to format falls back to the default.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::store::diagnostics::{Diagnostics, Severity};
use crate::store::ids::ProjectId;

pub const PROJECT_LIST_HEADER: &str =
    "# Warning: Do not edit by hand\n#\n# PROJECT LIST FILE\n#\n# Format: id|name\n\n";

pub const SETTINGS_HEADER: &str =
    "# Warning: Do not edit by hand\n#\n# SETTINGS FILE\n#\n# Format: setting|value\n\n";

pub const DEFAULT_COMMON_NOTES_TEMPLATE: &str = "# Common Notes File\n";
pub const DEFAULT_PROJECT_NOTES_TEMPLATE: &str = "# Notes for Project {0}\n";
pub const DEFAULT_TIMESTAMP_TEMPLATE: &str = "\n** {0} **\n\n\n";

/// Initial contents of the backup id file; the first backup gets id 0
pub const BACKUP_ID_SEED: &str = "-1";

pub fn logs_header(project_name: &str, project_id: ProjectId) -> String {
    format!(
        "# Warning: Do not edit by hand\n#\n# LOG FILE\n#\n# Project: {}\n# Id: {}\n#\n# Format: id|start time|end time|description\n\n",
        project_name, project_id
    )
}

pub fn files_header(project_name: &str, project_id: ProjectId) -> String {
    format!(
        "# Warning: Do not edit by hand\n#\n# FILES FILE\n#\n# Project: {}\n# Id: {}\n#\n# Format: file title|file|is file flag|program to open\n\n",
        project_name, project_id
    )
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unmatched '{brace}' at byte {position}")]
    UnmatchedBrace { brace: char, position: usize },

    #[error("placeholder '{{{text}}}' is not a positional index")]
    BadPlaceholder { text: String },

    #[error("placeholder {{{index}}} has no value (only {available} given)")]
    MissingArgument { index: usize, available: usize },
}

/// Substitute `{0}`, `{1}`, ... in `template`
pub fn fill_template(template: &str, args: &[&str]) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((position, c)) = chars.next() {
        match c {
            '{' if chars.peek().map(|(_, next)| *next) == Some('{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek().map(|(_, next)| *next) == Some('}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut text = String::new();
                let mut closed = false;
                for (_, inner) in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    text.push(inner);
                }
                if !closed {
                    return Err(TemplateError::UnmatchedBrace { brace: '{', position });
                }
                let index: usize = text
                    .trim()
                    .parse()
                    .map_err(|_| TemplateError::BadPlaceholder { text: text.clone() })?;
                let value = args.get(index).ok_or(TemplateError::MissingArgument {
                    index,
                    available: args.len(),
                })?;
                out.push_str(value);
            }
            '}' => return Err(TemplateError::UnmatchedBrace { brace: '}', position }),
            other => out.push(other),
        }
    }

    Ok(out)
}

/// The three user-overridable templates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    CommonNotes,
    ProjectNotes,
    TimeStamp,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 3] = [
        TemplateKind::CommonNotes,
        TemplateKind::ProjectNotes,
        TemplateKind::TimeStamp,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            TemplateKind::CommonNotes => "commonNotesFileTemplate.txt",
            TemplateKind::ProjectNotes => "projectNotesFileTemplate.txt",
            TemplateKind::TimeStamp => "timeStampTemplate.txt",
        }
    }

    pub fn default_template(self) -> &'static str {
        match self {
            TemplateKind::CommonNotes => DEFAULT_COMMON_NOTES_TEMPLATE,
            TemplateKind::ProjectNotes => DEFAULT_PROJECT_NOTES_TEMPLATE,
            TemplateKind::TimeStamp => DEFAULT_TIMESTAMP_TEMPLATE,
        }
    }

    pub fn path_in(self, templates_dir: &Path) -> PathBuf {
        templates_dir.join(self.file_name())
    }
}

/// Loaded custom templates plus the toggle that enables them
#[derive(Debug, Clone, Default)]
pub struct Templates {
    common_notes: Option<String>,
    project_notes: Option<String>,
    timestamp: Option<String>,
    use_custom: bool,
}

impl Templates {
    /// Read whichever template files exist. Missing or unreadable files are logged
    /// at MODERATE and the default is used for that kind.
    pub fn load(templates_dir: &Path, use_custom: bool, diag: &mut Diagnostics) -> Self {
        let mut templates = Self {
            use_custom,
            ..Self::default()
        };

        for kind in TemplateKind::ALL {
            let path = kind.path_in(templates_dir);
            let loaded = match fs::read_to_string(&path) {
                Ok(text) => Some(text),
                Err(e) => {
                    diag.log(
                        Severity::Moderate,
                        format!("Failed to load template from file {}:\n{}", path.display(), e),
                    );
                    None
                }
            };
            match kind {
                TemplateKind::CommonNotes => templates.common_notes = loaded,
                TemplateKind::ProjectNotes => templates.project_notes = loaded,
                TemplateKind::TimeStamp => templates.timestamp = loaded,
            }
        }

        templates
    }

    pub fn set_use_custom(&mut self, use_custom: bool) {
        self.use_custom = use_custom;
    }

    fn custom(&self, kind: TemplateKind) -> Option<&str> {
        if !self.use_custom {
            return None;
        }
        match kind {
            TemplateKind::CommonNotes => self.common_notes.as_deref(),
            TemplateKind::ProjectNotes => self.project_notes.as_deref(),
            TemplateKind::TimeStamp => self.timestamp.as_deref(),
        }
    }

    /// Header of the shared notes file. Not formatted, so it cannot fail.
    pub fn common_notes_header(&self) -> String {
        self.custom(TemplateKind::CommonNotes)
            .unwrap_or(DEFAULT_COMMON_NOTES_TEMPLATE)
            .to_string()
    }

    pub fn project_notes_header(&self, project_name: &str, diag: &mut Diagnostics) -> String {
        self.render(TemplateKind::ProjectNotes, project_name, diag)
    }

    /// Stamp appended to a notes file when it is opened
    pub fn timestamp(&self, when: &str, diag: &mut Diagnostics) -> String {
        self.render(TemplateKind::TimeStamp, when, diag)
    }

    fn render(&self, kind: TemplateKind, value: &str, diag: &mut Diagnostics) -> String {
        if let Some(custom) = self.custom(kind) {
            match fill_template(custom, &[value]) {
                Ok(text) => return text,
                Err(e) => diag.log(
                    Severity::Low,
                    format!(
                        "Error formatting custom template {}: {}. Using default template instead.",
                        kind.file_name(),
                        e
                    ),
                ),
            }
        }
        // Built-in templates are well-formed
        fill_template(kind.default_template(), &[value]).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_template() {
        assert_eq!(
            fill_template("# Notes for Project {0}\n", &["Alpha"]).unwrap(),
            "# Notes for Project Alpha\n"
        );
        assert_eq!(fill_template("{{{0}}}", &["x"]).unwrap(), "{x}");
        assert_eq!(fill_template("{1}-{0}", &["a", "b"]).unwrap(), "b-a");
    }

    #[test]
    fn test_fill_template_errors() {
        assert!(matches!(
            fill_template("{0", &["x"]),
            Err(TemplateError::UnmatchedBrace { brace: '{', .. })
        ));
        assert!(matches!(
            fill_template("0}", &["x"]),
            Err(TemplateError::UnmatchedBrace { brace: '}', .. })
        ));
        assert!(matches!(
            fill_template("{name}", &["x"]),
            Err(TemplateError::BadPlaceholder { .. })
        ));
        assert!(matches!(
            fill_template("{2}", &["x"]),
            Err(TemplateError::MissingArgument { index: 2, available: 1 })
        ));
    }

    #[test]
    fn test_custom_template_used_only_when_enabled() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            TemplateKind::ProjectNotes.path_in(dir.path()),
            "== {0} ==\n",
        )
        .unwrap();

        let mut diag = Diagnostics::new();
        let mut templates = Templates::load(dir.path(), true, &mut diag);
        // Two of the three files are missing
        assert_eq!(diag.count(Severity::Moderate), 2);
        assert_eq!(templates.project_notes_header("Alpha", &mut diag), "== Alpha ==\n");

        templates.set_use_custom(false);
        assert_eq!(
            templates.project_notes_header("Alpha", &mut diag),
            "# Notes for Project Alpha\n"
        );
    }

    #[test]
    fn test_broken_custom_template_falls_back() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(TemplateKind::TimeStamp.path_in(dir.path()), "** {0 **").unwrap();

        let mut diag = Diagnostics::new();
        let templates = Templates::load(dir.path(), true, &mut diag);
        diag.take();

        assert_eq!(templates.timestamp("noon", &mut diag), "\n** noon **\n\n\n");
        assert_eq!(diag.count(Severity::Low), 1);
    }

    #[test]
    fn test_headers_embed_name_and_id() {
        let header = logs_header("Alpha", 3);
        assert!(header.contains("# Project: Alpha\n# Id: 3\n"));
        assert!(header.ends_with("\n\n"));
        assert!(files_header("Alpha", 3).contains("# FILES FILE"));
    }
}
