// In-memory project arena and the views built on it (sorted list, time summary)

use std::collections::BTreeMap;

use chrono::Duration;
use serde::Serialize;

use crate::store::ids::ProjectId;
use crate::store::model::Project;
use crate::store::settings::{Settings, SortingMethod};

/// All loaded projects, keyed by id
#[derive(Debug, Clone, Default)]
pub struct Projects {
    by_id: BTreeMap<ProjectId, Project>,
}

impl Projects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a project, returning any project previously stored under its id
    pub fn insert(&mut self, project: Project) -> Option<Project> {
        self.by_id.insert(project.id(), project)
    }

    pub fn get(&self, id: ProjectId) -> Option<&Project> {
        self.by_id.get(&id)
    }

    pub fn get_mut(&mut self, id: ProjectId) -> Option<&mut Project> {
        self.by_id.get_mut(&id)
    }

    pub fn remove(&mut self, id: ProjectId) -> Option<Project> {
        self.by_id.remove(&id)
    }

    pub fn contains(&self, id: ProjectId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Projects in id order (the project list file order)
    pub fn iter(&self) -> impl Iterator<Item = &Project> {
        self.by_id.values()
    }

    pub fn ids(&self) -> Vec<ProjectId> {
        self.by_id.keys().copied().collect()
    }

    /// Find a project by exact name
    pub fn find_by_name(&self, name: &str) -> Option<&Project> {
        self.by_id.values().find(|p| p.name() == name)
    }

    /// Projects in display order
    pub fn sorted(&self, method: SortingMethod) -> Vec<&Project> {
        let mut projects: Vec<&Project> = self.by_id.values().collect();
        sort_projects(&mut projects, method);
        projects
    }

    /// Total completed time per project, plus the grand total
    pub fn summary(&self, settings: &Settings) -> Summary {
        let mut projects: Vec<&Project> = self
            .by_id
            .values()
            .filter(|p| !(settings.summary_ignore_hidden_projects && settings.is_hidden(p.id())))
            .collect();

        sort_projects(&mut projects, settings.sorting_method);
        if settings.summary_sort_by_time {
            // Stable, so equal totals keep the sorting-method order
            projects.sort_by_key(|p| std::cmp::Reverse(p.total_time()));
        }

        let rows: Vec<SummaryRow> = projects
            .into_iter()
            .map(|p| SummaryRow {
                id: p.id(),
                name: p.name().to_string(),
                hidden: settings.is_hidden(p.id()),
                total_seconds: p.total_time().num_seconds(),
            })
            .collect();
        let total_seconds = rows.iter().map(|r| r.total_seconds).sum();

        Summary {
            rows,
            total_seconds,
        }
    }
}

/// Sort project references in place
pub fn sort_projects(projects: &mut [&Project], method: SortingMethod) {
    match method {
        SortingMethod::OldFirst => projects.sort_by_key(|p| p.id()),
        SortingMethod::NewFirst => projects.sort_by_key(|p| std::cmp::Reverse(p.id())),
        SortingMethod::NameAToZ => projects.sort_by(|a, b| {
            a.name()
                .to_lowercase()
                .cmp(&b.name().to_lowercase())
                .then(a.id().cmp(&b.id()))
        }),
        SortingMethod::NameZToA => projects.sort_by(|a, b| {
            b.name()
                .to_lowercase()
                .cmp(&a.name().to_lowercase())
                .then(b.id().cmp(&a.id()))
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
    pub id: ProjectId,
    pub name: String,
    pub hidden: bool,
    pub total_seconds: i64,
}

impl SummaryRow {
    pub fn total(&self) -> Duration {
        Duration::seconds(self.total_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub rows: Vec<SummaryRow>,
    pub total_seconds: i64,
}

impl Summary {
    pub fn total(&self) -> Duration {
        Duration::seconds(self.total_seconds)
    }
}

/// `H:MM:SS`, hours unbounded
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.num_seconds().max(0);
    format!(
        "{}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}
