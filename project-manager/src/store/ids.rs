//! Id allocation for projects and per-project logs
//!
//! Ids are never persisted as counters. The allocator is seeded by observing every id
//! parsed at load time and only ever moves forward, so deleted ids are not reused
//! within a run.

use std::collections::HashMap;

/// Project identifier, unique across the data directory
pub type ProjectId = u32;

/// Log identifier, unique within its owning project
pub type LogId = u32;

/// Monotonic id allocator (high-water marks per entity class)
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    highest_project: Option<ProjectId>,
    highest_log: HashMap<ProjectId, LogId>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note a project id seen on disk
    pub fn observe_project(&mut self, id: ProjectId) {
        self.highest_project = Some(self.highest_project.map_or(id, |h| h.max(id)));
    }

    /// Note a log id seen on disk for the given project
    pub fn observe_log(&mut self, project: ProjectId, id: LogId) {
        self.highest_log
            .entry(project)
            .and_modify(|h| *h = (*h).max(id))
            .or_insert(id);
    }

    /// Return the next unused project id (0 when nothing has been seen), or `None`
    /// once `ProjectId::MAX` has been handed out or observed
    pub fn request_project_id(&mut self) -> Option<ProjectId> {
        let next = next_after(self.highest_project)?;
        self.highest_project = Some(next);
        Some(next)
    }

    /// Return the next unused log id for `project` (0 for a project's first log)
    pub fn request_log_id(&mut self, project: ProjectId) -> Option<LogId> {
        let next = next_after(self.highest_log.get(&project).copied())?;
        self.highest_log.insert(project, next);
        Some(next)
    }
}

fn next_after(highest: Option<u32>) -> Option<u32> {
    match highest {
        Some(h) => h.checked_add(1),
        None => Some(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_project_id_is_zero() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.request_project_id(), Some(0));
        assert_eq!(ids.request_project_id(), Some(1));
    }

    #[test]
    fn test_seeded_from_observed_ids() {
        let mut ids = IdAllocator::new();
        ids.observe_project(0);
        ids.observe_project(7);
        ids.observe_project(3);
        assert_eq!(ids.request_project_id(), Some(8));
    }

    #[test]
    fn test_ids_never_reused() {
        let mut ids = IdAllocator::new();
        let mut seen = Vec::new();
        for step in 0..20 {
            if step % 5 == 0 {
                // Interleave loads of smaller ids; they must not pull the mark back
                ids.observe_project(step / 2);
            }
            let id = ids.request_project_id().unwrap();
            assert!(seen.iter().all(|prev| id > *prev));
            seen.push(id);
        }
    }

    #[test]
    fn test_log_ids_scoped_per_project() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.request_log_id(1), Some(0));
        assert_eq!(ids.request_log_id(1), Some(1));
        assert_eq!(ids.request_log_id(2), Some(0));

        ids.observe_log(3, 9);
        assert_eq!(ids.request_log_id(3), Some(10));
        assert_eq!(ids.request_log_id(1), Some(2));
    }

    #[test]
    fn test_exhausted_ids_are_refused() {
        let mut ids = IdAllocator::new();
        ids.observe_project(u32::MAX);
        assert_eq!(ids.request_project_id(), None);
        assert_eq!(ids.request_project_id(), None);

        ids.observe_log(0, u32::MAX - 1);
        assert_eq!(ids.request_log_id(0), Some(u32::MAX));
        assert_eq!(ids.request_log_id(0), None);
        assert_eq!(ids.request_log_id(1), Some(0));
    }
}
