//! Integration tests for loading and writing the project store
//!
//! Each test roots a store in a temp directory, writes through the public API (or
//! hand-writes record files), then reopens the directory and checks what loads.

mod helpers;

use std::fs;

use chrono::Duration;
use helpers::store_fixture::{at, open_store, open_unloaded, write_data_file};
use project_manager_lib::store::{FileTarget, ProjectFileKind, Severity};
use tempfile::TempDir;

#[test]
fn test_project_round_trips_through_disk() {
    let temp_dir = TempDir::new().unwrap();
    let attachment = temp_dir.path().join("plan.txt");
    let editor = temp_dir.path().join("bin").join("editor");

    let mut store = open_store(temp_dir.path());
    let id = store.create_project("Website").unwrap();
    store.add_completed_log(id, at(1, 8, 0), at(1, 9, 30), "Plan").unwrap();
    store.add_completed_log(id, at(2, 8, 0), at(2, 8, 45), "Review").unwrap();
    store.start_log(id, "Design", at(3, 9, 0)).unwrap();
    assert!(store.add_file(
        id,
        "Plan",
        FileTarget::local(attachment.to_str().unwrap()).unwrap(),
        Some(editor.clone()),
    ));
    assert!(store.add_file(
        id,
        "Docs",
        FileTarget::remote("https://example.com/docs?page=2").unwrap(),
        None,
    ));
    let original = store.project(id).unwrap().clone();

    let reloaded = open_store(temp_dir.path());
    assert!(reloaded.diagnostics().is_empty(), "{:?}", reloaded.diagnostics().entries());
    assert_eq!(reloaded.project(id), Some(&original));

    let project = reloaded.project(id).unwrap();
    assert_eq!(project.incomplete_log().map(|l| l.description()), Some("Design"));
    assert_eq!(project.total_time(), Duration::minutes(135));
    assert_eq!(project.files()[1].program_to_open(), Some(editor.as_path()));
    assert!(project.files()[0].program_to_open().is_none());
}

#[test]
fn test_project_list_scenario_allocates_next_id() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_unloaded(temp_dir.path());
    write_data_file(&store, "projects.txt", "0|Website\n1|Taxes\n");

    assert_eq!(store.load(), 2);
    assert_eq!(store.projects().ids(), vec![0, 1]);
    assert_eq!(store.project(1).map(|p| p.name()), Some("Taxes"));
    assert_eq!(store.request_project_id(), Some(2));

    // Missing per-project files are created on load
    assert!(store.get_path(0, ProjectFileKind::Logs).unwrap().is_file());
    assert!(store.get_path(1, ProjectFileKind::Notes).unwrap().is_file());
}

#[test]
fn test_ids_never_reused_after_delete() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(temp_dir.path());

    let first = store.create_project("First").unwrap();
    let second = store.create_project("Second").unwrap();
    assert!(store.remove_project(second).is_some());
    let third = store.create_project("Third").unwrap();

    assert_eq!((first, second, third), (0, 1, 2));
}

#[test]
fn test_log_ids_seeded_from_disk() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_unloaded(temp_dir.path());
    write_data_file(&store, "projects.txt", "0|Website\n");
    write_data_file(
        &store,
        "logs/0_Website_logs.txt",
        "Complete\n7|2020-01-01T08:00:00|2020-01-01T09:00:00|Plan\n",
    );
    store.load();

    assert_eq!(store.request_log_id(0), Some(8));
    assert_eq!(store.request_log_id(5), Some(0));
}

#[test]
fn test_create_files_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(temp_dir.path());
    let id = store.create_project("Website").unwrap();
    let notes = store.get_path(id, ProjectFileKind::Notes).unwrap();

    fs::write(&notes, "# Notes for Project Website\nremember the logo\n").unwrap();
    let snapshot = |store: &project_manager_lib::store::ProjectStore| {
        ProjectFileKind::ALL
            .iter()
            .map(|kind| fs::read_to_string(store.get_path(id, *kind).unwrap()).unwrap())
            .collect::<Vec<_>>()
    };
    let before = snapshot(&store);

    assert!(store.create_files_for_project(id, false));
    let once = snapshot(&store);
    assert!(store.create_files_for_project(id, false));
    let twice = snapshot(&store);

    assert_eq!(before, once);
    assert_eq!(once, twice);
}

#[test]
fn test_corrupt_log_row_is_isolated() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_unloaded(temp_dir.path());
    write_data_file(&store, "projects.txt", "0|Website\n");
    write_data_file(
        &store,
        "logs/0_Website_logs.txt",
        "# LOG FILE\n\
         Complete\n\
         0|2020-01-01T07:00:00|2020-01-01T08:00:00|Plan\n\
         1|2020-01-01T08:00:00|2020-01-01T09:00:00\n\
         2|2020-01-01T09:00:00|2020-01-01T10:00:00|Build\n\
         3|2020-01-01T10:00:00|2020-01-01T11:00:00|Ship\n",
    );
    store.load();

    let project = store.project(0).unwrap();
    assert_eq!(project.completed_logs().len(), 3);
    assert_eq!(store.diagnostics().count(Severity::High), 1);
    assert!(store.diagnostics().contains("2020-01-01T09:00:00\'"));
}

#[test]
fn test_second_incomplete_row_discarded_on_load() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_unloaded(temp_dir.path());
    write_data_file(&store, "projects.txt", "0|Website\n");
    write_data_file(
        &store,
        "logs/0_Website_logs.txt",
        "Incomplete\n\
         4|2020-01-01T09:00:00||First\n\
         5|2020-01-01T10:00:00||Second\n\
         \n\
         Complete\n",
    );
    store.load();

    let project = store.project(0).unwrap();
    assert_eq!(project.incomplete_log().map(|l| l.id()), Some(4));
    assert!(project.completed_logs().is_empty());
    assert!(store.diagnostics().contains("Only one incomplete entry is allowed"));
}

#[test]
fn test_legacy_timestamps_load_and_are_rewritten_as_iso() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_unloaded(temp_dir.path());
    write_data_file(&store, "projects.txt", "0|Website\n");
    let logs = write_data_file(
        &store,
        "logs/0_Website_logs.txt",
        "Complete\n0|01/01/2020 09:00:00|01/01/2020 10:30:00|Design\n",
    );
    store.load();

    assert_eq!(store.project(0).unwrap().total_time(), Duration::minutes(90));

    assert!(store.write_logs_for_project(0));
    let text = fs::read_to_string(logs).unwrap();
    assert!(text.contains("0|2020-01-01T09:00:00|2020-01-01T10:30:00|Design\n"));
}

#[test]
fn test_bad_file_rows_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_unloaded(temp_dir.path());
    write_data_file(&store, "projects.txt", "0|Website\nnot a row\n");
    write_data_file(
        &store,
        "files/0_Website_files.txt",
        "Docs|https://example.com/docs|false|\n\
         Broken|https://example.com|sometimes|\n\
         Notes|ftp://example.com/notes|false|\n",
    );
    store.load();

    assert_eq!(store.projects().len(), 1);
    let files = store.project(0).unwrap().files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].short_display_name(), "example.com/docs");
    assert_eq!(store.diagnostics().count(Severity::High), 3);
}

#[test]
fn test_finish_log_persists_completion() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(temp_dir.path());
    let id = store.create_project("Website").unwrap();
    let log_id = store.start_log(id, "Design", at(1, 9, 0)).unwrap();
    assert_eq!(store.finish_log(id, at(1, 10, 15)), Some(log_id));

    let reloaded = open_store(temp_dir.path());
    let project = reloaded.project(id).unwrap();
    assert!(project.incomplete_log().is_none());
    assert_eq!(
        project.log(log_id).and_then(|l| l.duration()),
        Some(Duration::minutes(75))
    );
}

#[test]
fn test_padded_name_and_description_survive_reload() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(temp_dir.path());
    let id = store.create_project("Website ").unwrap();
    store.add_completed_log(id, at(1, 8, 0), at(1, 9, 0), "Plan ").unwrap();
    assert!(store.add_file(
        id,
        " Docs",
        FileTarget::remote("https://example.com/docs").unwrap(),
        None,
    ));
    assert_eq!(
        store.get_path(id, ProjectFileKind::Logs).unwrap(),
        store.data_paths().root().join("logs").join("0_Website_logs.txt")
    );
    let original = store.project(id).unwrap().clone();

    let reloaded = open_store(temp_dir.path());
    assert!(reloaded.diagnostics().is_empty(), "{:?}", reloaded.diagnostics().entries());
    assert_eq!(reloaded.project(id), Some(&original));
    let project = reloaded.project(id).unwrap();
    assert_eq!(project.name(), "Website");
    assert_eq!(project.completed_logs()[0].description(), "Plan");
    assert!(project.file("Docs").is_some());
}

#[test]
fn test_program_to_open_is_checked_before_writing() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(temp_dir.path());
    let id = store.create_project("Website").unwrap();
    let target = FileTarget::remote("https://example.com/").unwrap();

    assert!(!store.add_file(id, "Docs", target.clone(), Some("/opt/a|b/editor".into())));
    assert_eq!(store.diagnostics().count(Severity::High), 1);
    assert!(store.add_file(id, "Docs", target, Some("vim".into())));
    let program = store.project(id).unwrap().files()[0]
        .program_to_open()
        .map(|p| p.to_path_buf());
    assert!(program.as_deref().is_some_and(|p| p.is_absolute()));

    let reloaded = open_store(temp_dir.path());
    let files = reloaded.project(id).unwrap().files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].program_to_open().map(|p| p.to_path_buf()), program);
}

#[test]
fn test_largest_id_on_disk_exhausts_allocation() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_unloaded(temp_dir.path());
    write_data_file(&store, "projects.txt", "4294967295|Huge\n");
    write_data_file(
        &store,
        "logs/4294967295_Huge_logs.txt",
        "Complete\n4294967295|2020-01-01T08:00:00|2020-01-01T09:00:00|Plan\n",
    );
    store.load();

    assert_eq!(store.request_project_id(), None);
    assert!(store.create_project("Another").is_none());
    assert!(store.add_completed_log(u32::MAX, at(2, 8, 0), at(2, 9, 0), "More").is_none());
    assert_eq!(store.projects().len(), 1);
    assert_eq!(store.project(u32::MAX).unwrap().completed_logs().len(), 1);
    assert!(store.diagnostics().contains("no project ids left"));
    assert!(store.diagnostics().contains("no log ids left"));
}
