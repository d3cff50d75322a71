//! Integration tests for settings persistence, hidden projects, backups and moving
//! the data directory

mod helpers;

use std::fs;

use helpers::store_fixture::{at, open_store, open_unloaded};
use project_manager_lib::store::{
    settings::keys, Config, ProjectFileKind, Severity, SettingsError, SortingMethod,
};
use tempfile::TempDir;

#[test]
fn test_settings_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(temp_dir.path());
    let website = store.create_project("Website").unwrap();
    let taxes = store.create_project("Taxes").unwrap();

    store.set_setting(keys::SORTING_METHOD, "name_a_to_z").unwrap();
    store.set_setting(keys::SUMMARY_SORT_BY_TIME, "true").unwrap();
    assert!(store.hide(taxes));

    let reloaded = open_store(temp_dir.path());
    assert!(reloaded.diagnostics().is_empty());
    assert_eq!(reloaded.settings().sorting_method, SortingMethod::NameAToZ);
    assert!(reloaded.settings().summary_sort_by_time);
    assert!(reloaded.settings().is_hidden(taxes));
    assert!(!reloaded.settings().is_hidden(website));

    let names: Vec<_> = reloaded.sorted_projects().iter().map(|p| p.name().to_string()).collect();
    assert_eq!(names, vec!["Taxes", "Website"]);
}

#[test]
fn test_set_setting_rejects_bad_input() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(temp_dir.path());

    assert!(matches!(
        store.set_setting(keys::SORTING_METHOD, "sideways"),
        Err(SettingsError::InvalidValue { .. })
    ));
    assert!(matches!(
        store.set_setting("colour", "blue"),
        Err(SettingsError::UnknownKey(_))
    ));
    assert_eq!(store.settings().sorting_method, SortingMethod::NewFirst);
}

#[test]
fn test_hidden_ids_resolved_after_projects_load() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::new(temp_dir.path());
    let store = open_unloaded(temp_dir.path());
    fs::write(store.data_paths().project_list_file(), "0|Website\n1|Taxes\n").unwrap();
    drop(store);

    let settings = fs::read_to_string(config.settings_file()).unwrap();
    let settings = settings.replace("hidden_projects|\n", "hidden_projects|1|7\n");
    fs::write(config.settings_file(), settings).unwrap();

    let store = open_store(temp_dir.path());
    assert!(store.settings().is_hidden(1));
    assert_eq!(store.settings().hidden_projects().len(), 1);
    assert_eq!(store.diagnostics().count(Severity::Moderate), 1);
    assert!(store.diagnostics().contains("7"));
}

#[test]
fn test_summary_ignores_hidden_projects_when_asked() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(temp_dir.path());
    let website = store.create_project("Website").unwrap();
    let taxes = store.create_project("Taxes").unwrap();
    store.add_completed_log(website, at(1, 8, 0), at(1, 9, 0), "Plan").unwrap();
    store.add_completed_log(taxes, at(1, 8, 0), at(1, 10, 0), "Forms").unwrap();
    store.hide(taxes);

    let summary = store.summary();
    assert_eq!(summary.rows.len(), 2);
    assert_eq!(summary.total_seconds, 3 * 3600);

    store.set_setting(keys::SUMMARY_IGNORE_HIDDEN_PROJECTS, "true").unwrap();
    let summary = store.summary();
    assert_eq!(summary.rows.len(), 1);
    assert_eq!(summary.rows[0].name, "Website");
    assert_eq!(summary.total_seconds, 3600);
}

#[test]
fn test_backup_copies_data_without_older_backups() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(temp_dir.path());
    let id = store.create_project("Website").unwrap();
    store.add_completed_log(id, at(1, 8, 0), at(1, 9, 0), "Plan").unwrap();

    let first = store.backup().unwrap();
    let second = store.backup().unwrap();

    let paths = store.data_paths();
    assert_eq!(first, paths.backup_target(0));
    assert_eq!(second, paths.backup_target(1));
    assert!(first.join("projects.txt").is_file());
    assert!(first.join("logs").join("0_Website_logs.txt").is_file());
    assert!(!second.join("backup").exists());
    assert_eq!(fs::read_to_string(paths.backup_id_file()).unwrap(), "1");
}

#[test]
fn test_change_data_directory_moves_everything() {
    let temp_dir = TempDir::new().unwrap();
    let new_data = temp_dir.path().join("elsewhere").join("data");

    let mut store = open_store(temp_dir.path());
    let id = store.create_project("Website").unwrap();
    store.add_completed_log(id, at(1, 8, 0), at(1, 9, 0), "Plan").unwrap();
    store.backup().unwrap();

    assert!(store.change_data_directory(&new_data));
    assert_eq!(store.settings().data_directory, new_data);
    assert_eq!(
        store.get_path(id, ProjectFileKind::Logs).unwrap(),
        new_data.join("logs").join("0_Website_logs.txt")
    );
    assert!(new_data.join("backup").join("backup_0").is_dir());

    let reloaded = open_store(temp_dir.path());
    assert_eq!(reloaded.settings().data_directory, new_data);
    assert_eq!(reloaded.project(id).unwrap().completed_logs().len(), 1);
}

#[test]
fn test_change_data_directory_into_itself_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(temp_dir.path());
    let old_dir = store.settings().data_directory.clone();

    assert!(!store.change_data_directory(&old_dir.join("nested")));
    assert_eq!(store.settings().data_directory, old_dir);
    assert_eq!(store.diagnostics().count(Severity::High), 1);
}

#[test]
fn test_missing_data_directory_falls_back_to_default() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::new(temp_dir.path());
    drop(open_store(temp_dir.path()));

    let settings = fs::read_to_string(config.settings_file()).unwrap();
    let settings = settings.replace(
        &format!("data_directory|{}", config.default_data_dir().display()),
        "data_directory|/no/such/place",
    );
    fs::write(config.settings_file(), settings).unwrap();

    let store = open_store(temp_dir.path());
    assert_eq!(store.settings().data_directory, config.default_data_dir());
    assert_eq!(store.diagnostics().count(Severity::High), 1);
}
