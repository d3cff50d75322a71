// pm: command-line front end for the project store
//
// Commands:
//   pm list | new <name> | rename <id> <name> | delete <id>
//   pm start <id> <description> | finish <id> | logs <id>
//   pm add-file <id> <title> <target> [--url] [--program <path>] | files <id>
//   pm notes [<id>] | hide <id> | unhide <id> | summary
//   pm settings | set <key> <value> | backup | move-data <dir>

use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use project_manager_lib::store::{
    codec::format_timestamp, format_duration, settings::keys, Config, FileTarget, ProjectId,
    ProjectStore, Severity,
};
use serde_json::json;
use std::{env, path::PathBuf};
use tracing_appender::non_blocking::WorkerGuard;

/// Env var holding the tracing filter
const LOG_FILTER_ENV_VAR: &str = "PM_LOG";

fn print_help() {
    println!(
        r#"pm - track projects, time logs and attached files

USAGE:
    pm <COMMAND> [OPTIONS]

COMMANDS:
    list                          List projects in the configured order
    new <name>                    Create a project
    rename <id> <name>            Rename a project (moves its files)
    delete <id>                   Delete a project and its files
    start <id> <description>      Start a log for a project
    finish <id>                   Finish the running log of a project
    logs <id>                     Show a project's logs
    add-file <id> <title> <target>
                                  Attach a file (or url with --url) to a project
    files <id>                    Show a project's attached files
    notes [<id>]                  Prepare a notes file and print its path
    hide <id> / unhide <id>       Hide or show a project
    summary                       Total time per project
    settings                      Show settings
    set <key> <value>             Change a setting
    backup                        Copy the data directory into backup/
    move-data <dir>               Move the data directory
    help                          Show this help message

OPTIONS:
    --url              Treat the add-file target as an http(s) url
    --program <path>   Program used to open an attached file
    --json             Output in JSON format

ENVIRONMENT:
    PROJECT_MANAGER_HOME   Runtime directory (default ~/.project-manager)
    PM_LOG                 Log filter (default info)

EXAMPLES:
    pm new "Website"
    pm start 0 "Landing page"
    pm finish 0
    pm add-file 0 Docs https://example.com/docs --url
    pm set sorting_method name_a_to_z
"#
    );
}

/// Parsed command line
struct Args {
    command: String,
    positional: Vec<String>,
    json: bool,
    url: bool,
    program: Option<PathBuf>,
}

fn parse_args(raw: &[String]) -> Result<Args> {
    let mut args = Args {
        command: raw.first().cloned().unwrap_or_else(|| "help".to_string()),
        positional: Vec::new(),
        json: false,
        url: false,
        program: None,
    };

    let mut i = 1;
    while i < raw.len() {
        match raw[i].as_str() {
            "--json" => args.json = true,
            "--url" => args.url = true,
            "--program" => {
                i += 1;
                let program = raw
                    .get(i)
                    .ok_or_else(|| anyhow!("--program needs a path"))?;
                args.program = Some(PathBuf::from(program));
            }
            other => args.positional.push(other.to_string()),
        }
        i += 1;
    }

    Ok(args)
}

impl Args {
    fn arg(&self, index: usize, usage: &str) -> Result<&str> {
        self.positional
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("Usage: pm {}", usage))
    }

    fn project_id(&self, index: usize, usage: &str) -> Result<ProjectId> {
        self.arg(index, usage)?
            .parse()
            .context("Project id must be a non-negative number")
    }
}

/// File log under `<runtime>/logs/pm.log` plus stderr, filtered by `PM_LOG`
fn init_logging(config: &Config) -> Option<WorkerGuard> {
    use tracing_subscriber::fmt::time::LocalTime;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::Layer;

    let env_filter = tracing_subscriber::EnvFilter::try_from_env(LOG_FILTER_ENV_VAR)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_dir = config.log_dir();
    let (file_layer, guard) = match std::fs::create_dir_all(&log_dir) {
        Ok(()) => {
            let file_appender = tracing_appender::rolling::never(&log_dir, "pm.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_timer(LocalTime::rfc_3339())
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        Err(e) => {
            // Nowhere else to report this
            eprintln!(
                "Could not create log directory {}: {}. Logging to file is disabled.",
                log_dir.display(),
                e
            );
            (None, None)
        }
    };

    // Console only shows problems; the diagnostics summary covers the rest
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(LocalTime::rfc_3339())
        .with_target(false)
        .with_filter(tracing_subscriber::filter::LevelFilter::ERROR);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    guard
}

fn main() -> Result<()> {
    let raw: Vec<String> = env::args().skip(1).collect();
    let args = parse_args(&raw)?;

    if matches!(args.command.as_str(), "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }

    let config = Config::from_env();
    let _guard = init_logging(&config);

    let mut store = ProjectStore::open(config);
    store.load();

    let result = run(&mut store, &args);
    report_diagnostics(&store);
    result
}

fn run(store: &mut ProjectStore, args: &Args) -> Result<()> {
    let now = Local::now().naive_local();

    match args.command.as_str() {
        "list" => {
            let projects = store.sorted_projects();
            if args.json {
                let rows: Vec<_> = projects
                    .iter()
                    .map(|p| {
                        json!({
                            "id": p.id(),
                            "name": p.name(),
                            "hidden": store.settings().is_hidden(p.id()),
                            "running": p.incomplete_log().is_some(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
                return Ok(());
            }

            if projects.is_empty() {
                println!("No projects");
                return Ok(());
            }
            for project in projects {
                let mut flags = Vec::new();
                if project.incomplete_log().is_some() {
                    flags.push("running");
                }
                if store.settings().is_hidden(project.id()) {
                    flags.push("hidden");
                }
                let flags = if flags.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", flags.join(", "))
                };
                println!("{:>4}  {}{}", project.id(), project.name(), flags);
            }
            Ok(())
        }

        "new" => {
            let name = args.arg(0, "new <name>")?;
            let id = store
                .create_project(name)
                .ok_or_else(|| anyhow!("Could not create project '{}'", name))?;
            println!("Created project {} '{}'", id, name);
            Ok(())
        }

        "rename" => {
            let usage = "rename <id> <name>";
            let id = args.project_id(0, usage)?;
            let name = args.arg(1, usage)?;
            if !store.rename_project(id, name) {
                bail!("Could not rename project {}", id);
            }
            println!("Renamed project {} to '{}'", id, name);
            Ok(())
        }

        "delete" => {
            let id = args.project_id(0, "delete <id>")?;
            let project = store
                .remove_project(id)
                .ok_or_else(|| anyhow!("No project with id {}", id))?;
            println!("Deleted project {} '{}'", id, project.name());
            Ok(())
        }

        "start" => {
            let usage = "start <id> <description>";
            let id = args.project_id(0, usage)?;
            let description = args.arg(1, usage)?;
            let log_id = store
                .start_log(id, description, now)
                .ok_or_else(|| anyhow!("Could not start a log for project {}", id))?;
            println!("Started log {} at {}", log_id, format_timestamp(now));
            Ok(())
        }

        "finish" => {
            let id = args.project_id(0, "finish <id>")?;
            match store.finish_log(id, now) {
                Some(log_id) => {
                    let duration = store
                        .project(id)
                        .and_then(|p| p.log(log_id))
                        .and_then(|log| log.duration())
                        .unwrap_or_else(chrono::Duration::zero);
                    println!("Finished log {} ({})", log_id, format_duration(duration));
                }
                None => println!("Nothing to finish"),
            }
            Ok(())
        }

        "logs" => {
            let id = args.project_id(0, "logs <id>")?;
            let project = store
                .project(id)
                .ok_or_else(|| anyhow!("No project with id {}", id))?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&project.logs().collect::<Vec<_>>())?);
                return Ok(());
            }
            for log in project.logs() {
                let end = log
                    .end()
                    .map(format_timestamp)
                    .unwrap_or_else(|| "running".to_string());
                let duration = log.duration().map(format_duration).unwrap_or_default();
                println!(
                    "{:>4}  {}  {:<19}  {:>9}  {}",
                    log.id(),
                    format_timestamp(log.start()),
                    end,
                    duration,
                    log.description()
                );
            }
            println!("Total: {}", format_duration(project.total_time()));
            Ok(())
        }

        "add-file" => {
            let usage = "add-file <id> <title> <target> [--url] [--program <path>]";
            let id = args.project_id(0, usage)?;
            let title = args.arg(1, usage)?;
            let target = FileTarget::parse(args.arg(2, usage)?, !args.url)?;
            if !store.add_file(id, title, target, args.program.clone()) {
                bail!("Could not add file '{}' to project {}", title, id);
            }
            println!("Added '{}' to project {}", title, id);
            Ok(())
        }

        "files" => {
            let id = args.project_id(0, "files <id>")?;
            let project = store
                .project(id)
                .ok_or_else(|| anyhow!("No project with id {}", id))?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(project.files())?);
                return Ok(());
            }
            for file in project.files() {
                let program = file
                    .program_to_open()
                    .map(|p| format!("  [{}]", p.display()))
                    .unwrap_or_default();
                println!("{}  {}{}", file.title(), file.short_display_name(), program);
            }
            Ok(())
        }

        "notes" => {
            let project = match args.positional.first() {
                Some(_) => Some(args.project_id(0, "notes [<id>]")?),
                None => None,
            };
            let path = store
                .prepare_notes_file(project, now)
                .ok_or_else(|| anyhow!("Could not prepare notes file"))?;
            println!("{}", path.display());
            Ok(())
        }

        "hide" => {
            let id = args.project_id(0, "hide <id>")?;
            if !store.hide(id) {
                bail!("Could not hide project {}", id);
            }
            Ok(())
        }

        "unhide" => {
            let id = args.project_id(0, "unhide <id>")?;
            if !store.unhide(id) {
                println!("Project {} was not hidden", id);
            }
            Ok(())
        }

        "summary" => {
            let summary = store.summary();
            if args.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }
            for row in &summary.rows {
                println!("{:>10}  {}", format_duration(row.total()), row.name);
            }
            println!("{:>10}  Total", format_duration(summary.total()));
            Ok(())
        }

        "settings" => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(store.settings())?);
                return Ok(());
            }
            for (key, value) in store.settings().rows() {
                println!("{} = {}", key, value);
            }
            Ok(())
        }

        "set" => {
            let usage = "set <key> <value>";
            let key = args.arg(0, usage)?;
            let value = args.arg(1, usage)?;
            if key == keys::DATA_DIRECTORY {
                bail!("Use 'pm move-data <dir>' to change the data directory");
            }
            store.set_setting(key, value)?;
            println!("{} = {}", key, value);
            Ok(())
        }

        "backup" => {
            let target = store
                .backup()
                .ok_or_else(|| anyhow!("Backup failed"))?;
            println!("Backed up to {}", target.display());
            Ok(())
        }

        "move-data" => {
            let dir = PathBuf::from(args.arg(0, "move-data <dir>")?);
            if !store.change_data_directory(&dir) {
                bail!("Could not move data directory to {}", dir.display());
            }
            println!("Data directory is now {}", store.settings().data_directory.display());
            Ok(())
        }

        other => {
            print_help();
            bail!("Unknown command '{}'", other)
        }
    }
}

/// Echo diagnostics in debug mode, otherwise just say that something went wrong
fn report_diagnostics(store: &ProjectStore) {
    let diagnostics = store.diagnostics();

    if store.settings().debug_mode_on {
        for entry in diagnostics.entries() {
            eprintln!(
                "[{}] {}: {}",
                entry.recorded_at.format("%H:%M:%S"),
                entry.severity,
                entry.message
            );
        }
    } else if diagnostics.errors_occurred() {
        eprintln!(
            "{} problem(s) recorded ({} high). See {}.",
            diagnostics.len(),
            diagnostics.count(Severity::High),
            store.config().log_dir().join("pm.log").display()
        );
    }

    if store.settings().display_incomplete_log_warning {
        for project in store.projects_with_incomplete_logs() {
            eprintln!("Warning: project '{}' has a running log", project.name());
        }
    }
}
