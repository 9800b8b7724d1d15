//! Command table
//!
//! Every user-facing action is an `Operation` variant. Front ends (the CLI,
//! or any GUI) build an `Operation`, hand it to `Session::execute` or
//! `spawn_operation`, and receive updates through the `TaskContext`
//! callbacks only.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::build::{run_build, BuildOptions};
use crate::config::{AppConfig, DataUrlConfig, HeidiSqlUrlConfig, UrlConfig, DEFAULT_HEIDISQL_URL};
use crate::deps::{self, DepKind, DependencySpec, Scanner};
use crate::logging::{log_action, log_error};
use crate::mysql::{self, MySqlConnection, MySqlPaths, MySqlServer};
use crate::paths::Workspace;
use crate::repack::{self, ConfigPathValues, ServerKind};
use crate::source::{self, ModuleSpec, SourceVariant};
use crate::task::{TaskContext, TaskError, TaskResult};

// ============================================================================
// Operations
// ============================================================================

#[derive(Debug, Clone)]
pub enum Operation {
    ScanDependencies,
    InstallDependency { name: String },
    CloneSource { variant: SourceVariant },
    UpdateSource,
    CleanSource,
    ListModules,
    CloneModules { modules: Vec<ModuleSpec> },
    CleanModule { name: String },
    Build { generate_extractors: bool },
    CreateRepack,
    CreateConfigs,
    ConfigPaths { values: ConfigPathValues },
    SetAutoupdater { enabled: bool },
    CreateMysql,
    CreateDlls,
    WriteMyIni,
    WriteLaunchScripts,
    DownloadClientData,
    InitializeMysql,
    StartMysql,
    StopMysql,
    MysqlStatus,
    ConfigureMysql { root_password: String },
    CreateDatabase { root_password: String },
    ImportBaseSql { password: String, root_password: Option<String> },
    ImportModuleSql { password: String, root_password: Option<String> },
    LaunchServer { kind: ServerKind },
}

impl Operation {
    pub fn id(&self) -> &'static str {
        match self {
            Operation::ScanDependencies => "scan_dependencies",
            Operation::InstallDependency { .. } => "install_dependency",
            Operation::CloneSource { .. } => "clone_source",
            Operation::UpdateSource => "update_source",
            Operation::CleanSource => "clean_source",
            Operation::ListModules => "list_modules",
            Operation::CloneModules { .. } => "clone_modules",
            Operation::CleanModule { .. } => "clean_module",
            Operation::Build { .. } => "build",
            Operation::CreateRepack => "create_repack",
            Operation::CreateConfigs => "create_configs",
            Operation::ConfigPaths { .. } => "config_paths",
            Operation::SetAutoupdater { .. } => "set_autoupdater",
            Operation::CreateMysql => "create_mysql",
            Operation::CreateDlls => "create_dlls",
            Operation::WriteMyIni => "write_my_ini",
            Operation::WriteLaunchScripts => "write_launch_scripts",
            Operation::DownloadClientData => "download_client_data",
            Operation::InitializeMysql => "initialize_mysql",
            Operation::StartMysql => "start_mysql",
            Operation::StopMysql => "stop_mysql",
            Operation::MysqlStatus => "mysql_status",
            Operation::ConfigureMysql { .. } => "configure_mysql",
            Operation::CreateDatabase { .. } => "create_database",
            Operation::ImportBaseSql { .. } => "import_base_sql",
            Operation::ImportModuleSql { .. } => "import_module_sql",
            Operation::LaunchServer { .. } => "launch_server",
        }
    }

    pub fn info(&self) -> Option<&'static CommandInfo> {
        let id = self.id();
        COMMANDS.iter().find(|c| c.id == id)
    }
}

/// Static description of an operation for menus and help output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandInfo {
    pub id: &'static str,
    pub group: &'static str,
    pub label: &'static str,
}

const fn cmd(id: &'static str, group: &'static str, label: &'static str) -> CommandInfo {
    CommandInfo { id, group, label }
}

pub static COMMANDS: &[CommandInfo] = &[
    cmd("scan_dependencies", "Dependencies", "Scan for installed dependencies"),
    cmd("install_dependency", "Dependencies", "Download and install a dependency"),
    cmd("clone_source", "Source", "Clone a source variant"),
    cmd("update_source", "Source", "Fetch and pull the active source"),
    cmd("clean_source", "Source", "Delete the source folder"),
    cmd("list_modules", "Modules", "List catalog and cloned modules"),
    cmd("clone_modules", "Modules", "Clone modules into the source"),
    cmd("clean_module", "Modules", "Delete one cloned module"),
    cmd("build", "Build", "Configure and compile the server"),
    cmd("create_repack", "Repack", "Copy build output into Repack"),
    cmd("create_configs", "Repack", "Create .conf files from .conf.dist"),
    cmd("config_paths", "Repack", "Set DataDir, LogsDir and MySQLExecutable"),
    cmd("set_autoupdater", "Repack", "Toggle the database autoupdater"),
    cmd("create_mysql", "Repack", "Copy a MySQL installation into Repack"),
    cmd("create_dlls", "Repack", "Copy OpenSSL and MySQL runtime DLLs"),
    cmd("write_my_ini", "Repack", "Write the portable my.ini"),
    cmd("write_launch_scripts", "Repack", "Write MySQL/HeidiSQL/server .bat files"),
    cmd("download_client_data", "Repack", "Download and extract client data"),
    cmd("initialize_mysql", "MySQL", "Initialize an empty data directory"),
    cmd("start_mysql", "MySQL", "Start the bundled MySQL server"),
    cmd("stop_mysql", "MySQL", "Stop every running MySQL server"),
    cmd("mysql_status", "MySQL", "Show whether MySQL is running"),
    cmd("configure_mysql", "MySQL", "Set the root password and client config"),
    cmd("create_database", "MySQL", "Create the AzerothCore databases"),
    cmd("import_base_sql", "MySQL", "Import the base game SQL"),
    cmd("import_module_sql", "MySQL", "Import module SQL"),
    cmd("launch_server", "Servers", "Start the auth or world server"),
];

// ============================================================================
// Session
// ============================================================================

/// Long-lived state shared by every operation of one application run.
pub struct Session {
    pub workspace: Workspace,
    pub config: AppConfig,
    pub urls: UrlConfig,
    pub data_url: DataUrlConfig,
    pub dependencies: Vec<DependencySpec>,
    scanner: Scanner,
    mysql: MySqlServer,
}

impl Session {
    pub fn new(workspace: Workspace) -> Self {
        Self::with_scanner(workspace, Scanner::default())
    }

    pub fn with_scanner(workspace: Workspace, scanner: Scanner) -> Self {
        let config = AppConfig::load_for(&workspace);
        let urls = UrlConfig::load_from(&workspace.config_file(UrlConfig::FILE_NAME));
        let data_url = DataUrlConfig::load_from(&workspace.config_file(DataUrlConfig::FILE_NAME));
        let heidisql =
            HeidiSqlUrlConfig::load_from(&workspace.config_file(HeidiSqlUrlConfig::FILE_NAME));

        let mut dependencies = deps::load_dependencies(&workspace, &config, &urls);
        if urls.url_for("HeidiSQL").is_none() && heidisql.url.trim() != DEFAULT_HEIDISQL_URL {
            if let Some(spec) = dependencies.iter_mut().find(|d| d.kind == DepKind::HeidiSql) {
                if !heidisql.url.trim().is_empty() {
                    spec.download_url = heidisql.url.trim().to_string();
                }
            }
        }

        let mysql = MySqlServer::new(MySqlPaths::for_workspace(&workspace));
        Self {
            workspace,
            config,
            urls,
            data_url,
            dependencies,
            scanner,
            mysql,
        }
    }

    fn connection(&self, password: &str) -> MySqlConnection {
        MySqlConnection::new(&self.config.mysql, password)
    }

    /// Run `op` to completion and return a one-paragraph summary.
    pub fn execute(&mut self, op: Operation, ctx: &TaskContext) -> TaskResult<String> {
        log_action(&format!("Running {}", op.id()));
        let ws = &self.workspace;
        match op {
            Operation::ScanDependencies => {
                ctx.set_status("Scanning dependencies...");
                let found = deps::scan_all(&self.scanner, &mut self.dependencies, &mut self.config);
                self.config.save_for(ws);
                let lines: Vec<String> = self
                    .dependencies
                    .iter()
                    .map(|d| {
                        if d.detected {
                            format!("[x] {} {} ({})", d.name, d.version, d.path)
                        } else {
                            format!("[ ] {}", d.name)
                        }
                    })
                    .collect();
                Ok(format!(
                    "{}/{} dependencies found\n{}",
                    found,
                    self.dependencies.len(),
                    lines.join("\n")
                ))
            }
            Operation::InstallDependency { name } => {
                let spec = self
                    .dependencies
                    .iter_mut()
                    .find(|d| d.name.eq_ignore_ascii_case(&name))
                    .ok_or_else(|| TaskError::other("Install", format!("unknown dependency {}", name)))?;
                let result = deps::install(spec, ws, &self.scanner, ctx)?;
                let state = spec.state();
                let spec_name = spec.name.clone();
                self.config.set_dependency(&spec_name, state);
                self.config.save_for(ws);
                Ok(if result.detected {
                    format!("{} installed at {}", spec_name, result.path)
                } else {
                    format!(
                        "{} installer finished but it was not detected yet; rescan after completing setup",
                        spec_name
                    )
                })
            }
            Operation::CloneSource { variant } => {
                let path = source::clone_source(variant, ws, &mut self.config, ctx)?;
                Ok(format!("{} cloned into {}", variant.display_name(), path.display()))
            }
            Operation::UpdateSource => {
                source::update_source(ws, ctx)?;
                Ok("Source updated".to_string())
            }
            Operation::CleanSource => {
                let strategy = source::clean_source(ws, &mut self.config, ctx)?;
                Ok(format!("Source removed ({:?})", strategy))
            }
            Operation::ListModules => {
                let active = source::active_source(ws, &mut self.config);
                let lines: Vec<String> = source::list_modules(ws, active)
                    .into_iter()
                    .map(|m| {
                        format!(
                            "[{}] {}{}",
                            if m.cloned { "x" } else { " " },
                            m.name,
                            if m.cataloged { "" } else { " (local)" }
                        )
                    })
                    .collect();
                let header = match active {
                    Some(v) => format!("Active source: {}", v.display_name()),
                    None => "No source cloned".to_string(),
                };
                Ok(format!("{}\n{}", header, lines.join("\n")))
            }
            Operation::CloneModules { modules } => {
                let report = source::clone_modules(&modules, ws, ctx)?;
                Ok(report.summary())
            }
            Operation::CleanModule { name } => {
                let strategy = source::clean_individual_module(&name, ws, ctx)?;
                Ok(format!("{} removed ({:?})", name, strategy))
            }
            Operation::Build { generate_extractors } => {
                let report = run_build(
                    ws,
                    &self.config,
                    BuildOptions { generate_extractors },
                    ctx,
                    |stage| ctx.set_status(format!("Build: {:?}", stage)),
                )?;
                Ok(format!(
                    "Build finished in {}s, output in {}",
                    report.elapsed_secs,
                    report.output_dir.display()
                ))
            }
            Operation::CreateRepack => Ok(repack::create_repack(ws, ctx)?.summary()),
            Operation::CreateConfigs => {
                let report = repack::create_configs(ws)?;
                Ok(format!(
                    "{} config(s) created, {} already present",
                    report.created.len(),
                    report.kept
                ))
            }
            Operation::ConfigPaths { values } => {
                let report = repack::config_paths(ws, &values)?;
                if report.total() == 0 {
                    Ok("No default path lines found; configs left unchanged".to_string())
                } else {
                    let parts: Vec<String> = report
                        .files
                        .iter()
                        .map(|(file, n)| format!("{}: {}", file, n))
                        .collect();
                    Ok(format!("Substitutions applied: {}", parts.join(", ")))
                }
            }
            Operation::SetAutoupdater { enabled } => {
                let n = repack::set_autoupdater(ws, enabled)?;
                Ok(format!(
                    "Autoupdater {} ({} line(s) updated)",
                    if enabled { "enabled" } else { "disabled" },
                    n
                ))
            }
            Operation::CreateMysql => {
                let path = repack::create_mysql(ws, &self.config, ctx)?;
                Ok(format!("MySQL copied to {}", path.display()))
            }
            Operation::CreateDlls => Ok(repack::create_dlls(ws, &self.config)?.summary()),
            Operation::WriteMyIni => {
                let path = repack::write_my_ini(ws, self.config.mysql.port)?;
                Ok(format!("Wrote {}", path.display()))
            }
            Operation::WriteLaunchScripts => {
                let written = repack::write_launch_scripts(ws)?;
                Ok(format!("Wrote {} launch script(s)", written.len()))
            }
            Operation::DownloadClientData => {
                let files = repack::download_client_data(ws, &self.data_url, ctx)?;
                Ok(format!("Extracted {} client data file(s)", files))
            }
            Operation::InitializeMysql => {
                self.mysql.initialize(ctx)?;
                Ok("MySQL data directory initialized".to_string())
            }
            Operation::StartMysql => {
                let pid = self.mysql.start(ctx)?;
                Ok(format!("MySQL running (PID {})", pid))
            }
            Operation::StopMysql => {
                let outcome = self.mysql.stop(ctx)?;
                Ok(format!("MySQL stop: {:?}", outcome))
            }
            Operation::MysqlStatus => {
                let status = self.mysql.status();
                Ok(match (status.tracked, status.any) {
                    (true, _) => "MySQL is running (started by this session)".to_string(),
                    (false, true) => "MySQL is running (external process)".to_string(),
                    (false, false) => "MySQL is not running".to_string(),
                })
            }
            Operation::ConfigureMysql { root_password } => {
                let written = mysql::configure(ws, &root_password, ctx)?;
                Ok(format!("Root password set, {} client config file(s) written", written.len()))
            }
            Operation::CreateDatabase { root_password } => {
                mysql::create_database(ws, &MySqlConnection::root(root_password), ctx)?;
                Ok("AzerothCore databases created".to_string())
            }
            Operation::ImportBaseSql { password, root_password } => {
                let conn = self.connection(&password);
                let report = mysql::import_base_sql(ws, &conn, move || root_password.clone(), ctx)?;
                Ok(report.summary())
            }
            Operation::ImportModuleSql { password, root_password } => {
                let conn = self.connection(&password);
                let report =
                    mysql::import_module_sql(ws, &conn, move || root_password.clone(), ctx)?;
                Ok(report.summary())
            }
            Operation::LaunchServer { kind } => {
                repack::launch_server(kind, ws, ctx)?;
                Ok(format!("{} launched", kind.exe_name()))
            }
        }
    }
}

// ============================================================================
// Background execution
// ============================================================================

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run `op` on a worker thread. Errors and panics are logged and turned into
/// a final status message; the thread never takes the process down.
pub fn spawn_operation(
    session: Arc<Mutex<Session>>,
    op: Operation,
    ctx: TaskContext,
) -> JoinHandle<TaskResult<String>> {
    thread::spawn(move || {
        let id = op.id();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| session.lock().execute(op, &ctx)));
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => Err(TaskError::other(id, format!("panicked: {}", panic_message(&*payload)))),
        };
        match &result {
            Ok(summary) => {
                log_action(&format!("{} finished", id));
                ctx.set_status(summary.clone());
            }
            Err(e) if e.is_cancelled() => {
                log_action(&format!("{} cancelled", id));
                ctx.set_status("Cancelled");
            }
            Err(e) => {
                log_error(&format!("{} failed: {}", id, e));
                ctx.set_status(format!("Error: {}", e));
            }
        }
        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_operation_has_a_descriptor() {
        let ops = [
            Operation::ScanDependencies,
            Operation::UpdateSource,
            Operation::CreateRepack,
            Operation::MysqlStatus,
            Operation::LaunchServer { kind: ServerKind::World },
            Operation::ImportModuleSql {
                password: String::new(),
                root_password: None,
            },
        ];
        for op in ops {
            assert!(op.info().is_some(), "{} missing from COMMANDS", op.id());
        }
    }

    #[test]
    fn command_ids_are_unique() {
        let ids: HashSet<_> = COMMANDS.iter().map(|c| c.id).collect();
        assert_eq!(ids.len(), COMMANDS.len());
    }

    #[test]
    fn failures_become_status_messages() {
        let dir = tempfile::tempdir().unwrap();
        let session = Arc::new(Mutex::new(Session::new(Workspace::new(dir.path()))));
        let statuses = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = statuses.clone();
        let ctx = TaskContext::new(
            move |s| sink.lock().push(s),
            |_| {},
            |_| {},
            |_| true,
            Default::default(),
        );

        let result = spawn_operation(session, Operation::CreateRepack, ctx)
            .join()
            .unwrap();
        assert!(matches!(result, Err(TaskError::Precondition { .. })));
        assert!(statuses.lock().last().unwrap().starts_with("Error:"));
    }
}
