//! ACB - AzerothCore Builder
//!
//! Command-line front end over the `commands` table.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use parking_lot::Mutex;

use acb_rust::commands::{spawn_operation, Operation, Session, COMMANDS};
use acb_rust::logging::{current_log_path, init_logger, log_info, log_warning};
use acb_rust::paths::Workspace;
use acb_rust::repack::{ConfigPathValues, ServerKind};
use acb_rust::source::{find_module, ModuleSpec, SourceVariant};
use acb_rust::task::TaskContext;

#[derive(Parser, Debug)]
#[command(name = "acb", version, about = "AzerothCore Builder: dependencies, source, build, repack and MySQL")]
struct Cli {
    /// Application directory (defaults to the folder holding the executable)
    #[arg(long, short = 'w', global = true)]
    workspace: Option<PathBuf>,

    /// Answer "yes" to every confirmation prompt
    #[arg(long, short = 'y', global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum VariantArg {
    Standard,
    Npcbots,
    Playerbots,
    Custom,
}

impl From<VariantArg> for SourceVariant {
    fn from(v: VariantArg) -> Self {
        match v {
            VariantArg::Standard => SourceVariant::Standard,
            VariantArg::Npcbots => SourceVariant::NpcBots,
            VariantArg::Playerbots => SourceVariant::PlayerBots,
            VariantArg::Custom => SourceVariant::Custom,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ServerArg {
    Auth,
    World,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every available operation
    Commands,
    /// Scan for installed dependencies
    Scan,
    /// Download and install a dependency by name
    Install { name: String },
    /// Clone a source variant into GitSource
    Clone {
        #[arg(value_enum)]
        variant: VariantArg,
        /// Repository URL for the custom variant (persisted)
        #[arg(long)]
        url: Option<String>,
    },
    /// Fetch and pull the active source
    Update,
    /// Delete the source folder
    Clean,
    /// List catalog and cloned modules
    Modules,
    /// Clone modules by catalog name or by URL
    CloneModule {
        #[arg(required = true)]
        modules: Vec<String>,
    },
    /// Delete one cloned module
    CleanModule { name: String },
    /// Configure and compile
    Build {
        /// Also build the map extractors
        #[arg(long)]
        extractors: bool,
    },
    /// Copy the build output into Repack
    Repack,
    /// Create .conf files from their .conf.dist templates
    Configs,
    /// Replace the default DataDir/LogsDir/MySQLExecutable lines
    ConfigPaths {
        #[arg(long)]
        data_dir: Option<String>,
        #[arg(long)]
        logs_dir: Option<String>,
        #[arg(long)]
        mysql_executable: Option<String>,
    },
    /// Turn the database autoupdater on or off
    Autoupdater {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Copy a MySQL installation into Repack/mysql
    CreateMysql,
    /// Copy runtime DLLs into Repack
    CreateDlls,
    /// Write the portable my.ini
    MyIni,
    /// Write my.ini and the launch scripts
    Scripts,
    /// Download and extract the client data
    ClientData,
    /// Initialize the bundled MySQL data directory
    MysqlInit,
    /// Start the bundled MySQL and keep it running until Ctrl-C
    MysqlStart,
    /// Stop every running mysqld
    MysqlStop,
    /// Show whether MySQL is running
    MysqlStatus,
    /// Set the root password and write client config files
    MysqlConfigure,
    /// Create the AzerothCore databases
    CreateDatabase,
    /// Import base game SQL
    ImportSql {
        /// Import module SQL instead of the base game
        #[arg(long)]
        modules: bool,
    },
    /// Start the auth or world server
    Launch {
        #[arg(value_enum)]
        server: ServerArg,
    },
}

fn prompt_line(question: &str) -> Option<String> {
    eprint!("{} ", question);
    let _ = io::stderr().flush();
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).ok()?;
    Some(line.trim_end_matches(['\r', '\n']).to_string())
}

fn prompt_password(what: &str) -> String {
    if let Ok(value) = std::env::var("ACB_MYSQL_PASSWORD") {
        return value;
    }
    prompt_line(&format!("{}:", what)).unwrap_or_default()
}

fn module_from_arg(arg: &str) -> Option<ModuleSpec> {
    if arg.contains("://") || arg.ends_with(".git") {
        ModuleSpec::from_url(arg)
    } else {
        find_module(arg)
    }
}

fn build_context(assume_yes: bool, cancel: Arc<AtomicBool>) -> TaskContext {
    let last_step = Arc::new(AtomicI32::new(-1));
    TaskContext::new(
        |status| log_info(&status),
        |line| log_info(&line),
        move |progress| match progress {
            Some(p) => {
                let step = (p * 10.0) as i32;
                if last_step.swap(step, Ordering::Relaxed) != step {
                    eprintln!("  {:>3}%", step * 10);
                }
            }
            None => {
                last_step.store(-1, Ordering::Relaxed);
            }
        },
        move |question| {
            if assume_yes {
                return true;
            }
            matches!(
                prompt_line(&format!("{} [y/N]", question)).as_deref().map(str::trim),
                Some("y" | "Y" | "yes" | "Yes")
            )
        },
        cancel,
    )
}

/// Operations a subcommand runs, in order. Empty for purely local commands.
fn to_operations(command: Command, session: &Mutex<Session>) -> Result<Vec<Operation>, String> {
    let op = match command {
        Command::Commands => {
            let mut group = "";
            for info in COMMANDS {
                if info.group != group {
                    group = info.group;
                    println!("{}:", group);
                }
                println!("  {:<22} {}", info.id, info.label);
            }
            return Ok(Vec::new());
        }
        Command::Scan => Operation::ScanDependencies,
        Command::Install { name } => Operation::InstallDependency { name },
        Command::Clone { variant, url } => {
            if let Some(url) = url {
                let mut s = session.lock();
                let ws = s.workspace.clone();
                s.config.custom_git_url = Some(url);
                s.config.save_for(&ws);
            }
            Operation::CloneSource {
                variant: variant.into(),
            }
        }
        Command::Update => Operation::UpdateSource,
        Command::Clean => Operation::CleanSource,
        Command::Modules => Operation::ListModules,
        Command::CloneModule { modules } => {
            let specs = modules
                .iter()
                .map(|m| module_from_arg(m).ok_or_else(|| format!("Unknown module: {}", m)))
                .collect::<Result<Vec<_>, _>>()?;
            Operation::CloneModules { modules: specs }
        }
        Command::CleanModule { name } => Operation::CleanModule { name },
        Command::Build { extractors } => Operation::Build {
            generate_extractors: extractors,
        },
        Command::Repack => Operation::CreateRepack,
        Command::Configs => Operation::CreateConfigs,
        Command::ConfigPaths {
            data_dir,
            logs_dir,
            mysql_executable,
        } => Operation::ConfigPaths {
            values: ConfigPathValues {
                data_dir,
                logs_dir,
                mysql_executable,
            },
        },
        Command::Autoupdater { state } => Operation::SetAutoupdater {
            enabled: matches!(state, Toggle::On),
        },
        Command::CreateMysql => Operation::CreateMysql,
        Command::CreateDlls => Operation::CreateDlls,
        Command::MyIni => Operation::WriteMyIni,
        Command::Scripts => return Ok(vec![Operation::WriteMyIni, Operation::WriteLaunchScripts]),
        Command::ClientData => Operation::DownloadClientData,
        Command::MysqlInit => Operation::InitializeMysql,
        Command::MysqlStart => Operation::StartMysql,
        Command::MysqlStop => Operation::StopMysql,
        Command::MysqlStatus => Operation::MysqlStatus,
        Command::MysqlConfigure => Operation::ConfigureMysql {
            root_password: prompt_password("New MySQL root password"),
        },
        Command::CreateDatabase => Operation::CreateDatabase {
            root_password: prompt_password("MySQL root password"),
        },
        Command::ImportSql { modules } => {
            let user = session.lock().config.mysql.user.clone();
            let password = prompt_password(&format!("MySQL password for {}", user));
            let root_password = if user.eq_ignore_ascii_case("root") {
                None
            } else {
                Some(prompt_password("MySQL root password (used to create missing databases)"))
            };
            if modules {
                Operation::ImportModuleSql { password, root_password }
            } else {
                Operation::ImportBaseSql { password, root_password }
            }
        }
        Command::Launch { server } => Operation::LaunchServer {
            kind: match server {
                ServerArg::Auth => ServerKind::Auth,
                ServerArg::World => ServerKind::World,
            },
        },
    };
    Ok(vec![op])
}

fn main() {
    let cli = Cli::parse();
    if let Some(dir) = &cli.workspace {
        std::env::set_var("ACB_HOME", dir);
    }

    init_logger();
    log_info(&format!("ACB v{} starting up...", env!("CARGO_PKG_VERSION")));
    if let Some(path) = current_log_path() {
        log_info(&format!("Session log: {}", path.display()));
    }

    let workspace = cli.workspace.clone().map(Workspace::new).unwrap_or_default();
    let session = Arc::new(Mutex::new(Session::new(workspace)));

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        if handler_flag.swap(true, Ordering::Relaxed) {
            std::process::exit(130);
        }
        eprintln!("Cancelling... (press Ctrl-C again to exit immediately)");
    }) {
        log_warning(&format!("Could not install Ctrl-C handler: {}", e));
    }

    let keep_running = matches!(cli.command, Command::MysqlStart);
    let ops = match to_operations(cli.command, &session) {
        Ok(ops) => ops,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };
    if ops.is_empty() {
        return;
    }

    let ctx = build_context(cli.yes, cancel.clone());
    let mut result = Ok(String::new());
    for op in ops {
        result = match spawn_operation(session.clone(), op, ctx.clone()).join() {
            Ok(result) => result,
            Err(_) => {
                eprintln!("Error: worker thread aborted");
                std::process::exit(1);
            }
        };
        match &result {
            Ok(summary) if !keep_running => println!("{}", summary),
            Ok(_) => {}
            Err(_) => break,
        }
    }

    match result {
        Ok(summary) => {
            if keep_running {
                println!("{}", summary);
                eprintln!("Press Ctrl-C to stop MySQL.");
                while !cancel.load(Ordering::Relaxed) {
                    std::thread::sleep(std::time::Duration::from_millis(250));
                }
                cancel.store(false, Ordering::Relaxed);
                let stop_ctx = build_context(true, cancel);
                if let Err(e) = session.lock().execute(Operation::StopMysql, &stop_ctx) {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Err(e) if e.is_cancelled() => std::process::exit(130),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> (tempfile::TempDir, Mutex<Session>) {
        let dir = tempfile::tempdir().unwrap();
        let session = Mutex::new(Session::new(Workspace::new(dir.path())));
        (dir, session)
    }

    fn ids(command: Command) -> Vec<&'static str> {
        let (_dir, session) = session();
        to_operations(command, &session)
            .unwrap()
            .iter()
            .map(Operation::id)
            .collect()
    }

    #[test]
    fn scripts_writes_my_ini_before_the_batch_files() {
        assert_eq!(ids(Command::Scripts), vec!["write_my_ini", "write_launch_scripts"]);
        assert_eq!(ids(Command::MyIni), vec!["write_my_ini"]);
    }

    #[test]
    fn listing_commands_runs_nothing() {
        assert!(ids(Command::Commands).is_empty());
    }

    #[test]
    fn unknown_module_is_rejected_before_running() {
        let (_dir, session) = session();
        let err = to_operations(
            Command::CloneModule {
                modules: vec!["mod-does-not-exist".into()],
            },
            &session,
        )
        .unwrap_err();
        assert!(err.contains("mod-does-not-exist"));
    }
}
