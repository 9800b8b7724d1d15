//! Starting the auth and world servers from the Repack

use std::path::Path;

use super::require_repack;
use crate::logging::log_action;
use crate::paths::Workspace;
use crate::process::ToolCommand;
use crate::task::{TaskContext, TaskError, TaskResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerKind {
    Auth,
    World,
}

impl ServerKind {
    pub fn exe_name(self) -> &'static str {
        match self {
            ServerKind::Auth => "authserver.exe",
            ServerKind::World => "worldserver.exe",
        }
    }

    pub fn conf_name(self) -> &'static str {
        match self {
            ServerKind::Auth => "authserver.conf",
            ServerKind::World => "worldserver.conf",
        }
    }

    fn title(self) -> &'static str {
        match self {
            ServerKind::Auth => "AuthServer",
            ServerKind::World => "WorldServer",
        }
    }
}

/// `cmd /C start` gives the server its own console window, where the world
/// server's interactive prompt lives.
pub fn launch_command(kind: ServerKind, repack: &Path) -> ToolCommand {
    ToolCommand::new("cmd")
        .args(["/C", "start", kind.title(), "/D"])
        .arg(repack)
        .arg(repack.join(kind.exe_name()))
        .current_dir(repack)
        .label(kind.title())
}

pub fn launch_server(kind: ServerKind, workspace: &Workspace, ctx: &TaskContext) -> TaskResult<()> {
    let repack = require_repack(workspace)?;
    let exe = repack.join(kind.exe_name());
    if !exe.is_file() {
        return Err(TaskError::precondition(format!(
            "{} (run Create Repack first)",
            exe.display()
        )));
    }
    let conf = repack.join("configs").join(kind.conf_name());
    if !conf.is_file() {
        return Err(TaskError::precondition(format!(
            "{} (run Create Configs first)",
            conf.display()
        )));
    }

    launch_command(kind, &repack)
        .run(ctx)?
        .into_result(&format!("Starting {}", kind.title()))?;
    log_action(&format!("{} started", kind.title()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn refuses_without_config() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        fs::create_dir_all(ws.repack_dir()).unwrap();
        fs::write(ws.repack_dir().join("worldserver.exe"), "").unwrap();

        let err = launch_server(ServerKind::World, &ws, &TaskContext::headless(true)).unwrap_err();
        match err {
            TaskError::Precondition { what } => assert!(what.contains("worldserver.conf")),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn command_starts_from_repack_folder() {
        let cmd = launch_command(ServerKind::Auth, Path::new("Repack"));
        let args: Vec<String> = cmd
            .arg_list()
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(args[..4], ["/C", "start", "AuthServer", "/D"]);
        assert_eq!(args[4], "Repack");
        assert!(args[5].ends_with("authserver.exe"));
    }
}
