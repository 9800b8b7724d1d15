#![allow(dead_code)]

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use acb_rust::mysql::SqlExecutor;
use acb_rust::paths::Workspace;
use acb_rust::task::{TaskContext, TaskError, TaskResult};
use tempfile::TempDir;

/// Empty workspace rooted in a fresh temp dir.
pub fn setup_workspace() -> (TempDir, Workspace) {
    let tmp = tempfile::tempdir().unwrap();
    let ws = Workspace::new(tmp.path());
    (tmp, ws)
}

pub fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

/// Stock worldserver.conf excerpt with every line the builder rewrites.
pub const WORLDSERVER_DIST: &str = "\
[worldserver]
RealmID = 1
DataDir = \".\"
LogsDir = \"\"
MySQLExecutable = \"\"
Updates.EnableDatabases = 7
Updates.AutoSetup = 1
";

pub const AUTHSERVER_DIST: &str = "\
[authserver]
LogsDir = \"\"
MySQLExecutable = \"\"
RealmServerPort = 3724
";

/// Repack with `configs/*.conf.dist` templates in place.
pub fn repack_with_dist_configs(ws: &Workspace) -> PathBuf {
    let configs = ws.repack_dir().join("configs");
    write_file(&configs.join("worldserver.conf.dist"), WORLDSERVER_DIST);
    write_file(&configs.join("authserver.conf.dist"), AUTHSERVER_DIST);
    write_file(&configs.join("modules/mod_ahbot.conf.dist"), "AuctionHouseBot.EnableSeller = 0\n");
    configs
}

/// Records executor calls instead of talking to a server.
#[derive(Default)]
pub struct StubExecutor {
    pub existing: BTreeSet<String>,
    pub created: Vec<String>,
    pub imported: Vec<(String, PathBuf)>,
    /// File names whose import should fail
    pub failing: BTreeSet<String>,
}

impl StubExecutor {
    pub fn with_databases(names: &[&str]) -> Self {
        Self {
            existing: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }
}

impl SqlExecutor for StubExecutor {
    fn database_exists(&mut self, name: &str, _ctx: &TaskContext) -> TaskResult<bool> {
        Ok(self.existing.contains(name))
    }

    fn create_database(&mut self, name: &str, _ctx: &TaskContext) -> TaskResult<()> {
        self.existing.insert(name.to_string());
        self.created.push(name.to_string());
        Ok(())
    }

    fn import_file(&mut self, database: &str, file: &Path, _ctx: &TaskContext) -> TaskResult<()> {
        let name = file.file_name().unwrap().to_string_lossy().to_string();
        if self.failing.contains(&name) {
            return Err(TaskError::ToolFailed {
                label: format!("mysql < {}", name),
                code: Some(1),
                detail: "ERROR 1064 (42000): You have an error in your SQL syntax".into(),
            });
        }
        self.imported.push((database.to_string(), file.to_path_buf()));
        Ok(())
    }
}
