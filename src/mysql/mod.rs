//! MySQL Lifecycle Manager
//!
//! Everything here works against the portable copy in `Repack/mysql`.
//! Passwords reach the `mysql` client through `MYSQL_PWD`, never argv.

pub mod database;
pub mod import;
pub mod server;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::MySqlDefaults;
use crate::paths::Workspace;
use crate::process::ToolCommand;

pub use database::{configure, create_database, CREATE_SQL_URL};
pub use import::{
    detect_required_databases, guess_database, import_base_sql, import_module_sql, ImportReport,
    MysqlCli, SqlExecutor,
};
pub use server::{MySqlServer, ServerStatus, StopOutcome};

pub const AUTH_DB: &str = "acore_auth";
pub const CHARACTERS_DB: &str = "acore_characters";
pub const WORLD_DB: &str = "acore_world";
pub const GAME_DATABASES: [&str; 3] = [AUTH_DB, CHARACTERS_DB, WORLD_DB];

pub const DEFAULT_PORT: u16 = 3306;

/// Credentials for one `mysql` client invocation.
#[derive(Clone, PartialEq, Eq)]
pub struct MySqlConnection {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for MySqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

impl MySqlConnection {
    pub fn new(defaults: &MySqlDefaults, password: impl Into<String>) -> Self {
        Self {
            host: defaults.host.clone(),
            port: defaults.port,
            user: defaults.user.clone(),
            password: password.into(),
        }
    }

    /// Local root account on the default port.
    pub fn root(password: impl Into<String>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            user: "root".to_string(),
            password: password.into(),
        }
    }

    pub fn with_user(&self, user: &str, password: impl Into<String>) -> Self {
        Self {
            user: user.to_string(),
            password: password.into(),
            ..self.clone()
        }
    }

    pub fn is_root(&self) -> bool {
        self.user.eq_ignore_ascii_case("root")
    }
}

/// Layout of the portable MySQL inside the Repack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MySqlPaths {
    root: PathBuf,
}

impl MySqlPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn for_workspace(workspace: &Workspace) -> Self {
        Self::new(workspace.repack_dir().join("mysql"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    pub fn mysqld(&self) -> PathBuf {
        self.bin_dir().join("mysqld.exe")
    }

    pub fn client(&self) -> PathBuf {
        self.bin_dir().join("mysql.exe")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Environment the bundled server and client run in.
    pub fn environment(&self) -> Vec<(String, OsString)> {
        let mut path = OsString::from(self.bin_dir());
        if let Some(current) = std::env::var_os("PATH") {
            path.push(if cfg!(windows) { ";" } else { ":" });
            path.push(current);
        }
        vec![
            ("MYSQL_HOME".to_string(), self.root.clone().into_os_string()),
            ("PATH".to_string(), path),
            ("MYSQL_TCP_PORT".to_string(), OsString::from(DEFAULT_PORT.to_string())),
            (
                "MYSQL_UNIX_PORT".to_string(),
                self.tmp_dir().join("mysql.sock").into_os_string(),
            ),
        ]
    }

    /// `mysql` client command authenticated as `conn`.
    pub fn client_command(&self, conn: &MySqlConnection) -> ToolCommand {
        let program = if self.client().exists() {
            self.client().into_os_string()
        } else {
            OsString::from("mysql")
        };
        ToolCommand::new(program)
            .arg(format!("-h{}", conn.host))
            .arg(format!("-P{}", conn.port))
            .arg(format!("-u{}", conn.user))
            .envs(self.environment())
            .env("MYSQL_PWD", &conn.password)
            .label("mysql")
    }
}

/// Quote a value for use inside a single-quoted SQL string.
pub fn sql_string(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

/// Backtick-quote an identifier.
pub fn sql_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_never_reaches_argv() {
        let paths = MySqlPaths::new("/ws/Repack/mysql");
        let conn = MySqlConnection::root("s3cret");
        let cmd = paths.client_command(&conn);

        assert!(cmd
            .arg_list()
            .iter()
            .all(|a| !a.to_string_lossy().contains("s3cret")));
        assert!(cmd
            .env_list()
            .iter()
            .any(|(k, v)| k == "MYSQL_PWD" && v == "s3cret"));
        assert!(cmd.arg_list().iter().any(|a| a == "-uroot"));
        assert!(!format!("{:?}", conn).contains("s3cret"));
    }

    #[test]
    fn environment_prefixes_bundled_bin() {
        let paths = MySqlPaths::new("/ws/Repack/mysql");
        let env = paths.environment();
        let path = env.iter().find(|(k, _)| k == "PATH").unwrap();
        assert!(path.1.to_string_lossy().starts_with("/ws/Repack/mysql/bin"));
        assert!(env.iter().any(|(k, v)| k == "MYSQL_TCP_PORT" && v == "3306"));
    }

    #[test]
    fn sql_quoting() {
        assert_eq!(sql_string("it's"), "'it''s'");
        assert_eq!(sql_ident("acore`world"), "`acore``world`");
    }
}
