//! Root password setup and game database creation

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{sql_string, MySqlConnection, MySqlPaths};
use crate::logging::{log_database, log_warning};
use crate::paths::Workspace;
use crate::task::{check_cancelled, TaskContext, TaskError, TaskResult};
use crate::utils::download_file;

pub const CREATE_SQL_URL: &str =
    "https://raw.githubusercontent.com/azerothcore/azerothcore-wotlk/master/data/sql/create/create_mysql.sql";

const CLIENT_TIMEOUT: Duration = Duration::from_secs(300);

/// `[client]` option file contents.
pub fn client_config_contents(conn: &MySqlConnection) -> String {
    format!(
        "[client]\nuser={}\npassword={}\nhost={}\nport={}\n",
        conn.user, conn.password, conn.host, conn.port
    )
}

/// Run `script` through the client by piping it into stdin, then delete it.
fn run_script_file(
    paths: &MySqlPaths,
    conn: &MySqlConnection,
    script: &Path,
    label: &str,
    ctx: &TaskContext,
) -> TaskResult<()> {
    let result = paths
        .client_command(conn)
        .stdin_file(script)
        .label(label)
        .timeout(CLIENT_TIMEOUT)
        .run(ctx)
        .map_err(TaskError::from)
        .and_then(|out| out.into_result(label).map(|_| ()));
    if let Err(e) = fs::remove_file(script) {
        log_warning(&format!("Could not remove {}: {}", script.display(), e));
    }
    result
}

/// Write `[client]` credential files beside the bundled MySQL and the build
/// output, then set the root password.
///
/// A freshly initialized server has a passwordless root, so the ALTER USER
/// runs without one.
pub fn configure(
    workspace: &Workspace,
    root_password: &str,
    ctx: &TaskContext,
) -> TaskResult<Vec<PathBuf>> {
    let paths = MySqlPaths::for_workspace(workspace);
    if !paths.bin_dir().is_dir() {
        return Err(TaskError::precondition(format!(
            "{} (run Create MySQL first)",
            paths.bin_dir().display()
        )));
    }

    let conn = MySqlConnection::root(root_password);
    let contents = client_config_contents(&conn);
    let mut written = Vec::new();
    for dir in [paths.bin_dir(), workspace.build_output_dir()] {
        if !dir.is_dir() {
            log_warning(&format!("{} does not exist, skipping my.cnf there", dir.display()));
            continue;
        }
        let file = dir.join("my.cnf");
        fs::write(&file, &contents)
            .map_err(|e| TaskError::io(format!("Writing {}", file.display()), e))?;
        written.push(file);
    }

    check_cancelled(ctx)?;
    ctx.set_status("Setting MySQL root password...");
    fs::create_dir_all(paths.tmp_dir())?;
    let script = paths.tmp_dir().join("acb_set_root.sql");
    fs::write(
        &script,
        format!(
            "ALTER USER 'root'@'localhost' IDENTIFIED BY {};\n",
            sql_string(root_password)
        ),
    )
    .map_err(|e| TaskError::io(format!("Writing {}", script.display()), e))?;
    run_script_file(&paths, &MySqlConnection::root(""), &script, "ALTER USER root", ctx)?;

    log_database(&format!("Root password set; wrote {} client config file(s)", written.len()));
    Ok(written)
}

/// Run `exec` (download included) on a temporary script, then remove the
/// script and its folder (if left empty) whether or not `exec` succeeded.
pub fn with_temp_script<T>(
    script: &Path,
    exec: impl FnOnce(&Path) -> TaskResult<T>,
) -> TaskResult<T> {
    let result = exec(script);
    if script.exists() {
        if let Err(e) = fs::remove_file(script) {
            log_warning(&format!("Could not remove {}: {}", script.display(), e));
        }
    }
    if let Some(dir) = script.parent() {
        let empty = fs::read_dir(dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if empty {
            let _ = fs::remove_dir(dir);
        }
    }
    result
}

/// Download upstream `create_mysql.sql` and source it as root.
pub fn create_database(
    workspace: &Workspace,
    root: &MySqlConnection,
    ctx: &TaskContext,
) -> TaskResult<()> {
    let paths = MySqlPaths::for_workspace(workspace);
    let temp_dir = std::env::temp_dir().join(format!("acb_sql_{}", std::process::id()));
    let script = temp_dir.join("create_mysql.sql");

    with_temp_script(&script, |script| {
        ctx.set_status("Downloading create_mysql.sql...");
        download_file(CREATE_SQL_URL, script, ctx, |_, _| {}).map_err(|e| match e {
            TaskError::Cancelled => TaskError::Cancelled,
            other => TaskError::Download {
                attempted: vec![CREATE_SQL_URL.to_string()],
                reason: other.to_string(),
            },
        })?;

        ctx.set_status("Creating AzerothCore databases...");
        paths
            .client_command(root)
            .arg(format!("--execute=source {}", script.display()))
            .label("create_mysql.sql")
            .timeout(CLIENT_TIMEOUT)
            .run(ctx)?
            .into_result("create_mysql.sql")?;
        log_database("Created acore_auth, acore_characters and acore_world");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_config_has_all_fields() {
        let text = client_config_contents(&MySqlConnection::root("pw"));
        assert!(text.starts_with("[client]\n"));
        for line in ["user=root", "password=pw", "host=127.0.0.1", "port=3306"] {
            assert!(text.contains(line), "missing {line}");
        }
    }

    #[test]
    fn temp_script_is_removed_even_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("acb_sql_1");
        fs::create_dir_all(&temp).unwrap();
        let script = temp.join("create_mysql.sql");
        fs::write(&script, "CREATE DATABASE x;").unwrap();

        let result: TaskResult<()> =
            with_temp_script(&script, |_| Err(TaskError::other("mysql", "exit 1")));
        assert!(result.is_err());
        assert!(!script.exists());
        assert!(!temp.exists());
    }

    #[test]
    fn temp_folder_is_removed_when_the_download_fails() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("acb_sql_2");
        let script = temp.join("create_mysql.sql");

        let result: TaskResult<()> = with_temp_script(&script, |script| {
            fs::create_dir_all(script.parent().unwrap()).unwrap();
            Err(TaskError::Download {
                attempted: vec![CREATE_SQL_URL.to_string()],
                reason: "HTTP 503".into(),
            })
        });
        assert!(matches!(result, Err(TaskError::Download { .. })));
        assert!(!temp.exists());
    }

    #[test]
    fn configure_requires_bundled_mysql() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        let err = configure(&ws, "pw", &TaskContext::headless(true)).unwrap_err();
        assert!(matches!(err, TaskError::Precondition { .. }));
    }
}
