//! SQL import for the base game and for modules
//!
//! Target databases come from the folder convention when there is one and
//! from a keyword guess otherwise. Databases a script references on its own
//! (`USE x`, `INSERT INTO x.t`, ...) are created first if missing.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use walkdir::WalkDir;

use super::{sql_ident, sql_string, MySqlConnection, MySqlPaths, AUTH_DB, CHARACTERS_DB, WORLD_DB};
use crate::logging::{log_database, log_error, log_warning};
use crate::paths::Workspace;
use crate::task::{check_cancelled, TaskContext, TaskError, TaskResult};

pub const IMPORT_TIMEOUT: Duration = Duration::from_secs(300);

// ============================================================================
// Database detection
// ============================================================================

static DATABASE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?im)(?:^|;)\s*USE\s+`?(\w+)`?",
        r"(?im)(?:^|;)\s*CREATE\s+DATABASE\s+(?:IF\s+NOT\s+EXISTS\s+)?`?(\w+)`?",
        r"(?i)\bINSERT\s+(?:IGNORE\s+)?INTO\s+`?(\w+)`?\s*\.\s*`?\w+",
        r"(?i)\bUPDATE\s+`?(\w+)`?\s*\.\s*`?\w+",
        r"(?i)\bFROM\s+`?(\w+)`?\s*\.\s*`?\w+",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("database pattern is a valid regex"))
    .collect()
});

/// String literals and comments. Literals come first so a `#` or `--`
/// inside quotes is not read as a comment.
static LITERALS_AND_COMMENTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)'(?:[^'\\]|\\.|'')*'|"(?:[^"\\]|\\.|"")*"|/\*.*?\*/|--[^\n]*|#[^\n]*"#)
        .expect("literal pattern is a valid regex")
});

/// Databases a script names explicitly. Comments and quoted text are ignored.
pub fn detect_required_databases(sql: &str) -> BTreeSet<String> {
    let stripped = LITERALS_AND_COMMENTS.replace_all(sql, " ");
    DATABASE_PATTERNS
        .iter()
        .flat_map(|re| re.captures_iter(&stripped))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

const AUTH_KEYWORDS: &[&str] = &["realmlist", "account_access", "account_banned", "`account`", " account ", "logs_ip_actions"];
const CHARACTER_KEYWORDS: &[&str] = &[
    "`characters`",
    " characters ",
    "character_",
    "guild_member",
    "item_instance",
    "mail_items",
];

/// Keyword guess for scripts outside the folder convention; world otherwise.
pub fn guess_database(sql: &str) -> &'static str {
    let lower = sql.to_lowercase();
    if AUTH_KEYWORDS.iter().any(|k| lower.contains(k)) {
        AUTH_DB
    } else if CHARACTER_KEYWORDS.iter().any(|k| lower.contains(k)) {
        CHARACTERS_DB
    } else {
        WORLD_DB
    }
}

/// Database implied by folder names such as `db_world`, `db-auth` or
/// `characters`.
pub fn database_from_path(path: &Path) -> Option<&'static str> {
    path.components().rev().find_map(|c| {
        let Component::Normal(name) = c else {
            return None;
        };
        let name = name.to_string_lossy().to_lowercase();
        let name = name
            .trim_start_matches("pending_")
            .trim_start_matches("db_")
            .trim_start_matches("db-");
        match name {
            "auth" | "acore_auth" => Some(AUTH_DB),
            "characters" | "character" | "acore_characters" => Some(CHARACTERS_DB),
            "world" | "acore_world" => Some(WORLD_DB),
            _ => None,
        }
    })
}

// ============================================================================
// Executor seam
// ============================================================================

/// The operations import needs from a MySQL server.
pub trait SqlExecutor {
    fn database_exists(&mut self, name: &str, ctx: &TaskContext) -> TaskResult<bool>;
    /// Create `name` and grant the operating user full access to it.
    fn create_database(&mut self, name: &str, ctx: &TaskContext) -> TaskResult<()>;
    fn import_file(&mut self, database: &str, file: &Path, ctx: &TaskContext) -> TaskResult<()>;
}

/// Executor backed by the bundled `mysql` client.
pub struct MysqlCli {
    paths: MySqlPaths,
    conn: MySqlConnection,
    root: Option<MySqlConnection>,
    ask_root_password: Box<dyn FnMut() -> Option<String> + Send>,
}

impl MysqlCli {
    /// `ask_root_password` is called at most once, the first time a missing
    /// database has to be created.
    pub fn new(
        paths: MySqlPaths,
        conn: MySqlConnection,
        ask_root_password: impl FnMut() -> Option<String> + Send + 'static,
    ) -> Self {
        Self {
            paths,
            conn,
            root: None,
            ask_root_password: Box::new(ask_root_password),
        }
    }

    fn root_connection(&mut self) -> TaskResult<MySqlConnection> {
        if self.conn.is_root() {
            return Ok(self.conn.clone());
        }
        if let Some(root) = &self.root {
            return Ok(root.clone());
        }
        let password = (self.ask_root_password)()
            .ok_or_else(|| TaskError::precondition("the MySQL root password"))?;
        let root = self.conn.with_user("root", password);
        self.root = Some(root.clone());
        Ok(root)
    }
}

impl SqlExecutor for MysqlCli {
    fn database_exists(&mut self, name: &str, ctx: &TaskContext) -> TaskResult<bool> {
        let out = self
            .paths
            .client_command(&self.conn)
            .args(["-N", "-B"])
            .arg(format!("--execute=SHOW DATABASES LIKE {}", sql_string(name)))
            .quiet()
            .timeout(Duration::from_secs(30))
            .run(ctx)?
            .into_result("SHOW DATABASES")?;
        Ok(out.lines.iter().any(|l| l.trim() == name))
    }

    fn create_database(&mut self, name: &str, ctx: &TaskContext) -> TaskResult<()> {
        let root = self.root_connection()?;
        let mut sql = format!("CREATE DATABASE IF NOT EXISTS {};", sql_ident(name));
        if !self.conn.is_root() {
            sql.push_str(&format!(
                " GRANT ALL PRIVILEGES ON {}.* TO {}@'localhost'; FLUSH PRIVILEGES;",
                sql_ident(name),
                sql_string(&self.conn.user)
            ));
        }
        self.paths
            .client_command(&root)
            .arg(format!("--execute={}", sql))
            .label("CREATE DATABASE")
            .timeout(Duration::from_secs(60))
            .run(ctx)?
            .into_result(&format!("Creating database {}", name))?;
        Ok(())
    }

    fn import_file(&mut self, database: &str, file: &Path, ctx: &TaskContext) -> TaskResult<()> {
        let label = format!(
            "mysql < {}",
            file.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
        );
        self.paths
            .client_command(&self.conn)
            .arg(database)
            .stdin_file(file)
            .label(&label)
            .timeout(IMPORT_TIMEOUT)
            .run(ctx)?
            .into_result(&label)?;
        Ok(())
    }
}

// ============================================================================
// Import
// ============================================================================

#[derive(Debug, Default, Clone)]
pub struct ImportReport {
    pub imported: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
    pub created_databases: Vec<String>,
}

impl ImportReport {
    pub fn summary(&self) -> String {
        let mut text = format!("{} file(s) imported", self.imported.len());
        if !self.created_databases.is_empty() {
            text.push_str(&format!(", created {}", self.created_databases.join(", ")));
        }
        if !self.failed.is_empty() {
            text.push_str(&format!(", {} failed:", self.failed.len()));
            for (file, reason) in &self.failed {
                text.push_str(&format!("\n  - {}: {}", file.display(), reason));
            }
        }
        text
    }
}

fn sql_files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("sql"))
        })
        .collect();
    files.sort();
    files
}

/// Base game scripts in apply order: per database, base then updates then
/// pending.
pub fn collect_base_sql(source_dir: &Path) -> Vec<(PathBuf, String)> {
    let sql_root = source_dir.join("data").join("sql");
    let mut plan = Vec::new();
    for (short, db) in [("auth", AUTH_DB), ("characters", CHARACTERS_DB), ("world", WORLD_DB)] {
        let folder = format!("db_{}", short);
        let pending = format!("pending_db_{}", short);
        for dir in [
            sql_root.join("base").join(&folder),
            sql_root.join("updates").join(&folder),
            sql_root.join("updates").join(&pending),
            sql_root.join(&pending),
        ] {
            plan.extend(sql_files_in(&dir).into_iter().map(|f| (f, db.to_string())));
        }
    }
    plan
}

/// Every module script with its target database.
pub fn collect_module_sql(modules_dir: &Path) -> Vec<(PathBuf, String)> {
    sql_files_in(modules_dir)
        .into_iter()
        .map(|file| {
            let rel = file.strip_prefix(modules_dir).unwrap_or(&file);
            let db = match database_from_path(rel.parent().unwrap_or(rel)) {
                Some(db) => db,
                None => {
                    let content = fs::read_to_string(&file).unwrap_or_default();
                    guess_database(&content)
                }
            };
            (file, db.to_string())
        })
        .collect()
}

/// Import each `(file, database)` pair. One file failing is recorded and
/// the rest continue; cancellation stops the run.
pub fn import_files(
    plan: &[(PathBuf, String)],
    executor: &mut dyn SqlExecutor,
    ctx: &TaskContext,
) -> TaskResult<ImportReport> {
    let mut report = ImportReport::default();
    let mut known: BTreeSet<String> = BTreeSet::new();

    for (i, (file, database)) in plan.iter().enumerate() {
        check_cancelled(ctx)?;
        ctx.set_status(format!(
            "Importing {} ({}/{})",
            file.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
            i + 1,
            plan.len()
        ));

        let outcome = import_one(file, database, executor, &mut known, &mut report, ctx);
        match outcome {
            Ok(()) => report.imported.push(file.clone()),
            Err(TaskError::Cancelled) => return Err(TaskError::Cancelled),
            Err(e) => {
                log_error(&format!("Import of {} failed: {}", file.display(), e));
                report.failed.push((file.clone(), e.to_string()));
            }
        }
        ctx.set_progress((i + 1) as f32 / plan.len() as f32);
    }

    log_database(&report.summary());
    Ok(report)
}

fn import_one(
    file: &Path,
    database: &str,
    executor: &mut dyn SqlExecutor,
    known: &mut BTreeSet<String>,
    report: &mut ImportReport,
    ctx: &TaskContext,
) -> TaskResult<()> {
    let bytes = fs::read(file).map_err(|e| TaskError::io(format!("Reading {}", file.display()), e))?;
    let sql = String::from_utf8_lossy(&bytes);

    for required in detect_required_databases(&sql) {
        if known.contains(&required) {
            continue;
        }
        if !executor.database_exists(&required, ctx)? {
            log_warning(&format!("{} references missing database {}, creating it", file.display(), required));
            executor.create_database(&required, ctx)?;
            report.created_databases.push(required.clone());
        }
        known.insert(required);
    }

    executor.import_file(database, file, ctx)
}

fn executor_for(workspace: &Workspace, conn: &MySqlConnection, ask_root: impl FnMut() -> Option<String> + Send + 'static) -> MysqlCli {
    MysqlCli::new(MySqlPaths::for_workspace(workspace), conn.clone(), ask_root)
}

/// Import the base game's `data/sql` scripts into the three game databases.
pub fn import_base_sql(
    workspace: &Workspace,
    conn: &MySqlConnection,
    ask_root: impl FnMut() -> Option<String> + Send + 'static,
    ctx: &TaskContext,
) -> TaskResult<ImportReport> {
    let source = workspace.source_dir();
    let plan = collect_base_sql(&source);
    if plan.is_empty() {
        return Err(TaskError::precondition(format!(
            "SQL scripts under {} (clone the source first)",
            source.join("data/sql").display()
        )));
    }
    import_files(&plan, &mut executor_for(workspace, conn, ask_root), ctx)
}

/// Import every `.sql` file found under the source's `modules` folder.
pub fn import_module_sql(
    workspace: &Workspace,
    conn: &MySqlConnection,
    ask_root: impl FnMut() -> Option<String> + Send + 'static,
    ctx: &TaskContext,
) -> TaskResult<ImportReport> {
    let modules = workspace.modules_dir();
    if !modules.is_dir() {
        return Err(TaskError::precondition(format!("{}", modules.display())));
    }
    let plan = collect_module_sql(&modules);
    if plan.is_empty() {
        log_database("No module SQL files found");
    }
    import_files(&plan, &mut executor_for(workspace, conn, ask_root), ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_use_and_qualified_insert() {
        let dbs = detect_required_databases("USE acore_world; INSERT INTO acore_auth.account VALUES (1);");
        assert_eq!(
            dbs,
            BTreeSet::from(["acore_world".to_string(), "acore_auth".to_string()])
        );
    }

    #[test]
    fn detects_create_update_and_from() {
        let sql = "CREATE DATABASE IF NOT EXISTS `acore_playerbots`;\n\
                   UPDATE acore_characters.characters SET online = 0;\n\
                   SELECT * FROM `acore_world`.`creature`;";
        let dbs = detect_required_databases(sql);
        assert!(dbs.contains("acore_playerbots"));
        assert!(dbs.contains("acore_characters"));
        assert!(dbs.contains("acore_world"));
    }

    #[test]
    fn unqualified_statements_and_comments_need_nothing() {
        let sql = "-- use this for testing\n/* USE acore_auth; */\n\
                   DELETE FROM `creature_template` WHERE `entry` = 1;\n\
                   INSERT INTO `creature_template` (`entry`) VALUES (1);";
        assert!(detect_required_databases(sql).is_empty());
    }

    #[test]
    fn prose_in_string_literals_is_not_a_statement() {
        let sql = "INSERT INTO creature_text (Text) VALUES ('You must use the portal');\n\
                   INSERT INTO broadcast_text (Text) VALUES (\"Create database of heroes from the.ashes\");";
        assert!(detect_required_databases(sql).is_empty());
    }

    #[test]
    fn comment_markers_inside_quotes_do_not_hide_statements() {
        let sql = "UPDATE quest_template SET Title = 'Rank #1' WHERE ID = 1; USE acore_playerbots;\n\
                   UPDATE item_template SET name = '---' WHERE entry = 2; USE `acore_eluna`;\n\
                   UPDATE npc_text SET text0_0 = 'It''s; USE nothing' WHERE ID = 3;";
        assert_eq!(
            detect_required_databases(sql),
            BTreeSet::from(["acore_playerbots".to_string(), "acore_eluna".to_string()])
        );
    }

    #[test]
    fn keyword_guess_falls_back_to_world() {
        assert_eq!(guess_database("UPDATE realmlist SET address = '127.0.0.1';"), AUTH_DB);
        assert_eq!(guess_database("DELETE FROM character_aura;"), CHARACTERS_DB);
        assert_eq!(guess_database("DELETE FROM creature WHERE guid = 1;"), WORLD_DB);
    }

    #[test]
    fn folder_names_decide_the_database() {
        assert_eq!(database_from_path(Path::new("mod-x/data/sql/db-world/base")), Some(WORLD_DB));
        assert_eq!(database_from_path(Path::new("mod-x/data/sql/db_auth")), Some(AUTH_DB));
        assert_eq!(
            database_from_path(Path::new("mod-x/sql/characters")),
            Some(CHARACTERS_DB)
        );
        assert_eq!(database_from_path(Path::new("mod-x/sql")), None);
    }
}
