mod common;

use std::path::PathBuf;

use acb_rust::mysql::import::{collect_base_sql, collect_module_sql, import_files};
use acb_rust::mysql::{AUTH_DB, CHARACTERS_DB, WORLD_DB};
use acb_rust::task::TaskContext;
use common::{setup_workspace, write_file, StubExecutor};

#[test]
fn plain_script_goes_to_the_given_database_and_creates_nothing() {
    let (tmp, _ws) = setup_workspace();
    let file = tmp.path().join("creature_fix.sql");
    write_file(&file, "DELETE FROM `creature` WHERE `guid` = 42;\n");

    let mut exec = StubExecutor::default();
    let plan = vec![(file.clone(), WORLD_DB.to_string())];
    let report = import_files(&plan, &mut exec, &TaskContext::headless(true)).unwrap();

    assert_eq!(report.imported, vec![file.clone()]);
    assert!(report.created_databases.is_empty());
    assert!(exec.created.is_empty());
    assert_eq!(exec.imported, vec![(WORLD_DB.to_string(), file)]);
}

#[test]
fn referenced_databases_are_created_once() {
    let (tmp, _ws) = setup_workspace();
    let a = tmp.path().join("a.sql");
    let b = tmp.path().join("b.sql");
    write_file(&a, "CREATE DATABASE IF NOT EXISTS `acore_playerbots`;\nUSE acore_playerbots;\n");
    write_file(&b, "INSERT INTO acore_playerbots.playerbots_rpg_races VALUES (1, 1);\n");

    let mut exec = StubExecutor::with_databases(&[AUTH_DB, CHARACTERS_DB, WORLD_DB]);
    let plan = vec![(a, WORLD_DB.to_string()), (b, WORLD_DB.to_string())];
    let report = import_files(&plan, &mut exec, &TaskContext::headless(true)).unwrap();

    assert_eq!(exec.created, vec!["acore_playerbots".to_string()]);
    assert_eq!(report.created_databases, vec!["acore_playerbots".to_string()]);
    assert_eq!(report.imported.len(), 2);
}

#[test]
fn quoted_npc_text_creates_no_databases() {
    let (tmp, _ws) = setup_workspace();
    let file = tmp.path().join("creature_text.sql");
    write_file(
        &file,
        "INSERT INTO creature_text (Text) VALUES ('You must use the portal');\n",
    );

    let mut exec = StubExecutor::with_databases(&[AUTH_DB, CHARACTERS_DB, WORLD_DB]);
    let plan = vec![(file.clone(), WORLD_DB.to_string())];
    let report = import_files(&plan, &mut exec, &TaskContext::headless(true)).unwrap();

    assert!(exec.created.is_empty());
    assert!(report.created_databases.is_empty());
    assert_eq!(exec.imported, vec![(WORLD_DB.to_string(), file)]);
}

#[test]
fn one_failing_file_does_not_stop_the_rest() {
    let (tmp, _ws) = setup_workspace();
    let files: Vec<PathBuf> = ["1.sql", "2.sql", "3.sql"]
        .iter()
        .map(|n| tmp.path().join(n))
        .collect();
    for f in &files {
        write_file(f, "SELECT 1;\n");
    }

    let mut exec = StubExecutor::default();
    exec.failing.insert("2.sql".to_string());
    let plan: Vec<_> = files.iter().map(|f| (f.clone(), WORLD_DB.to_string())).collect();
    let report = import_files(&plan, &mut exec, &TaskContext::headless(true)).unwrap();

    assert_eq!(report.imported, vec![files[0].clone(), files[2].clone()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, files[1]);
    assert!(report.summary().contains("1 failed"));
}

#[test]
fn base_sql_is_ordered_per_database() {
    let (_tmp, ws) = setup_workspace();
    let sql = ws.source_dir().join("data/sql");
    write_file(&sql.join("base/db_world/creature.sql"), "");
    write_file(&sql.join("base/db_auth/account.sql"), "");
    write_file(&sql.join("updates/db_auth/2024_01_01_00.sql"), "");
    write_file(&sql.join("base/db_characters/characters.sql"), "");
    write_file(&sql.join("updates/pending_db_world/rev_1.sql"), "");

    let plan = collect_base_sql(&ws.source_dir());
    let names: Vec<(String, String)> = plan
        .iter()
        .map(|(f, db)| (f.file_name().unwrap().to_string_lossy().to_string(), db.clone()))
        .collect();

    assert_eq!(
        names,
        vec![
            ("account.sql".to_string(), AUTH_DB.to_string()),
            ("2024_01_01_00.sql".to_string(), AUTH_DB.to_string()),
            ("characters.sql".to_string(), CHARACTERS_DB.to_string()),
            ("creature.sql".to_string(), WORLD_DB.to_string()),
            ("rev_1.sql".to_string(), WORLD_DB.to_string()),
        ]
    );
}

#[test]
fn module_sql_uses_folders_then_keywords() {
    let (_tmp, ws) = setup_workspace();
    let modules = ws.modules_dir();
    write_file(
        &modules.join("mod-ahbot/data/sql/db-world/base/ahbot.sql"),
        "INSERT INTO `auctionhousebot` VALUES (2);\n",
    );
    write_file(
        &modules.join("mod-transmog/sql/install.sql"),
        "CREATE TABLE IF NOT EXISTS `custom_transmogrification` (`GUID` INT, `character_guid` INT);\n\
         DELETE FROM character_transmog;\n",
    );
    write_file(&modules.join("mod-x/README.md"), "not sql");

    let plan = collect_module_sql(&modules);
    assert_eq!(plan.len(), 2);
    let db_for = |name: &str| {
        plan.iter()
            .find(|(f, _)| f.file_name().unwrap() == name)
            .map(|(_, db)| db.as_str())
    };
    assert_eq!(db_for("ahbot.sql"), Some(WORLD_DB));
    assert_eq!(db_for("install.sql"), Some(CHARACTERS_DB));
}
