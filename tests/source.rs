mod common;

use std::fs;

use acb_rust::config::AppConfig;
use acb_rust::source::{active_source, clean_path, clean_source, CleanStrategy, SourceVariant};
use acb_rust::task::TaskContext;
use common::{setup_workspace, write_file};

fn set_readonly(path: &std::path::Path) {
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_readonly(true);
    fs::set_permissions(path, perms).unwrap();
}

#[test]
fn clean_removes_checkout_with_readonly_git_files() {
    let (_tmp, ws) = setup_workspace();
    let source = ws.source_dir();
    let pack = source.join(".git/objects/pack/pack-1234.pack");
    write_file(&pack, "PACK");
    write_file(&source.join("README.md"), "# AzerothCore\n");
    set_readonly(&pack);
    set_readonly(&source.join("README.md"));

    let strategy = clean_path(&source, &TaskContext::headless(true)).unwrap();

    assert_ne!(strategy, CleanStrategy::AlreadyAbsent);
    assert!(!source.exists());
    assert!(ws.git_source_dir().exists());
}

#[test]
fn cleaning_a_missing_folder_is_not_an_error() {
    let (_tmp, ws) = setup_workspace();
    let strategy = clean_path(&ws.source_dir(), &TaskContext::headless(true)).unwrap();
    assert_eq!(strategy, CleanStrategy::AlreadyAbsent);
}

#[test]
fn clean_source_forgets_the_active_variant() {
    let (_tmp, ws) = setup_workspace();
    write_file(&ws.source_dir().join(".git/HEAD"), "ref: refs/heads/master\n");
    let mut config = AppConfig::default();
    config.last_cloned_source = Some("npcbots".into());

    clean_source(&ws, &mut config, &TaskContext::headless(true)).unwrap();

    assert!(config.last_cloned_source.is_none());
    assert_eq!(active_source(&ws, &mut config), None);
    let saved = AppConfig::load_for(&ws);
    assert!(saved.last_cloned_source.is_none());
}

#[test]
fn persisted_key_wins_over_sniffing_while_checkout_exists() {
    let (_tmp, ws) = setup_workspace();
    write_file(&ws.source_dir().join(".git/HEAD"), "ref: refs/heads/master\n");
    let mut config = AppConfig::default();
    config.last_cloned_source = Some("playerbots".into());

    assert_eq!(active_source(&ws, &mut config), Some(SourceVariant::PlayerBots));
}

#[test]
fn sniffing_recognises_npcbots_and_stale_key_is_cleared() {
    let (_tmp, ws) = setup_workspace();
    let mut config = AppConfig::default();
    config.last_cloned_source = Some("standard".into());
    assert_eq!(active_source(&ws, &mut config), None);
    assert!(config.last_cloned_source.is_none());

    write_file(&ws.source_dir().join(".git/HEAD"), "ref: refs/heads/npcbots_3.3.5\n");
    fs::create_dir_all(ws.source_dir().join("src/server/game/AI/NpcBots")).unwrap();
    assert_eq!(active_source(&ws, &mut config), Some(SourceVariant::NpcBots));
    assert_eq!(config.last_cloned_source.as_deref(), Some("npcbots"));
}
