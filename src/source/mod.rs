//! Source Manager
//!
//! Every source variant clones into the same `GitSource/azerothcore-wotlk`
//! folder, so at most one variant is "active" at a time. Modules live in
//! that clone's `modules/` folder.

pub mod git;
pub mod modules;
pub mod progress;

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::logging::log_info;
use crate::paths::Workspace;
use crate::task::{TaskError, TaskResult};

pub use git::{clean_path, clean_source, clone_source, update_source, CleanStrategy};
pub use modules::{
    clean_individual_module, clone_modules, clone_single_module, find_module, list_modules,
    ModuleCatalog, ModuleCloneReport, ModuleSpec, ModuleStatus,
};
pub use progress::CloneProgress;

pub const STANDARD_URL: &str = "https://github.com/azerothcore/azerothcore-wotlk.git";
pub const NPCBOTS_URL: &str = "https://github.com/trickerer/AzerothCore-wotlk-with-NPCBots.git";
pub const PLAYERBOTS_URL: &str = "https://github.com/liyunfan1223/azerothcore-wotlk.git";

/// One of the upstream repository flavours that can occupy the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceVariant {
    Standard,
    NpcBots,
    PlayerBots,
    Custom,
}

impl SourceVariant {
    pub const ALL: [SourceVariant; 4] = [
        SourceVariant::Standard,
        SourceVariant::NpcBots,
        SourceVariant::PlayerBots,
        SourceVariant::Custom,
    ];

    /// Key persisted as `last_cloned_source`.
    pub fn key(self) -> &'static str {
        match self {
            SourceVariant::Standard => "standard",
            SourceVariant::NpcBots => "npcbots",
            SourceVariant::PlayerBots => "playerbots",
            SourceVariant::Custom => "custom",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.key().eq_ignore_ascii_case(key.trim()))
    }

    pub fn display_name(self) -> &'static str {
        match self {
            SourceVariant::Standard => "AzerothCore",
            SourceVariant::NpcBots => "AzerothCore with NPCBots",
            SourceVariant::PlayerBots => "AzerothCore with Playerbots",
            SourceVariant::Custom => "Custom repository",
        }
    }
}

impl std::fmt::Display for SourceVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Where a variant is cloned from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRepoSpec {
    pub variant: SourceVariant,
    pub url: String,
    pub branch: Option<String>,
}

impl SourceRepoSpec {
    /// Resolve a variant; the custom one needs `custom_git_url` to be set.
    pub fn for_variant(variant: SourceVariant, config: &AppConfig) -> TaskResult<Self> {
        let (url, branch) = match variant {
            SourceVariant::Standard => (STANDARD_URL.to_string(), Some("master")),
            SourceVariant::NpcBots => (NPCBOTS_URL.to_string(), Some("npcbots_3.3.5")),
            SourceVariant::PlayerBots => (PLAYERBOTS_URL.to_string(), Some("Playerbot")),
            SourceVariant::Custom => {
                let url = config
                    .custom_git_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .ok_or_else(|| TaskError::precondition("a custom Git URL (set one first)"))?;
                (url.to_string(), None)
            }
        };
        Ok(Self {
            variant,
            url,
            branch: branch.map(str::to_string),
        })
    }
}

/// Whether `dir` looks like a git checkout.
pub fn is_git_checkout(dir: &Path) -> bool {
    dir.join(".git").exists()
}

/// Guess which variant a checkout is from its contents alone.
pub fn sniff_variant(source_dir: &Path, custom_url: Option<&str>) -> Option<SourceVariant> {
    if !is_git_checkout(source_dir) {
        return None;
    }

    if source_dir.join("src/server/game/AI/NpcBots").exists()
        || source_dir.join("src/server/scripts/Custom/npcbot").exists()
    {
        return Some(SourceVariant::NpcBots);
    }

    let head = fs::read_to_string(source_dir.join(".git/HEAD")).unwrap_or_default();
    if head.contains("Playerbot") || source_dir.join("modules/mod-playerbots").exists() {
        return Some(SourceVariant::PlayerBots);
    }

    if let Some(custom) = custom_url.map(str::trim).filter(|u| !u.is_empty()) {
        let git_config = fs::read_to_string(source_dir.join(".git/config")).unwrap_or_default();
        if git_config.contains(custom.trim_end_matches(".git")) {
            return Some(SourceVariant::Custom);
        }
    }

    Some(SourceVariant::Standard)
}

/// The variant currently occupying the workspace.
///
/// The persisted key wins while the checkout it describes still exists;
/// a key that no longer matches the filesystem is cleared from `config`.
pub fn active_source(workspace: &Workspace, config: &mut AppConfig) -> Option<SourceVariant> {
    let source_dir = workspace.source_dir();
    if !is_git_checkout(&source_dir) {
        if config.last_cloned_source.take().is_some() {
            log_info("Forgetting last cloned source: workspace folder is gone");
        }
        return None;
    }

    if let Some(variant) = config
        .last_cloned_source
        .as_deref()
        .and_then(SourceVariant::from_key)
    {
        return Some(variant);
    }

    let sniffed = sniff_variant(&source_dir, config.custom_git_url.as_deref());
    config.last_cloned_source = sniffed.map(|v| v.key().to_string());
    sniffed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_checkout(ws: &Workspace) {
        fs::create_dir_all(ws.source_dir().join(".git")).unwrap();
        fs::write(ws.source_dir().join(".git/HEAD"), "ref: refs/heads/master\n").unwrap();
    }

    #[test]
    fn keys_round_trip() {
        for v in SourceVariant::ALL {
            assert_eq!(SourceVariant::from_key(v.key()), Some(v));
        }
        assert_eq!(SourceVariant::from_key("nope"), None);
    }

    #[test]
    fn custom_variant_needs_a_url() {
        let mut config = AppConfig::default();
        let err = SourceRepoSpec::for_variant(SourceVariant::Custom, &config).unwrap_err();
        assert!(matches!(err, TaskError::Precondition { .. }));

        config.custom_git_url = Some("https://example.org/me/ac.git".into());
        let spec = SourceRepoSpec::for_variant(SourceVariant::Custom, &config).unwrap();
        assert_eq!(spec.url, "https://example.org/me/ac.git");
        assert_eq!(spec.branch, None);
    }

    #[test]
    fn sniffs_npcbots_from_subpath() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        fake_checkout(&ws);
        assert_eq!(sniff_variant(&ws.source_dir(), None), Some(SourceVariant::Standard));

        fs::create_dir_all(ws.source_dir().join("src/server/scripts/Custom/npcbot")).unwrap();
        assert_eq!(sniff_variant(&ws.source_dir(), None), Some(SourceVariant::NpcBots));
    }

    #[test]
    fn persisted_key_wins_only_while_checkout_exists() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        let mut config = AppConfig {
            last_cloned_source: Some("playerbots".into()),
            ..Default::default()
        };

        // Folder deleted by hand: stale key is dropped
        assert_eq!(active_source(&ws, &mut config), None);
        assert_eq!(config.last_cloned_source, None);

        fake_checkout(&ws);
        config.last_cloned_source = Some("playerbots".into());
        assert_eq!(active_source(&ws, &mut config), Some(SourceVariant::PlayerBots));

        // No key: fall back to sniffing and remember the answer
        config.last_cloned_source = None;
        assert_eq!(active_source(&ws, &mut config), Some(SourceVariant::Standard));
        assert_eq!(config.last_cloned_source.as_deref(), Some("standard"));
    }
}
