//! Optional server modules cloned into the active source's `modules/` folder

use std::fs;
use std::path::{Component, Path, PathBuf};

use super::git::{clean_path, git_clone, CleanStrategy};
use super::{is_git_checkout, SourceVariant};
use crate::logging::{log_action, log_error, log_info};
use crate::paths::Workspace;
use crate::task::{check_cancelled, TaskContext, TaskError, TaskResult};

/// A module repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSpec {
    pub name: String,
    pub url: String,
    pub branch: Option<String>,
}

impl ModuleSpec {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            branch: None,
        }
    }

    /// Module from a bare repository URL; the name is the last path segment.
    pub fn from_url(url: &str) -> Option<Self> {
        let name = url
            .trim()
            .trim_end_matches('/')
            .trim_end_matches(".git")
            .rsplit('/')
            .next()
            .filter(|n| !n.is_empty())?;
        Some(Self::new(name, url.trim()))
    }
}

struct CatalogEntry {
    name: &'static str,
    url: &'static str,
    branch: Option<&'static str>,
}

const fn entry(name: &'static str, url: &'static str) -> CatalogEntry {
    CatalogEntry {
        name,
        url,
        branch: None,
    }
}

const AZEROTHCORE_MODULES: &[CatalogEntry] = &[
    entry("mod-eluna", "https://github.com/azerothcore/mod-eluna.git"),
    entry("mod-transmog", "https://github.com/azerothcore/mod-transmog.git"),
    entry("mod-autobalance", "https://github.com/azerothcore/mod-autobalance.git"),
    entry("mod-ah-bot", "https://github.com/azerothcore/mod-ah-bot.git"),
    entry("mod-npc-buffer", "https://github.com/azerothcore/mod-npc-buffer.git"),
    entry("mod-solo-lfg", "https://github.com/azerothcore/mod-solo-lfg.git"),
    entry("mod-learn-spells", "https://github.com/azerothcore/mod-learn-spells.git"),
    entry("mod-aoe-loot", "https://github.com/azerothcore/mod-aoe-loot.git"),
];

const COMMUNITY_MODULES: &[CatalogEntry] = &[
    entry(
        "mod-individual-progression",
        "https://github.com/ZhengPeiRu21/mod-individual-progression.git",
    ),
    entry(
        "mod-reagent-bank",
        "https://github.com/ZhengPeiRu21/mod-reagent-bank.git",
    ),
];

// Modules known to build against the NPCBots fork
const NPCBOT_MODULES: &[CatalogEntry] = &[
    entry("mod-autobalance", "https://github.com/azerothcore/mod-autobalance.git"),
    entry("mod-transmog", "https://github.com/azerothcore/mod-transmog.git"),
];

const PLAYERBOT_MODULES: &[CatalogEntry] = &[CatalogEntry {
    name: "mod-playerbots",
    url: "https://github.com/liyunfan1223/mod-playerbots.git",
    branch: Some("master"),
}];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleCatalog {
    AzerothCore,
    Community,
    NpcBot,
    PlayerBot,
}

impl ModuleCatalog {
    pub const ALL: [ModuleCatalog; 4] = [
        ModuleCatalog::AzerothCore,
        ModuleCatalog::Community,
        ModuleCatalog::NpcBot,
        ModuleCatalog::PlayerBot,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModuleCatalog::AzerothCore => "AzerothCore",
            ModuleCatalog::Community => "Community",
            ModuleCatalog::NpcBot => "NPCBot",
            ModuleCatalog::PlayerBot => "PlayerBot",
        }
    }

    fn entries(self) -> &'static [CatalogEntry] {
        match self {
            ModuleCatalog::AzerothCore => AZEROTHCORE_MODULES,
            ModuleCatalog::Community => COMMUNITY_MODULES,
            ModuleCatalog::NpcBot => NPCBOT_MODULES,
            ModuleCatalog::PlayerBot => PLAYERBOT_MODULES,
        }
    }

    pub fn modules(self) -> Vec<ModuleSpec> {
        self.entries()
            .iter()
            .map(|e| ModuleSpec {
                name: e.name.to_string(),
                url: e.url.to_string(),
                branch: e.branch.map(str::to_string),
            })
            .collect()
    }

    /// Catalogs that make sense on top of `variant`.
    pub fn for_variant(variant: SourceVariant) -> Vec<ModuleCatalog> {
        match variant {
            SourceVariant::NpcBots => vec![ModuleCatalog::NpcBot, ModuleCatalog::Community],
            SourceVariant::PlayerBots => vec![
                ModuleCatalog::PlayerBot,
                ModuleCatalog::AzerothCore,
                ModuleCatalog::Community,
            ],
            SourceVariant::Standard | SourceVariant::Custom => {
                vec![ModuleCatalog::AzerothCore, ModuleCatalog::Community]
            }
        }
    }
}

/// Look a module up by name across every catalog.
pub fn find_module(name: &str) -> Option<ModuleSpec> {
    ModuleCatalog::ALL
        .into_iter()
        .flat_map(|c| c.modules())
        .find(|m| m.name.eq_ignore_ascii_case(name))
}

// ============================================================================
// Listing
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleStatus {
    pub name: String,
    pub path: PathBuf,
    pub cloned: bool,
    /// Known to one of the catalogs
    pub cataloged: bool,
}

/// Catalog modules for `variant` plus anything else found on disk.
pub fn list_modules(workspace: &Workspace, variant: Option<SourceVariant>) -> Vec<ModuleStatus> {
    let modules_dir = workspace.modules_dir();
    let mut statuses: Vec<ModuleStatus> = Vec::new();

    let catalogs = variant
        .map(ModuleCatalog::for_variant)
        .unwrap_or_else(|| ModuleCatalog::ALL.to_vec());
    for module in catalogs.into_iter().flat_map(|c| c.modules()) {
        if statuses.iter().any(|s| s.name == module.name) {
            continue;
        }
        let path = modules_dir.join(&module.name);
        statuses.push(ModuleStatus {
            cloned: is_git_checkout(&path),
            name: module.name,
            path,
            cataloged: true,
        });
    }

    if let Ok(entries) = fs::read_dir(&modules_dir) {
        let mut extra: Vec<ModuleStatus> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                if name.starts_with('.') || statuses.iter().any(|s| s.name == name) {
                    return None;
                }
                let path = e.path();
                Some(ModuleStatus {
                    cataloged: find_module(&name).is_some(),
                    cloned: is_git_checkout(&path),
                    name,
                    path,
                })
            })
            .collect();
        extra.sort_by(|a, b| a.name.cmp(&b.name));
        statuses.extend(extra);
    }

    statuses
}

// ============================================================================
// Clone / clean
// ============================================================================

fn require_source(workspace: &Workspace) -> TaskResult<PathBuf> {
    let source = workspace.source_dir();
    if is_git_checkout(&source) {
        Ok(workspace.modules_dir())
    } else {
        Err(TaskError::precondition(format!(
            "a cloned source in {} (clone one before adding modules)",
            source.display()
        )))
    }
}

/// Reject names that would resolve outside the modules folder.
fn module_dir(modules_dir: &Path, name: &str) -> TaskResult<PathBuf> {
    let rel = Path::new(name);
    let single_normal = rel.components().count() == 1
        && matches!(rel.components().next(), Some(Component::Normal(_)));
    if name.trim().is_empty() || !single_normal {
        return Err(TaskError::other("Module name", format!("invalid module name '{}'", name)));
    }
    Ok(modules_dir.join(rel))
}

pub fn clone_single_module(
    module: &ModuleSpec,
    workspace: &Workspace,
    ctx: &TaskContext,
) -> TaskResult<PathBuf> {
    let modules_dir = require_source(workspace)?;
    let target = module_dir(&modules_dir, &module.name)?;

    if target.exists() {
        ctx.require_confirmation(&format!(
            "Module {} is already present. Delete it and clone again?",
            module.name
        ))?;
        clean_path(&target, ctx)?;
    }

    check_cancelled(ctx)?;
    fs::create_dir_all(&modules_dir)
        .map_err(|e| TaskError::io(format!("Creating {}", modules_dir.display()), e))?;
    ctx.set_status(format!("Cloning {}...", module.name));
    log_action(&format!("Cloning module {} from {}", module.name, module.url));

    git_clone(&module.url, module.branch.as_deref(), &target, ctx)?;
    log_info(&format!("Module {} cloned", module.name));
    Ok(target)
}

/// Outcome of cloning several modules.
#[derive(Debug, Default, Clone)]
pub struct ModuleCloneReport {
    pub cloned: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl ModuleCloneReport {
    pub fn summary(&self) -> String {
        let mut text = format!("{} module(s) cloned", self.cloned.len());
        if !self.failed.is_empty() {
            text.push_str(&format!(", {} failed:", self.failed.len()));
            for (name, reason) in &self.failed {
                text.push_str(&format!("\n  - {}: {}", name, reason));
            }
        }
        text
    }
}

/// Clone each module in turn; a failure is recorded and the rest continue.
/// Cancellation stops the batch.
pub fn clone_modules(
    modules: &[ModuleSpec],
    workspace: &Workspace,
    ctx: &TaskContext,
) -> TaskResult<ModuleCloneReport> {
    require_source(workspace)?;
    let mut report = ModuleCloneReport::default();

    for module in modules {
        check_cancelled(ctx)?;
        match clone_single_module(module, workspace, ctx) {
            Ok(_) => report.cloned.push(module.name.clone()),
            Err(TaskError::Cancelled) => return Err(TaskError::Cancelled),
            Err(e) => {
                log_error(&format!("Module {} failed: {}", module.name, e));
                report.failed.push((module.name.clone(), e.to_string()));
            }
        }
    }

    ctx.set_status(report.summary());
    Ok(report)
}

pub fn clean_individual_module(
    name: &str,
    workspace: &Workspace,
    ctx: &TaskContext,
) -> TaskResult<CleanStrategy> {
    let target = module_dir(&workspace.modules_dir(), name)?;
    let strategy = clean_path(&target, ctx)?;
    log_action(&format!("Removed module {} ({:?})", name, strategy));
    Ok(strategy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_from_url_uses_repo_name() {
        let m = ModuleSpec::from_url("https://github.com/azerothcore/mod-eluna.git").unwrap();
        assert_eq!(m.name, "mod-eluna");
        assert!(ModuleSpec::from_url("   ").is_none());
    }

    #[test]
    fn playerbots_variant_offers_mod_playerbots_first() {
        let catalogs = ModuleCatalog::for_variant(SourceVariant::PlayerBots);
        assert_eq!(catalogs[0], ModuleCatalog::PlayerBot);
        assert_eq!(catalogs[0].modules()[0].name, "mod-playerbots");
    }

    #[test]
    fn module_names_cannot_escape_modules_folder() {
        let base = Path::new("/ws/GitSource/azerothcore-wotlk/modules");
        assert!(module_dir(base, "../src").is_err());
        assert!(module_dir(base, "a/b").is_err());
        assert!(module_dir(base, "").is_err());
        assert_eq!(module_dir(base, "mod-eluna").unwrap(), base.join("mod-eluna"));
    }

    #[test]
    fn listing_marks_cloned_and_unknown_modules() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        fs::create_dir_all(ws.modules_dir().join("mod-eluna/.git")).unwrap();
        fs::create_dir_all(ws.modules_dir().join("my-private-mod/.git")).unwrap();

        let list = list_modules(&ws, Some(SourceVariant::Standard));
        let eluna = list.iter().find(|m| m.name == "mod-eluna").unwrap();
        assert!(eluna.cloned && eluna.cataloged);
        let transmog = list.iter().find(|m| m.name == "mod-transmog").unwrap();
        assert!(!transmog.cloned);
        let private = list.iter().find(|m| m.name == "my-private-mod").unwrap();
        assert!(private.cloned && !private.cataloged);
    }

    #[test]
    fn folders_without_git_are_not_cloned() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        fs::create_dir_all(ws.modules_dir().join("mod-eluna/src")).unwrap();
        fs::create_dir_all(ws.modules_dir().join("half-cloned-mod")).unwrap();

        let list = list_modules(&ws, Some(SourceVariant::Standard));
        let eluna = list.iter().find(|m| m.name == "mod-eluna").unwrap();
        assert!(!eluna.cloned && eluna.cataloged);
        let stray = list.iter().find(|m| m.name == "half-cloned-mod").unwrap();
        assert!(!stray.cloned && !stray.cataloged);
    }

    #[test]
    fn modules_need_an_active_source() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        let ctx = TaskContext::headless(true);
        let err = clone_modules(&ModuleCatalog::Community.modules(), &ws, &ctx).unwrap_err();
        assert!(matches!(err, TaskError::Precondition { .. }));
    }

    #[test]
    fn cleaning_a_module_removes_only_that_folder() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        fs::create_dir_all(ws.modules_dir().join("mod-eluna/src")).unwrap();
        fs::create_dir_all(ws.modules_dir().join("mod-transmog")).unwrap();

        clean_individual_module("mod-eluna", &ws, &TaskContext::headless(true)).unwrap();
        assert!(!ws.modules_dir().join("mod-eluna").exists());
        assert!(ws.modules_dir().join("mod-transmog").exists());
    }
}
