use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::log_warning;
use crate::paths::Workspace;

/// Default client data archive (maps, vmaps, mmaps, dbc) for 3.3.5a.
pub const DEFAULT_DATA_URL: &str =
    "https://github.com/wowgaming/client-data/releases/download/v16/data.zip";

/// Default portable HeidiSQL build.
pub const DEFAULT_HEIDISQL_URL: &str =
    "https://www.heidisql.com/downloads/releases/HeidiSQL_12.8_64_Portable.zip";

// ============================================================================
// JSON persistence helpers
// ============================================================================

fn load_json<T: DeserializeOwned + Default>(path: &Path) -> T {
    if path.exists() {
        if let Ok(content) = fs::read_to_string(path) {
            match serde_json::from_str(&content) {
                Ok(config) => return config,
                Err(e) => log_warning(&format!(
                    "Ignoring unreadable {}: {}",
                    path.display(),
                    e
                )),
            }
        }
    }
    T::default()
}

fn save_json<T: Serialize>(value: &T, path: &Path) {
    // Ensure parent dir exists
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if let Ok(json) = serde_json::to_string_pretty(value) {
        if let Err(e) = fs::write(path, json) {
            log_warning(&format!("Failed to save {}: {}", path.display(), e));
        }
    }
}

// ============================================================================
// Main App Config (acb_config.json)
// ============================================================================

/// What the scanner or installer last found for a dependency.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct DependencyState {
    pub detected: bool,
    pub path: String,
    pub version: String,
}

/// Connection defaults remembered between runs. Passwords are never stored.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MySqlDefaults {
    pub host: String,
    pub port: u16,
    pub user: String,
}

impl Default for MySqlDefaults {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3306,
            user: "acore".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub dependencies: BTreeMap<String, DependencyState>,
    pub custom_git_url: Option<String>,
    pub last_cloned_source: Option<String>,
    pub mysql: MySqlDefaults,
}

impl AppConfig {
    pub const FILE_NAME: &'static str = "acb_config.json";

    fn get_path() -> PathBuf {
        acb_path!(Self::FILE_NAME)
    }

    pub fn load() -> Self {
        Self::load_from(&Self::get_path())
    }

    pub fn save(&self) {
        self.save_to(&Self::get_path());
    }

    pub fn load_from(path: &Path) -> Self {
        load_json(path)
    }

    pub fn save_to(&self, path: &Path) {
        save_json(self, path);
    }

    /// Load the config stored in `workspace`'s root.
    pub fn load_for(workspace: &Workspace) -> Self {
        Self::load_from(&workspace.config_file(Self::FILE_NAME))
    }

    pub fn save_for(&self, workspace: &Workspace) {
        self.save_to(&workspace.config_file(Self::FILE_NAME));
    }

    pub fn dependency(&self, name: &str) -> Option<&DependencyState> {
        self.dependencies.get(name)
    }

    /// Resolved path of a detected dependency, if it still exists on disk.
    pub fn dependency_path(&self, name: &str) -> Option<PathBuf> {
        self.dependencies
            .get(name)
            .filter(|d| d.detected && !d.path.is_empty())
            .map(|d| PathBuf::from(&d.path))
            .filter(|p| p.exists())
    }

    pub fn set_dependency(&mut self, name: &str, state: DependencyState) {
        self.dependencies.insert(name.to_string(), state);
    }
}

// ============================================================================
// Custom download URLs (acb_urls_config.json)
// ============================================================================

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct UrlConfig {
    /// Dependency name -> URL overriding the built-in default
    pub urls: BTreeMap<String, String>,
}

impl UrlConfig {
    pub const FILE_NAME: &'static str = "acb_urls_config.json";

    pub fn load() -> Self {
        Self::load_from(&acb_path!(Self::FILE_NAME))
    }

    pub fn save(&self) {
        self.save_to(&acb_path!(Self::FILE_NAME));
    }

    pub fn load_from(path: &Path) -> Self {
        load_json(path)
    }

    pub fn save_to(&self, path: &Path) {
        save_json(self, path);
    }

    pub fn url_for(&self, dependency: &str) -> Option<&str> {
        self.urls
            .get(dependency)
            .map(String::as_str)
            .filter(|u| !u.trim().is_empty())
    }
}

// ============================================================================
// HeidiSQL download URL (heidisql_url_config.json)
// ============================================================================

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HeidiSqlUrlConfig {
    pub url: String,
}

impl Default for HeidiSqlUrlConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_HEIDISQL_URL.to_string(),
        }
    }
}

impl HeidiSqlUrlConfig {
    pub const FILE_NAME: &'static str = "heidisql_url_config.json";

    pub fn load() -> Self {
        load_json(&acb_path!(Self::FILE_NAME))
    }

    pub fn save(&self) {
        save_json(self, &acb_path!(Self::FILE_NAME));
    }

    pub fn load_from(path: &Path) -> Self {
        load_json(path)
    }
}

// ============================================================================
// Client data download URL (data_url_config.json)
// ============================================================================

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DataUrlConfig {
    pub url: String,
}

impl Default for DataUrlConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATA_URL.to_string(),
        }
    }
}

impl DataUrlConfig {
    pub const FILE_NAME: &'static str = "data_url_config.json";

    pub fn load() -> Self {
        load_json(&acb_path!(Self::FILE_NAME))
    }

    pub fn save(&self) {
        save_json(self, &acb_path!(Self::FILE_NAME));
    }

    pub fn load_from(path: &Path) -> Self {
        load_json(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_config_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(AppConfig::FILE_NAME);

        let mut config = AppConfig::default();
        config.set_dependency(
            "CMake",
            DependencyState {
                detected: true,
                path: r"C:\Program Files\CMake\bin\cmake.exe".into(),
                version: "cmake version 3.31.2".into(),
            },
        );
        config.last_cloned_source = Some("npcbots".into());
        config.save_to(&path);

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.last_cloned_source.as_deref(), Some("npcbots"));
        assert_eq!(
            loaded.dependency("CMake").map(|d| d.version.as_str()),
            Some("cmake version 3.31.2")
        );
    }

    #[test]
    fn corrupt_or_partial_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acb_config.json");

        fs::write(&path, "{ not json").unwrap();
        assert!(AppConfig::load_from(&path).dependencies.is_empty());

        fs::write(&path, r#"{"custom_git_url":"https://example.org/ac.git"}"#).unwrap();
        let partial = AppConfig::load_from(&path);
        assert_eq!(partial.custom_git_url.as_deref(), Some("https://example.org/ac.git"));
        assert_eq!(partial.mysql.port, 3306);
    }

    #[test]
    fn blank_custom_url_is_ignored() {
        let mut urls = UrlConfig::default();
        urls.urls.insert("MySQL".into(), "  ".into());
        urls.urls.insert("Boost".into(), "https://mirror/boost.zip".into());
        assert_eq!(urls.url_for("MySQL"), None);
        assert_eq!(urls.url_for("Boost"), Some("https://mirror/boost.zip"));
    }
}
