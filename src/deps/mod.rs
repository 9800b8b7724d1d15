//! Third-party tool management
//!
//! The static table lives in `registry`; `scanner` finds installed copies,
//! `installer` downloads and installs missing ones, and `env` persists the
//! environment variables some of them need.

pub mod env;
pub mod installer;
pub mod latest;
pub mod registry;
pub mod scanner;

use std::path::{Path, PathBuf};

use crate::config::{AppConfig, DependencyState, UrlConfig};
use crate::logging::log_info;
use crate::paths::Workspace;

pub use installer::install;
pub use registry::{find_dependency, DepKind, Dependency, LatestSource, DEPENDENCIES};
pub use scanner::{RegistryReader, ScanResult, Scanner, WindowsRegistry};

/// A dependency definition resolved against the workspace and user settings,
/// plus what the last scan or install found.
#[derive(Debug, Clone)]
pub struct DependencySpec {
    pub name: String,
    pub kind: DepKind,
    pub exe_name: String,
    pub version_check: Option<String>,
    pub registry_keys: Vec<String>,
    pub common_paths: Vec<PathBuf>,
    pub download_url: String,
    pub install_path: PathBuf,
    pub latest: LatestSource,
    pub alternative_urls: Vec<String>,
    pub detected: bool,
    pub path: String,
    pub version: String,
}

impl DependencySpec {
    /// Bare spec with no probes; mostly useful for tests and custom entries.
    pub fn new(name: &str, kind: DepKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            exe_name: format!("{}.exe", name.to_lowercase()),
            version_check: None,
            registry_keys: Vec::new(),
            common_paths: Vec::new(),
            download_url: String::new(),
            install_path: PathBuf::new(),
            latest: LatestSource::None,
            alternative_urls: Vec::new(),
            detected: false,
            path: String::new(),
            version: String::new(),
        }
    }

    pub fn from_definition(def: &Dependency, workspace: &Workspace, urls: &UrlConfig) -> Self {
        let resolve = |p: &str| -> PathBuf {
            let path = Path::new(p);
            if is_absolute_windows(p) || path.is_absolute() {
                path.to_path_buf()
            } else {
                workspace.root().join(windows_relative(p))
            }
        };

        Self {
            name: def.name.to_string(),
            kind: def.kind,
            exe_name: def.exe_name.to_string(),
            version_check: def.version_check.map(str::to_string),
            registry_keys: def.registry_keys.iter().map(|k| k.to_string()).collect(),
            common_paths: def.common_paths.iter().map(|p| resolve(p)).collect(),
            download_url: urls
                .url_for(def.name)
                .unwrap_or(def.download_url)
                .to_string(),
            install_path: resolve(def.install_path),
            latest: def.latest,
            alternative_urls: def.alternative_urls.iter().map(|u| u.to_string()).collect(),
            detected: false,
            path: String::new(),
            version: String::new(),
        }
    }

    pub fn apply_scan(&mut self, result: &ScanResult) {
        self.detected = result.detected;
        self.path = result.path.clone();
        self.version = result.version.clone();
    }

    pub fn state(&self) -> DependencyState {
        DependencyState {
            detected: self.detected,
            path: self.path.clone(),
            version: self.version.clone(),
        }
    }

    /// Restore the last persisted scan result.
    pub fn restore(&mut self, config: &AppConfig) {
        if let Some(state) = config.dependency(&self.name) {
            self.detected = state.detected;
            self.path = state.path.clone();
            self.version = state.version.clone();
        }
    }
}

fn is_absolute_windows(p: &str) -> bool {
    let bytes = p.as_bytes();
    (bytes.len() > 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic()) || p.starts_with(r"\\")
}

/// `Repack\Tools\HeidiSQL` -> path with native separators.
fn windows_relative(p: &str) -> PathBuf {
    p.split(['\\', '/']).filter(|s| !s.is_empty()).collect()
}

/// Every dependency from the static table, resolved and with persisted state.
pub fn load_dependencies(workspace: &Workspace, config: &AppConfig, urls: &UrlConfig) -> Vec<DependencySpec> {
    DEPENDENCIES
        .iter()
        .map(|def| {
            let mut spec = DependencySpec::from_definition(def, workspace, urls);
            spec.restore(config);
            spec
        })
        .collect()
}

/// Scan every dependency and persist the results into `config`.
pub fn scan_all(scanner: &Scanner, specs: &mut [DependencySpec], config: &mut AppConfig) -> usize {
    let mut found = 0;
    for spec in specs.iter_mut() {
        let result = scanner.scan(spec);
        if result.detected {
            found += 1;
            log_info(&format!("{} found: {} {}", spec.name, result.path, result.version));
        } else {
            log_info(&format!("{} not found", spec.name));
        }
        spec.apply_scan(&result);
        config.set_dependency(&spec.name, spec.state());
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_install_paths_resolve_under_workspace() {
        let ws = Workspace::new("/srv/acb");
        let def = find_dependency("HeidiSQL").unwrap();
        let spec = DependencySpec::from_definition(def, &ws, &UrlConfig::default());
        assert_eq!(spec.install_path, PathBuf::from("/srv/acb/Repack/Tools/HeidiSQL"));
        assert_eq!(
            spec.common_paths[0],
            PathBuf::from("/srv/acb/Repack/Tools/HeidiSQL/heidisql.exe")
        );
    }

    #[test]
    fn custom_url_overrides_default() {
        let ws = Workspace::new("/srv/acb");
        let mut urls = UrlConfig::default();
        urls.urls.insert("MySQL".into(), "https://mirror.example/mysql.zip".into());
        let spec =
            DependencySpec::from_definition(find_dependency("MySQL").unwrap(), &ws, &urls);
        assert_eq!(spec.download_url, "https://mirror.example/mysql.zip");
        assert_eq!(spec.install_path, PathBuf::from(r"C:\MySQL"));
    }
}
