//! Installed-dependency detection
//!
//! Probe order, first hit wins: common install paths, then `InstallLocation`
//! values under HKLM, then `PATH` directories named after the dependency.
//! Probe failures are never errors; they just mean "not found here".

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use version_compare::Version;

use super::registry::{DepKind, VS_SXS_KEY};
use super::DependencySpec;
use crate::process::run_shell_capture;

const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Registry access
// ============================================================================

/// Read access to HKEY_LOCAL_MACHINE.
pub trait RegistryReader: Send + Sync {
    fn read_value(&self, key: &str, value: &str) -> Option<String>;
    fn value_names(&self, key: &str) -> Vec<String>;
}

/// Registry access through `reg query` (64-bit view).
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsRegistry;

impl WindowsRegistry {
    fn query(&self, args: &[&str]) -> Option<String> {
        let output = Command::new("reg").args(args).output().ok()?;
        if !output.status.success() {
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl RegistryReader for WindowsRegistry {
    fn read_value(&self, key: &str, value: &str) -> Option<String> {
        let full_key = format!(r"HKLM\{}", key);
        let out = self.query(&["query", &full_key, "/v", value, "/reg:64"])?;
        parse_reg_query_value(&out, value)
    }

    fn value_names(&self, key: &str) -> Vec<String> {
        let full_key = format!(r"HKLM\{}", key);
        self.query(&["query", &full_key])
            .map(|out| parse_reg_query_names(&out))
            .unwrap_or_default()
    }
}

/// Pull the data of `value` out of `reg query` output:
/// `    InstallLocation    REG_SZ    C:\Program Files\Git\`
pub fn parse_reg_query_value(output: &str, value: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (name, rest) = split_reg_line(line)?;
        if !name.eq_ignore_ascii_case(value) {
            return None;
        }
        let data = rest.trim();
        if data.is_empty() {
            None
        } else {
            Some(data.to_string())
        }
    })
}

fn parse_reg_query_names(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(split_reg_line)
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Split a value line into (name, data) around its `REG_*` type token.
fn split_reg_line(line: &str) -> Option<(&str, &str)> {
    let idx = line.find("    REG_")?;
    let name = line[..idx].trim();
    let after_type = &line[idx + 4..];
    let data_start = after_type.find(char::is_whitespace)?;
    Some((name, &after_type[data_start..]))
}

// ============================================================================
// Scanner
// ============================================================================

/// Outcome of a scan. Not found is always `(false, "", "")`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub detected: bool,
    pub path: String,
    pub version: String,
}

impl ScanResult {
    pub fn not_found() -> Self {
        Self::default()
    }
}

pub struct Scanner {
    registry: Box<dyn RegistryReader>,
    path_var: Option<OsString>,
    run_version_checks: bool,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new(Box::new(WindowsRegistry))
    }
}

impl Scanner {
    pub fn new(registry: Box<dyn RegistryReader>) -> Self {
        Self {
            registry,
            path_var: std::env::var_os("PATH"),
            run_version_checks: true,
        }
    }

    /// Use `path` instead of the process `PATH`.
    pub fn with_path_var(mut self, path: impl Into<OsString>) -> Self {
        self.path_var = Some(path.into());
        self
    }

    pub fn without_version_checks(mut self) -> Self {
        self.run_version_checks = false;
        self
    }

    pub fn scan(&self, spec: &DependencySpec) -> ScanResult {
        let Some(path) = self
            .probe_common_paths(spec)
            .or_else(|| self.probe_registry(spec))
            .or_else(|| self.probe_path_var(spec))
        else {
            return ScanResult::not_found();
        };

        let version = if self.run_version_checks {
            self.detect_version(spec, &path)
        } else {
            String::new()
        };

        ScanResult {
            detected: true,
            path: path.to_string_lossy().to_string(),
            version,
        }
    }

    fn probe_common_paths(&self, spec: &DependencySpec) -> Option<PathBuf> {
        spec.common_paths.iter().find(|p| p.exists()).cloned()
    }

    fn probe_registry(&self, spec: &DependencySpec) -> Option<PathBuf> {
        spec.registry_keys.iter().find_map(|key| {
            let location = self.registry.read_value(key, "InstallLocation")?;
            let dir = PathBuf::from(location.trim_end_matches('\\'));
            if !dir.exists() {
                return None;
            }
            // Prefer the executable inside the install location
            [dir.join("bin").join(&spec.exe_name), dir.join("cmd").join(&spec.exe_name), dir.join(&spec.exe_name)]
                .into_iter()
                .find(|p| p.exists())
                .or(Some(dir))
        })
    }

    fn probe_path_var(&self, spec: &DependencySpec) -> Option<PathBuf> {
        let path_var = self.path_var.as_ref()?;
        let needle = spec.name.to_lowercase();
        std::env::split_paths(path_var)
            .filter(|dir| dir.to_string_lossy().to_lowercase().contains(&needle))
            .map(|dir| dir.join(&spec.exe_name))
            .find(|exe| exe.exists())
    }

    fn detect_version(&self, spec: &DependencySpec, path: &Path) -> String {
        if spec.kind == DepKind::VisualStudio {
            return self.visual_studio_version().unwrap_or_default();
        }

        let Some(check) = spec.version_check.as_deref() else {
            return String::new();
        };

        // Run the located binary rather than whatever PATH resolves first
        let command_line = if path.is_file() {
            let args = check.split_once(' ').map(|(_, a)| a).unwrap_or("");
            format!("\"{}\" {}", path.display(), args)
        } else {
            check.to_string()
        };

        run_shell_capture(&command_line, VERSION_CHECK_TIMEOUT)
            .and_then(|out| out.lines().next().map(|l| l.trim().to_string()))
            .unwrap_or_default()
    }

    /// Highest version listed under the Visual Studio SxS key.
    fn visual_studio_version(&self) -> Option<String> {
        newest_version(self.registry.value_names(VS_SXS_KEY))
    }
}

/// Pick the highest dotted version out of `candidates`.
pub fn newest_version(candidates: impl IntoIterator<Item = String>) -> Option<String> {
    candidates
        .into_iter()
        .filter(|c| c.starts_with(|ch: char| ch.is_ascii_digit()) && Version::from(c).is_some())
        .max_by(|a, b| {
            let (va, vb) = (Version::from(a), Version::from(b));
            match (va, vb) {
                (Some(va), Some(vb)) => va
                    .compare(&vb)
                    .ord()
                    .unwrap_or(std::cmp::Ordering::Equal),
                _ => std::cmp::Ordering::Equal,
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    #[derive(Default)]
    struct FakeRegistry {
        values: HashMap<(String, String), String>,
        names: HashMap<String, Vec<String>>,
    }

    impl RegistryReader for FakeRegistry {
        fn read_value(&self, key: &str, value: &str) -> Option<String> {
            self.values.get(&(key.to_string(), value.to_string())).cloned()
        }

        fn value_names(&self, key: &str) -> Vec<String> {
            self.names.get(key).cloned().unwrap_or_default()
        }
    }

    fn scanner(registry: FakeRegistry, path_var: &str) -> Scanner {
        Scanner::new(Box::new(registry))
            .with_path_var(path_var)
            .without_version_checks()
    }

    #[test]
    fn missing_cmake_is_not_detected() {
        let mut spec = DependencySpec::new("CMake", DepKind::CMake);
        spec.common_paths = vec![PathBuf::from(r"C:\nonexistent\cmake.exe")];
        spec.version_check = Some("cmake --version".into());

        let result = Scanner::new(Box::new(FakeRegistry::default()))
            .with_path_var("/usr/local/bin:/usr/bin")
            .scan(&spec);
        assert_eq!(result, ScanResult::not_found());
        assert_eq!((result.detected, result.path.as_str(), result.version.as_str()), (false, "", ""));
    }

    #[test]
    fn common_path_wins_over_registry_and_path() {
        let dir = tempfile::tempdir().unwrap();
        let common = dir.path().join("common/git.exe");
        fs::create_dir_all(common.parent().unwrap()).unwrap();
        fs::write(&common, "").unwrap();

        let reg_dir = dir.path().join("reg");
        fs::create_dir_all(reg_dir.join("cmd")).unwrap();
        fs::write(reg_dir.join("cmd/git.exe"), "").unwrap();
        let path_dir = dir.path().join("Git/cmd");
        fs::create_dir_all(&path_dir).unwrap();
        fs::write(path_dir.join("git.exe"), "").unwrap();

        let mut registry = FakeRegistry::default();
        registry.values.insert(
            ("SOFTWARE\\GitForWindows".into(), "InstallLocation".into()),
            reg_dir.to_string_lossy().to_string(),
        );

        let mut spec = DependencySpec::new("Git", DepKind::Git);
        spec.common_paths = vec![PathBuf::from(r"C:\nope\git.exe"), common.clone()];
        spec.registry_keys = vec!["SOFTWARE\\GitForWindows".into()];

        let path_var = std::env::join_paths([&path_dir]).unwrap();
        let result = scanner(registry, &path_var.to_string_lossy()).scan(&spec);
        assert!(result.detected);
        assert_eq!(PathBuf::from(result.path), common);
    }

    #[test]
    fn registry_install_location_is_used_when_no_common_path_exists() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("bin")).unwrap();
        fs::write(dir.path().join("bin/mysql.exe"), "").unwrap();

        let mut registry = FakeRegistry::default();
        registry.values.insert(
            ("SOFTWARE\\MySQL AB\\MySQL Server 8.4".into(), "InstallLocation".into()),
            format!("{}\\", dir.path().display()),
        );

        let mut spec = DependencySpec::new("MySQL", DepKind::MySql);
        spec.registry_keys = vec!["SOFTWARE\\MySQL AB\\MySQL Server 8.4".into()];

        let result = scanner(registry, "").scan(&spec);
        assert!(result.detected);
        assert_eq!(PathBuf::from(result.path), dir.path().join("bin/mysql.exe"));
    }

    #[test]
    fn path_directories_must_mention_the_dependency() {
        let dir = tempfile::tempdir().unwrap();
        let unrelated = dir.path().join("tools");
        let named = dir.path().join("CMake/bin");
        for d in [&unrelated, &named] {
            fs::create_dir_all(d).unwrap();
            fs::write(d.join("cmake.exe"), "").unwrap();
        }

        let spec = DependencySpec::new("CMake", DepKind::CMake);
        let path_var = std::env::join_paths([&unrelated, &named]).unwrap();
        let result = scanner(FakeRegistry::default(), &path_var.to_string_lossy()).scan(&spec);
        assert_eq!(PathBuf::from(result.path), named.join("cmake.exe"));
    }

    #[test]
    fn visual_studio_version_comes_from_sxs_listing() {
        let dir = tempfile::tempdir().unwrap();
        let devenv = dir.path().join("devenv.exe");
        fs::write(&devenv, "").unwrap();

        let mut registry = FakeRegistry::default();
        registry.names.insert(
            VS_SXS_KEY.to_string(),
            vec!["15.0".into(), "17.0".into(), "16.0".into()],
        );

        let mut spec = DependencySpec::new("Visual Studio", DepKind::VisualStudio);
        spec.common_paths = vec![devenv];

        let result = Scanner::new(Box::new(registry)).with_path_var("").scan(&spec);
        assert_eq!(result.version, "17.0");
    }

    #[test]
    fn parses_reg_query_output() {
        let out = "\r\nHKEY_LOCAL_MACHINE\\SOFTWARE\\GitForWindows\r\n    InstallLocation    REG_SZ    C:\\Program Files\\Git\\\r\n\r\n";
        assert_eq!(
            parse_reg_query_value(out, "InstallLocation").as_deref(),
            Some("C:\\Program Files\\Git\\")
        );
        assert_eq!(parse_reg_query_value(out, "CurrentVersion"), None);
        assert_eq!(parse_reg_query_names(out), vec!["InstallLocation".to_string()]);
    }

    #[test]
    fn newest_version_compares_numerically() {
        let picked = newest_version(vec!["9.0".into(), "10.0".into(), "junk".into()]);
        assert_eq!(picked.as_deref(), Some("10.0"));
    }
}
