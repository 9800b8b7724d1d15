//! Dependency definitions and URLs
//!
//! All dependency metadata is defined here for easy updates.

/// Where a newer download than the configured default can be discovered.
#[derive(Debug, Clone, Copy)]
pub enum LatestSource {
    /// No discovery; only the configured and alternative URLs are tried
    None,
    /// Latest GitHub release asset whose name contains every fragment
    GithubAsset {
        repo: &'static str,
        fragments: &'static [&'static str],
    },
    /// Probe `template` for each version (newest first) until one answers 200.
    /// `{v}` expands to the version, `{v_}` to the version with `_` separators.
    ProbeVersions {
        template: &'static str,
        versions: &'static [&'static str],
    },
}

/// How a dependency is installed once downloaded (beyond the file extension).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepKind {
    Git,
    CMake,
    /// The compiler IDE: silent install with the C++ workload
    VisualStudio,
    MySql,
    OpenSsl,
    Boost,
    HeidiSql,
}

/// Dependency definition
#[derive(Debug, Clone)]
pub struct Dependency {
    pub name: &'static str,
    pub kind: DepKind,
    /// Executable looked for inside `PATH` directories whose name matches
    pub exe_name: &'static str,
    pub version_check: Option<&'static str>,
    /// Keys under HKEY_LOCAL_MACHINE carrying an `InstallLocation` value
    pub registry_keys: &'static [&'static str],
    pub common_paths: &'static [&'static str],
    pub download_url: &'static str,
    /// Absolute, or relative to the workspace root
    pub install_path: &'static str,
    pub latest: LatestSource,
    pub alternative_urls: &'static [&'static str],
}

/// Workload flags for an unattended Visual Studio install able to build AzerothCore.
pub const VS_INSTALL_ARGS: &[&str] = &[
    "--add",
    "Microsoft.VisualStudio.Workload.NativeDesktop",
    "--includeRecommended",
    "--passive",
    "--norestart",
    "--wait",
];

/// Registry key listing installed Visual Studio versions as value names ("17.0").
pub const VS_SXS_KEY: &str = r"SOFTWARE\WOW6432Node\Microsoft\VisualStudio\SxS\VS7";

/// Required build and runtime dependencies
pub const DEPENDENCIES: &[Dependency] = &[
    Dependency {
        name: "Git",
        kind: DepKind::Git,
        exe_name: "git.exe",
        version_check: Some("git --version"),
        registry_keys: &[r"SOFTWARE\GitForWindows"],
        common_paths: &[
            r"C:\Program Files\Git\cmd\git.exe",
            r"C:\Program Files (x86)\Git\cmd\git.exe",
        ],
        download_url:
            "https://github.com/git-for-windows/git/releases/download/v2.47.1.windows.1/Git-2.47.1-64-bit.exe",
        install_path: r"C:\Program Files\Git",
        latest: LatestSource::GithubAsset {
            repo: "git-for-windows/git",
            fragments: &["64-bit.exe"],
        },
        alternative_urls: &[
            "https://github.com/git-for-windows/git/releases/download/v2.46.2.windows.1/Git-2.46.2-64-bit.exe",
            "https://github.com/git-for-windows/git/releases/download/v2.45.2.windows.1/Git-2.45.2-64-bit.exe",
        ],
    },
    Dependency {
        name: "CMake",
        kind: DepKind::CMake,
        exe_name: "cmake.exe",
        version_check: Some("cmake --version"),
        registry_keys: &[r"SOFTWARE\Kitware\CMake"],
        common_paths: &[
            r"C:\Program Files\CMake\bin\cmake.exe",
            r"C:\Program Files (x86)\CMake\bin\cmake.exe",
        ],
        download_url:
            "https://github.com/Kitware/CMake/releases/download/v3.31.2/cmake-3.31.2-windows-x86_64.msi",
        install_path: r"C:\Program Files\CMake",
        latest: LatestSource::GithubAsset {
            repo: "Kitware/CMake",
            fragments: &["windows-x86_64", ".msi"],
        },
        alternative_urls: &[
            "https://github.com/Kitware/CMake/releases/download/v3.30.5/cmake-3.30.5-windows-x86_64.msi",
            "https://github.com/Kitware/CMake/releases/download/v3.29.6/cmake-3.29.6-windows-x86_64.msi",
        ],
    },
    Dependency {
        name: "Visual Studio",
        kind: DepKind::VisualStudio,
        exe_name: "devenv.exe",
        // Version comes from the SxS registry listing instead
        version_check: None,
        registry_keys: &[],
        common_paths: &[
            r"C:\Program Files\Microsoft Visual Studio\2022\Community\Common7\IDE\devenv.exe",
            r"C:\Program Files\Microsoft Visual Studio\2022\Professional\Common7\IDE\devenv.exe",
            r"C:\Program Files\Microsoft Visual Studio\2022\Enterprise\Common7\IDE\devenv.exe",
            r"C:\Program Files (x86)\Microsoft Visual Studio\2019\Community\Common7\IDE\devenv.exe",
            r"C:\Program Files (x86)\Microsoft Visual Studio\2019\Professional\Common7\IDE\devenv.exe",
            r"C:\Program Files (x86)\Microsoft Visual Studio\2019\Enterprise\Common7\IDE\devenv.exe",
        ],
        download_url: "https://aka.ms/vs/17/release/vs_community.exe",
        install_path: r"C:\Program Files\Microsoft Visual Studio\2022\Community",
        latest: LatestSource::None,
        alternative_urls: &["https://aka.ms/vs/16/release/vs_community.exe"],
    },
    Dependency {
        name: "MySQL",
        kind: DepKind::MySql,
        exe_name: "mysql.exe",
        version_check: Some("mysql --version"),
        registry_keys: &[
            r"SOFTWARE\MySQL AB\MySQL Server 8.4",
            r"SOFTWARE\MySQL AB\MySQL Server 8.0",
        ],
        common_paths: &[
            r"C:\Program Files\MySQL\MySQL Server 8.4\bin\mysql.exe",
            r"C:\Program Files\MySQL\MySQL Server 8.0\bin\mysql.exe",
            r"C:\MySQL\mysql-8.4.3-winx64\bin\mysql.exe",
        ],
        download_url: "https://cdn.mysql.com/Downloads/MySQL-8.4/mysql-8.4.3-winx64.zip",
        install_path: r"C:\MySQL",
        latest: LatestSource::ProbeVersions {
            template: "https://cdn.mysql.com/Downloads/MySQL-8.4/mysql-{v}-winx64.zip",
            versions: &["8.4.3", "8.4.4", "8.4.5", "8.4.6"],
        },
        alternative_urls: &[
            "https://downloads.mysql.com/archives/get/p/23/file/mysql-8.4.2-winx64.zip",
            "https://downloads.mysql.com/archives/get/p/23/file/mysql-8.0.40-winx64.zip",
        ],
    },
    Dependency {
        name: "OpenSSL",
        kind: DepKind::OpenSsl,
        exe_name: "openssl.exe",
        version_check: Some("openssl version"),
        registry_keys: &[
            r"SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall\OpenSSL (64-bit)_is1",
        ],
        common_paths: &[
            r"C:\Program Files\OpenSSL-Win64\bin\openssl.exe",
            r"C:\Program Files\OpenSSL\bin\openssl.exe",
            r"C:\OpenSSL-Win64\bin\openssl.exe",
        ],
        download_url: "https://slproweb.com/download/Win64OpenSSL-3_4_0.exe",
        install_path: r"C:\Program Files\OpenSSL-Win64",
        latest: LatestSource::ProbeVersions {
            template: "https://slproweb.com/download/Win64OpenSSL-{v_}.exe",
            versions: &["3.4.0", "3.4.1", "3.5.0", "3.5.1"],
        },
        alternative_urls: &[
            "https://slproweb.com/download/Win64OpenSSL-3_3_2.exe",
            "https://slproweb.com/download/Win64OpenSSL-3_2_3.exe",
        ],
    },
    Dependency {
        name: "Boost",
        kind: DepKind::Boost,
        exe_name: "b2.exe",
        version_check: None,
        registry_keys: &[],
        common_paths: &[
            r"C:\local\boost_1_86_0\boost\version.hpp",
            r"C:\local\boost_1_85_0\boost\version.hpp",
            r"C:\local\boost_1_84_0\boost\version.hpp",
            r"C:\boost\boost\version.hpp",
        ],
        download_url: "https://archives.boost.io/release/1.86.0/source/boost_1_86_0.zip",
        install_path: r"C:\local",
        latest: LatestSource::ProbeVersions {
            template: "https://archives.boost.io/release/{v}/source/boost_{v_}.zip",
            versions: &["1.86.0", "1.87.0", "1.88.0"],
        },
        alternative_urls: &[
            "https://archives.boost.io/release/1.85.0/source/boost_1_85_0.zip",
            "https://archives.boost.io/release/1.84.0/source/boost_1_84_0.zip",
        ],
    },
    Dependency {
        name: "HeidiSQL",
        kind: DepKind::HeidiSql,
        exe_name: "heidisql.exe",
        version_check: None,
        registry_keys: &[],
        common_paths: &[
            r"Repack\Tools\HeidiSQL\heidisql.exe",
            r"C:\Program Files\HeidiSQL\heidisql.exe",
        ],
        download_url: crate::config::DEFAULT_HEIDISQL_URL,
        install_path: r"Repack\Tools\HeidiSQL",
        latest: LatestSource::GithubAsset {
            repo: "HeidiSQL/HeidiSQL",
            fragments: &["64_portable", ".zip"],
        },
        alternative_urls: &[
            "https://www.heidisql.com/downloads/releases/HeidiSQL_12.6_64_Portable.zip",
        ],
    },
];

/// Look up a definition by (case-insensitive) name.
pub fn find_dependency(name: &str) -> Option<&'static Dependency> {
    DEPENDENCIES
        .iter()
        .find(|d| d.name.eq_ignore_ascii_case(name))
}

/// Expand a `ProbeVersions` template for one version.
pub fn expand_template(template: &str, version: &str) -> String {
    template
        .replace("{v_}", &version.replace('.', "_"))
        .replace("{v}", version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_expansion_handles_both_placeholders() {
        assert_eq!(
            expand_template(
                "https://archives.boost.io/release/{v}/source/boost_{v_}.zip",
                "1.86.0"
            ),
            "https://archives.boost.io/release/1.86.0/source/boost_1_86_0.zip"
        );
    }

    #[test]
    fn every_dependency_has_a_download_url_and_probe() {
        for dep in DEPENDENCIES {
            assert!(!dep.download_url.is_empty(), "{} has no URL", dep.name);
            assert!(!dep.common_paths.is_empty(), "{} has no common paths", dep.name);
        }
        assert!(find_dependency("cmake").is_some());
        assert!(find_dependency("visual studio").is_some());
    }
}
