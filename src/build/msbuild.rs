//! MSBuild location and invocation

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths::BUILD_CONFIGURATION;
use crate::process::run_shell_capture;

pub const MSBUILD_TIMEOUT: Duration = Duration::from_secs(1800);
pub const MSBUILD_IMAGE: &str = "MSBuild.exe";

const MSBUILD_CANDIDATES: &[&str] = &[
    r"C:\Program Files\Microsoft Visual Studio\2022\Community\MSBuild\Current\Bin\MSBuild.exe",
    r"C:\Program Files\Microsoft Visual Studio\2022\Professional\MSBuild\Current\Bin\MSBuild.exe",
    r"C:\Program Files\Microsoft Visual Studio\2022\Enterprise\MSBuild\Current\Bin\MSBuild.exe",
    r"C:\Program Files\Microsoft Visual Studio\2022\BuildTools\MSBuild\Current\Bin\MSBuild.exe",
    r"C:\Program Files (x86)\Microsoft Visual Studio\2019\Community\MSBuild\Current\Bin\MSBuild.exe",
    r"C:\Program Files (x86)\Microsoft Visual Studio\2019\Professional\MSBuild\Current\Bin\MSBuild.exe",
    r"C:\Program Files (x86)\Microsoft Visual Studio\2019\Enterprise\MSBuild\Current\Bin\MSBuild.exe",
    r"C:\Program Files (x86)\Microsoft Visual Studio\2019\BuildTools\MSBuild\Current\Bin\MSBuild.exe",
];

/// First existing candidate path, else whatever `where msbuild` reports.
pub fn locate_msbuild() -> Option<PathBuf> {
    locate_in(MSBUILD_CANDIDATES.iter().map(PathBuf::from), || {
        run_shell_capture("where msbuild", Duration::from_secs(10))
            .and_then(|out| out.lines().next().map(|l| PathBuf::from(l.trim())))
    })
}

fn locate_in(
    candidates: impl IntoIterator<Item = PathBuf>,
    fallback: impl FnOnce() -> Option<PathBuf>,
) -> Option<PathBuf> {
    candidates
        .into_iter()
        .find(|p| p.exists())
        .or_else(fallback)
        .filter(|p| !p.as_os_str().is_empty())
}

pub fn msbuild_args(solution: &Path) -> Vec<String> {
    vec![
        solution.to_string_lossy().to_string(),
        format!("/p:Configuration={}", BUILD_CONFIGURATION),
        "/p:Platform=x64".to_string(),
        "/p:BuildProjectReferences=false".to_string(),
        "/m".to_string(),
        // Leftover worker nodes would survive a cancel
        "/nodeReuse:false".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_pin_configuration_and_platform() {
        let args = msbuild_args(Path::new("Build/AzerothCore.sln"));
        assert_eq!(args[0], "Build/AzerothCore.sln");
        assert!(args.contains(&"/p:Configuration=RelWithDebInfo".to_string()));
        assert!(args.contains(&"/p:Platform=x64".to_string()));
        assert!(args.contains(&"/p:BuildProjectReferences=false".to_string()));
        assert!(args.contains(&"/m".to_string()));
    }

    #[test]
    fn existing_candidate_beats_path_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("MSBuild.exe");
        std::fs::write(&present, "").unwrap();

        let found = locate_in(
            vec![dir.path().join("missing.exe"), present.clone()],
            || Some(PathBuf::from("from-where")),
        );
        assert_eq!(found, Some(present));

        let fallback = locate_in(vec![dir.path().join("missing.exe")], || {
            Some(PathBuf::from("C:/tools/MSBuild.exe"))
        });
        assert_eq!(fallback, Some(PathBuf::from("C:/tools/MSBuild.exe")));
        assert_eq!(locate_in(Vec::<PathBuf>::new(), || None), None);
    }
}
