//! CMake configure step

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths::BUILD_CONFIGURATION;

pub const CMAKE_TIMEOUT: Duration = Duration::from_secs(300);

/// Solution file the Visual Studio generator produces for AzerothCore.
pub const SOLUTION_NAME: &str = "AzerothCore.sln";

/// Generator name matching the installed Visual Studio.
pub fn generator_for(vs_path: &Path) -> &'static str {
    let text = vs_path.to_string_lossy();
    if text.contains("2019") {
        "Visual Studio 16 2019"
    } else {
        "Visual Studio 17 2022"
    }
}

pub fn configure_args(
    source: &Path,
    build: &Path,
    generator: &str,
    build_tools: bool,
) -> Vec<String> {
    vec![
        "-S".to_string(),
        source.to_string_lossy().to_string(),
        "-B".to_string(),
        build.to_string_lossy().to_string(),
        "-G".to_string(),
        generator.to_string(),
        "-A".to_string(),
        "x64".to_string(),
        format!("-DCMAKE_BUILD_TYPE={}", BUILD_CONFIGURATION),
        format!("-DTOOLS_BUILD={}", if build_tools { "all" } else { "none" }),
    ]
}

pub fn solution_path(build: &Path) -> PathBuf {
    build.join(SOLUTION_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configure_args_follow_toggle() {
        let args = configure_args(
            Path::new("src"),
            Path::new("Build"),
            "Visual Studio 17 2022",
            true,
        );
        assert_eq!(
            args,
            vec![
                "-S",
                "src",
                "-B",
                "Build",
                "-G",
                "Visual Studio 17 2022",
                "-A",
                "x64",
                "-DCMAKE_BUILD_TYPE=RelWithDebInfo",
                "-DTOOLS_BUILD=all",
            ]
        );
        let without = configure_args(Path::new("s"), Path::new("b"), "g", false);
        assert_eq!(without.last().map(String::as_str), Some("-DTOOLS_BUILD=none"));
    }

    #[test]
    fn generator_tracks_visual_studio_year() {
        assert_eq!(
            generator_for(Path::new(
                r"C:\Program Files (x86)\Microsoft Visual Studio\2019\Community\Common7\IDE\devenv.exe"
            )),
            "Visual Studio 16 2019"
        );
        assert_eq!(
            generator_for(Path::new(
                r"C:\Program Files\Microsoft Visual Studio\2022\Community\Common7\IDE\devenv.exe"
            )),
            "Visual Studio 17 2022"
        );
    }
}
