use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub static DEFAULT_ACB_PATH: LazyLock<PathBuf> = LazyLock::new(|| {
    if let Some(home) = std::env::var_os("ACB_HOME") {
        return PathBuf::from(home);
    }

    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        return dir;
    }

    let mut path = dirs::data_local_dir().unwrap_or_default();
    path.push("ACB");
    path
});

/// Computes the path from the application directory based on the arguments.
///
/// Returns a `&Path` referencing the application directory itself if no arguments are passed in,
/// or a `PathBuf` created by joining all of the arguments to the application directory if at
/// least one argument is passed in.
///
/// # Examples
///
/// ```
/// // With `ACB_HOME` unset the application directory is the folder holding the executable
/// let config = acb_rust::acb_path!("acb_config.json");
/// assert!(config.ends_with("acb_config.json"));
/// ```
#[macro_export]
macro_rules! acb_path {
    () => {
        $crate::paths::DEFAULT_ACB_PATH.as_path()
    };

    ( $( $path:expr ),+ $(,)? ) => {
        [
            $crate::paths::DEFAULT_ACB_PATH.as_path(),
            $( std::path::Path::new(&$path) ),+
        ].into_iter().collect::<std::path::PathBuf>()
    };
}

/// Folder (under `GitSource`) that whichever source variant is active occupies.
pub const SOURCE_FOLDER_NAME: &str = "azerothcore-wotlk";

/// CMake configuration every build and every repack step agrees on.
pub const BUILD_CONFIGURATION: &str = "RelWithDebInfo";

// ============================================================================
// Workspace layout
// ============================================================================

/// The fixed folder layout below the application directory.
///
/// Every component locates its inputs and outputs through this type, so a
/// workspace can be relocated (or pointed at a temp dir in tests) as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(acb_path!())
    }
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn git_source_dir(&self) -> PathBuf {
        self.root.join("GitSource")
    }

    /// The shared clone target every source variant uses.
    pub fn source_dir(&self) -> PathBuf {
        self.git_source_dir().join(SOURCE_FOLDER_NAME)
    }

    pub fn modules_dir(&self) -> PathBuf {
        self.source_dir().join("modules")
    }

    pub fn build_dir(&self) -> PathBuf {
        self.root.join("Build")
    }

    /// Where MSBuild drops the server binaries.
    pub fn build_output_dir(&self) -> PathBuf {
        self.build_dir().join("bin").join(BUILD_CONFIGURATION)
    }

    pub fn repack_dir(&self) -> PathBuf {
        self.root.join("Repack")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join("Downloads")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn config_file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}
