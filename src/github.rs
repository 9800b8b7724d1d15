//! Shared GitHub API types

use serde::Deserialize;

use crate::task::{TaskError, TaskResult};

/// GitHub release metadata
#[derive(Deserialize, Debug, Clone)]
pub struct GithubRelease {
    pub tag_name: String,
    pub body: Option<String>,
    pub assets: Vec<GithubAsset>,
}

/// GitHub release asset
#[derive(Deserialize, Debug, Clone)]
pub struct GithubAsset {
    pub name: String,
    pub browser_download_url: String,
}

impl GithubRelease {
    /// First asset whose name contains every fragment (case-insensitive).
    pub fn find_asset(&self, fragments: &[&str]) -> Option<&GithubAsset> {
        self.assets.iter().find(|a| {
            let name = a.name.to_lowercase();
            fragments.iter().all(|f| name.contains(&f.to_lowercase()))
        })
    }
}

/// Fetch the latest release of `owner/repo`
pub fn fetch_latest_release(repo: &str) -> TaskResult<GithubRelease> {
    let url = format!("https://api.github.com/repos/{}/releases/latest", repo);
    ureq::get(&url)
        .set("User-Agent", "ACB-Rust")
        .call()
        .map_err(|e| TaskError::other(format!("GitHub API {}", repo), e))?
        .into_json()
        .map_err(|e| TaskError::other(format!("GitHub API {}", repo), e))
}
