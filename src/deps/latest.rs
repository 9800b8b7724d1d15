//! Latest-version discovery for dependency downloads

use std::cmp::Ordering;

use version_compare::Version;

use super::registry::{expand_template, LatestSource};
use crate::github::fetch_latest_release;
use crate::logging::{log_download, log_warning};
use crate::utils::url_responds;

/// Best-effort lookup of a newer download URL. `None` when discovery is not
/// configured for the dependency or nothing answered.
pub fn discover_latest_url(source: &LatestSource) -> Option<String> {
    discover_with(source, url_responds)
}

fn discover_with(source: &LatestSource, probe: impl Fn(&str) -> bool) -> Option<String> {
    match source {
        LatestSource::None => None,
        LatestSource::GithubAsset { repo, fragments } => match fetch_latest_release(repo) {
            Ok(release) => {
                let asset = release.find_asset(fragments)?;
                log_download(&format!(
                    "Latest {} release {} -> {}",
                    repo, release.tag_name, asset.name
                ));
                Some(asset.browser_download_url.clone())
            }
            Err(e) => {
                log_warning(&format!("Could not query latest release of {}: {}", repo, e));
                None
            }
        },
        LatestSource::ProbeVersions { template, versions } => newest_first(versions)
            .into_iter()
            .map(|v| expand_template(template, v))
            .find(|url| probe(url)),
    }
}

/// Versions sorted so the newest comes first.
fn newest_first<'a>(versions: &[&'a str]) -> Vec<&'a str> {
    let mut sorted = versions.to_vec();
    sorted.sort_by(|a, b| match (Version::from(a), Version::from(b)) {
        (Some(va), Some(vb)) => vb.compare(&va).ord().unwrap_or(Ordering::Equal),
        _ => b.cmp(a),
    });
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probes_newest_version_first() {
        let source = LatestSource::ProbeVersions {
            template: "https://cdn.example/mysql-{v}-winx64.zip",
            versions: &["8.4.3", "8.4.10", "8.4.5"],
        };
        let probed = std::cell::RefCell::new(Vec::new());
        let found = discover_with(&source, |url| {
            probed.borrow_mut().push(url.to_string());
            url.contains("8.4.5")
        });

        assert_eq!(found.as_deref(), Some("https://cdn.example/mysql-8.4.5-winx64.zip"));
        assert_eq!(
            probed.into_inner(),
            vec![
                "https://cdn.example/mysql-8.4.10-winx64.zip",
                "https://cdn.example/mysql-8.4.5-winx64.zip",
            ]
        );
    }

    #[test]
    fn nothing_to_discover_without_a_source() {
        assert_eq!(discover_with(&LatestSource::None, |_| true), None);
    }
}
