//! Real clone progress from `git clone --progress` output
//!
//! Object download maps to 0-80%, delta resolution to 80-98%. The last
//! stretch (checkout) is reported as 100% only once git exits successfully.

use std::sync::LazyLock;

use regex::Regex;

static PHASE_PERCENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(Receiving objects|Resolving deltas):\s+(\d{1,3})%").expect("progress pattern is a valid regex")
});

const RECEIVE_SHARE: f32 = 0.80;
const RESOLVE_END: f32 = 0.98;

/// Tracks the overall fraction across git's progress phases.
#[derive(Debug, Default, Clone)]
pub struct CloneProgress {
    fraction: Option<f32>,
}

impl CloneProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one output line; returns the new overall fraction if the line
    /// carried progress. Never moves backwards.
    pub fn observe(&mut self, line: &str) -> Option<f32> {
        let caps = PHASE_PERCENT.captures(line)?;
        let pct: f32 = caps[2].parse::<u32>().ok()?.min(100) as f32 / 100.0;
        let mapped = match &caps[1] {
            "Receiving objects" => pct * RECEIVE_SHARE,
            _ => RECEIVE_SHARE + pct * (RESOLVE_END - RECEIVE_SHARE),
        };
        let next = self.fraction.map_or(mapped, |f| f.max(mapped));
        self.fraction = Some(next);
        Some(next)
    }

    /// `None` until git has printed a real percentage.
    pub fn fraction(&self) -> Option<f32> {
        self.fraction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_git_phases_onto_one_scale() {
        let mut p = CloneProgress::new();
        assert_eq!(p.observe("Cloning into 'azerothcore-wotlk'..."), None);
        assert_eq!(p.fraction(), None);

        let half = p.observe("Receiving objects:  50% (5000/10000), 12.00 MiB | 4.00 MiB/s").unwrap();
        assert!((half - 0.40).abs() < 1e-6);

        let done_recv = p.observe("Receiving objects: 100% (10000/10000), done.").unwrap();
        assert!((done_recv - 0.80).abs() < 1e-6);

        let deltas = p.observe("Resolving deltas: 100% (700/700), done.").unwrap();
        assert!((deltas - 0.98).abs() < 1e-6);
    }

    #[test]
    fn progress_never_goes_backwards() {
        let mut p = CloneProgress::new();
        p.observe("Resolving deltas:  10% (1/10)");
        let after = p.observe("Receiving objects:   5% (1/20)").unwrap();
        assert!(after >= 0.80);
    }
}
