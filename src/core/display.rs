#![forbid(unsafe_code)]

//! Selection item strings: `<name> @ <branch> - <age>`.

use std::path::Path;
use std::time::SystemTime;

use crate::core::worktree::Worktree;

#[must_use]
pub fn format_item(wt: &Worktree, now: SystemTime) -> String {
    let branch = if wt.branch.is_empty() {
        "(detached)"
    } else {
        wt.branch.as_str()
    };
    let age = std::fs::metadata(Path::new(&wt.path))
        .and_then(|m| m.modified())
        .ok()
        .map_or_else(
            || "missing".to_owned(),
            |modified| {
                let secs = now
                    .duration_since(modified)
                    .map_or(0, |d| d.as_secs());
                relative_age(secs)
            },
        );
    let mut line = format!("{} @ {branch} - {age}", wt.name());
    if wt.is_current {
        line.push_str(" (current)");
    }
    line
}

#[must_use]
pub fn format_items(worktrees: &[Worktree]) -> Vec<String> {
    let now = SystemTime::now();
    worktrees.iter().map(|wt| format_item(wt, now)).collect()
}

#[must_use]
pub fn relative_age(secs: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;
    const WEEK: u64 = 7 * DAY;

    match secs {
        s if s < MINUTE => "just now".to_owned(),
        s if s < HOUR => format!("{}m ago", s / MINUTE),
        s if s < DAY => format!("{}h ago", s / HOUR),
        s if s < WEEK => format!("{}d ago", s / DAY),
        s => format!("{}w ago", s / WEEK),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn ages_round_down_to_largest_unit() {
        assert_eq!(relative_age(5), "just now");
        assert_eq!(relative_age(600), "10m ago");
        assert_eq!(relative_age(2 * 3600 + 59), "2h ago");
        assert_eq!(relative_age(3 * 86_400), "3d ago");
        assert_eq!(relative_age(15 * 86_400), "2w ago");
    }

    #[test]
    fn formats_existing_worktree() {
        let td = tempfile::tempdir().expect("tempdir");
        let dir = td.path().join("feature");
        std::fs::create_dir(&dir).unwrap();
        let wt = Worktree {
            path: dir.to_string_lossy().to_string(),
            branch: "auth".to_owned(),
            is_current: true,
            ..Worktree::default()
        };
        let later = SystemTime::now() + Duration::from_secs(600);
        assert_eq!(format_item(&wt, later), "feature @ auth - 10m ago (current)");
    }

    #[test]
    fn missing_directory_and_detached_head() {
        let wt = Worktree {
            path: "/nonexistent/git-wt/gone".to_owned(),
            ..Worktree::default()
        };
        assert_eq!(
            format_item(&wt, SystemTime::now()),
            "gone @ (detached) - missing"
        );
    }
}
