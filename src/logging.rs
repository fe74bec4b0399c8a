#![forbid(unsafe_code)]

//! File logging. The terminal belongs to the selection UI, so nothing is
//! ever logged to stdout or stderr.

use std::path::PathBuf;

use directories::ProjectDirs;

const APP_NAME: &str = "git-wt";
const LOG_FILE_NAME: &str = "git-wt.log";

pub const LOG_LEVEL_ENV: &str = "GWT_LOG";
pub const DEFAULT_LOG_LEVEL: log::LevelFilter = log::LevelFilter::Warn;

pub fn cache_dir() -> Option<PathBuf> {
    if let Ok(xdg_cache_home) = std::env::var("XDG_CACHE_HOME")
        && !xdg_cache_home.is_empty()
    {
        return Some(PathBuf::from(xdg_cache_home).join(APP_NAME));
    }
    ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.cache_dir().to_path_buf())
}

pub fn default_log_file() -> Option<PathBuf> {
    cache_dir().map(|dir| dir.join(LOG_FILE_NAME))
}

/// Unset or unrecognised values fall back to [`DEFAULT_LOG_LEVEL`].
#[must_use]
pub fn level_from(value: Option<&str>) -> log::LevelFilter {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_LOG_LEVEL)
}

pub fn setup_logging(level: log::LevelFilter) -> anyhow::Result<()> {
    let log_file = default_log_file()
        .ok_or_else(|| anyhow::anyhow!("unable to determine a cache directory"))?;
    if let Some(parent) = log_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    simple_log::file(log_file.to_string_lossy().into_owned(), level, 10, 10)
        .map_err(|e| anyhow::anyhow!(e))?;
    log::info!("git-wt logging initialised (level={level})");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parsing_falls_back_to_default() {
        assert_eq!(level_from(None), DEFAULT_LOG_LEVEL);
        assert_eq!(level_from(Some("nonsense")), DEFAULT_LOG_LEVEL);
        assert_eq!(level_from(Some("debug")), log::LevelFilter::Debug);
        assert_eq!(level_from(Some(" TRACE ")), log::LevelFilter::Trace);
    }

    #[test]
    fn default_log_file_ends_with_log_filename() {
        if let Some(path) = default_log_file() {
            assert_eq!(path.file_name().unwrap(), LOG_FILE_NAME);
            assert!(path.parent().unwrap().ends_with(APP_NAME));
        }
    }
}
