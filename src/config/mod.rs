#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Context as _;
use directories::ProjectDirs;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::GwtError;
use crate::select::SelectOptions;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub worktree: WorktreeConfig,
    pub lock: LockConfig,
    pub select: SelectConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorktreeConfig {
    /// Parent directory for new worktrees, relative to the main checkout.
    #[serde(alias = "basedir")]
    pub base_dir: String,
}

impl Default for WorktreeConfig {
    fn default() -> Self {
        Self {
            base_dir: "..".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LockConfig {
    #[serde(alias = "timeout")]
    pub timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self { timeout_ms: 5000 }
    }
}

impl LockConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SelectConfig {
    pub show_instructions: bool,
    pub allow_empty: bool,
    pub color: bool,
}

impl Default for SelectConfig {
    fn default() -> Self {
        let opts = SelectOptions::default();
        Self {
            show_instructions: opts.show_instructions,
            allow_empty: opts.allow_empty,
            color: opts.color,
        }
    }
}

impl SelectConfig {
    #[must_use]
    pub fn options(&self) -> SelectOptions {
        SelectOptions {
            show_instructions: self.show_instructions,
            allow_empty: self.allow_empty,
            color: self.color && std::env::var_os("NO_COLOR").is_none(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_file: PathBuf,
}

pub fn default_paths() -> anyhow::Result<ConfigPaths> {
    let unix = home_dir()
        .unwrap_or_else(|| PathBuf::from("~"))
        .join(".config")
        .join("git-wt")
        .join("config.toml");
    if !cfg!(windows) || unix.exists() {
        return Ok(ConfigPaths { config_file: unix });
    }

    let proj = ProjectDirs::from("", "", "git-wt")
        .context("failed to determine platform config directory")?;
    Ok(ConfigPaths {
        config_file: proj.config_dir().join("config.toml"),
    })
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

#[must_use]
pub fn expand_tilde(input: &str) -> String {
    if input == "~"
        && let Some(home) = home_dir()
    {
        return home.to_string_lossy().to_string();
    }
    if let Some(rest) = input.strip_prefix("~/")
        && let Some(home) = home_dir()
    {
        return home.join(rest).to_string_lossy().to_string();
    }
    input.to_owned()
}

static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?").expect("env var pattern is valid")
});

/// Expands `$VAR` and `${VAR}`. Unknown variables are left untouched.
fn expand_env_vars(input: &str) -> String {
    ENV_VAR
        .replace_all(input, |caps: &regex::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_owned())
        })
        .to_string()
}

/// Expands `~` and environment variables, then anchors relative results at
/// `relative_to`.
#[must_use]
pub fn resolve_dir(input: &str, relative_to: &Path) -> PathBuf {
    let p = PathBuf::from(expand_env_vars(&expand_tilde(input)));
    if p.is_absolute() {
        p
    } else {
        relative_to.join(p)
    }
}

pub fn load() -> anyhow::Result<Config> {
    let paths = default_paths()?;
    let cfg = load_from_file(&paths.config_file)?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn list_resolved_toml() -> anyhow::Result<String> {
    Ok(toml::to_string_pretty(&load()?)?)
}

pub fn get_value_string(key: &str) -> anyhow::Result<Option<String>> {
    let paths = default_paths()?;
    get_value_string_at_path(&paths.config_file, key)
}

fn load_from_file(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let cfg: Config = toml::from_str(&raw)
        .with_context(|| format!("failed to parse TOML in {}", path.display()))?;
    Ok(cfg)
}

pub fn get_value_string_at_path(path: &Path, key: &str) -> anyhow::Result<Option<String>> {
    let cfg = load_from_file(path)?;
    cfg.validate()?;
    let key = normalize_key(key);
    if !KNOWN_KEYS.contains(&key) {
        return Err(GwtError::InvalidConfigKey(key.to_owned()).into());
    }
    Ok(lookup_value(&cfg, key).map(format_value_for_stdout))
}

const KNOWN_KEYS: &[&str] = &[
    "worktree",
    "worktree.base_dir",
    "lock",
    "lock.timeout_ms",
    "select",
    "select.show_instructions",
    "select.allow_empty",
    "select.color",
];

fn normalize_key(key: &str) -> &str {
    match key {
        "worktree.basedir" => "worktree.base_dir",
        "lock.timeout" => "lock.timeout_ms",
        _ => key,
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), GwtError> {
        if self.worktree.base_dir.trim().is_empty() {
            return Err(GwtError::Config(
                "worktree.base_dir must not be empty".to_owned(),
            ));
        }
        if self.lock.timeout_ms == 0 {
            return Err(GwtError::Config("lock.timeout_ms must be >= 1".to_owned()));
        }
        Ok(())
    }
}

fn lookup_value(cfg: &Config, key: &str) -> Option<serde_json::Value> {
    let mut v = serde_json::to_value(cfg).ok()?;
    for seg in key.split('.').filter(|s| !s.is_empty()) {
        match v {
            serde_json::Value::Object(mut map) => {
                v = map.remove(seg)?;
            }
            _ => return None,
        }
    }
    Some(v)
}

fn format_value_for_stdout(v: serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => "null".to_owned(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s,
        other => serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn config_validation_catches_invalid_values() {
        let mut cfg = Config::default();
        cfg.lock.timeout_ms = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.worktree.base_dir = "  ".to_owned();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[lock]\ntimeout = 250\n\n[select]\ncolor = false\n").unwrap();

        let cfg = load_from_file(&path).unwrap();
        assert_eq!(cfg.lock.timeout(), Duration::from_millis(250));
        assert!(!cfg.select.color);
        assert!(cfg.select.show_instructions);
        assert_eq!(cfg.worktree.base_dir, "..");
    }

    #[test]
    fn get_dotted_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[worktree]\nbasedir = \"~/wt\"\n").unwrap();

        assert_eq!(
            get_value_string_at_path(&path, "worktree.base_dir")
                .unwrap()
                .as_deref(),
            Some("~/wt")
        );
        assert_eq!(
            get_value_string_at_path(&path, "lock.timeout")
                .unwrap()
                .as_deref(),
            Some("5000")
        );
        assert!(get_value_string_at_path(&path, "lock.nope").is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_from_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn resolve_dir_anchors_relative_paths() {
        let root = Path::new("/srv/repo");
        assert_eq!(resolve_dir("..", root), PathBuf::from("/srv/repo/.."));
        assert_eq!(resolve_dir("/abs/wt", root), PathBuf::from("/abs/wt"));
        assert_eq!(
            resolve_dir("$GIT_WT_SURELY_UNSET_VAR/x", root),
            PathBuf::from("/srv/repo/$GIT_WT_SURELY_UNSET_VAR/x")
        );
    }
}
