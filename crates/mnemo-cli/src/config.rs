//! Configuration Vault – reads/writes `~/.mnemo/config.toml`.

use mnemo_memory::{BankConfig, SearchOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Persisted user configuration stored in `~/.mnemo/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database holding the memory bank.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Run deduplication and consolidation once the bank holds more
    /// memories than this.
    #[serde(default = "default_maintenance_threshold")]
    pub maintenance_threshold: usize,

    /// Associative links weaker than this are pruned after recalls.
    #[serde(default = "default_prune_min_strength")]
    pub prune_min_strength: f64,

    /// Quiet period before a scheduled prune runs, in milliseconds.
    #[serde(default = "default_prune_delay_ms")]
    pub prune_delay_ms: u64,

    /// Ranking options for `/recall`.
    #[serde(default)]
    pub search: SearchOptions,
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn default_store_path() -> PathBuf {
    PathBuf::from(home_dir()).join(".mnemo").join("memories.db")
}
fn default_maintenance_threshold() -> usize {
    BankConfig::default().maintenance_threshold
}
fn default_prune_min_strength() -> f64 {
    BankConfig::default().prune_min_strength
}
fn default_prune_delay_ms() -> u64 {
    BankConfig::default().prune_delay_ms
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            maintenance_threshold: default_maintenance_threshold(),
            prune_min_strength: default_prune_min_strength(),
            prune_delay_ms: default_prune_delay_ms(),
            search: SearchOptions::default(),
        }
    }
}

impl Config {
    /// Engine tunables derived from this config.
    pub fn bank_config(&self) -> BankConfig {
        BankConfig {
            maintenance_threshold: self.maintenance_threshold,
            prune_min_strength: self.prune_min_strength,
            prune_delay_ms: self.prune_delay_ms,
            search: self.search.clone(),
            ..BankConfig::default()
        }
    }
}

/// Return the path to `~/.mnemo/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

/// Build the config path relative to the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".mnemo").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path and apply env overrides.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    let Some(mut cfg) = read_from(path)? else {
        return Ok(None);
    };
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Parse the file at `path` as-is.
pub(crate) fn read_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| format!("Failed to parse config: {}", e))
}

/// Apply `MNEMO_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `MNEMO_STORE_PATH` | `store_path` |
/// | `MNEMO_MAINTENANCE_THRESHOLD` | `maintenance_threshold` |
/// | `MNEMO_PRUNE_MIN_STRENGTH` | `prune_min_strength` |
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

/// Apply overrides from an arbitrary variable lookup.
pub(crate) fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("MNEMO_STORE_PATH")
        && !v.trim().is_empty() {
            cfg.store_path = PathBuf::from(v);
        }
    if let Some(v) = lookup("MNEMO_MAINTENANCE_THRESHOLD")
        && let Ok(n) = v.trim().parse::<usize>() {
            cfg.maintenance_threshold = n;
        }
    if let Some(v) = lookup("MNEMO_PRUNE_MIN_STRENGTH")
        && let Ok(s) = v.trim().parse::<f64>()
        && (0.0..=1.0).contains(&s) {
            cfg.prune_min_strength = s;
        }
}

/// Save the config to disk, creating `~/.mnemo/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        create_private_dir(parent)?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Memories are personal; keep the file owner-only (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

/// Create `dir` (and parents) restricted to the owner (rwx------) on Unix.
pub(crate) fn create_private_dir(dir: &std::path::Path) -> Result<(), String> {
    fs::create_dir_all(dir)
        .map_err(|e| format!("Failed to create directory {}: {}", dir.display(), e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
            .map_err(|e| format!("Failed to set permissions on {}: {}", dir.display(), e))?;
    }
    Ok(())
}
