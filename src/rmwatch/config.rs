use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Empirically, a fully blank page renders to a few KB while any marked-up
/// page produces tens of KB. Tied to the converter tools' output
/// characteristics, so it stays configurable rather than hard-coded in the
/// engine.
pub const DEFAULT_BLANK_THRESHOLD_BYTES: u64 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    pub delay_secs: f64,
    pub blank_threshold_bytes: u64,
    pub recursive: bool,
    pub verify: bool,
    pub staging_dir: Option<PathBuf>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            delay_secs: 0.0,
            blank_threshold_bytes: DEFAULT_BLANK_THRESHOLD_BYTES,
            recursive: true,
            verify: false,
            staging_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialWatchConfig {
    delay_secs: Option<f64>,
    blank_threshold_bytes: Option<u64>,
    recursive: Option<bool>,
    verify: Option<bool>,
    staging_dir: Option<PathBuf>,
}

fn env_or_f64(var: &str, fallback: f64) -> f64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<f64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "on" => true,
            "0" | "false" | "FALSE" | "no" | "off" => false,
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

fn env_or_opt_path(var: &str, fallback: Option<PathBuf>) -> Option<PathBuf> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(PathBuf::from(v.trim())),
        _ => fallback,
    }
}

pub fn validate(cfg: &WatchConfig) -> Result<()> {
    if !cfg.delay_secs.is_finite() || cfg.delay_secs < 0.0 {
        return Err(anyhow!("invalid debounce delay: must be >= 0 seconds"));
    }
    if cfg.blank_threshold_bytes == 0 {
        return Err(anyhow!("invalid blank threshold: must be >= 1 byte"));
    }
    Ok(())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("RMWATCH_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".config").join("rmwatch.toml"))
}

fn merge_file_config(base: &mut WatchConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    let parsed: PartialWatchConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse config {}: {err}", path.display()))?;
    if let Some(delay_secs) = parsed.delay_secs {
        base.delay_secs = delay_secs;
    }
    if let Some(blank_threshold_bytes) = parsed.blank_threshold_bytes {
        base.blank_threshold_bytes = blank_threshold_bytes;
    }
    if let Some(recursive) = parsed.recursive {
        base.recursive = recursive;
    }
    if let Some(verify) = parsed.verify {
        base.verify = verify;
    }
    if parsed.staging_dir.is_some() {
        base.staging_dir = parsed.staging_dir;
    }
    Ok(())
}

/// Defaults, overlaid by the optional config file, overlaid by environment
/// variables. CLI flags are applied on top by the commands.
pub fn load_config() -> Result<WatchConfig> {
    let mut cfg = WatchConfig::default();
    merge_file_config(&mut cfg)?;

    cfg.delay_secs = env_or_f64("RMWATCH_DELAY_SECS", cfg.delay_secs);
    cfg.blank_threshold_bytes = env_or_u64(
        "RMWATCH_BLANK_THRESHOLD_BYTES",
        cfg.blank_threshold_bytes,
    );
    cfg.recursive = env_or_bool("RMWATCH_RECURSIVE", cfg.recursive);
    cfg.verify = env_or_bool("RMWATCH_VERIFY", cfg.verify);
    cfg.staging_dir = env_or_opt_path("RMWATCH_STAGING_DIR", cfg.staging_dir.take());

    validate(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = WatchConfig::default();
        assert!(validate(&cfg).is_ok());
        assert_eq!(cfg.blank_threshold_bytes, DEFAULT_BLANK_THRESHOLD_BYTES);
        assert!(cfg.recursive);
        assert!(!cfg.verify);
    }

    #[test]
    fn negative_delay_is_rejected() {
        let cfg = WatchConfig {
            delay_secs: -1.0,
            ..WatchConfig::default()
        };
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn zero_blank_threshold_is_rejected() {
        let cfg = WatchConfig {
            blank_threshold_bytes: 0,
            ..WatchConfig::default()
        };
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let mut cfg = WatchConfig::default();
        let parsed: PartialWatchConfig =
            toml::from_str("delay_secs = 2.5\nverify = true\n").expect("parse");
        if let Some(delay_secs) = parsed.delay_secs {
            cfg.delay_secs = delay_secs;
        }
        if let Some(verify) = parsed.verify {
            cfg.verify = verify;
        }

        assert_eq!(cfg.delay_secs, 2.5);
        assert!(cfg.verify);
        assert_eq!(cfg.blank_threshold_bytes, DEFAULT_BLANK_THRESHOLD_BYTES);
    }

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        // Unset variables fall back.
        assert!(env_or_bool("RMWATCH_TEST_UNSET_BOOL", true));
        assert!(!env_or_bool("RMWATCH_TEST_UNSET_BOOL", false));
    }
}
