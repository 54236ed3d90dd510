//! Configuration management for tile-engine.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (`TILE_ENGINE_ARCH`, etc.)
//! 2. Project-local config file (`./tile-engine.toml`)
//! 3. User config file (`~/.config/tile-engine/config.toml`)
//! 4. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # tile-engine.toml
//!
//! # Hardware generation: a2a3, a5 or kirin9030
//! arch = "a2a3"
//!
//! # Record races, scratch and index faults
//! debug_checks = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::device::arch_config::Arch;
use crate::device::hw_spec::SIGNAL_DEFAULT_RETRIES;

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// tile-engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hardware generation to simulate.
    pub arch: Arch,

    /// Enable race, scratch-size, index and tier-overflow checks.
    pub debug_checks: bool,

    /// Log every issued vector instruction at trace level.
    pub trace_issues: bool,

    /// Poll budget for signal waits.
    pub signal_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            arch: Arch::default(),
            debug_checks: false,
            trace_issues: false,
            signal_retries: SIGNAL_DEFAULT_RETRIES,
        }
    }
}

/// A config file as written: every field optional so layering only
/// overrides what a file actually sets.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct PartialConfig {
    arch: Option<Arch>,
    debug_checks: Option<bool>,
    trace_issues: Option<bool>,
    signal_retries: Option<u32>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project-local `tile-engine.toml`
    /// 3. User config `~/.config/tile-engine/config.toml`
    /// 4. Defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        if let Some(local_config) = Self::load_local_config() {
            config.merge(local_config);
        }

        config.apply_env_overrides();

        config
    }

    /// Get the cached global configuration.
    ///
    /// Loads configuration on first call and caches it.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    /// Parse a TOML document into a full configuration over defaults.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        let partial: PartialConfig = toml::from_str(text)?;
        let mut config = Self::default();
        config.merge(partial);
        Ok(config)
    }

    /// Load user configuration from ~/.config/tile-engine/config.toml
    fn load_user_config() -> Option<PartialConfig> {
        let path = Self::user_config_path()?;
        Self::load_from_file(&path)
    }

    /// Load project-local configuration from ./tile-engine.toml
    fn load_local_config() -> Option<PartialConfig> {
        let local_path = Path::new("tile-engine.toml");
        if let Some(config) = Self::load_from_file(local_path) {
            return Some(config);
        }

        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let project_path = Path::new(&manifest_dir).join("tile-engine.toml");
            if let Some(config) = Self::load_from_file(&project_path) {
                return Some(config);
            }
        }

        None
    }

    fn load_from_file(path: &Path) -> Option<PartialConfig> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge a file layer: only fields the file sets override.
    fn merge(&mut self, other: PartialConfig) {
        if let Some(arch) = other.arch {
            self.arch = arch;
        }
        if let Some(v) = other.debug_checks {
            self.debug_checks = v;
        }
        if let Some(v) = other.trace_issues {
            self.trace_issues = v;
        }
        if let Some(v) = other.signal_retries {
            self.signal_retries = v;
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("TILE_ENGINE_ARCH") {
            match value.parse::<Arch>() {
                Ok(arch) => {
                    log::info!("Using TILE_ENGINE_ARCH from environment: {}", arch);
                    self.arch = arch;
                }
                Err(e) => log::warn!("Ignoring TILE_ENGINE_ARCH: {}", e),
            }
        }
        if let Ok(value) = std::env::var("TILE_ENGINE_DEBUG_CHECKS") {
            match parse_bool(&value) {
                Some(v) => {
                    log::info!("Using TILE_ENGINE_DEBUG_CHECKS from environment: {}", v);
                    self.debug_checks = v;
                }
                None => log::warn!("Ignoring TILE_ENGINE_DEBUG_CHECKS={:?}", value),
            }
        }
        if let Ok(value) = std::env::var("TILE_ENGINE_SIGNAL_RETRIES") {
            match value.parse::<u32>() {
                Ok(v) => {
                    log::info!("Using TILE_ENGINE_SIGNAL_RETRIES from environment: {}", v);
                    self.signal_retries = v;
                }
                Err(e) => log::warn!("Ignoring TILE_ENGINE_SIGNAL_RETRIES: {}", e),
            }
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("tile-engine").join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        format!(
            r#"# tile-engine configuration
# Place this file at ~/.config/tile-engine/config.toml or ./tile-engine.toml

# Hardware generation: "a2a3", "a5" or "kirin9030"
arch = "a2a3"

# Report races, undersized scratch tiles, out-of-range indices and
# tier overflows (results are unchanged)
debug_checks = false

# Log every vector issue at trace level (also needs RUST_LOG=trace)
trace_issues = false

# Poll budget for signal waits
signal_retries = {}
"#,
            SIGNAL_DEFAULT_RETRIES
        )
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.arch, Arch::A2A3);
        assert!(!config.debug_checks);
        assert_eq!(config.signal_retries, SIGNAL_DEFAULT_RETRIES);
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config {
            arch: Arch::A5,
            debug_checks: true,
            trace_issues: false,
            signal_retries: 10,
        };

        base.merge(PartialConfig {
            arch: None,
            debug_checks: Some(false),
            trace_issues: None,
            signal_retries: Some(99),
        });

        assert_eq!(base.arch, Arch::A5);
        assert!(!base.debug_checks);
        assert_eq!(base.signal_retries, 99);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = Config::from_toml("arch = \"kirin9030\"\n").unwrap();
        assert_eq!(config.arch, Arch::Kirin9030);
        assert_eq!(config.signal_retries, SIGNAL_DEFAULT_RETRIES);
        assert!(Config::from_toml("arch = \"z80\"").is_err());
    }

    #[test]
    fn test_sample_config_parses() {
        let sample = Config::sample_config();
        let config = Config::from_toml(&sample).expect("Sample config should parse");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
