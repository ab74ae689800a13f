//! Router configuration.
//!
//! Settings for the [`CollisionRouter`](crate::resources::collisionrouter::CollisionRouter),
//! loadable from an INI file. Defaults are safe to start with; missing keys
//! keep their current values.
//!
//! # Configuration File Format
//!
//! ```ini
//! [contacts]
//! destroy_policy = synthesize_end
//! sweep_stale = true
//! warn_on_reregister = true
//! max_recorded_failures = 64
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use configparser::ini::Ini;
use log::info;

const DEFAULT_DESTROY_POLICY: DestroyPolicy = DestroyPolicy::SynthesizeEnd;
const DEFAULT_SWEEP_STALE: bool = true;
const DEFAULT_WARN_ON_REREGISTER: bool = true;
const DEFAULT_MAX_RECORDED_FAILURES: usize = 64;
const DEFAULT_CONFIG_PATH: &str = "./contacts.ini";

const SECTION: &str = "contacts";

/// What happens to live contacts when one of their bodies is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyPolicy {
    /// Fire `on_end` for every tracked contact of the body, so subscribers
    /// always see balanced start/end pairs.
    SynthesizeEnd,
    /// Drop the contact state without any callback.
    Silent,
}

impl fmt::Display for DestroyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestroyPolicy::SynthesizeEnd => f.write_str("synthesize_end"),
            DestroyPolicy::Silent => f.write_str("silent"),
        }
    }
}

impl FromStr for DestroyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "synthesize_end" | "end" => Ok(DestroyPolicy::SynthesizeEnd),
            "silent" | "drop" => Ok(DestroyPolicy::Silent),
            other => Err(format!("Unknown destroy_policy '{}'", other)),
        }
    }
}

/// Collision router settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Behavior when a body is destroyed mid-contact, or re-registered so
    /// that a tracked contact no longer matches.
    pub destroy_policy: DestroyPolicy,
    /// End tracked contacts the engine stopped reporting without an explicit
    /// end pair.
    pub sweep_stale: bool,
    /// Log a warning when a body is re-registered with a different owner.
    pub warn_on_reregister: bool,
    /// How many callback failures the router keeps for [`take_failures`].
    ///
    /// [`take_failures`]: crate::resources::collisionrouter::CollisionRouter::take_failures
    pub max_recorded_failures: usize,
    /// Path to the configuration file.
    pub config_path: PathBuf,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            destroy_policy: DEFAULT_DESTROY_POLICY,
            sweep_stale: DEFAULT_SWEEP_STALE,
            warn_on_reregister: DEFAULT_WARN_ON_REREGISTER,
            max_recorded_failures: DEFAULT_MAX_RECORDED_FAILURES,
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }

    /// Create a configuration with a custom config file path.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
            ..Self::new()
        }
    }

    pub fn with_destroy_policy(mut self, policy: DestroyPolicy) -> Self {
        self.destroy_policy = policy;
        self
    }

    pub fn with_sweep_stale(mut self, sweep: bool) -> Self {
        self.sweep_stale = sweep;
        self
    }

    /// Load configuration from the INI file at `config_path`.
    ///
    /// Missing values retain their current values.
    /// Returns an error if the file cannot be read or a value is malformed.
    pub fn load_from_file(&mut self) -> Result<(), String> {
        let mut config = Ini::new();
        config
            .load(&self.config_path)
            .map_err(|e| format!("Failed to load config file: {}", e))?;
        self.apply(&config)?;
        info!(
            target: "contacts",
            "Loaded config from {:?}: destroy_policy={}, sweep_stale={}, warn_on_reregister={}, max_recorded_failures={}",
            self.config_path,
            self.destroy_policy,
            self.sweep_stale,
            self.warn_on_reregister,
            self.max_recorded_failures
        );
        Ok(())
    }

    /// Load configuration from INI text.
    pub fn load_from_str(&mut self, text: &str) -> Result<(), String> {
        let mut config = Ini::new();
        config
            .read(text.to_string())
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        self.apply(&config)
    }

    fn apply(&mut self, config: &Ini) -> Result<(), String> {
        if let Some(policy) = config.get(SECTION, "destroy_policy") {
            self.destroy_policy = policy.parse()?;
        }
        if let Some(sweep) = config.getbool(SECTION, "sweep_stale")? {
            self.sweep_stale = sweep;
        }
        if let Some(warn) = config.getbool(SECTION, "warn_on_reregister")? {
            self.warn_on_reregister = warn;
        }
        if let Some(max) = config.getuint(SECTION, "max_recorded_failures")? {
            self.max_recorded_failures = max as usize;
        }
        Ok(())
    }

    /// Save configuration to the INI file at `config_path`.
    ///
    /// Creates the file if it doesn't exist.
    pub fn save_to_file(&self) -> Result<(), String> {
        let mut config = Ini::new();
        config.set(
            SECTION,
            "destroy_policy",
            Some(self.destroy_policy.to_string()),
        );
        config.set(SECTION, "sweep_stale", Some(self.sweep_stale.to_string()));
        config.set(
            SECTION,
            "warn_on_reregister",
            Some(self.warn_on_reregister.to_string()),
        );
        config.set(
            SECTION,
            "max_recorded_failures",
            Some(self.max_recorded_failures.to_string()),
        );

        config
            .write(&self.config_path)
            .map_err(|e| format!("Failed to save config file: {}", e))?;

        info!(target: "contacts", "Saved config to {:?}", self.config_path);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RouterConfig::new();
        assert_eq!(config.destroy_policy, DestroyPolicy::SynthesizeEnd);
        assert!(config.sweep_stale);
        assert!(config.warn_on_reregister);
        assert_eq!(config.max_recorded_failures, 64);
    }

    #[test]
    fn test_load_from_str_overrides_present_keys() {
        let mut config = RouterConfig::new();
        config
            .load_from_str("[contacts]\ndestroy_policy = silent\nmax_recorded_failures = 8\n")
            .unwrap();
        assert_eq!(config.destroy_policy, DestroyPolicy::Silent);
        assert_eq!(config.max_recorded_failures, 8);
        assert!(config.sweep_stale);
    }

    #[test]
    fn test_load_from_str_rejects_bad_policy() {
        let mut config = RouterConfig::new();
        let err = config
            .load_from_str("[contacts]\ndestroy_policy = explode\n")
            .unwrap_err();
        assert!(err.contains("explode"));
    }

    #[test]
    fn test_load_from_str_rejects_bad_bool() {
        let mut config = RouterConfig::new();
        assert!(
            config
                .load_from_str("[contacts]\nsweep_stale = maybe\n")
                .is_err()
        );
    }

    #[test]
    fn test_missing_file_is_error() {
        let mut config = RouterConfig::with_path("./definitely/not/here.ini");
        assert!(config.load_from_file().is_err());
    }

    #[test]
    fn test_save_then_load() {
        let path = std::env::temp_dir().join(format!(
            "contactrouter_config_{}.ini",
            std::process::id()
        ));
        let mut original = RouterConfig::with_path(&path)
            .with_destroy_policy(DestroyPolicy::Silent)
            .with_sweep_stale(false);
        original.max_recorded_failures = 3;
        original.save_to_file().unwrap();

        let mut loaded = RouterConfig::with_path(&path);
        loaded.load_from_file().unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, original);
    }

    #[test]
    fn test_policy_round_trips_through_display() {
        for policy in [DestroyPolicy::SynthesizeEnd, DestroyPolicy::Silent] {
            assert_eq!(policy.to_string().parse::<DestroyPolicy>().unwrap(), policy);
        }
    }
}
