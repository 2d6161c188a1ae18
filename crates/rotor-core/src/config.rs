//! Immutable fleet configuration.
//!
//! Built once at startup (defaults → `ROTOR_*` environment → CLI flags) and shared
//! read-only by every component through an `Arc<FleetConfig>`.
use std::{
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use rotor_model::{DEFAULT_SLOT_PREFIX, MemoryLimit, Slot, SlotNaming};

use crate::error::ConfigError;

pub const DEFAULT_HOME: &str = "/var/lib/rotor";
pub const DEFAULT_IMAGE: &str = "nexus-node:latest";

#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Worker image every unit is created from.
    pub image: String,
    /// Slot naming prefix (`<prefix><n>`).
    pub slot_prefix: String,
    /// Directory holding the pool, state and lock files.
    pub home: PathBuf,
    /// Directory holding per-slot logs and the operational logs.
    pub log_dir: PathBuf,
    pub pool_path: PathBuf,
    pub state_path: PathBuf,
    pub lock_path: PathBuf,
    /// Every cycle event, append-only.
    pub rotation_log: PathBuf,
    /// Failures only, append-only.
    pub failure_log: PathBuf,
    /// Where `deploy` writes the cron entries.
    pub schedule_path: PathBuf,
    /// Ceiling reported for units that carry none, and used for slots with no unit.
    pub fallback_memory: MemoryLimit,
    /// How long a recreated unit has to reach `running`.
    pub health_grace: Duration,
    pub health_poll_interval: Duration,
    /// Preflight: minimum available host memory.
    pub min_free_memory_mb: u64,
    /// Preflight: maximum used share of the filesystem holding `home`.
    pub max_disk_usage_pct: u8,
    /// Preflight: how long the runtime may take to answer a ping.
    pub runtime_ping_timeout: Duration,
    /// Container runtime CLI.
    pub runtime_program: String,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self::with_home(DEFAULT_HOME)
    }
}

impl FleetConfig {
    /// Defaults with every derived path rooted at `home`.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let log_dir = home.join("logs");
        Self {
            image: DEFAULT_IMAGE.to_string(),
            slot_prefix: DEFAULT_SLOT_PREFIX.to_string(),
            pool_path: home.join("node-ids.json"),
            state_path: home.join("rotation-state.json"),
            lock_path: home.join("rotation.lock"),
            rotation_log: log_dir.join("rotation.log"),
            failure_log: log_dir.join("rotation-failures.log"),
            schedule_path: PathBuf::from("/etc/cron.d/rotor"),
            fallback_memory: MemoryLimit::Unlimited,
            health_grace: Duration::from_secs(30),
            health_poll_interval: Duration::from_secs(2),
            min_free_memory_mb: 512,
            max_disk_usage_pct: 90,
            runtime_ping_timeout: Duration::from_secs(10),
            runtime_program: "docker".to_string(),
            log_dir,
            home,
        }
    }

    /// Defaults overridden by `ROTOR_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let home: PathBuf = parse_optional_env("ROTOR_HOME", PathBuf::from(DEFAULT_HOME))?;
        let mut cfg = Self::with_home(home);

        if let Some(log_dir) = optional_env("ROTOR_LOG_DIR")? {
            cfg.set_log_dir(log_dir);
        }
        cfg.image = parse_optional_env("ROTOR_IMAGE", cfg.image)?;
        cfg.slot_prefix = parse_optional_env("ROTOR_SLOT_PREFIX", cfg.slot_prefix)?;
        cfg.schedule_path = parse_optional_env("ROTOR_SCHEDULE_PATH", cfg.schedule_path)?;
        cfg.fallback_memory = parse_optional_env("ROTOR_MEMORY_LIMIT", cfg.fallback_memory)?;
        cfg.health_grace = Duration::from_secs(parse_optional_env(
            "ROTOR_HEALTH_GRACE_SECS",
            cfg.health_grace.as_secs(),
        )?);
        cfg.min_free_memory_mb =
            parse_optional_env("ROTOR_MIN_FREE_MEMORY_MB", cfg.min_free_memory_mb)?;
        cfg.max_disk_usage_pct = parse_optional_env("ROTOR_MAX_DISK_PCT", cfg.max_disk_usage_pct)?;
        cfg.runtime_program = parse_optional_env("ROTOR_RUNTIME", cfg.runtime_program)?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Re-root the pool, state, lock and log paths under `home`.
    pub fn set_home(&mut self, home: impl Into<PathBuf>) {
        let home = home.into();
        self.pool_path = home.join("node-ids.json");
        self.state_path = home.join("rotation-state.json");
        self.lock_path = home.join("rotation.lock");
        self.set_log_dir(home.join("logs"));
        self.home = home;
    }

    /// Move per-slot and operational logs to `log_dir`.
    pub fn set_log_dir(&mut self, log_dir: impl Into<PathBuf>) {
        let log_dir = log_dir.into();
        self.rotation_log = log_dir.join("rotation.log");
        self.failure_log = log_dir.join("rotation-failures.log");
        self.log_dir = log_dir;
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.image.trim().is_empty() {
            return Err(ConfigError::invalid("image", "must not be empty"));
        }
        if self.slot_prefix.is_empty() {
            return Err(ConfigError::invalid("slot_prefix", "must not be empty"));
        }
        if self.max_disk_usage_pct == 0 || self.max_disk_usage_pct > 100 {
            return Err(ConfigError::invalid(
                "max_disk_usage_pct",
                format!("{} is outside 1..=100", self.max_disk_usage_pct),
            ));
        }
        if self.health_poll_interval.is_zero() {
            return Err(ConfigError::invalid("health_poll_interval", "must be positive"));
        }
        Ok(())
    }

    pub fn naming(&self) -> SlotNaming {
        SlotNaming::new(self.slot_prefix.as_str())
    }

    /// Host log file bound into the unit for `slot`.
    pub fn log_path_for(&self, slot: &str) -> PathBuf {
        self.log_dir.join(format!("{slot}.log"))
    }

    /// Display label passed to the unit.
    pub fn label_for(&self, slot: &str) -> Slot {
        slot.to_string()
    }

    /// Directory whose filesystem the disk preflight inspects.
    pub fn data_dir(&self) -> &Path {
        &self.home
    }
}

fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => Ok(Some(v)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::invalid(key, e.to_string())),
    }
}

fn parse_optional_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(key)? {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(key, format!("{raw:?}: {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_derive_from_home() {
        let cfg = FleetConfig::with_home("/srv/rotor");
        assert_eq!(cfg.pool_path, PathBuf::from("/srv/rotor/node-ids.json"));
        assert_eq!(cfg.state_path, PathBuf::from("/srv/rotor/rotation-state.json"));
        assert_eq!(
            cfg.failure_log,
            PathBuf::from("/srv/rotor/logs/rotation-failures.log")
        );
        assert_eq!(
            cfg.log_path_for("nexus-node-2"),
            PathBuf::from("/srv/rotor/logs/nexus-node-2.log")
        );
    }

    #[test]
    fn log_dir_override_moves_operational_logs() {
        let mut cfg = FleetConfig::with_home("/srv/rotor");
        cfg.set_log_dir("/var/log/rotor");
        assert_eq!(cfg.rotation_log, PathBuf::from("/var/log/rotor/rotation.log"));
        assert_eq!(
            cfg.log_path_for("nexus-node-1"),
            PathBuf::from("/var/log/rotor/nexus-node-1.log")
        );
    }

    #[test]
    fn set_home_matches_with_home() {
        let mut cfg = FleetConfig::default();
        cfg.set_home("/srv/other");
        let fresh = FleetConfig::with_home("/srv/other");
        assert_eq!(cfg.pool_path, fresh.pool_path);
        assert_eq!(cfg.lock_path, fresh.lock_path);
        assert_eq!(cfg.rotation_log, fresh.rotation_log);
        assert_eq!(cfg.data_dir(), Path::new("/srv/other"));
    }

    #[test]
    fn validate_rejects_bad_disk_threshold() {
        let mut cfg = FleetConfig::default();
        assert!(cfg.validate().is_ok());
        cfg.max_disk_usage_pct = 0;
        assert!(cfg.validate().is_err());
        cfg.max_disk_usage_pct = 101;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parse_optional_env_falls_back_to_default() {
        let v: u64 = parse_optional_env("ROTOR_TEST_SURELY_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(v, 7);
    }
}
