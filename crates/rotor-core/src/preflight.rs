//! Host and runtime checks run once before a rotation cycle touches any slot.
use std::path::Path;

use rotor_store::{IdentityPool, PoolStore};
use tracing::{debug, warn};

use crate::{config::FleetConfig, error::CycleError, runtime::ContainerRuntime};

/// Host resource readings. `None` means the reading is unavailable on this host.
pub trait HostProbe: Send + Sync {
    fn available_memory_mb(&self) -> Option<u64>;

    /// Used share of the filesystem holding `path`, in percent.
    fn disk_usage_pct(&self, path: &Path) -> Option<u8>;
}

/// Reads the live host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl HostProbe for SystemProbe {
    fn available_memory_mb(&self) -> Option<u64> {
        read_available_memory_mb()
    }

    fn disk_usage_pct(&self, path: &Path) -> Option<u8> {
        read_disk_usage_pct(existing_ancestor(path)?)
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        fn read_available_memory_mb() -> Option<u64> {
            match std::fs::read_to_string("/proc/meminfo") {
                Ok(raw) => parse_meminfo_available_kb(&raw).map(|kb| kb / 1024),
                Err(e) => {
                    debug!(target: "rotor.preflight", error = %e, "cannot read /proc/meminfo");
                    None
                }
            }
        }
    } else {
        fn read_available_memory_mb() -> Option<u64> {
            None
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        fn read_disk_usage_pct(path: &Path) -> Option<u8> {
            use std::{ffi::CString, os::unix::ffi::OsStrExt};

            let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
            // SAFETY: all-zero is a valid `statvfs`; it is fully overwritten on success.
            let mut st: libc::statvfs = unsafe { std::mem::zeroed() };
            // SAFETY: `c_path` is NUL-terminated and `st` is a valid out-pointer for the call.
            let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut st) };
            if rc != 0 {
                debug!(target: "rotor.preflight", path = %path.display(), error = %std::io::Error::last_os_error(), "statvfs failed");
                return None;
            }
            usage_pct(st.f_blocks as u64, st.f_bavail as u64)
        }
    } else {
        fn read_disk_usage_pct(_path: &Path) -> Option<u8> {
            None
        }
    }
}

/// `MemAvailable` in kB.
fn parse_meminfo_available_kb(raw: &str) -> Option<u64> {
    raw.lines()
        .find_map(|line| line.strip_prefix("MemAvailable:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|v| v.parse().ok())
}

/// The data directory may not exist yet on a fresh host.
fn existing_ancestor(path: &Path) -> Option<&Path> {
    path.ancestors().find(|p| p.exists())
}

/// Same arithmetic as `df`: used over used plus available-to-unprivileged.
fn usage_pct(total_blocks: u64, avail_blocks: u64) -> Option<u8> {
    if total_blocks == 0 {
        return None;
    }
    let used = total_blocks.saturating_sub(avail_blocks);
    Some(((used * 100).div_ceil(total_blocks)).min(100) as u8)
}

/// Memory → runtime ping → disk → pool parse. The first failure aborts.
///
/// Returns the parsed pool so the cycle reads it exactly once.
pub async fn preflight(
    cfg: &FleetConfig,
    runtime: &dyn ContainerRuntime,
    probe: &dyn HostProbe,
) -> Result<IdentityPool, CycleError> {
    match probe.available_memory_mb() {
        Some(mb) if mb < cfg.min_free_memory_mb => {
            return Err(CycleError::Resource(format!(
                "available memory {mb}MB is below the {}MB minimum",
                cfg.min_free_memory_mb
            )));
        }
        Some(mb) => debug!(target: "rotor.preflight", available_mb = mb, "memory ok"),
        None => warn!(target: "rotor.preflight", "available memory unknown; check skipped"),
    }

    match tokio::time::timeout(cfg.runtime_ping_timeout, runtime.ping()).await {
        Ok(Ok(())) => debug!(target: "rotor.preflight", runtime = runtime.name(), "runtime reachable"),
        Ok(Err(e)) => {
            return Err(CycleError::Resource(format!(
                "{} runtime not responsive: {e}",
                runtime.name()
            )));
        }
        Err(_) => {
            return Err(CycleError::Resource(format!(
                "{} runtime did not answer within {:?}",
                runtime.name(),
                cfg.runtime_ping_timeout
            )));
        }
    }

    match probe.disk_usage_pct(cfg.data_dir()) {
        Some(pct) if pct > cfg.max_disk_usage_pct => {
            return Err(CycleError::Resource(format!(
                "disk usage {pct}% of {} exceeds {}%",
                cfg.data_dir().display(),
                cfg.max_disk_usage_pct
            )));
        }
        Some(pct) => debug!(target: "rotor.preflight", disk_pct = pct, "disk ok"),
        None => warn!(target: "rotor.preflight", "disk usage unknown; check skipped"),
    }

    PoolStore::new(&cfg.pool_path)
        .load()
        .map_err(CycleError::Config)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::runtime::fake::FakeRuntime;

    /// Fixed readings.
    #[derive(Debug, Clone, Copy)]
    pub(crate) struct FakeProbe {
        pub memory_mb: Option<u64>,
        pub disk_pct: Option<u8>,
    }

    impl FakeProbe {
        pub fn healthy() -> Self {
            Self {
                memory_mb: Some(8192),
                disk_pct: Some(40),
            }
        }
    }

    impl HostProbe for FakeProbe {
        fn available_memory_mb(&self) -> Option<u64> {
            self.memory_mb
        }

        fn disk_usage_pct(&self, _path: &Path) -> Option<u8> {
            self.disk_pct
        }
    }

    fn cfg_with_pool(pool: &str) -> (tempfile::TempDir, FleetConfig) {
        let dir = tempfile::tempdir().unwrap();
        let cfg = FleetConfig::with_home(dir.path());
        std::fs::write(&cfg.pool_path, pool).unwrap();
        (dir, cfg)
    }

    #[test]
    fn meminfo_parsing() {
        let raw = "MemTotal:       16314412 kB\nMemFree:         1200000 kB\nMemAvailable:    8123456 kB\n";
        assert_eq!(parse_meminfo_available_kb(raw), Some(8_123_456));
        assert_eq!(parse_meminfo_available_kb("MemTotal: 1 kB\n"), None);
    }

    #[test]
    fn usage_pct_matches_df_rounding() {
        assert_eq!(usage_pct(100, 50), Some(50));
        assert_eq!(usage_pct(3, 1), Some(67));
        assert_eq!(usage_pct(0, 0), None);
    }

    #[tokio::test]
    async fn low_memory_fails_before_runtime_is_contacted() {
        let (_dir, cfg) = cfg_with_pool(r#"{"a":["x","y"]}"#);
        let rt = FakeRuntime::new();
        let probe = FakeProbe {
            memory_mb: Some(100),
            ..FakeProbe::healthy()
        };
        let err = preflight(&cfg, &rt, &probe).await.unwrap_err();
        assert!(matches!(err, CycleError::Resource(_)));
        assert!(rt.calls().is_empty());
    }

    #[tokio::test]
    async fn unreachable_runtime_is_resource_error() {
        let (_dir, cfg) = cfg_with_pool(r#"{"a":["x","y"]}"#);
        let rt = FakeRuntime::new();
        rt.set_unreachable();
        let err = preflight(&cfg, &rt, &FakeProbe::healthy()).await.unwrap_err();
        assert!(matches!(err, CycleError::Resource(_)));
    }

    #[tokio::test]
    async fn full_disk_is_resource_error() {
        let (_dir, cfg) = cfg_with_pool(r#"{"a":["x","y"]}"#);
        let probe = FakeProbe {
            disk_pct: Some(97),
            ..FakeProbe::healthy()
        };
        let err = preflight(&cfg, &FakeRuntime::new(), &probe).await.unwrap_err();
        assert!(matches!(err, CycleError::Resource(_)));
    }

    #[tokio::test]
    async fn corrupt_pool_is_config_error() {
        let (_dir, cfg) = cfg_with_pool(r#"{"a":"x"}"#);
        let err = preflight(&cfg, &FakeRuntime::new(), &FakeProbe::healthy())
            .await
            .unwrap_err();
        assert!(matches!(err, CycleError::Config(_)));
    }

    #[tokio::test]
    async fn passing_preflight_returns_pool() {
        let (_dir, cfg) = cfg_with_pool(r#"{"a":["x","y"]}"#);
        let pool = preflight(&cfg, &FakeRuntime::new(), &FakeProbe::healthy())
            .await
            .unwrap();
        assert_eq!(pool.real_identities("a").len(), 2);
    }

    #[test]
    fn system_probe_reads_something_on_linux() {
        if cfg!(target_os = "linux") {
            assert!(SystemProbe.available_memory_mb().is_some());
            assert!(SystemProbe.disk_usage_pct(Path::new("/tmp/does/not/exist")).is_some());
        }
    }
}
