use std::{sync::Arc, time::Duration};

use rotor_model::{Identity, MemoryLimit, UnitSpec, UnitStatus};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, warn};

use crate::{
    config::FleetConfig,
    error::SlotError,
    runtime::{ContainerRuntime, RuntimeError},
};

/// Consecutive `running` observations required before a unit counts as healthy.
const HEALTHY_POLLS: u32 = 2;

/// Lifecycle of the execution unit behind one slot.
///
/// Shared by the rotation engine and the manual fleet operations; holds no state of its own.
#[derive(Clone)]
pub struct WorkerSupervisor {
    runtime: Arc<dyn ContainerRuntime>,
    cfg: Arc<FleetConfig>,
}

impl WorkerSupervisor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, cfg: Arc<FleetConfig>) -> Self {
        Self { runtime, cfg }
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub fn config(&self) -> &FleetConfig {
        &self.cfg
    }

    /// Force-remove the unit for `slot`. A slot with no unit is already destroyed.
    #[instrument(level = "debug", skip(self))]
    pub async fn destroy(&self, slot: &str) -> Result<(), SlotError> {
        match self.runtime.remove(slot).await {
            Ok(true) => {
                debug!(target: "rotor.supervisor", slot, "unit removed");
                Ok(())
            }
            Ok(false) => {
                debug!(target: "rotor.supervisor", slot, "no unit to remove");
                Ok(())
            }
            Err(e) => Err(SlotError::Destroy {
                slot: slot.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Create and start a unit bound to `identity`.
    ///
    /// Success means the runtime accepted the request, not that the worker is healthy.
    #[instrument(level = "debug", skip(self, identity), fields(identity = %identity))]
    pub async fn create(
        &self,
        slot: &str,
        identity: &Identity,
        memory: MemoryLimit,
    ) -> Result<(), SlotError> {
        let create_err = |reason: String| SlotError::Create {
            slot: slot.to_string(),
            reason,
        };

        let log_path = self.cfg.log_path_for(slot);
        ensure_file(&log_path)
            .await
            .map_err(|e| create_err(format!("log file {}: {e}", log_path.display())))?;

        let spec = UnitSpec {
            slot: slot.to_string(),
            image: self.cfg.image.clone(),
            identity: identity.clone(),
            memory,
            log_path,
            label: self.cfg.label_for(slot),
        };

        let id = self
            .runtime
            .create(&spec)
            .await
            .map_err(|e| create_err(e.to_string()))?;
        info!(target: "rotor.supervisor", slot, unit_id = %id, memory = %memory, "unit created");
        Ok(())
    }

    /// Poll until the unit has been seen `running` on consecutive polls, or `timeout` passes.
    ///
    /// A unit that exits, restarts or disappears is reported unhealthy without waiting out
    /// the timeout.
    #[instrument(level = "debug", skip(self))]
    pub async fn health_check(&self, slot: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut running = 0u32;

        loop {
            match self.runtime.inspect(slot).await {
                // A fresh unit starts at zero restarts; any restart means the process died.
                Ok(Some(unit)) if unit.restart_count > 0 || unit.status == UnitStatus::Restarting => {
                    warn!(
                        target: "rotor.supervisor",
                        slot,
                        status = %unit.status,
                        restarts = unit.restart_count,
                        "unit restarted during health check"
                    );
                    return false;
                }
                Ok(Some(unit)) if unit.status.is_running() => {
                    running += 1;
                    if running >= HEALTHY_POLLS {
                        debug!(target: "rotor.supervisor", slot, "unit healthy");
                        return true;
                    }
                }
                Ok(Some(unit)) if unit.status.is_terminal() => {
                    warn!(target: "rotor.supervisor", slot, status = %unit.status, "unit stopped during health check");
                    return false;
                }
                Ok(Some(unit)) => {
                    running = 0;
                    debug!(target: "rotor.supervisor", slot, status = %unit.status, "unit not running yet");
                }
                Ok(None) => {
                    warn!(target: "rotor.supervisor", slot, "unit vanished during health check");
                    return false;
                }
                Err(e) => {
                    running = 0;
                    debug!(target: "rotor.supervisor", slot, error = %e, "status poll failed");
                }
            }

            if Instant::now() >= deadline {
                warn!(target: "rotor.supervisor", slot, ?timeout, "health check timed out");
                return false;
            }
            sleep(self.cfg.health_poll_interval).await;
        }
    }

    /// Identity the live unit is running with.
    pub async fn current_identity(&self, slot: &str) -> Result<Option<Identity>, RuntimeError> {
        Ok(self
            .runtime
            .inspect(slot)
            .await?
            .and_then(|unit| unit.identity()))
    }

    /// Ceiling applied to the live unit, or the configured fallback when there is none.
    pub async fn resource_limit_of(&self, slot: &str) -> Result<MemoryLimit, RuntimeError> {
        Ok(match self.runtime.inspect(slot).await? {
            Some(unit) => unit.memory,
            None => self.cfg.fallback_memory,
        })
    }

    /// Destroy, create and health-check in one go.
    ///
    /// A unit that fails to start or fails its health check is removed again so no
    /// half-started worker keeps the slot name.
    pub async fn replace(
        &self,
        slot: &str,
        identity: &Identity,
        memory: MemoryLimit,
    ) -> Result<(), SlotError> {
        self.destroy(slot).await?;
        if let Err(e) = self.create(slot, identity, memory).await {
            self.cleanup(slot).await;
            return Err(e);
        }

        if self.health_check(slot, self.cfg.health_grace).await {
            return Ok(());
        }
        self.cleanup(slot).await;
        Err(SlotError::Health {
            slot: slot.to_string(),
            reason: format!("not running within {:?}", self.cfg.health_grace),
        })
    }

    /// Best-effort removal of a unit that failed to start or to become healthy.
    pub(crate) async fn cleanup(&self, slot: &str) {
        if let Err(e) = self.destroy(slot).await {
            warn!(target: "rotor.supervisor", slot, error = %e, "cleanup of failed unit did not succeed");
        }
    }
}

async fn ensure_file(path: &std::path::Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fake::FakeRuntime;

    fn setup() -> (tempfile::TempDir, Arc<FakeRuntime>, WorkerSupervisor) {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Arc::new(FleetConfig::with_home(dir.path()));
        let rt = Arc::new(FakeRuntime::new());
        let sup = WorkerSupervisor::new(rt.clone(), cfg);
        (dir, rt, sup)
    }

    #[tokio::test]
    async fn destroy_absent_slot_twice_is_ok() {
        let (_dir, rt, sup) = setup();
        sup.destroy("nexus-node-1").await.unwrap();
        sup.destroy("nexus-node-1").await.unwrap();
        assert_eq!(rt.removes(), 2);
    }

    #[tokio::test]
    async fn create_binds_identity_and_log_file() {
        let (dir, rt, sup) = setup();
        sup.create("nexus-node-1", &Identity::from("abc"), MemoryLimit::from_mib(512))
            .await
            .unwrap();

        assert!(dir.path().join("logs/nexus-node-1.log").exists());
        let unit = rt.unit("nexus-node-1").unwrap();
        assert_eq!(unit.identity(), Some(Identity::from("abc")));
        assert_eq!(unit.memory, MemoryLimit::from_mib(512));
        assert_eq!(
            sup.current_identity("nexus-node-1").await.unwrap(),
            Some(Identity::from("abc"))
        );
    }

    #[tokio::test]
    async fn create_rejection_carries_diagnostic() {
        let (_dir, rt, sup) = setup();
        rt.fail_create("nexus-node-1");
        let err = sup
            .create("nexus-node-1", &Identity::from("abc"), MemoryLimit::Unlimited)
            .await
            .unwrap_err();
        assert!(matches!(err, SlotError::Create { .. }));
        assert!(err.to_string().contains("no such image"));
    }

    #[tokio::test(start_paused = true)]
    async fn health_needs_two_running_polls() {
        let (_dir, rt, sup) = setup();
        sup.create("nexus-node-1", &Identity::from("abc"), MemoryLimit::Unlimited)
            .await
            .unwrap();
        assert!(sup.health_check("nexus-node-1", Duration::from_secs(30)).await);
        let inspects = rt
            .calls()
            .into_iter()
            .filter(|c| matches!(c, crate::runtime::fake::Call::Inspect(_)))
            .count();
        assert_eq!(inspects, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exited_unit_fails_fast() {
        let (_dir, rt, sup) = setup();
        rt.crash_on_start("nexus-node-1");
        sup.create("nexus-node-1", &Identity::from("abc"), MemoryLimit::Unlimited)
            .await
            .unwrap();
        let started = Instant::now();
        assert!(!sup.health_check("nexus-node-1", Duration::from_secs(30)).await);
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_unit_is_unhealthy() {
        let (_dir, _rt, sup) = setup();
        assert!(!sup.health_check("nexus-node-9", Duration::from_secs(5)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn replace_cleans_up_unhealthy_unit() {
        let (_dir, rt, sup) = setup();
        rt.crash_on_start("nexus-node-1");
        let err = sup
            .replace("nexus-node-1", &Identity::from("abc"), MemoryLimit::Unlimited)
            .await
            .unwrap_err();
        assert_eq!(err.phase(), rotor_model::SlotPhase::HealthFailed);
        assert!(rt.unit("nexus-node-1").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn crash_looping_unit_is_unhealthy() {
        let (_dir, rt, sup) = setup();
        rt.crash_loop("nexus-node-1");
        sup.create("nexus-node-1", &Identity::from("abc"), MemoryLimit::Unlimited)
            .await
            .unwrap();
        // Reported `running` on every poll, but restarted in between.
        assert!(!sup.health_check("nexus-node-1", Duration::from_secs(30)).await);
        assert_eq!(rt.unit("nexus-node-1").unwrap().status, UnitStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn replace_removes_unit_that_failed_to_start() {
        let (_dir, rt, sup) = setup();
        rt.fail_start("nexus-node-1");
        let err = sup
            .replace("nexus-node-1", &Identity::from("abc"), MemoryLimit::Unlimited)
            .await
            .unwrap_err();
        assert_eq!(err.phase(), rotor_model::SlotPhase::CreateFailed);
        assert!(rt.unit("nexus-node-1").is_none());
    }

    #[tokio::test]
    async fn resource_limit_falls_back_without_unit() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = FleetConfig::with_home(dir.path());
        cfg.fallback_memory = MemoryLimit::from_mib(1024);
        let rt = Arc::new(FakeRuntime::new());
        let sup = WorkerSupervisor::new(rt.clone(), Arc::new(cfg));

        assert_eq!(
            sup.resource_limit_of("nexus-node-1").await.unwrap(),
            MemoryLimit::from_mib(1024)
        );
        sup.create("nexus-node-1", &Identity::from("a"), MemoryLimit::Unlimited)
            .await
            .unwrap();
        assert_eq!(
            sup.resource_limit_of("nexus-node-1").await.unwrap(),
            MemoryLimit::Unlimited
        );
    }
}
