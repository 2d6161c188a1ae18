use std::{sync::Arc, time::SystemTime};

use rotor_model::{CycleReport, SlotPhase, SlotReport};
use rotor_observe::{log_cycle, log_report, message_for};
use rotor_store::{IdentityPool, RotationState, RunLock, StateStore, StoreError};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::FleetConfig,
    error::{CycleError, SlotError},
    journal::Journal,
    preflight::{HostProbe, preflight},
    runtime::ContainerRuntime,
    supervisor::WorkerSupervisor,
};

/// Strict round-robin successor of `current` in a list of `count` identities.
///
/// A stale `current` (list shrank since it was stored) is first reduced modulo `count`.
#[inline]
pub fn next_index(current: usize, count: usize) -> usize {
    if count == 0 {
        return 0;
    }
    (current % count + 1) % count
}

/// Runs rotation cycles over every slot in the identity pool.
pub struct RotationEngine {
    cfg: Arc<FleetConfig>,
    supervisor: WorkerSupervisor,
    state: StateStore,
    journal: Journal,
    probe: Arc<dyn HostProbe>,
}

impl RotationEngine {
    /// Opens (and creates when absent) the operational logs.
    pub fn new(
        cfg: Arc<FleetConfig>,
        runtime: Arc<dyn ContainerRuntime>,
        probe: Arc<dyn HostProbe>,
    ) -> std::io::Result<Self> {
        let journal = Journal::open(&cfg.rotation_log, &cfg.failure_log)?;
        Ok(Self {
            supervisor: WorkerSupervisor::new(runtime, Arc::clone(&cfg)),
            state: StateStore::new(&cfg.state_path),
            journal,
            probe,
            cfg,
        })
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// One full pass: lock, preflight, then every slot in natural order.
    ///
    /// `Err` means the cycle was refused before any slot was touched (one failure-log entry).
    /// Slot-level failures are reported inside the returned [`CycleReport`].
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = SystemTime::now();

        let _guard = match RunLock::new(&self.cfg.lock_path).try_acquire() {
            Ok(guard) => guard,
            Err(StoreError::Locked { path }) => {
                return Err(self.abort(&run_id, CycleError::AlreadyRunning(path)));
            }
            Err(e) => return Err(self.abort(&run_id, CycleError::Config(e))),
        };

        self.journal.info(format!("cycle {run_id} started"));
        info!(target: "rotor.engine", %run_id, "rotation cycle started");

        let pool = match preflight(&self.cfg, self.supervisor.runtime().as_ref(), self.probe.as_ref()).await {
            Ok(pool) => pool,
            Err(e) => return Err(self.abort(&run_id, e)),
        };

        if !self.state.path().exists() {
            self.journal
                .warn("rotation state missing; reinitialised as empty");
        }
        let state = match self.state.load() {
            Ok(state) => state,
            Err(e) => return Err(self.abort(&run_id, CycleError::Config(e))),
        };

        let mut slots = Vec::with_capacity(pool.len());
        for slot in pool.slots() {
            let report = self.rotate_slot(slot, &pool, &state).await;
            self.record(&report);
            slots.push(report);
        }

        let report = CycleReport {
            run_id,
            started_at,
            finished_at: SystemTime::now(),
            slots,
        };
        self.journal.info(format!(
            "cycle {} finished: {} slots, {} rotated, {} skipped, {} failed",
            report.run_id,
            report.slots.len(),
            report.committed(),
            report.skipped(),
            report.failed()
        ));
        log_cycle(&report);
        Ok(report)
    }

    /// Drive one slot through the state machine. Never fails the cycle.
    async fn rotate_slot(&self, slot: &str, pool: &IdentityPool, state: &RotationState) -> SlotReport {
        let mut report = SlotReport::new(slot);

        let identities = pool.real_identities(slot);
        if identities.len() < 2 {
            return report.fail(
                SlotPhase::SkippedIneligible,
                format!("{} real identities in pool", identities.len()),
            );
        }

        let stored = state.index_or_default(slot);
        let next = next_index(stored, identities.len());
        let identity = identities[next].clone();
        report.from_index = Some(stored);
        report.to_index = Some(next);
        report.identity = Some(identity.clone());
        step(&mut report, SlotPhase::IndexComputed);

        // The old unit is only torn down once its ceiling is known.
        let memory = match self.supervisor.resource_limit_of(slot).await {
            Ok(memory) => memory,
            Err(e) => {
                warn!(target: "rotor.engine", slot, error = %e, "cannot read current ceiling; slot left untouched");
                return fail(
                    report,
                    SlotError::Destroy {
                        slot: slot.to_string(),
                        reason: format!("current memory ceiling unreadable, unit left in place: {e}"),
                    },
                );
            }
        };

        if let Err(e) = self.supervisor.destroy(slot).await {
            return fail(report, e);
        }
        step(&mut report, SlotPhase::OldDestroyed);

        if let Err(e) = self.supervisor.create(slot, &identity, memory).await {
            self.supervisor.cleanup(slot).await;
            return fail(report, e);
        }
        step(&mut report, SlotPhase::NewCreated);

        if !self.supervisor.health_check(slot, self.cfg.health_grace).await {
            self.supervisor.cleanup(slot).await;
            return fail(
                report,
                SlotError::Health {
                    slot: slot.to_string(),
                    reason: format!("not running within {:?}", self.cfg.health_grace),
                },
            );
        }
        step(&mut report, SlotPhase::HealthVerified);

        if let Err(e) = self.state.commit(slot, next) {
            return fail(
                report,
                SlotError::Commit {
                    slot: slot.to_string(),
                    reason: e.to_string(),
                },
            );
        }
        report.advance(SlotPhase::Committed);
        report
    }

    /// Terminal outcome → tracing and operational journal.
    fn record(&self, report: &SlotReport) {
        log_report(report);

        let mut line = format!("{}: {}", report.slot, message_for(report.phase));
        if let (Some(from), Some(to)) = (report.from_index, report.to_index) {
            line.push_str(&format!(" (index {from} -> {to})"));
        }
        if let Some(err) = &report.error {
            line.push_str(&format!(": {err}"));
        }

        match report.phase {
            SlotPhase::Committed => self.journal.info(line),
            SlotPhase::SkippedIneligible | SlotPhase::CommitFailed => self.journal.warn(line),
            phase if phase.is_failure() => self.journal.failure(line),
            _ => self.journal.info(line),
        }
    }

    fn abort(&self, run_id: &str, err: CycleError) -> CycleError {
        self.journal.failure(format!("cycle {run_id} aborted: {err}"));
        warn!(target: "rotor.engine", %run_id, error = %err, "rotation cycle aborted");
        err
    }
}

fn step(report: &mut SlotReport, phase: SlotPhase) {
    report.advance(phase);
    log_report(report);
}

fn fail(report: SlotReport, err: SlotError) -> SlotReport {
    report.fail(err.phase(), err.to_string())
}
