//! Ad-hoc fleet operations behind the CLI.
//!
//! Everything here goes through the [`WorkerSupervisor`] directly. None of it reads the
//! run lock or writes the rotation state: manual changes are invisible to the rotation
//! index until the next scheduled cycle.
use std::{
    io::SeekFrom,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use rotor_model::{Identity, MemoryLimit, MemoryUsage, Slot, UnitInfo, natural_cmp};
use rotor_store::{IdentityPool, PoolStore, StateStore, atomic_write};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::FleetConfig,
    error::OpsError,
    journal::Journal,
    runtime::ContainerRuntime,
    schedule::CronSchedule,
    supervisor::WorkerSupervisor,
};

/// Bytes read from the end of a log file when looking for the last lines.
const TAIL_WINDOW: u64 = 1024 * 1024;
const FOLLOW_POLL: Duration = Duration::from_millis(500);

/// Outcome of `start` for one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartResult {
    Started { slot: Slot, identity: Identity },
    Skipped { slot: Slot, reason: String },
    Failed { slot: Slot, reason: String },
}

/// What `stop_all` did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    pub removed: Vec<Slot>,
    /// Slot and the reason it is still there.
    pub failed: Vec<(Slot, String)>,
}

/// What `deploy` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReport {
    /// Slots written to a freshly seeded pool file; `None` when a pool already existed.
    pub seeded_slots: Option<usize>,
    pub schedule_path: PathBuf,
}

pub struct FleetOps {
    cfg: Arc<FleetConfig>,
    supervisor: WorkerSupervisor,
    journal: Journal,
}

impl FleetOps {
    pub fn new(cfg: Arc<FleetConfig>, runtime: Arc<dyn ContainerRuntime>) -> std::io::Result<Self> {
        let journal = Journal::open(&cfg.rotation_log, &cfg.failure_log)?;
        Ok(Self {
            supervisor: WorkerSupervisor::new(runtime, Arc::clone(&cfg)),
            journal,
            cfg,
        })
    }

    fn runtime(&self) -> &dyn ContainerRuntime {
        self.supervisor.runtime().as_ref()
    }

    /// Unit names matching the slot naming convention, in natural order.
    async fn managed_units(&self) -> Result<Vec<Slot>, OpsError> {
        let naming = self.cfg.naming();
        let mut names: Vec<Slot> = self
            .runtime()
            .list(naming.prefix())
            .await?
            .into_iter()
            .filter(|n| naming.matches(n))
            .collect();
        names.sort_by(|a, b| natural_cmp(a, b));
        Ok(names)
    }

    /// Every managed unit with its live identity and memory usage.
    pub async fn list(&self) -> Result<Vec<UnitInfo>, OpsError> {
        let names = self.managed_units().await?;
        let mut units = Vec::with_capacity(names.len());
        for name in &names {
            // Removed between list and inspect.
            let Some(unit) = self.runtime().inspect(name).await? else {
                continue;
            };
            units.push(UnitInfo {
                slot: name.clone(),
                status: unit.status,
                identity: unit.identity(),
                memory_limit: unit.memory,
                usage: None,
            });
        }

        let running: Vec<String> = units
            .iter()
            .filter(|u| u.status.is_running())
            .map(|u| u.slot.clone())
            .collect();
        if !running.is_empty() {
            match self.runtime().stats(&running).await {
                Ok(mut usage) => {
                    for unit in &mut units {
                        unit.usage = usage.remove(&unit.slot);
                    }
                }
                Err(e) => warn!(target: "rotor.ops", error = %e, "memory usage unavailable"),
            }
        }
        Ok(units)
    }

    /// Live memory usage of every running managed unit.
    pub async fn stats(&self) -> Result<Vec<(Slot, MemoryUsage)>, OpsError> {
        let names = self.managed_units().await?;
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let mut usage: Vec<(Slot, MemoryUsage)> =
            self.runtime().stats(&names).await?.into_iter().collect();
        usage.sort_by(|a, b| natural_cmp(&a.0, &b.0));
        Ok(usage)
    }

    /// Write the last `lines` lines of the slot's log to `out`, then keep streaming
    /// appended lines until `cancel` fires when `follow` is set.
    pub async fn tail<W>(
        &self,
        slot: &str,
        lines: usize,
        follow: bool,
        cancel: CancellationToken,
        out: &mut W,
    ) -> Result<(), OpsError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.check_slot(slot)?;
        let path = self.cfg.log_path_for(slot);
        let mut file = match tokio::fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OpsError::NotFound(slot.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata().await?.len();
        let start = len.saturating_sub(TAIL_WINDOW);
        file.seek(SeekFrom::Start(start)).await?;
        let mut buf = Vec::with_capacity((len - start) as usize);
        file.read_to_end(&mut buf).await?;
        out.write_all(last_lines(&buf, lines, start > 0)).await?;
        out.flush().await?;

        if !follow {
            return Ok(());
        }

        let mut pos = start + buf.len() as u64;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(FOLLOW_POLL) => {}
            }

            let len = match tokio::fs::metadata(&path).await {
                Ok(m) => m.len(),
                // Rotated away; wait for the worker to recreate it.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if len < pos {
                debug!(target: "rotor.ops", slot, "log truncated; following from start");
                pos = 0;
            }
            if len == pos {
                continue;
            }

            let mut file = tokio::fs::File::open(&path).await?;
            file.seek(SeekFrom::Start(pos)).await?;
            let mut chunk = Vec::with_capacity((len - pos) as usize);
            file.read_to_end(&mut chunk).await?;
            pos += chunk.len() as u64;
            out.write_all(&chunk).await?;
            out.flush().await?;
        }
    }

    /// Rebind `slot` to `identity` ("change id").
    pub async fn manual_replace(
        &self,
        slot: &str,
        identity: Identity,
        memory: Option<MemoryLimit>,
    ) -> Result<(), OpsError> {
        self.check_slot(slot)?;
        check_identity(&identity)?;

        let memory = match memory {
            Some(m) => m,
            None => self.supervisor.resource_limit_of(slot).await?,
        };
        self.replace_logged("change-id", slot, &identity, memory).await
    }

    /// Create a worker on the next free slot. Returns the slot name.
    pub async fn manual_add(
        &self,
        identity: Identity,
        memory: Option<MemoryLimit>,
    ) -> Result<Slot, OpsError> {
        check_identity(&identity)?;

        let taken = self.managed_units().await?;
        let slot = self.cfg.naming().next_free(taken.iter().map(String::as_str));
        let memory = memory.unwrap_or(self.cfg.fallback_memory);
        self.replace_logged("add", &slot, &identity, memory).await?;
        Ok(slot)
    }

    /// Recreate `slot` with the identity it is running now.
    pub async fn manual_restart(&self, slot: &str, memory: Option<MemoryLimit>) -> Result<(), OpsError> {
        self.check_slot(slot)?;
        let unit = self
            .runtime()
            .inspect(slot)
            .await?
            .ok_or_else(|| OpsError::NotFound(slot.to_string()))?;
        let identity = unit.identity().ok_or_else(|| {
            OpsError::InvalidInput(format!("unit {slot} carries no identity binding"))
        })?;
        let memory = memory.unwrap_or(unit.memory);
        self.replace_logged("restart", slot, &identity, memory).await
    }

    /// Create slots `1..=count`, each bound to the identity at its stored rotation index.
    pub async fn start(&self, count: u32, memory: Option<MemoryLimit>) -> Result<Vec<StartResult>, OpsError> {
        if count == 0 {
            return Err(OpsError::InvalidInput("count must be at least 1".into()));
        }
        let pool = PoolStore::new(&self.cfg.pool_path).load()?;
        let state = StateStore::new(&self.cfg.state_path).load()?;
        let memory = memory.unwrap_or(self.cfg.fallback_memory);
        let naming = self.cfg.naming();

        let mut results = Vec::with_capacity(count as usize);
        for n in 1..=count {
            let slot = naming.name(n);
            let identities = pool.real_identities(&slot);
            if identities.is_empty() {
                warn!(target: "rotor.ops", slot = %slot, "no real identity in pool; not started");
                results.push(StartResult::Skipped {
                    slot,
                    reason: "no real identity in pool".into(),
                });
                continue;
            }
            let identity = identities[state.index_or_default(&slot) % identities.len()].clone();

            match self.replace_logged("start", &slot, &identity, memory).await {
                Ok(()) => results.push(StartResult::Started { slot, identity }),
                Err(e) => results.push(StartResult::Failed {
                    slot,
                    reason: e.to_string(),
                }),
            }
        }
        Ok(results)
    }

    /// Destroy every managed unit. A unit that cannot be removed does not stop the rest.
    pub async fn stop_all(&self) -> Result<StopReport, OpsError> {
        let mut report = StopReport::default();
        for name in self.managed_units().await? {
            match self.supervisor.destroy(&name).await {
                Ok(()) => report.removed.push(name),
                Err(e) => {
                    self.journal.failure(format!("stop-all {name}: {e}"));
                    report.failed.push((name, e.to_string()));
                }
            }
        }
        self.journal.info(format!(
            "stop-all removed {} units, {} failed",
            report.removed.len(),
            report.failed.len()
        ));
        info!(
            target: "rotor.ops",
            removed = report.removed.len(),
            failed = report.failed.len(),
            "units stopped"
        );
        Ok(report)
    }

    /// Build the worker image from `context`.
    pub async fn build_image(&self, context: &Path) -> Result<(), OpsError> {
        if !context.is_dir() {
            return Err(OpsError::InvalidInput(format!(
                "build context {} is not a directory",
                context.display()
            )));
        }
        self.runtime().build_image(&self.cfg.image, context).await?;
        self.journal.info(format!("image {} built", self.cfg.image));
        Ok(())
    }

    /// Prepare the host for scheduled rotation.
    ///
    /// Ensures per-slot log files, seeds a pool file from the running fleet when none exists,
    /// initialises the state file and writes the schedule.
    pub async fn deploy(&self, schedule: &CronSchedule) -> Result<DeployReport, OpsError> {
        let rendered = schedule
            .render()
            .map_err(|e| OpsError::InvalidInput(e.to_string()))?;

        tokio::fs::create_dir_all(&self.cfg.home).await?;
        tokio::fs::create_dir_all(&self.cfg.log_dir).await?;

        let names = self.managed_units().await?;
        for name in &names {
            tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.cfg.log_path_for(name))
                .await?;
        }

        let pools = PoolStore::new(&self.cfg.pool_path);
        let seeded_slots = if pools.exists() {
            None
        } else {
            let mut pool = IdentityPool::new();
            for name in &names {
                match self.supervisor.current_identity(name).await? {
                    Some(identity) => pool.insert(name.clone(), vec![identity, Identity::placeholder()]),
                    None => warn!(target: "rotor.ops", slot = %name, "unit has no identity; not seeded"),
                }
            }
            pools.save(&pool)?;
            info!(target: "rotor.ops", slots = pool.len(), path = %pools.path().display(), "identity pool seeded");
            Some(pool.len())
        };

        StateStore::new(&self.cfg.state_path).ensure()?;
        atomic_write(&self.cfg.schedule_path, rendered.as_bytes())?;

        self.journal.info(format!(
            "deployed schedule {} (every {}h, {}s after boot)",
            self.cfg.schedule_path.display(),
            schedule.interval_hours,
            schedule.boot_delay.as_secs()
        ));
        Ok(DeployReport {
            seeded_slots,
            schedule_path: self.cfg.schedule_path.clone(),
        })
    }

    fn check_slot(&self, slot: &str) -> Result<(), OpsError> {
        if self.cfg.naming().matches(slot) {
            Ok(())
        } else {
            Err(OpsError::InvalidInput(format!(
                "{slot} is not a slot name ({}<n>)",
                self.cfg.slot_prefix
            )))
        }
    }

    async fn replace_logged(
        &self,
        op: &str,
        slot: &str,
        identity: &Identity,
        memory: MemoryLimit,
    ) -> Result<(), OpsError> {
        match self.supervisor.replace(slot, identity, memory).await {
            Ok(()) => {
                self.journal
                    .info(format!("{op} {slot}: running {identity} (memory {memory})"));
                info!(target: "rotor.ops", op, slot, %identity, %memory, "unit replaced");
                Ok(())
            }
            Err(e) => {
                self.journal.failure(format!("{op} {slot}: {e}"));
                Err(e.into())
            }
        }
    }
}

fn check_identity(identity: &Identity) -> Result<(), OpsError> {
    if identity.is_real() {
        Ok(())
    } else {
        Err(OpsError::InvalidInput(format!(
            "identity '{identity}' cannot be assigned to a worker"
        )))
    }
}

/// Last `n` lines of `buf`. A window that starts mid-file drops its first, partial line.
fn last_lines(buf: &[u8], n: usize, partial_head: bool) -> &[u8] {
    let mut buf = buf;
    if partial_head {
        match buf.iter().position(|&b| b == b'\n') {
            Some(i) => buf = &buf[i + 1..],
            None => return &[],
        }
    }
    if n == 0 {
        return &[];
    }

    let body = buf.strip_suffix(b"\n").unwrap_or(buf);
    let mut seen = 0;
    for (i, &b) in body.iter().enumerate().rev() {
        if b == b'\n' {
            seen += 1;
            if seen == n {
                return &buf[i + 1..];
            }
        }
    }
    buf
}
