use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use rotor_core::{
    ContainerRuntime, CronSchedule, FleetConfig, FleetOps, RotationEngine, SystemProbe,
};
use rotor_exec::DockerCli;
use rotor_model::{Identity, MemoryLimit};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    cli::{Command, GlobalArgs},
    menu, output,
};

/// Defaults, then `ROTOR_*` environment, then command-line flags.
pub fn load_config(global: &GlobalArgs, cmd: &Command) -> Result<FleetConfig> {
    let mut cfg = FleetConfig::from_env().context("reading ROTOR_* environment")?;
    if let Some(home) = &global.home {
        cfg.set_home(home);
    }
    if let Some(log_dir) = &global.log_dir {
        cfg.set_log_dir(log_dir);
    }
    if let Some(image) = &global.image {
        cfg.image = image.clone();
    }
    if let Command::Deploy {
        schedule_path: Some(path),
        ..
    } = cmd
    {
        cfg.schedule_path = path.clone();
    }
    cfg.validate()?;
    Ok(cfg)
}

pub struct App {
    cfg: Arc<FleetConfig>,
    runtime: Arc<dyn ContainerRuntime>,
    ops: FleetOps,
    json: bool,
}

impl App {
    pub fn new(cfg: FleetConfig, json: bool) -> Result<Self> {
        let cfg = Arc::new(cfg);
        let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerCli::from_config(&cfg));
        let ops = FleetOps::new(Arc::clone(&cfg), Arc::clone(&runtime))
            .with_context(|| format!("opening logs under {}", cfg.log_dir.display()))?;
        Ok(Self {
            cfg,
            runtime,
            ops,
            json,
        })
    }

    pub async fn dispatch(&self, cmd: Command) -> Result<()> {
        match cmd {
            Command::Build { context } => self.build(&context).await,
            Command::Start { count, memory } => self.start(count, memory.memory).await,
            Command::StopAll => self.stop_all().await,
            Command::Restart { slot, memory } => self.restart(&slot, memory.memory).await,
            Command::List => self.list().await,
            Command::ChangeId {
                slot,
                identity,
                memory,
            } => self.change_id(&slot, &identity, memory.memory).await,
            Command::Add { identity, memory } => self.add(&identity, memory.memory).await,
            Command::Logs {
                slot,
                lines,
                follow,
            } => self.logs(&slot, lines, follow).await,
            Command::Deploy {
                interval_hours,
                boot_delay_secs,
                ..
            } => self.deploy(interval_hours, boot_delay_secs).await,
            Command::Stats => self.stats().await,
            Command::Rotate => self.rotate().await,
            Command::Menu => menu::run(self).await,
        }
    }

    pub fn config(&self) -> &FleetConfig {
        &self.cfg
    }

    pub async fn build(&self, context: &Path) -> Result<()> {
        info!(image = %self.cfg.image, context = %context.display(), "building worker image");
        self.ops.build_image(context).await?;
        println!("built {}", self.cfg.image);
        Ok(())
    }

    pub async fn start(&self, count: u32, memory: Option<MemoryLimit>) -> Result<()> {
        let results = self.ops.start(count, memory).await?;
        output::started(&results);
        Ok(())
    }

    pub async fn stop_all(&self) -> Result<()> {
        let report = self.ops.stop_all().await?;
        println!("removed {} workers", report.removed.len());
        for (slot, reason) in &report.failed {
            println!("{slot:<18} still present: {reason}");
        }
        if !report.failed.is_empty() {
            bail!("{} workers could not be removed", report.failed.len());
        }
        Ok(())
    }

    pub async fn restart(&self, slot: &str, memory: Option<MemoryLimit>) -> Result<()> {
        self.ops.manual_restart(slot, memory).await?;
        println!("{slot} restarted");
        Ok(())
    }

    pub async fn list(&self) -> Result<()> {
        let units = self.ops.list().await?;
        output::units(&units, self.json)
    }

    pub async fn change_id(&self, slot: &str, identity: &str, memory: Option<MemoryLimit>) -> Result<()> {
        self.ops
            .manual_replace(slot, Identity::from(identity.trim()), memory)
            .await?;
        println!("{slot} now runs {}", identity.trim());
        Ok(())
    }

    pub async fn add(&self, identity: &str, memory: Option<MemoryLimit>) -> Result<()> {
        let slot = self
            .ops
            .manual_add(Identity::from(identity.trim()), memory)
            .await?;
        println!("{slot} started with {}", identity.trim());
        Ok(())
    }

    pub async fn logs(&self, slot: &str, lines: usize, follow: bool) -> Result<()> {
        let cancel = CancellationToken::new();
        if follow {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });
        }
        let mut stdout = tokio::io::stdout();
        self.ops
            .tail(slot, lines, follow, cancel, &mut stdout)
            .await?;
        Ok(())
    }

    pub async fn deploy(&self, interval_hours: u8, boot_delay_secs: u64) -> Result<()> {
        let program = std::env::current_exe().context("locating the rotor binary")?;
        let mut schedule = CronSchedule::new(
            program,
            &self.cfg.home,
            self.cfg.log_dir.join("cron.log"),
        );
        schedule.interval_hours = interval_hours;
        schedule.boot_delay = Duration::from_secs(boot_delay_secs);

        let report = self.ops.deploy(&schedule).await?;
        if let Some(n) = report.seeded_slots {
            println!("seeded {} with {n} slots", self.cfg.pool_path.display());
        }
        println!(
            "rotation every {interval_hours}h and {boot_delay_secs}s after boot; schedule at {}",
            report.schedule_path.display()
        );
        Ok(())
    }

    pub async fn stats(&self) -> Result<()> {
        let rows = self.ops.stats().await?;
        output::stats(&rows, self.json)
    }

    pub async fn rotate(&self) -> Result<()> {
        let engine = RotationEngine::new(
            Arc::clone(&self.cfg),
            Arc::clone(&self.runtime),
            Arc::new(SystemProbe),
        )
        .context("opening rotation logs")?;

        let report = engine.run_cycle().await?;
        output::cycle(&report, self.json)?;
        if report.failed() > 0 {
            warn!(failed = report.failed(), "some slots failed to rotate");
        }
        Ok(())
    }

    /// Refuse identities the engine would never assign.
    pub fn check_identity(identity: &str) -> Result<()> {
        if !Identity::from(identity.trim()).is_real() {
            bail!("identity must be a non-empty value other than the placeholder");
        }
        Ok(())
    }
}
