use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use rotor_model::{MemoryLimit, MemoryUsage, UnitSpec, UnitStatus};

use super::{ContainerRuntime, RuntimeError, UnitInspect};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Ping,
    Remove(String),
    Create(String),
    Inspect(String),
    List,
    Stats,
    Build(String),
}

#[derive(Default)]
struct Inner {
    units: HashMap<String, UnitInspect>,
    calls: Vec<Call>,
    unreachable: bool,
    fail_remove: HashSet<String>,
    fail_create: HashSet<String>,
    /// Slots whose created units exit straight away.
    crash_on_start: HashSet<String>,
    /// Slots whose created units keep running but are restarted between polls.
    crash_loop: HashSet<String>,
    /// Slots whose `run` is accepted but the start fails, leaving a `created` unit behind.
    fail_start: HashSet<String>,
    /// Remaining inspect failures per slot.
    fail_inspect: HashMap<String, u32>,
    on_create: Option<CreateHook>,
}

type CreateHook = Arc<dyn Fn(&UnitSpec) + Send + Sync>;

/// In-memory runtime that records every call.
#[derive(Default)]
pub(crate) struct FakeRuntime {
    inner: Mutex<Inner>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a running unit built from `spec`.
    pub fn seed(&self, spec: &UnitSpec) {
        self.insert(spec, UnitStatus::Running);
    }

    pub fn set_unreachable(&self) {
        self.inner.lock().unwrap().unreachable = true;
    }

    pub fn fail_remove(&self, slot: &str) {
        self.inner.lock().unwrap().fail_remove.insert(slot.to_string());
    }

    pub fn fail_create(&self, slot: &str) {
        self.inner.lock().unwrap().fail_create.insert(slot.to_string());
    }

    pub fn crash_on_start(&self, slot: &str) {
        self.inner
            .lock()
            .unwrap()
            .crash_on_start
            .insert(slot.to_string());
    }

    pub fn crash_loop(&self, slot: &str) {
        self.inner.lock().unwrap().crash_loop.insert(slot.to_string());
    }

    pub fn fail_start(&self, slot: &str) {
        self.inner.lock().unwrap().fail_start.insert(slot.to_string());
    }

    /// The next `times` inspects of `slot` time out.
    pub fn fail_inspect(&self, slot: &str, times: u32) {
        self.inner
            .lock()
            .unwrap()
            .fail_inspect
            .insert(slot.to_string(), times);
    }

    /// Run `hook` after every accepted create.
    pub fn on_create(&self, hook: impl Fn(&UnitSpec) + Send + Sync + 'static) {
        self.inner.lock().unwrap().on_create = Some(Arc::new(hook));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn removes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Remove(_)))
            .count()
    }

    pub fn creates(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Create(_)))
            .count()
    }

    pub fn unit(&self, name: &str) -> Option<UnitInspect> {
        self.inner.lock().unwrap().units.get(name).cloned()
    }

    fn insert(&self, spec: &UnitSpec, status: UnitStatus) {
        let unit = UnitInspect {
            name: spec.slot.clone(),
            status,
            restart_count: 0,
            env: spec.env(),
            memory: spec.memory,
            image: spec.image.clone(),
        };
        self.inner
            .lock()
            .unwrap()
            .units
            .insert(spec.slot.clone(), unit);
    }

    fn record(&self, call: Call) -> Result<(), RuntimeError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(call);
        if inner.unreachable {
            return Err(RuntimeError::Unreachable("fake runtime is down".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn ping(&self) -> Result<(), RuntimeError> {
        self.record(Call::Ping)
    }

    async fn remove(&self, name: &str) -> Result<bool, RuntimeError> {
        self.record(Call::Remove(name.to_string()))?;
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_remove.contains(name) {
            return Err(RuntimeError::Rejected {
                op: "remove",
                diagnostic: "device or resource busy".into(),
            });
        }
        Ok(inner.units.remove(name).is_some())
    }

    async fn create(&self, spec: &UnitSpec) -> Result<String, RuntimeError> {
        self.record(Call::Create(spec.slot.clone()))?;
        let (fail, crash, fail_start, taken, hook) = {
            let inner = self.inner.lock().unwrap();
            (
                inner.fail_create.contains(&spec.slot),
                inner.crash_on_start.contains(&spec.slot),
                inner.fail_start.contains(&spec.slot),
                inner.units.contains_key(&spec.slot),
                inner.on_create.clone(),
            )
        };
        if fail {
            return Err(RuntimeError::Rejected {
                op: "create",
                diagnostic: "no such image".into(),
            });
        }
        if taken {
            return Err(RuntimeError::Rejected {
                op: "create",
                diagnostic: format!("name {} already in use", spec.slot),
            });
        }
        if fail_start {
            self.insert(spec, UnitStatus::Created);
            return Err(RuntimeError::Rejected {
                op: "create",
                diagnostic: "failed to create task: oci runtime error".into(),
            });
        }
        let status = if crash {
            UnitStatus::Exited
        } else {
            UnitStatus::Running
        };
        self.insert(spec, status);
        if let Some(hook) = hook {
            hook(spec);
        }
        Ok(format!("fake-{}", spec.slot))
    }

    async fn inspect(&self, name: &str) -> Result<Option<UnitInspect>, RuntimeError> {
        self.record(Call::Inspect(name.to_string()))?;
        let mut inner = self.inner.lock().unwrap();
        if let Some(left) = inner.fail_inspect.get_mut(name)
            && *left > 0
        {
            *left -= 1;
            return Err(RuntimeError::Timeout {
                op: "inspect",
                after: Duration::from_secs(60),
            });
        }
        let looping = inner.crash_loop.contains(name);
        let Some(unit) = inner.units.get_mut(name) else {
            return Ok(None);
        };
        if looping {
            unit.restart_count += 1;
        }
        Ok(Some(unit.clone()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, RuntimeError> {
        self.record(Call::List)?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .units
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn stats(&self, names: &[String]) -> Result<HashMap<String, MemoryUsage>, RuntimeError> {
        self.record(Call::Stats)?;
        let inner = self.inner.lock().unwrap();
        Ok(names
            .iter()
            .filter_map(|n| inner.units.get(n))
            .filter(|u| u.status.is_running())
            .map(|u| {
                let usage = MemoryUsage {
                    used_bytes: 64 * 1024 * 1024,
                    limit_bytes: match u.memory {
                        MemoryLimit::Unlimited => None,
                        MemoryLimit::Bytes(b) => Some(b),
                    },
                };
                (u.name.clone(), usage)
            })
            .collect())
    }

    async fn build_image(&self, tag: &str, _context: &Path) -> Result<(), RuntimeError> {
        self.record(Call::Build(tag.to_string()))
    }
}
