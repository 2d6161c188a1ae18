//! [`ContainerRuntime`] backed by the `docker` CLI.
//!
//! Every invocation is an argument vector handed straight to the program; nothing is
//! ever interpolated into a shell string.
use std::{collections::HashMap, path::Path, time::Duration};

use async_trait::async_trait;
use rotor_core::{ContainerRuntime, FleetConfig, RuntimeError, UnitInspect};
use rotor_model::{KeyValue, LABEL_SLOT, MemoryLimit, MemoryUsage, UnitSpec, UnitStatus};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{error::ExecError, util::run_capture};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
    /// Upper bound for every call except image builds.
    timeout: Duration,
}

impl DockerCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_config(cfg: &FleetConfig) -> Self {
        Self::new(cfg.runtime_program.as_str())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, op: &'static str, args: Vec<String>) -> Result<String, ExecError> {
        debug!(target: "rotor.exec", op, program = %self.program, "runtime call");
        run_capture(&self.program, &args, Some(self.timeout)).await
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn ping(&self) -> Result<(), RuntimeError> {
        let out = self
            .run("ping", ping_args())
            .await
            .map_err(|e| e.into_runtime("ping"))?;
        debug!(target: "rotor.exec", server = out.trim(), "runtime answered");
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<bool, RuntimeError> {
        match self.run("remove", rm_args(name)).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_no_such() => Ok(false),
            Err(e) => Err(e.into_runtime("remove")),
        }
    }

    async fn create(&self, spec: &UnitSpec) -> Result<String, RuntimeError> {
        let out = self
            .run("create", run_args(spec))
            .await
            .map_err(|e| e.into_runtime("create"))?;
        Ok(out.trim().to_string())
    }

    async fn inspect(&self, name: &str) -> Result<Option<UnitInspect>, RuntimeError> {
        match self.run("inspect", inspect_args(name)).await {
            Ok(out) => parse_inspect(&out),
            Err(e) if e.is_no_such() => Ok(None),
            Err(e) => Err(e.into_runtime("inspect")),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, RuntimeError> {
        let out = self
            .run("list", ps_args(prefix))
            .await
            .map_err(|e| e.into_runtime("list"))?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|n| n.starts_with(prefix))
            .map(str::to_string)
            .collect())
    }

    async fn stats(&self, names: &[String]) -> Result<HashMap<String, MemoryUsage>, RuntimeError> {
        if names.is_empty() {
            return Ok(HashMap::new());
        }
        let out = self
            .run("stats", stats_args(names))
            .await
            .map_err(|e| e.into_runtime("stats"))?;
        Ok(parse_stats(&out))
    }

    async fn build_image(&self, tag: &str, context: &Path) -> Result<(), RuntimeError> {
        debug!(target: "rotor.exec", tag, context = %context.display(), "building image");
        run_capture(&self.program, &build_args(tag, context), None)
            .await
            .map(|_| ())
            .map_err(|e| e.into_runtime("build"))
    }
}

fn strings<const N: usize>(args: [&str; N]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

fn ping_args() -> Vec<String> {
    strings(["version", "--format", "{{.Server.Version}}"])
}

fn rm_args(name: &str) -> Vec<String> {
    strings(["rm", "-f", name])
}

fn inspect_args(name: &str) -> Vec<String> {
    strings(["inspect", "--type", "container", name])
}

fn ps_args(prefix: &str) -> Vec<String> {
    let filter = format!("name=^{prefix}");
    strings(["ps", "-a", "--filter", filter.as_str(), "--format", "{{.Names}}"])
}

fn stats_args(names: &[String]) -> Vec<String> {
    let mut args = strings(["stats", "--no-stream", "--format", "{{.Name}}\t{{.MemUsage}}"]);
    args.extend(names.iter().cloned());
    args
}

fn build_args(tag: &str, context: &Path) -> Vec<String> {
    vec![
        "build".into(),
        "-t".into(),
        tag.into(),
        context.to_string_lossy().into_owned(),
    ]
}

/// `docker run` for one unit. Memory and swap ceilings are equal, so the unit gets no extra swap.
fn run_args(spec: &UnitSpec) -> Vec<String> {
    let mut args = strings(["run", "-d", "--name", spec.slot.as_str(), "--restart", "unless-stopped"]);
    args.push("--label".into());
    args.push(format!("{LABEL_SLOT}={}", spec.slot));
    for kv in spec.env() {
        args.push("-e".into());
        args.push(kv.to_binding());
    }
    args.push("-v".into());
    args.push(spec.log_mount());
    if let Some(flag) = spec.memory.to_flag() {
        args.extend(["--memory".into(), flag.clone(), "--memory-swap".into(), flag]);
    }
    args.push(spec.image.clone());
    args
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectDoc {
    name: String,
    #[serde(default)]
    restart_count: u32,
    state: StateDoc,
    config: ConfigDoc,
    host_config: HostConfigDoc,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StateDoc {
    status: String,
    #[serde(default)]
    restarting: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConfigDoc {
    #[serde(default)]
    env: Option<Vec<String>>,
    #[serde(default)]
    image: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HostConfigDoc {
    #[serde(default)]
    memory: i64,
}

fn parse_inspect(raw: &str) -> Result<Option<UnitInspect>, RuntimeError> {
    let docs: Vec<InspectDoc> = serde_json::from_str(raw).map_err(|e| RuntimeError::Parse {
        op: "inspect",
        reason: e.to_string(),
    })?;
    let Some(doc) = docs.into_iter().next() else {
        return Ok(None);
    };

    // Between restarts under a restart policy the daemon may still say "running".
    let status = if doc.state.restarting {
        UnitStatus::Restarting
    } else {
        doc.state.status.parse().unwrap_or(UnitStatus::Unknown)
    };
    Ok(Some(UnitInspect {
        name: doc.name.trim_start_matches('/').to_string(),
        status,
        restart_count: doc.restart_count,
        env: doc
            .config
            .env
            .unwrap_or_default()
            .iter()
            .filter_map(|raw| KeyValue::parse_binding(raw))
            .collect(),
        memory: MemoryLimit::from_runtime_bytes(doc.host_config.memory),
        image: doc.config.image,
    }))
}

/// Lines of `<name>\t<used> / <limit>`. Unparsable lines are skipped.
fn parse_stats(raw: &str) -> HashMap<String, MemoryUsage> {
    raw.lines()
        .filter_map(|line| {
            let (name, usage) = line.split_once('\t')?;
            match MemoryUsage::parse_stats(usage) {
                Ok(usage) => Some((name.trim().to_string(), usage)),
                Err(e) => {
                    warn!(target: "rotor.exec", line, error = %e, "unparsable stats line");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotor_model::Identity;
    use std::path::PathBuf;

    fn spec(identity: &str, memory: MemoryLimit) -> UnitSpec {
        UnitSpec {
            slot: "nexus-node-3".into(),
            image: "nexus-node:latest".into(),
            identity: Identity::from(identity),
            memory,
            log_path: PathBuf::from("/var/lib/rotor/logs/nexus-node-3.log"),
            label: "nexus-node-3".into(),
        }
    }

    #[test]
    fn run_args_bind_everything_as_separate_arguments() {
        let args = run_args(&spec("abc'; rm -rf / #", MemoryLimit::from_mib(2048)));
        assert_eq!(
            args,
            [
                "run",
                "-d",
                "--name",
                "nexus-node-3",
                "--restart",
                "unless-stopped",
                "--label",
                "rotor.slot=nexus-node-3",
                "-e",
                "NODE_ID=abc'; rm -rf / #",
                "-e",
                "LOG_FILE=/app/logs/node.log",
                "-e",
                "NODE_LABEL=nexus-node-3",
                "-v",
                "/var/lib/rotor/logs/nexus-node-3.log:/app/logs/node.log",
                "--memory",
                "2g",
                "--memory-swap",
                "2g",
                "nexus-node:latest",
            ]
        );
    }

    #[test]
    fn unlimited_unit_has_no_memory_flags() {
        let args = run_args(&spec("abc", MemoryLimit::Unlimited));
        assert!(!args.iter().any(|a| a.starts_with("--memory")));
        assert_eq!(args.last().map(String::as_str), Some("nexus-node:latest"));
    }

    #[test]
    fn ps_filters_by_anchored_prefix() {
        assert_eq!(
            ps_args("nexus-node-"),
            ["ps", "-a", "--filter", "name=^nexus-node-", "--format", "{{.Names}}"]
        );
    }

    #[test]
    fn inspect_document_is_parsed() {
        let raw = r#"[{
            "Id": "4f1c",
            "Name": "/nexus-node-3",
            "State": {"Status": "running", "Running": true},
            "Config": {"Image": "nexus-node:latest", "Env": ["PATH=/usr/bin", "NODE_ID=abc=1", "LOG_FILE=/app/logs/node.log"]},
            "HostConfig": {"Memory": 2147483648, "MemorySwap": 2147483648}
        }]"#;
        let unit = parse_inspect(raw).unwrap().unwrap();
        assert_eq!(unit.name, "nexus-node-3");
        assert_eq!(unit.status, UnitStatus::Running);
        assert_eq!(unit.identity(), Some(Identity::from("abc=1")));
        assert_eq!(unit.memory, MemoryLimit::from_mib(2048));
        assert_eq!(unit.restart_count, 0);
    }

    #[test]
    fn crash_looping_unit_reports_restarts() {
        let raw = r#"[{
            "Name": "/nexus-node-3",
            "RestartCount": 4,
            "State": {"Status": "running", "Running": true, "Restarting": true},
            "Config": {"Image": "nexus-node:latest", "Env": []},
            "HostConfig": {"Memory": 0}
        }]"#;
        let unit = parse_inspect(raw).unwrap().unwrap();
        assert_eq!(unit.status, UnitStatus::Restarting);
        assert_eq!(unit.restart_count, 4);
    }

    #[test]
    fn zero_memory_is_unlimited_and_null_env_is_empty() {
        let raw = r#"[{"Name":"/n","State":{"Status":"exited"},"Config":{"Image":"i","Env":null},"HostConfig":{"Memory":0}}]"#;
        let unit = parse_inspect(raw).unwrap().unwrap();
        assert_eq!(unit.memory, MemoryLimit::Unlimited);
        assert!(unit.env.is_empty());
        assert!(unit.status.is_terminal());
    }

    #[test]
    fn garbage_inspect_is_parse_error() {
        assert!(matches!(
            parse_inspect("not json"),
            Err(RuntimeError::Parse { .. })
        ));
        assert_eq!(parse_inspect("[]").unwrap(), None);
    }

    #[test]
    fn stats_lines_are_parsed() {
        let raw = "nexus-node-1\t512MiB / 2GiB\nnexus-node-2\t1.5GiB / 0B\nbroken line\n";
        let stats = parse_stats(raw);
        assert_eq!(stats.len(), 2);
        let one = stats["nexus-node-1"];
        assert_eq!(one.used_bytes, 512 * 1024 * 1024);
        assert_eq!(one.limit_bytes, Some(2 * 1024 * 1024 * 1024));
        assert_eq!(stats["nexus-node-2"].limit_bytes, None);
    }

    #[test]
    fn build_args_pass_context_verbatim() {
        assert_eq!(
            build_args("nexus-node:latest", Path::new("/srv/build ctx")),
            ["build", "-t", "nexus-node:latest", "/srv/build ctx"]
        );
    }
}
