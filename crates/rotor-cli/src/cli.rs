use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rotor_model::MemoryLimit;
use rotor_observe::LoggerFormat;

#[derive(Parser, Debug)]
#[command(name = "rotor", version, about = "Identity-rotating worker fleet manager")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Directory holding the pool, state and lock files [env: ROTOR_HOME]
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Directory holding worker and rotation logs [env: ROTOR_LOG_DIR]
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Worker image [env: ROTOR_IMAGE]
    #[arg(long, global = true)]
    pub image: Option<String>,

    /// Tracing filter directive, e.g. `info` or `rotor=debug`
    #[arg(long, global = true, env = "ROTOR_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Diagnostic output format: text, json or journald
    #[arg(long, global = true, env = "ROTOR_LOG_FORMAT", default_value = "text")]
    pub log_format: LoggerFormat,

    /// Print inventory and cycle results as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the worker image
    Build {
        /// Build context directory
        #[arg(default_value = ".")]
        context: PathBuf,
    },

    /// Start workers for slots 1..=COUNT from the identity pool
    Start {
        count: u32,
        #[command(flatten)]
        memory: MemoryArg,
    },

    /// Remove every managed worker
    StopAll,

    /// Recreate a worker with the identity it is running
    Restart {
        slot: String,
        #[command(flatten)]
        memory: MemoryArg,
    },

    /// List managed workers with live identity and memory
    List,

    /// Bind a worker to a different identity
    ChangeId {
        slot: String,
        identity: String,
        #[command(flatten)]
        memory: MemoryArg,
    },

    /// Start a worker on the next free slot
    Add {
        identity: String,
        #[command(flatten)]
        memory: MemoryArg,
    },

    /// Show a worker's log
    Logs {
        slot: String,
        /// Number of trailing lines
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,
        /// Keep streaming appended lines until Ctrl+C
        #[arg(short, long)]
        follow: bool,
    },

    /// Seed pool and state files and install the rotation schedule
    Deploy {
        /// Hours between scheduled rotations (1-24)
        #[arg(long, default_value_t = 6)]
        interval_hours: u8,
        /// Seconds to wait after boot before the on-boot rotation
        #[arg(long, default_value_t = 120)]
        boot_delay_secs: u64,
        /// Schedule file to write [env: ROTOR_SCHEDULE_PATH]
        #[arg(long)]
        schedule_path: Option<PathBuf>,
    },

    /// Live memory usage of every running worker
    Stats,

    /// Run one rotation cycle
    Rotate,

    /// Interactive numbered menu
    Menu,
}

#[derive(Args, Debug, Clone)]
pub struct MemoryArg {
    /// Memory ceiling, e.g. `2g`, `1536m` or `unlimited` (default: keep current)
    #[arg(long)]
    pub memory: Option<MemoryLimit>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_change_id_with_memory() {
        let cli = Cli::try_parse_from([
            "rotor", "change-id", "nexus-node-2", "abc", "--memory", "2g",
        ])
        .unwrap();
        match cli.cmd {
            Command::ChangeId {
                slot,
                identity,
                memory,
            } => {
                assert_eq!(slot, "nexus-node-2");
                assert_eq!(identity, "abc");
                assert_eq!(memory.memory, Some(MemoryLimit::from_mib(2048)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["rotor", "list", "--json", "--home", "/srv/rotor"]).unwrap();
        assert!(cli.global.json);
        assert_eq!(cli.global.home, Some(PathBuf::from("/srv/rotor")));
    }

    #[test]
    fn bad_memory_is_rejected() {
        assert!(Cli::try_parse_from(["rotor", "add", "abc", "--memory", "lots"]).is_err());
    }
}
