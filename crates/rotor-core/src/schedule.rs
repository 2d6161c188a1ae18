//! Periodic and on-boot trigger, rendered as a cron.d file.
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::ConfigError;

const CRON_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// `rotor rotate` every `interval_hours`, plus once `boot_delay` after boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    pub interval_hours: u8,
    pub boot_delay: Duration,
    /// Absolute path of the `rotor` binary.
    pub program: PathBuf,
    /// Passed as `--home` so cron runs see the same pool and state.
    pub home: PathBuf,
    /// Where cron output (stderr tracing) is appended.
    pub output: PathBuf,
    pub user: String,
}

impl CronSchedule {
    pub fn new(program: impl Into<PathBuf>, home: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            interval_hours: 6,
            boot_delay: Duration::from_secs(120),
            program: program.into(),
            home: home.into(),
            output: output.into(),
            user: "root".to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=24).contains(&self.interval_hours) {
            return Err(ConfigError::invalid(
                "interval_hours",
                format!("{} is outside 1..=24", self.interval_hours),
            ));
        }
        if !self.program.is_absolute() {
            return Err(ConfigError::invalid(
                "program",
                format!("{} is not an absolute path", self.program.display()),
            ));
        }
        if self.user.trim().is_empty() || self.user.contains(char::is_whitespace) {
            return Err(ConfigError::invalid("user", "must be a single word"));
        }
        Ok(())
    }

    /// Hour field of the periodic entry.
    fn hours_field(&self) -> String {
        match self.interval_hours {
            24 => "0".to_string(),
            1 => "*".to_string(),
            n => format!("*/{n}"),
        }
    }

    fn command(&self) -> String {
        format!(
            "{} --home {} rotate >> {} 2>&1",
            cron_quote(&self.program),
            cron_quote(&self.home),
            cron_quote(&self.output)
        )
    }

    pub fn render(&self) -> Result<String, ConfigError> {
        self.validate()?;
        let command = self.command();
        Ok(format!(
            "# rotor identity rotation; rewritten by `rotor deploy`\n\
             SHELL=/bin/sh\n\
             PATH={CRON_PATH}\n\
             0 {hours} * * * {user} {command}\n\
             @reboot {user} sleep {delay} && {command}\n",
            hours = self.hours_field(),
            user = self.user,
            delay = self.boot_delay.as_secs(),
        ))
    }
}

/// Single-quote for `sh`, then escape `%`, which cron turns into newlines.
fn cron_quote(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let quoted = format!("'{}'", raw.replace('\'', r"'\''"));
    quoted.replace('%', r"\%")
}
