use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Runtime-reported state of an execution unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnitStatus {
    /// Created but never started.
    Created,
    /// Process inside the unit is alive.
    Running,
    /// Runtime is restarting the unit after an exit.
    Restarting,
    /// Process exited; the unit still occupies its name.
    Exited,
    Paused,
    Dead,
    Removing,
    /// Anything the runtime reports that we do not model.
    Unknown,
}

impl UnitStatus {
    #[inline]
    pub fn is_running(&self) -> bool {
        matches!(self, UnitStatus::Running)
    }

    /// The unit will not become `running` without outside intervention.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UnitStatus::Exited | UnitStatus::Dead | UnitStatus::Removing
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::Created => "created",
            UnitStatus::Running => "running",
            UnitStatus::Restarting => "restarting",
            UnitStatus::Exited => "exited",
            UnitStatus::Paused => "paused",
            UnitStatus::Dead => "dead",
            UnitStatus::Removing => "removing",
            UnitStatus::Unknown => "unknown",
        }
    }
}

impl FromStr for UnitStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s.trim().to_ascii_lowercase().as_str() {
            "created" => UnitStatus::Created,
            "running" => UnitStatus::Running,
            "restarting" => UnitStatus::Restarting,
            "exited" => UnitStatus::Exited,
            "paused" => UnitStatus::Paused,
            "dead" => UnitStatus::Dead,
            "removing" => UnitStatus::Removing,
            _ => UnitStatus::Unknown,
        };
        Ok(status)
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
