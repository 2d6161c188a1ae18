use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::{Identity, Slot};

/// Position of one slot in the rotation state machine.
///
/// Happy path: `Pending → IndexComputed → OldDestroyed → NewCreated → HealthVerified → Committed`.
/// Every other terminal variant is a slot-scoped exit; the cycle moves on to the next slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SlotPhase {
    Pending,
    IndexComputed,
    OldDestroyed,
    NewCreated,
    HealthVerified,
    /// New index persisted; rotation complete.
    Committed,
    /// Fewer than two real identities in the pool.
    SkippedIneligible,
    DestroyFailed,
    CreateFailed,
    /// Unit never reached `running`; cleaned up, index untouched.
    HealthFailed,
    /// Unit runs the new identity but the index could not be saved.
    CommitFailed,
}

impl SlotPhase {
    /// Returns `true` once the slot will not move further this cycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SlotPhase::Committed
                | SlotPhase::SkippedIneligible
                | SlotPhase::DestroyFailed
                | SlotPhase::CreateFailed
                | SlotPhase::HealthFailed
                | SlotPhase::CommitFailed
        )
    }

    /// Failures go to the failure log. Skips and commit warnings do not.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SlotPhase::DestroyFailed | SlotPhase::CreateFailed | SlotPhase::HealthFailed
        )
    }
}

/// Outcome of one slot in one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotReport {
    pub slot: Slot,
    pub phase: SlotPhase,
    /// Index assigned before the cycle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_index: Option<usize>,
    /// Index the cycle tried to move to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_index: Option<usize>,
    /// Identity the cycle tried to bind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SlotReport {
    pub fn new(slot: impl Into<Slot>) -> Self {
        Self {
            slot: slot.into(),
            phase: SlotPhase::Pending,
            from_index: None,
            to_index: None,
            identity: None,
            error: None,
        }
    }

    /// Move to `phase`.
    pub fn advance(&mut self, phase: SlotPhase) {
        self.phase = phase;
    }

    /// Terminate with `phase` and a reason.
    pub fn fail(mut self, phase: SlotPhase, error: impl Into<String>) -> Self {
        self.phase = phase;
        self.error = Some(error.into());
        self
    }
}

/// Result of a full rotation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub run_id: String,
    #[serde(with = "time_serde")]
    pub started_at: SystemTime,
    #[serde(with = "time_serde")]
    pub finished_at: SystemTime,
    pub slots: Vec<SlotReport>,
}

impl CycleReport {
    pub fn count(&self, phase: SlotPhase) -> usize {
        self.slots.iter().filter(|s| s.phase == phase).count()
    }

    pub fn committed(&self) -> usize {
        self.count(SlotPhase::Committed)
    }

    pub fn skipped(&self) -> usize {
        self.count(SlotPhase::SkippedIneligible)
    }

    pub fn failed(&self) -> usize {
        self.slots.iter().filter(|s| s.phase.is_failure()).count()
    }

    pub fn get(&self, slot: &str) -> Option<&SlotReport> {
        self.slots.iter().find(|s| s.slot == slot)
    }
}

mod time_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let since_epoch = time
            .duration_since(UNIX_EPOCH)
            .map_err(serde::ser::Error::custom)?;
        since_epoch.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + std::time::Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_phases() {
        assert!(SlotPhase::HealthFailed.is_failure());
        assert!(SlotPhase::DestroyFailed.is_failure());
        assert!(!SlotPhase::SkippedIneligible.is_failure());
        assert!(!SlotPhase::CommitFailed.is_failure());
        assert!(SlotPhase::CommitFailed.is_terminal());
        assert!(!SlotPhase::NewCreated.is_terminal());
    }

    #[test]
    fn cycle_counts() {
        let report = CycleReport {
            run_id: "run".into(),
            started_at: SystemTime::now(),
            finished_at: SystemTime::now(),
            slots: vec![
                {
                    let mut r = SlotReport::new("a");
                    r.advance(SlotPhase::Committed);
                    r
                },
                SlotReport::new("b").fail(SlotPhase::SkippedIneligible, "1 real identity"),
                SlotReport::new("c").fail(SlotPhase::CreateFailed, "image missing"),
            ],
        };
        assert_eq!(report.committed(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.get("c").unwrap().error.as_deref(), Some("image missing"));
    }

    #[test]
    fn slot_report_omits_empty_fields() {
        let json = serde_json::to_string(&SlotReport::new("a")).unwrap();
        assert_eq!(json, r#"{"slot":"a","phase":"pending"}"#);
    }
}
