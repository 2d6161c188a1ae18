use rotor_model::{CycleReport, SlotPhase, SlotReport};
use tracing::{debug, error, info, warn};

#[inline]
pub fn message_for(phase: SlotPhase) -> &'static str {
    match phase {
        // progress
        SlotPhase::Pending => "slot queued for rotation",
        SlotPhase::IndexComputed => "next identity selected",
        SlotPhase::OldDestroyed => "previous unit removed",
        SlotPhase::NewCreated => "replacement unit created",
        SlotPhase::HealthVerified => "replacement unit is running",

        // terminal
        SlotPhase::Committed => "identity rotated and index committed",
        SlotPhase::SkippedIneligible => "slot skipped (fewer than two real identities)",
        SlotPhase::DestroyFailed => "failed to remove previous unit; slot skipped",
        SlotPhase::CreateFailed => "failed to create replacement unit; slot skipped",
        SlotPhase::HealthFailed => "replacement unit never became healthy; cleaned up",
        SlotPhase::CommitFailed => "unit rotated but index not persisted; state diverges until next commit",
    }
}

#[inline]
pub fn log_report(r: &SlotReport) {
    let msg = message_for(r.phase);
    let reason = r.error.as_deref().unwrap_or("");
    let identity = r.identity.as_ref().map(|i| i.as_str()).unwrap_or("");

    match r.phase {
        SlotPhase::Pending
        | SlotPhase::IndexComputed
        | SlotPhase::OldDestroyed
        | SlotPhase::NewCreated
        | SlotPhase::HealthVerified => {
            debug!(target: "rotor.engine", slot = %r.slot, identity, "{msg}")
        }
        SlotPhase::Committed => info!(
            target: "rotor.engine",
            slot = %r.slot,
            from = r.from_index,
            to = r.to_index,
            identity,
            "{msg}"
        ),
        SlotPhase::SkippedIneligible => {
            warn!(target: "rotor.engine", slot = %r.slot, reason, "{msg}")
        }
        SlotPhase::CommitFailed => {
            warn!(target: "rotor.engine", slot = %r.slot, identity, reason, "{msg}")
        }
        SlotPhase::DestroyFailed | SlotPhase::CreateFailed | SlotPhase::HealthFailed => {
            error!(target: "rotor.engine", slot = %r.slot, identity, reason, "{msg}")
        }
    }
}

/// One summary line per cycle.
pub fn log_cycle(report: &CycleReport) {
    let failed = report.failed();
    if failed > 0 {
        warn!(
            target: "rotor.engine",
            run_id = %report.run_id,
            slots = report.slots.len(),
            committed = report.committed(),
            skipped = report.skipped(),
            failed,
            "rotation cycle finished with failures"
        );
    } else {
        info!(
            target: "rotor.engine",
            run_id = %report.run_id,
            slots = report.slots.len(),
            committed = report.committed(),
            skipped = report.skipped(),
            "rotation cycle finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_phase_has_a_message() {
        let phases = [
            SlotPhase::Pending,
            SlotPhase::IndexComputed,
            SlotPhase::OldDestroyed,
            SlotPhase::NewCreated,
            SlotPhase::HealthVerified,
            SlotPhase::Committed,
            SlotPhase::SkippedIneligible,
            SlotPhase::DestroyFailed,
            SlotPhase::CreateFailed,
            SlotPhase::HealthFailed,
            SlotPhase::CommitFailed,
        ];
        for phase in phases {
            assert!(!message_for(phase).is_empty());
            log_report(&SlotReport::new("nexus-node-1").fail(phase, "reason"));
        }
    }
}
