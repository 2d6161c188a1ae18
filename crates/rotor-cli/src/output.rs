//! Human and JSON renderings of command results. Always stdout.
use anyhow::Result;
use rotor_core::StartResult;
use rotor_model::{CycleReport, MemoryUsage, UnitInfo};
use serde_json::json;

pub fn units(units: &[UnitInfo], as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(units)?);
        return Ok(());
    }
    if units.is_empty() {
        println!("no managed workers");
        return Ok(());
    }
    println!("{:<18} {:<11} {:<44} MEMORY", "SLOT", "STATUS", "IDENTITY");
    for u in units {
        let identity = u.identity.as_ref().map(|i| i.as_str()).unwrap_or("-");
        let memory = match &u.usage {
            Some(usage) => usage.to_string(),
            None => format!("limit {}", u.memory_limit),
        };
        println!("{:<18} {:<11} {:<44} {memory}", u.slot, u.status.as_str(), identity);
    }
    Ok(())
}

pub fn stats(rows: &[(String, MemoryUsage)], as_json: bool) -> Result<()> {
    if as_json {
        let doc: Vec<_> = rows
            .iter()
            .map(|(slot, usage)| {
                json!({
                    "slot": slot,
                    "usedBytes": usage.used_bytes,
                    "limitBytes": usage.limit_bytes,
                    "percent": usage.percent(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("no running workers");
        return Ok(());
    }
    println!("{:<18} {:<24} USE%", "SLOT", "MEMORY");
    for (slot, usage) in rows {
        let pct = usage
            .percent()
            .map(|p| format!("{p:.1}%"))
            .unwrap_or_else(|| "-".to_string());
        println!("{slot:<18} {:<24} {pct}", usage.to_string());
    }
    Ok(())
}

pub fn cycle(report: &CycleReport, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    for s in &report.slots {
        let detail = match (&s.identity, &s.error) {
            (_, Some(err)) => err.clone(),
            (Some(id), None) => format!("now {id}"),
            (None, None) => String::new(),
        };
        println!("{:<18} {:<18} {detail}", s.slot, format!("{:?}", s.phase));
    }
    println!(
        "cycle {}: {} rotated, {} skipped, {} failed",
        report.run_id,
        report.committed(),
        report.skipped(),
        report.failed()
    );
    Ok(())
}

pub fn started(results: &[StartResult]) {
    for r in results {
        match r {
            StartResult::Started { slot, identity } => println!("{slot:<18} started     {identity}"),
            StartResult::Skipped { slot, reason } => println!("{slot:<18} skipped     {reason}"),
            StartResult::Failed { slot, reason } => println!("{slot:<18} failed      {reason}"),
        }
    }
}
