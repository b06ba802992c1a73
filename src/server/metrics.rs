//! Prometheus text exposition of pool counters

use std::fmt::Write;

use crate::browser_pool::PoolSnapshot;

const PREFIX: &str = "browser_service";

fn header(out: &mut String, name: &str, kind: &str, help: &str) {
    let _ = writeln!(out, "# HELP {PREFIX}_{name} {help}");
    let _ = writeln!(out, "# TYPE {PREFIX}_{name} {kind}");
}

fn sample(out: &mut String, name: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "{PREFIX}_{name} {value}");
}

fn per_slot<F>(out: &mut String, snapshot: &PoolSnapshot, name: &str, help: &str, value: F)
where
    F: Fn(&crate::browser_pool::SlotSnapshot) -> u64,
{
    header(out, name, "gauge", help);
    for slot in &snapshot.slots {
        let _ = writeln!(
            out,
            "{PREFIX}_{name}{{slot=\"{}\"}} {}",
            slot.index,
            value(slot)
        );
    }
    out.push('\n');
}

/// Render the snapshot in Prometheus text format 0.0.4
#[must_use]
pub fn render(snapshot: &PoolSnapshot) -> String {
    let mut out = String::with_capacity(2048);

    header(&mut out, "requests_total", "counter", "Total number of admitted requests");
    sample(&mut out, "requests_total", snapshot.requests_total);
    out.push('\n');

    header(&mut out, "uptime_seconds", "gauge", "Service uptime in seconds");
    sample(&mut out, "uptime_seconds", format!("{:.2}", snapshot.uptime_secs));
    out.push('\n');

    header(&mut out, "pool_size", "gauge", "Browser pool size");
    sample(&mut out, "pool_size", snapshot.pool_size);
    out.push('\n');

    header(&mut out, "max_concurrent", "gauge", "Maximum concurrent pages per browser");
    sample(&mut out, "max_concurrent", snapshot.max_concurrent_per_worker);
    out.push('\n');

    header(&mut out, "in_flight", "gauge", "Fetches currently holding an admission permit");
    sample(&mut out, "in_flight", snapshot.in_flight);
    out.push('\n');

    header(&mut out, "live_workers", "gauge", "Browser workers currently alive");
    sample(&mut out, "live_workers", snapshot.live_workers);
    out.push('\n');

    header(&mut out, "replacements_total", "counter", "Browser workers replaced since start");
    sample(&mut out, "replacements_total", snapshot.total_replacements);
    out.push('\n');

    per_slot(&mut out, snapshot, "slot_active_readers", "Fetches in progress per slot", |s| {
        s.active_readers as u64
    });
    per_slot(&mut out, snapshot, "slot_fetch_count", "Fetches served by the current worker", |s| {
        s.fetch_count
    });
    per_slot(&mut out, snapshot, "slot_replacing", "1 while the slot's worker is being replaced", |s| {
        u64::from(s.replacing)
    });
    per_slot(&mut out, snapshot, "slot_generation", "Workers installed in the slot so far", |s| {
        s.generation
    });

    out
}
