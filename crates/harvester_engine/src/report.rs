use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::NaiveDate;
use harvester_core::{Engagement, FeedRecord, StopReason};

use crate::WalkReport;

const TRUNCATED_MARKER: &str = "…";
pub const MAX_PREVIEW_CHARS: usize = 80;

/// First body line, cut at a char boundary when longer than `max_bytes`.
pub fn preview_line(body: &str, max_bytes: usize) -> String {
    let first = body.lines().next().unwrap_or_default().trim();
    if first.len() <= max_bytes {
        return first.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !first.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{TRUNCATED_MARKER}", &first[..end])
}

fn describe_stop(reason: Option<StopReason>) -> &'static str {
    match reason {
        Some(StopReason::TargetReached) => "cutoff reached",
        Some(StopReason::IterationCap) => "scroll limit hit",
        Some(StopReason::Exhausted) => "feed exhausted",
        Some(StopReason::TargetUnmet) => "feed ended before the cutoff",
        Some(StopReason::Cancelled) => "cancelled",
        None => "no session completed",
    }
}

/// Plain-text summary of one run: records grouped by reporting date, newest first.
pub fn render_harvest_report(report: &WalkReport) -> String {
    let mut by_date: BTreeMap<NaiveDate, Vec<&FeedRecord>> = BTreeMap::new();
    for record in &report.inserted {
        by_date.entry(record.reporting_date()).or_default().push(record);
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} new record(s), {} refreshed; {} after {} round(s)",
        report.inserted.len(),
        report.refreshed,
        describe_stop(report.stop_reason),
        report.iterations
    );
    let _ = writeln!(
        out,
        "cutoff reached: {}",
        if report.target_reached { "yes" } else { "no" }
    );
    if let Some(earliest) = report.earliest_date {
        let _ = writeln!(out, "earliest date seen: {earliest}");
    }

    for (date, records) in by_date.iter().rev() {
        let totals = records.iter().fold(Engagement::default(), |acc, record| {
            Engagement::new(
                acc.likes + record.engagement.likes,
                acc.reposts + record.engagement.reposts,
                acc.comments + record.engagement.comments,
            )
        });
        let _ = writeln!(
            out,
            "\n{date}: {} record(s), {} likes, {} reposts, {} comments",
            records.len(),
            totals.likes,
            totals.reposts,
            totals.comments
        );
        let mut records = records.clone();
        records.sort_by(|a, b| b.occurred_at_utc.cmp(&a.occurred_at_utc));
        for record in records {
            let _ = writeln!(
                out,
                "  {} [{}] {}",
                record.occurred_at_local.format("%H:%M"),
                record.external_id,
                preview_line(&record.body, MAX_PREVIEW_CHARS)
            );
        }
    }
    out
}
