use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context};
use chrono::{Days, NaiveDate, Utc};
use engine_logging::{engine_info, engine_warn};
use harvester_engine::{
    cutoff_from_days_back, render_harvest_report, ChromeLauncher, DailyActivity, DailySummary,
    FeedProbe, ResilientRunner, SessionController, SqliteFeedStore,
};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;

const STATUS_DAYS: u64 = 7;

async fn open_store(config: &AppConfig) -> anyhow::Result<SqliteFeedStore> {
    SqliteFeedStore::open(&config.database_path)
        .await
        .with_context(|| format!("opening database {}", config.database_path.display()))
}

pub(crate) async fn harvest(
    config: &AppConfig,
    days_back: u32,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let settings = config.to_settings()?;
    let store = open_store(config).await?;
    let cutoff = cutoff_from_days_back(days_back, Utc::now(), settings.extract.reporting_timezone);
    match cutoff {
        Some(date) => engine_info!("harvesting back to {date} ({days_back} day(s))"),
        None => engine_info!("harvesting without a cutoff"),
    }

    let controller = SessionController::new(
        Box::new(ChromeLauncher::new(settings.session.clone())),
        settings.extract.clone(),
        settings.walk.clone(),
    );
    let report = ResilientRunner::new(controller, settings.retry)
        .run(&store, cutoff, cancel)
        .await;

    if report.stop_reason.is_none() {
        engine_warn!("no harvest session completed");
    }
    print!("{}", render_harvest_report(&report));
    Ok(())
}

fn activity_line(activity: &DailyActivity) -> String {
    format!(
        "{}: {} record(s), {} likes, {} reposts, {} comments",
        activity.date,
        activity.records,
        activity.totals.likes,
        activity.totals.reposts,
        activity.totals.comments
    )
}

pub(crate) async fn status(config: &AppConfig) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let total = store.record_count().await?;
    let latest = store.latest_external_id().await?;

    let today = Utc::now()
        .with_timezone(&config.reporting_zone()?)
        .date_naive();
    let since = today
        .checked_sub_days(Days::new(STATUS_DAYS - 1))
        .unwrap_or(today);
    let activity = store.daily_activity(since).await?;

    println!("database: {}", config.database_path.display());
    println!("total records: {total}");
    println!("latest record: {}", latest.as_deref().unwrap_or("none"));
    println!("last {STATUS_DAYS} day(s):");
    if activity.is_empty() {
        println!("  no records");
    }
    for day in &activity {
        println!("  {}", activity_line(day));
    }
    Ok(())
}

pub(crate) async fn import_summary(
    config: &AppConfig,
    date: NaiveDate,
    file: &Path,
    generated_by: &str,
) -> anyhow::Result<()> {
    let content = fs::read_to_string(file)
        .with_context(|| format!("reading summary {}", file.display()))?;
    let content = content.trim();
    if content.is_empty() {
        return Err(anyhow!("summary file {} is empty", file.display()));
    }

    let store = open_store(config).await?;
    let activity = store.activity_on(date).await?;
    if activity.records == 0 {
        engine_warn!("importing a summary for {date}, which has no stored records");
    }
    let summary = DailySummary {
        date,
        content: content.to_string(),
        record_count: activity.records,
        totals: activity.totals,
        generated_by: generated_by.to_string(),
        generated_at: Utc::now(),
    };
    store.upsert_daily_summary(&summary).await?;
    engine_info!("stored summary for {date} from {generated_by}");
    println!("summary stored for {}", activity_line(&activity));
    Ok(())
}

pub(crate) async fn pending_summaries(config: &AppConfig) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let pending = store.dates_without_summary().await?;
    if pending.is_empty() {
        println!("every reporting date has a summary");
        return Ok(());
    }
    for date in pending {
        let activity = store.activity_on(date).await?;
        println!("{}", activity_line(&activity));
    }
    Ok(())
}

pub(crate) async fn probe(config: &AppConfig) -> anyhow::Result<()> {
    let probe = FeedProbe::new(config.probe_settings());
    let outcome = probe
        .probe(&config.feed_url)
        .await
        .with_context(|| format!("probing {}", config.feed_url))?;
    println!("status: {}", outcome.status);
    println!("final url: {}", outcome.final_url);
    if outcome.redirect_count > 0 {
        println!("redirects: {}", outcome.redirect_count);
    }
    println!(
        "content type: {}",
        outcome.content_type.as_deref().unwrap_or("unknown")
    );
    println!(
        "bytes: {}{}",
        outcome.byte_len,
        if outcome.truncated { " (truncated)" } else { "" }
    );
    println!("elapsed: {:?}", outcome.elapsed);
    Ok(())
}
