use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use harvester_core::{Engagement, FeedRecord};
use sha2::{Digest, Sha256};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("cannot prepare database location: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored row {key} is corrupt: {detail}")]
    Corrupt { key: String, detail: String },
}

impl StoreError {
    fn corrupt(key: impl Into<String>, detail: impl ToString) -> Self {
        StoreError::Corrupt {
            key: key.into(),
            detail: detail.to_string(),
        }
    }
}

/// Durable keyed storage the dedup gate writes through.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Content fingerprint of the stored record, if the id is known.
    async fn fingerprint(&self, external_id: &str) -> Result<Option<String>, StoreError>;

    /// Insert or overwrite the record keyed by its `external_id`.
    async fn upsert_record(&self, record: &FeedRecord, fingerprint: &str)
        -> Result<(), StoreError>;
}

/// Hex SHA-256 over every field an upstream edit can change.
pub fn content_fingerprint(record: &FeedRecord) -> String {
    let mut hasher = Sha256::new();
    let fields = [
        record.body.clone(),
        record.occurred_at_utc.to_rfc3339(),
        record.occurred_at_local.to_rfc3339(),
        record.canonical_url.clone(),
        record.engagement.likes.to_string(),
        record.engagement.reposts.to_string(),
        record.engagement.comments.to_string(),
    ];
    for field in fields.iter().chain(record.media_refs.iter()) {
        hasher.update(field.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in digest.iter() {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

/// Records and engagement summed over one reporting date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyActivity {
    pub date: NaiveDate,
    pub records: u64,
    pub totals: Engagement,
}

/// Narrative written for one reporting date by an external summarizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub content: String,
    pub record_count: u64,
    pub totals: Engagement,
    pub generated_by: String,
    pub generated_at: DateTime<Utc>,
}

pub struct SqliteFeedStore {
    pool: SqlitePool,
}

impl SqliteFeedStore {
    /// Open (creating if missing) the database file and apply the schema.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Private in-memory database; lives as long as the store.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feed_records (
                external_id TEXT PRIMARY KEY NOT NULL,
                body TEXT NOT NULL,
                occurred_date TEXT NOT NULL,
                occurred_at_local TEXT NOT NULL,
                occurred_at_utc TEXT NOT NULL,
                likes INTEGER NOT NULL DEFAULT 0,
                reposts INTEGER NOT NULL DEFAULT 0,
                comments INTEGER NOT NULL DEFAULT 0,
                media_refs TEXT NOT NULL DEFAULT '[]',
                canonical_url TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                harvested_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_summaries (
                summary_date TEXT PRIMARY KEY NOT NULL,
                summary_content TEXT NOT NULL,
                record_count INTEGER NOT NULL DEFAULT 0,
                total_likes INTEGER NOT NULL DEFAULT 0,
                total_reposts INTEGER NOT NULL DEFAULT 0,
                total_comments INTEGER NOT NULL DEFAULT 0,
                generated_by TEXT NOT NULL,
                generated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_feed_records_date ON feed_records(occurred_date)",
            "CREATE INDEX IF NOT EXISTS idx_feed_records_harvested ON feed_records(harvested_at)",
        ] {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn record_count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM feed_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    /// Id of the most recent record by occurrence time.
    pub async fn latest_external_id(&self) -> Result<Option<String>, StoreError> {
        let id = sqlx::query_scalar(
            "SELECT external_id FROM feed_records ORDER BY occurred_at_utc DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn record(&self, external_id: &str) -> Result<Option<FeedRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM feed_records WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    /// Records of one reporting date, newest first.
    pub async fn records_on(&self, date: NaiveDate) -> Result<Vec<FeedRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM feed_records WHERE occurred_date = ? ORDER BY occurred_at_utc DESC",
        )
        .bind(date.format(DATE_FORMAT).to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }

    /// Per-date counts and engagement totals from `since` on, newest date first.
    pub async fn daily_activity(&self, since: NaiveDate) -> Result<Vec<DailyActivity>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT occurred_date, COUNT(*) AS records,
                   SUM(likes) AS likes, SUM(reposts) AS reposts, SUM(comments) AS comments
            FROM feed_records
            WHERE occurred_date >= ?
            GROUP BY occurred_date
            ORDER BY occurred_date DESC
            "#,
        )
        .bind(since.format(DATE_FORMAT).to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(activity_from_row).collect()
    }

    pub async fn activity_on(&self, date: NaiveDate) -> Result<DailyActivity, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT ? AS occurred_date, COUNT(*) AS records,
                   SUM(likes) AS likes, SUM(reposts) AS reposts, SUM(comments) AS comments
            FROM feed_records
            WHERE occurred_date = ?
            "#,
        )
        .bind(date.format(DATE_FORMAT).to_string())
        .bind(date.format(DATE_FORMAT).to_string())
        .fetch_one(&self.pool)
        .await?;
        activity_from_row(&row)
    }

    /// Store the summary for its date, replacing any earlier one.
    pub async fn upsert_daily_summary(&self, summary: &DailySummary) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO daily_summaries (summary_date, summary_content, record_count,
                                         total_likes, total_reposts, total_comments,
                                         generated_by, generated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(summary_date) DO UPDATE SET
                summary_content = excluded.summary_content,
                record_count = excluded.record_count,
                total_likes = excluded.total_likes,
                total_reposts = excluded.total_reposts,
                total_comments = excluded.total_comments,
                generated_by = excluded.generated_by,
                generated_at = excluded.generated_at
            "#,
        )
        .bind(summary.date.format(DATE_FORMAT).to_string())
        .bind(&summary.content)
        .bind(to_db_count(summary.record_count))
        .bind(to_db_count(summary.totals.likes))
        .bind(to_db_count(summary.totals.reposts))
        .bind(to_db_count(summary.totals.comments))
        .bind(&summary.generated_by)
        .bind(summary.generated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn daily_summary(&self, date: NaiveDate) -> Result<Option<DailySummary>, StoreError> {
        let row = sqlx::query("SELECT * FROM daily_summaries WHERE summary_date = ?")
            .bind(date.format(DATE_FORMAT).to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(summary_from_row).transpose()
    }

    /// Reporting dates that have records but no summary yet, oldest first.
    pub async fn dates_without_summary(&self) -> Result<Vec<NaiveDate>, StoreError> {
        let dates: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT r.occurred_date
            FROM feed_records r
            LEFT JOIN daily_summaries s ON s.summary_date = r.occurred_date
            WHERE s.summary_date IS NULL
            ORDER BY r.occurred_date ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        dates.iter().map(|raw| parse_date(raw, raw)).collect()
    }
}

#[async_trait]
impl FeedStore for SqliteFeedStore {
    async fn fingerprint(&self, external_id: &str) -> Result<Option<String>, StoreError> {
        let hash = sqlx::query_scalar("SELECT content_hash FROM feed_records WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(hash)
    }

    async fn upsert_record(
        &self,
        record: &FeedRecord,
        fingerprint: &str,
    ) -> Result<(), StoreError> {
        let media = serde_json::to_string(&record.media_refs)
            .map_err(|err| StoreError::corrupt(record.external_id.clone(), err))?;
        sqlx::query(
            r#"
            INSERT INTO feed_records (external_id, body, occurred_date, occurred_at_local,
                                      occurred_at_utc, likes, reposts, comments, media_refs,
                                      canonical_url, content_hash, harvested_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(external_id) DO UPDATE SET
                body = excluded.body,
                occurred_date = excluded.occurred_date,
                occurred_at_local = excluded.occurred_at_local,
                occurred_at_utc = excluded.occurred_at_utc,
                likes = excluded.likes,
                reposts = excluded.reposts,
                comments = excluded.comments,
                media_refs = excluded.media_refs,
                canonical_url = excluded.canonical_url,
                content_hash = excluded.content_hash,
                harvested_at = excluded.harvested_at
            "#,
        )
        .bind(&record.external_id)
        .bind(&record.body)
        .bind(record.reporting_date().format(DATE_FORMAT).to_string())
        .bind(record.occurred_at_local.to_rfc3339())
        .bind(record.occurred_at_utc.to_rfc3339())
        .bind(to_db_count(record.engagement.likes))
        .bind(to_db_count(record.engagement.reposts))
        .bind(to_db_count(record.engagement.comments))
        .bind(media)
        .bind(&record.canonical_url)
        .bind(fingerprint)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn to_db_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_db_count(value: Option<i64>) -> u64 {
    value.unwrap_or(0).max(0) as u64
}

fn parse_date(key: &str, raw: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|err| StoreError::corrupt(key, err))
}

fn record_from_row(row: &SqliteRow) -> Result<FeedRecord, StoreError> {
    let external_id: String = row.try_get("external_id")?;
    let local: String = row.try_get("occurred_at_local")?;
    let utc: String = row.try_get("occurred_at_utc")?;
    let media: String = row.try_get("media_refs")?;

    let occurred_at_local = DateTime::parse_from_rfc3339(&local)
        .map_err(|err| StoreError::corrupt(external_id.clone(), err))?;
    let occurred_at_utc = DateTime::parse_from_rfc3339(&utc)
        .map_err(|err| StoreError::corrupt(external_id.clone(), err))?
        .with_timezone(&Utc);
    let media_refs: Vec<String> = serde_json::from_str(&media)
        .map_err(|err| StoreError::corrupt(external_id.clone(), err))?;

    Ok(FeedRecord {
        body: row.try_get("body")?,
        occurred_at_local,
        occurred_at_utc,
        engagement: Engagement::new(
            from_db_count(row.try_get("likes")?),
            from_db_count(row.try_get("reposts")?),
            from_db_count(row.try_get("comments")?),
        ),
        media_refs,
        canonical_url: row.try_get("canonical_url")?,
        external_id,
    })
}

fn activity_from_row(row: &SqliteRow) -> Result<DailyActivity, StoreError> {
    let raw: String = row.try_get("occurred_date")?;
    Ok(DailyActivity {
        date: parse_date(&raw, &raw)?,
        records: from_db_count(row.try_get("records")?),
        totals: Engagement::new(
            from_db_count(row.try_get("likes")?),
            from_db_count(row.try_get("reposts")?),
            from_db_count(row.try_get("comments")?),
        ),
    })
}

fn summary_from_row(row: &SqliteRow) -> Result<DailySummary, StoreError> {
    let raw_date: String = row.try_get("summary_date")?;
    let raw_generated: String = row.try_get("generated_at")?;
    let generated_at = DateTime::parse_from_rfc3339(&raw_generated)
        .map_err(|err| StoreError::corrupt(raw_date.clone(), err))?
        .with_timezone(&Utc);
    Ok(DailySummary {
        date: parse_date(&raw_date, &raw_date)?,
        content: row.try_get("summary_content")?,
        record_count: from_db_count(row.try_get("record_count")?),
        totals: Engagement::new(
            from_db_count(row.try_get("total_likes")?),
            from_db_count(row.try_get("total_reposts")?),
            from_db_count(row.try_get("total_comments")?),
        ),
        generated_by: row.try_get("generated_by")?,
        generated_at,
    })
}
