use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Short-lived local cache. Only discussion lookups are cached, keyed by
/// page path; profile lookups are never cached across runs.
#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone)]
pub struct DiscussionEntry {
    pub page_path: String,
    pub url: String,
    pub comments: i64,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone)]
pub struct Options {
    pub path: Option<PathBuf>,
}

impl Store {
    pub fn open(opts: Options) -> Result<Self> {
        let path = if let Some(path) = opts.path {
            path
        } else {
            default_path().context("storage: resolve default path")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("storage: create directory {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("storage: open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", &"WAL")
            .context("storage: set WAL")?;
        conn.pragma_update(None, "busy_timeout", &5000)
            .context("storage: set busy timeout")?;
        migrate(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn close(self) -> Result<()> {
        let conn = Arc::try_unwrap(self.conn)
            .map_err(|_| anyhow!("storage: connection still in use"))?
            .into_inner();
        conn.close()
            .map_err(|(_, err)| err)
            .context("storage: close connection")
    }

    pub fn upsert_discussion(&self, mut entry: DiscussionEntry) -> Result<()> {
        if entry.page_path.is_empty() {
            anyhow::bail!("storage: page path required");
        }
        if entry.fetched_at.timestamp() == 0 {
            entry.fetched_at = Utc::now();
        }

        let conn = self.conn.lock();
        conn.execute(
            r#"
INSERT INTO discussion_cache (page_path, url, comments, fetched_at)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT(page_path) DO UPDATE SET
  url = excluded.url,
  comments = excluded.comments,
  fetched_at = excluded.fetched_at
"#,
            params![
                entry.page_path,
                entry.url,
                entry.comments,
                entry.fetched_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    /// Returns the cached discussion for a page, ignoring entries fetched
    /// before the cutoff.
    pub fn get_discussion(
        &self,
        page_path: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<DiscussionEntry>> {
        let conn = self.conn.lock();
        conn.query_row(
            r#"
SELECT page_path, url, comments, fetched_at
FROM discussion_cache
WHERE page_path = ?1 AND fetched_at > ?2
"#,
            params![page_path, cutoff.timestamp()],
            discussion_from_row,
        )
        .optional()
        .context("storage: query discussion cache")
    }

    pub fn prune_stale(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM discussion_cache WHERE fetched_at <= ?1",
            params![cutoff.timestamp()],
        )?;
        Ok(removed)
    }
}

fn discussion_from_row(row: &Row<'_>) -> rusqlite::Result<DiscussionEntry> {
    let fetched: i64 = row.get(3)?;
    Ok(DiscussionEntry {
        page_path: row.get(0)?,
        url: row.get(1)?,
        comments: row.get(2)?,
        fetched_at: Utc
            .timestamp_opt(fetched, 0)
            .single()
            .unwrap_or_else(Utc::now),
    })
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at INTEGER NOT NULL
)
"#,
        [],
    )?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    let migrations = migrations();
    for (idx, sql) in migrations.iter().enumerate() {
        let version = (idx + 1) as i64;
        if version <= current {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![
                version,
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or(Duration::from_secs(0))
                    .as_secs() as i64,
            ],
        )?;
    }
    Ok(())
}

fn migrations() -> Vec<&'static str> {
    vec![
        r#"
CREATE TABLE IF NOT EXISTS discussion_cache (
  page_path TEXT PRIMARY KEY,
  url TEXT NOT NULL,
  comments INTEGER NOT NULL DEFAULT 0,
  fetched_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_discussion_cache_fetched_at ON discussion_cache(fetched_at);
"#,
    ]
}

pub fn default_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("sitenotes").join("cache.db"))
}
