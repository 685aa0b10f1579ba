use std::path::{Path, PathBuf};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use nm_core::{Article, ArticleStorage, Error, RecordFilter, Result, StoredRecord};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use crate::{StorageBackend, StorageConfig};

const COLUMNS: &str =
    "source, link, headline, body, image, sentiment_label, sentiment_score, summary, stored_at";

fn storage_err(context: &str) -> impl Fn(sqlx::Error) -> Error + '_ {
    move |e| Error::Storage(format!("{}: {}", context, e))
}

fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!("Invalid collection name: {:?}", name)))
    }
}

/// One row per stored article, keyed on `(source, link)`.
pub struct SqliteStorage {
    pool: SqlitePool,
    table: String,
    db_path: PathBuf,
}

impl SqliteStorage {
    pub async fn open_path(db_path: &Path, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(storage_err("Failed to open database"))?;

        let migrations = [
            format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    source TEXT NOT NULL,
                    link TEXT NOT NULL,
                    headline TEXT NOT NULL,
                    body TEXT,
                    image TEXT,
                    sentiment_label TEXT,
                    sentiment_score REAL,
                    summary TEXT,
                    stored_at TEXT NOT NULL,
                    PRIMARY KEY (source, link)
                )"
            ),
            format!("CREATE INDEX IF NOT EXISTS {table}_stored_at ON {table} (stored_at)"),
        ];
        for (i, migration) in migrations.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| Error::Storage(format!("Failed to run migration {}: {}", i, e)))?;
        }

        Ok(Self {
            pool,
            table: table.to_string(),
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn record_from_row(row: &SqliteRow) -> Result<StoredRecord> {
        let get_err = storage_err("Malformed row");
        let label: Option<String> = row.try_get("sentiment_label").map_err(&get_err)?;
        let score: Option<f64> = row.try_get("sentiment_score").map_err(&get_err)?;
        let stored_at: String = row.try_get("stored_at").map_err(&get_err)?;

        let article = Article {
            source: row.try_get("source").map_err(&get_err)?,
            link: row.try_get("link").map_err(&get_err)?,
            headline: row.try_get("headline").map_err(&get_err)?,
            body: row.try_get("body").map_err(&get_err)?,
            image: row.try_get("image").map_err(&get_err)?,
            sentiment_label: label.map(|l| l.parse()).transpose()?,
            sentiment_score: score.map(|s| s as f32),
            summary: row.try_get("summary").map_err(&get_err)?,
        };
        let stored_at = DateTime::parse_from_rfc3339(&stored_at)
            .map_err(|e| Error::Storage(format!("Failed to parse date: {}", e)))?
            .with_timezone(&Utc);

        Ok(StoredRecord { article, stored_at })
    }
}

#[async_trait]
impl StorageBackend for SqliteStorage {
    async fn open(config: &StorageConfig) -> Result<Self> {
        let dir = config.url.trim_start_matches("sqlite://");
        let dir = if dir.is_empty() { "." } else { dir };
        let db_path = PathBuf::from(dir).join(format!("{}.db", config.database));
        Self::open_path(&db_path, &config.collection).await
    }
}

#[async_trait]
impl ArticleStorage for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn save(&self, articles: &[Article]) -> Result<usize> {
        let sql = format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.table, COLUMNS
        );
        let stored_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        let mut tx = self.pool.begin().await.map_err(storage_err("Failed to begin transaction"))?;
        let mut inserted = 0;
        for article in articles {
            let result = sqlx::query(&sql)
                .bind(&article.source)
                .bind(&article.link)
                .bind(&article.headline)
                .bind(article.body.as_deref())
                .bind(article.image.as_deref())
                .bind(article.sentiment_label.map(|l| l.as_str()))
                .bind(article.sentiment_score.map(|s| s as f64))
                .bind(article.summary.as_deref())
                .bind(&stored_at)
                .execute(&mut *tx)
                .await
                .map_err(storage_err("Failed to store article"))?;
            inserted += result.rows_affected() as usize;
        }
        tx.commit().await.map_err(storage_err("Failed to commit"))?;

        Ok(inserted)
    }

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM {} WHERE 1 = 1", COLUMNS, self.table));
        if let Some(sentiment) = filter.sentiment {
            query.push(" AND sentiment_label = ").push_bind(sentiment.as_str());
        }
        if let Some(ref source) = filter.source {
            query.push(" AND source = ").push_bind(source.clone());
        }
        query.push(" ORDER BY stored_at DESC, rowid DESC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err("Failed to list articles"))?;
        rows.iter().map(Self::record_from_row).collect()
    }
}
