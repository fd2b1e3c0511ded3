//! Primary storage backend on Postgres.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crawler::{ContactHit, CrawlJob, CrawlResult, CrawlStatus, JobStatus, PageVisit};

use super::{
    BusinessRecord, CrawlResultRecord, DatasetRecord, DatasetSnapshot, ExportRow, Store,
    StoreError, StoreResult,
};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn crawl_status_str(status: CrawlStatus) -> &'static str {
    match status {
        CrawlStatus::NotCrawled => "not_crawled",
        CrawlStatus::Partial => "partial",
        CrawlStatus::Completed => "completed",
    }
}

fn crawl_status_from(s: &str) -> CrawlStatus {
    match s {
        "partial" => CrawlStatus::Partial,
        "completed" => CrawlStatus::Completed,
        _ => CrawlStatus::NotCrawled,
    }
}

fn job_status_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "queued",
        JobStatus::Running => "running",
        JobStatus::Success => "success",
        JobStatus::Failed => "failed",
    }
}

fn result_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<CrawlResultRecord> {
    let status: String = row.get("crawl_status");
    Ok(CrawlResultRecord {
        result: CrawlResult {
            business_id: row.get("business_id"),
            dataset_id: row.get("dataset_id"),
            website_url: row.get("website_url"),
            started_at: row.get("started_at"),
            finished_at: row.get("finished_at"),
            pages_visited: row.get::<i32, _>("pages_visited") as usize,
            crawl_status: crawl_status_from(&status),
            emails: serde_json::from_value(row.get("emails"))?,
            phones: serde_json::from_value(row.get("phones"))?,
            contact_pages: row.get("contact_pages"),
            social: serde_json::from_value(row.get("social"))?,
            errors: serde_json::from_value(row.get("errors"))?,
        },
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl Store for PostgresStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|_| StoreError::Unhealthy {
                backend: "postgres",
            })?;
        Ok(())
    }

    async fn upsert_dataset(&self, dataset: &DatasetRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO datasets (id, user_id, name, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(dataset.id)
        .bind(dataset.user_id)
        .bind(&dataset.name)
        .bind(dataset.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_dataset(&self, dataset_id: Uuid) -> StoreResult<Option<DatasetRecord>> {
        let row = sqlx::query(
            "SELECT id, user_id, name, created_at FROM datasets WHERE id = $1",
        )
        .bind(dataset_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| DatasetRecord {
            id: r.get("id"),
            user_id: r.get("user_id"),
            name: r.get("name"),
            created_at: r.get("created_at"),
        }))
    }

    async fn get_latest_dataset(&self, user_id: Uuid) -> StoreResult<Option<DatasetRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, name, created_at
            FROM datasets
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| DatasetRecord {
            id: r.get("id"),
            user_id: r.get("user_id"),
            name: r.get("name"),
            created_at: r.get("created_at"),
        }))
    }

    async fn list_datasets(&self) -> StoreResult<Vec<DatasetRecord>> {
        let rows = sqlx::query(
            "SELECT id, user_id, name, created_at FROM datasets ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| DatasetRecord {
                id: r.get("id"),
                user_id: r.get("user_id"),
                name: r.get("name"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    async fn upsert_businesses(&self, businesses: &[BusinessRecord]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for business in businesses {
            sqlx::query(
                r#"
                INSERT INTO businesses (id, dataset_id, name, website_url, created_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name,
                    website_url = EXCLUDED.website_url
                "#,
            )
            .bind(business.id)
            .bind(business.dataset_id)
            .bind(&business.name)
            .bind(&business.website_url)
            .bind(business.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_dataset_businesses(&self, dataset_id: Uuid) -> StoreResult<Vec<BusinessRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, dataset_id, name, website_url, created_at
            FROM businesses
            WHERE dataset_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(dataset_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| BusinessRecord {
                id: r.get("id"),
                dataset_id: r.get("dataset_id"),
                name: r.get("name"),
                website_url: r.get("website_url"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    async fn create_dataset_snapshot(&self, snapshot: &DatasetSnapshot) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO dataset_snapshots (id, dataset_id, user_id, created_at, expires_at, data)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(snapshot.id)
        .bind(snapshot.dataset_id)
        .bind(snapshot.user_id)
        .bind(snapshot.created_at)
        .bind(snapshot.expires_at)
        .bind(&snapshot.data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_dataset_snapshot(
        &self,
        dataset_id: Uuid,
    ) -> StoreResult<Option<DatasetSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT id, dataset_id, user_id, created_at, expires_at, data
            FROM dataset_snapshots
            WHERE dataset_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(dataset_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| DatasetSnapshot {
            id: r.get("id"),
            dataset_id: r.get("dataset_id"),
            user_id: r.get("user_id"),
            created_at: r.get("created_at"),
            expires_at: r.get("expires_at"),
            data: r.get("data"),
        }))
    }

    async fn create_crawl_job(&self, dataset_id: Uuid, job: &CrawlJob) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO crawl_jobs (
                id, dataset_id, business_id, website_url, status,
                pages_limit, pages_crawled, attempts, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
            "#,
        )
        .bind(job.id)
        .bind(dataset_id)
        .bind(job.business_id)
        .bind(&job.website_url)
        .bind(job_status_str(job.status))
        .bind(job.pages_limit as i32)
        .bind(job.pages_crawled as i32)
        .bind(job.attempts as i32)
        .bind(job.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_crawl_job(&self, _dataset_id: Uuid, job: &CrawlJob) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE crawl_jobs
            SET status = $2, pages_crawled = $3, attempts = $4, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(job_status_str(job.status))
        .bind(job.pages_crawled as i32)
        .bind(job.attempts as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_page(&self, dataset_id: Uuid, job_id: Uuid, page: &PageVisit) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO crawl_pages (id, job_id, dataset_id, url, depth, ok, fetched_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(job_id)
        .bind(dataset_id)
        .bind(&page.url)
        .bind(page.depth as i32)
        .bind(page.ok)
        .bind(page.fetched_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_crawl_result(&self, result: &CrawlResult) -> StoreResult<CrawlResultRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO crawl_results (
                business_id, dataset_id, website_url, started_at, finished_at,
                pages_visited, crawl_status, emails, phones, contact_pages,
                social, errors, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, now(), now())
            ON CONFLICT (business_id, dataset_id) DO UPDATE SET
                website_url = EXCLUDED.website_url,
                started_at = EXCLUDED.started_at,
                finished_at = EXCLUDED.finished_at,
                pages_visited = EXCLUDED.pages_visited,
                crawl_status = EXCLUDED.crawl_status,
                emails = EXCLUDED.emails,
                phones = EXCLUDED.phones,
                contact_pages = EXCLUDED.contact_pages,
                social = EXCLUDED.social,
                errors = EXCLUDED.errors,
                created_at = crawl_results.created_at,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(result.business_id)
        .bind(result.dataset_id)
        .bind(&result.website_url)
        .bind(result.started_at)
        .bind(result.finished_at)
        .bind(result.pages_visited as i32)
        .bind(crawl_status_str(result.crawl_status))
        .bind(serde_json::to_value(&result.emails)?)
        .bind(serde_json::to_value(&result.phones)?)
        .bind(&result.contact_pages)
        .bind(serde_json::to_value(&result.social)?)
        .bind(serde_json::to_value(&result.errors)?)
        .fetch_one(&self.pool)
        .await?;

        result_from_row(&row)
    }

    async fn get_crawl_result(
        &self,
        business_id: Uuid,
        dataset_id: Uuid,
    ) -> StoreResult<Option<CrawlResultRecord>> {
        let row = sqlx::query(
            r#"
            SELECT business_id, dataset_id, website_url, started_at, finished_at,
                   pages_visited, crawl_status, emails, phones, contact_pages,
                   social, errors, created_at, updated_at
            FROM crawl_results
            WHERE business_id = $1 AND dataset_id = $2
            "#,
        )
        .bind(business_id)
        .bind(dataset_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| result_from_row(&r)).transpose()
    }

    async fn save_contacts(&self, dataset_id: Uuid, result: &CrawlResult) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        // Refresh replaces the business's contact rows wholesale
        sqlx::query("DELETE FROM contacts WHERE dataset_id = $1 AND business_id = $2")
            .bind(dataset_id)
            .bind(result.business_id)
            .execute(&mut *tx)
            .await?;

        let insert = |kind: &'static str, hit: &ContactHit| {
            sqlx::query(
                r#"
                INSERT INTO contacts (id, dataset_id, business_id, kind, value, source_url, context, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, now())
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(dataset_id)
            .bind(result.business_id)
            .bind(kind)
            .bind(hit.value.clone())
            .bind(hit.source_url.clone())
            .bind(hit.context.clone())
        };

        for hit in &result.emails {
            insert("email", hit).execute(&mut *tx).await?;
        }
        for hit in &result.phones {
            insert("phone", hit).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_export_rows(&self, dataset_id: Uuid, limit: usize) -> StoreResult<Vec<ExportRow>> {
        let rows = sqlx::query(
            r#"
            SELECT b.id AS business_id, b.name, b.website_url,
                   r.emails, r.phones, r.contact_pages, r.crawl_status, r.created_at
            FROM businesses b
            LEFT JOIN crawl_results r
                ON r.business_id = b.id AND r.dataset_id = b.dataset_id
            WHERE b.dataset_id = $1
            ORDER BY b.created_at
            LIMIT $2
            "#,
        )
        .bind(dataset_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                let emails: Vec<ContactHit> = r
                    .try_get::<Option<serde_json::Value>, _>("emails")?
                    .map(serde_json::from_value)
                    .transpose()?
                    .unwrap_or_default();
                let phones: Vec<ContactHit> = r
                    .try_get::<Option<serde_json::Value>, _>("phones")?
                    .map(serde_json::from_value)
                    .transpose()?
                    .unwrap_or_default();
                let contact_pages: Vec<String> = r
                    .try_get::<Option<Vec<String>>, _>("contact_pages")?
                    .unwrap_or_default();
                let status: Option<String> = r.try_get("crawl_status")?;

                Ok(ExportRow {
                    business_id: r.get("business_id"),
                    business_name: r.get("name"),
                    website_url: r.get("website_url"),
                    emails: dedup_values(emails),
                    phones: dedup_values(phones),
                    contact_page: contact_pages.into_iter().next(),
                    crawl_status: status
                        .as_deref()
                        .map(crawl_status_from)
                        .unwrap_or(CrawlStatus::NotCrawled),
                    first_discovered_at: r.try_get("created_at")?,
                })
            })
            .collect()
    }
}

/// Collapse cross-page provenance into unique values for export.
pub(crate) fn dedup_values(hits: Vec<ContactHit>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    hits.into_iter()
        .map(|hit| hit.value)
        .filter(|value| seen.insert(value.clone()))
        .collect()
}
