use crate::models::SourceRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use std::collections::VecDeque;

/// Lazy, forward-only scan over a primary-key interval of the legacy
/// membership application table.
///
/// Pages are fetched with a re-issued bounded keyset query
/// (`id > last_seen AND id <= max_id ORDER BY id LIMIT page_size`), so
/// memory and lock duration stay bounded by the page size instead of
/// growing with scan offset. The scan ends on a short page or once
/// `last_seen` reaches `max_id`. A partial run can only be resumed by
/// constructing a new cursor with an updated lower bound.
pub struct ChunkedCursor {
    pool: Pool<Sqlite>,
    last_seen: i64,
    max_id: i64,
    page_size: i64,
    page: VecDeque<SourceRow>,
    exhausted: bool,
}

impl ChunkedCursor {
    /// `min_id` is exclusive, `max_id` inclusive.
    pub fn new(pool: Pool<Sqlite>, min_id: i64, max_id: i64, page_size: i64) -> Self {
        Self {
            pool,
            last_seen: min_id,
            max_id,
            page_size: page_size.max(1),
            page: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Yields the next row in ascending id order, or `None` once the range
    /// is exhausted. Fetch failures are infrastructure errors and abort
    /// the scan.
    pub async fn next_row(&mut self) -> Result<Option<SourceRow>, String> {
        if self.page.is_empty() && !self.exhausted {
            self.fetch_page().await?;
        }
        Ok(self.page.pop_front())
    }

    async fn fetch_page(&mut self) -> Result<(), String> {
        if self.last_seen >= self.max_id {
            self.exhausted = true;
            return Ok(());
        }

        let rows = sqlx::query(
            r#"
            SELECT id, amount, payment_interval, payment_type, data, iban, bic, status, created_at
            FROM membership_application
            WHERE id > ? AND id <= ?
            ORDER BY id
            LIMIT ?
            "#,
        )
        .bind(self.last_seen)
        .bind(self.max_id)
        .bind(self.page_size)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to fetch membership application page: {}", e))?;

        if (rows.len() as i64) < self.page_size {
            self.exhausted = true;
        }

        for row in &rows {
            let decoded = decode_source_row(row)?;
            self.last_seen = decoded.id;
            self.page.push_back(decoded);
        }

        Ok(())
    }
}

fn decode_source_row(row: &SqliteRow) -> Result<SourceRow, String> {
    Ok(SourceRow {
        id: row
            .try_get("id")
            .map_err(|e| format!("Failed to read id column: {}", e))?,
        amount: row
            .try_get("amount")
            .map_err(|e| format!("Failed to read amount column: {}", e))?,
        payment_interval: row
            .try_get("payment_interval")
            .map_err(|e| format!("Failed to read payment_interval column: {}", e))?,
        payment_type: row
            .try_get("payment_type")
            .map_err(|e| format!("Failed to read payment_type column: {}", e))?,
        data: row
            .try_get("data")
            .map_err(|e| format!("Failed to read data column: {}", e))?,
        iban: row
            .try_get("iban")
            .map_err(|e| format!("Failed to read iban column: {}", e))?,
        bic: row
            .try_get("bic")
            .map_err(|e| format!("Failed to read bic column: {}", e))?,
        status: row
            .try_get("status")
            .map_err(|e| format!("Failed to read status column: {}", e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| format!("Failed to read created_at column: {}", e))?,
    })
}
