use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{ConnectOptions, Pool, Row, Sqlite};

pub async fn create_pool(db_path: &str) -> Result<Pool<Sqlite>, String> {
    if db_path.is_empty() {
        return Err("Database file path is required".to_string());
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .log_statements(log::LevelFilter::Debug);

    SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(std::time::Duration::from_secs(10))
        .connect_with(options)
        .await
        .map_err(|e| format!("Failed to create SQLite pool: {}", e))
}

/// Ensures both sides of the migration exist. The destination table is
/// owned by this tool; the source table definition matches the legacy
/// schema and only matters for fresh (test or staging) stores.
pub async fn init_schema(pool: &Pool<Sqlite>) -> Result<(), String> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS membership_application (
            id INTEGER PRIMARY KEY,
            amount TEXT,
            payment_interval INTEGER NOT NULL DEFAULT 0,
            payment_type TEXT NOT NULL,
            data TEXT,
            iban TEXT,
            bic TEXT,
            status INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            payment_id INTEGER
        );

        CREATE TABLE IF NOT EXISTS payment (
            id INTEGER PRIMARY KEY,
            payment_type TEXT NOT NULL,
            amount INTEGER NOT NULL,
            payment_interval INTEGER NOT NULL,
            cancelled INTEGER NOT NULL DEFAULT 0,
            iban TEXT,
            bic TEXT,
            anonymous INTEGER NOT NULL DEFAULT 0
        );
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| format!("Failed to initialize migration schema: {}", e))?;

    Ok(())
}

/// Current maximum id of the source table; the resolved upper bound when a
/// run is invoked without an explicit end id.
pub async fn source_max_id(pool: &Pool<Sqlite>) -> Result<i64, String> {
    let row = sqlx::query("SELECT COALESCE(MAX(id), 0) AS max_id FROM membership_application")
        .fetch_one(pool)
        .await
        .map_err(|e| format!("Failed to resolve source max id: {}", e))?;

    row.try_get("max_id")
        .map_err(|e| format!("Failed to read source max id: {}", e))
}

/// Highest id that already carries a payment back-reference, i.e. the last
/// durably committed id. Used as the default start offset so a plain
/// invocation migrates everything not yet migrated.
pub async fn last_migrated_id(pool: &Pool<Sqlite>) -> Result<i64, String> {
    let row = sqlx::query(
        "SELECT COALESCE(MAX(id), 0) AS last_id FROM membership_application \
         WHERE payment_id IS NOT NULL",
    )
    .fetch_one(pool)
    .await
    .map_err(|e| format!("Failed to resolve last migrated id: {}", e))?;

    row.try_get("last_id")
        .map_err(|e| format!("Failed to read last migrated id: {}", e))
}

/// Operator verification query: source rows still lacking a destination
/// reference. Drives the exit-code decision and manual auditing.
pub async fn missing_payment_reference_count(pool: &Pool<Sqlite>) -> Result<i64, String> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS missing FROM membership_application WHERE payment_id IS NULL",
    )
    .fetch_one(pool)
    .await
    .map_err(|e| format!("Failed to count rows without payment reference: {}", e))?;

    row.try_get("missing")
        .map_err(|e| format!("Failed to read missing reference count: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> Pool<Sqlite> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("sqlite memory");
        init_schema(&pool).await.expect("schema");
        pool
    }

    async fn seed(pool: &Pool<Sqlite>, id: i64, payment_id: Option<i64>) {
        sqlx::query(
            "INSERT INTO membership_application \
             (id, amount, payment_interval, payment_type, status, created_at, payment_id) \
             VALUES (?, '10', 12, 'PPL', 1, '2010-01-01 10:00:00', ?)",
        )
        .bind(id)
        .bind(payment_id)
        .execute(pool)
        .await
        .expect("seed row");
    }

    #[tokio::test]
    async fn max_and_last_migrated_ids_default_to_zero_on_an_empty_table() {
        let pool = test_pool().await;
        assert_eq!(source_max_id(&pool).await.expect("max id"), 0);
        assert_eq!(last_migrated_id(&pool).await.expect("last id"), 0);
        assert_eq!(
            missing_payment_reference_count(&pool).await.expect("count"),
            0
        );
    }

    #[tokio::test]
    async fn verification_queries_reflect_the_back_fill_state() {
        let pool = test_pool().await;
        seed(&pool, 1, Some(1)).await;
        seed(&pool, 2, Some(2)).await;
        seed(&pool, 3, None).await;
        seed(&pool, 7, None).await;

        assert_eq!(source_max_id(&pool).await.expect("max id"), 7);
        assert_eq!(last_migrated_id(&pool).await.expect("last id"), 2);
        assert_eq!(
            missing_payment_reference_count(&pool).await.expect("count"),
            2
        );
    }
}
